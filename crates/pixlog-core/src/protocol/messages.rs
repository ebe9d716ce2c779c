//! All pixlog protocol message types.
//!
//! One frame on the wire carries one [`LogMessage`]. The 12-byte frame
//! header (kind + payload length) is defined in [`crate::protocol::codec`];
//! this module defines the typed payloads that travel inside frames.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version, carried in the `Version` handshake frame.
pub const PROTOCOL_VERSION: u32 = 1;

/// Total size of the frame header in bytes: 4-byte kind + 8-byte payload length.
pub const HEADER_SIZE: usize = 12;

// ── Frame kinds ───────────────────────────────────────────────────────────────

/// Frame kind discriminator, a 4-byte little-endian unsigned field on the wire.
///
/// The enumeration is closed: a decoder that meets a value outside this table
/// rejects the frame instead of skipping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum FrameKind {
    /// Connection shutdown. Always carries an empty payload.
    Close = 0,
    /// Handshake frame sent by the server immediately after accept.
    /// The payload is exactly 4 bytes: the protocol version.
    Version = 1,
    /// An image buffer addressed to a named viewer group.
    Image = 2,
    /// A figure handle addressed to the plotting capability.
    Figure = 3,
    /// Arms the server's stop-on-empty condition: once set, the server exits
    /// when the last viewer group and figure have been closed by the user.
    StopWhenAllWindowsClosed = 4,
    /// Immediate server shutdown, regardless of open windows.
    StopProcess = 5,
}

impl TryFrom<u32> for FrameKind {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(FrameKind::Close),
            1 => Ok(FrameKind::Version),
            2 => Ok(FrameKind::Image),
            3 => Ok(FrameKind::Figure),
            4 => Ok(FrameKind::StopWhenAllWindowsClosed),
            5 => Ok(FrameKind::StopProcess),
            _ => Err(()),
        }
    }
}

// ── Image payload ─────────────────────────────────────────────────────────────

/// Per-sample storage type of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SampleType {
    U8 = 0,
    F32 = 1,
    Bool = 2,
}

impl SampleType {
    /// Number of bytes one sample occupies in the pixel buffer.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::U8 | SampleType::Bool => 1,
            SampleType::F32 => 4,
        }
    }
}

impl TryFrom<u8> for SampleType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(SampleType::U8),
            1 => Ok(SampleType::F32),
            2 => Ok(SampleType::Bool),
            _ => Err(()),
        }
    }
}

/// IMAGE (kind 2): one image buffer addressed to a named viewer group.
///
/// Invariant: `pixels.len()` equals
/// `width * height * channels * sample_type.bytes_per_sample()`.
/// The codec enforces this on both encode and decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    /// Display name of the image within its group.
    pub name: String,
    /// Viewer group the image belongs to. Images addressed to the same group
    /// share one viewer instance on the server.
    pub group: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Samples per pixel (1 = grayscale, 3 = RGB, 4 = RGBA).
    pub channels: u32,
    /// Storage type of each sample.
    pub sample_type: SampleType,
    /// Whether an existing image of the same name in the group is replaced.
    pub replace: bool,
    /// Raw sample data, row-major.
    pub pixels: Vec<u8>,
}

impl ImageMessage {
    /// The pixel buffer length implied by the shape and sample type.
    pub fn expected_pixel_len(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.channels as u64
            * self.sample_type.bytes_per_sample() as u64
    }
}

// ── Figure payload ────────────────────────────────────────────────────────────

/// FIGURE (kind 3): a figure handle forwarded to the plotting capability.
///
/// The figure contents themselves are owned by the external plotting
/// capability; the wire carries only the handle and its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureMessage {
    /// Producer-assigned handle identifying the figure.
    pub figure_id: u64,
    /// Window title; showing a figure under an existing name replaces it.
    pub name: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// One decoded protocol message.
///
/// The dispatcher matches on this exhaustively, so adding a kind is a
/// compile-time-checked change at every dispatch site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogMessage {
    Close,
    Version(u32),
    Image(ImageMessage),
    Figure(FigureMessage),
    StopWhenAllWindowsClosed,
    StopProcess,
}

impl LogMessage {
    /// The frame kind this message is carried under.
    pub fn kind(&self) -> FrameKind {
        match self {
            LogMessage::Close => FrameKind::Close,
            LogMessage::Version(_) => FrameKind::Version,
            LogMessage::Image(_) => FrameKind::Image,
            LogMessage::Figure(_) => FrameKind::Figure,
            LogMessage::StopWhenAllWindowsClosed => FrameKind::StopWhenAllWindowsClosed,
            LogMessage::StopProcess => FrameKind::StopProcess,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
