//! Binary codec for encoding and decoding pixlog protocol frames.
//!
//! Wire format:
//! ```text
//! [kind:4][payload_len:8][payload:N]
//! ```
//! Total header size: 12 bytes. All multi-byte integers are little-endian
//! and unsigned. The declared payload length always matches the number of
//! payload bytes that follow; a stream that ends before a frame completes is
//! a truncation error, fatal to the connection that produced it.

use thiserror::Error;

use crate::protocol::messages::{
    FigureMessage, FrameKind, ImageMessage, LogMessage, SampleType, HEADER_SIZE,
};

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error, PartialEq)]
pub enum FramingError {
    /// The byte stream ended before the frame was complete. There is no
    /// partial-frame recovery: the connection carrying the frame is dead.
    #[error("truncated frame: need at least {needed} bytes, got {available}")]
    Truncated { needed: u64, available: u64 },

    /// The kind field is not a member of the closed [`FrameKind`] table.
    #[error("unknown frame kind: {0}")]
    UnknownKind(u32),

    /// A fixed-payload kind carried the wrong payload length
    /// (`Close` must be empty, `Version` must be exactly 4 bytes).
    #[error("invalid payload length {len} for {kind:?} frame")]
    InvalidPayloadLength { kind: FrameKind, len: u64 },

    /// The payload could not be parsed (field out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The image pixel buffer does not match the declared shape and dtype.
    #[error("pixel buffer length mismatch: shape implies {expected} bytes, got {actual}")]
    PixelLengthMismatch { expected: u64, actual: u64 },
}

/// One length-prefixed protocol unit: a kind plus its raw payload.
///
/// Frames are immutable once constructed; [`Frame::new`] is the only way to
/// build one and it validates the fixed-length payload kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame, rejecting payload lengths the kind does not allow.
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Result<Self, FramingError> {
        check_payload_len(kind, payload.len() as u64)?;
        Ok(Self { kind, payload })
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

fn check_payload_len(kind: FrameKind, len: u64) -> Result<(), FramingError> {
    let valid = match kind {
        FrameKind::Close
        | FrameKind::StopWhenAllWindowsClosed
        | FrameKind::StopProcess => len == 0,
        FrameKind::Version => len == 4,
        FrameKind::Image | FrameKind::Figure => true,
    };
    if valid {
        Ok(())
    } else {
        Err(FramingError::InvalidPayloadLength { kind, len })
    }
}

// ── Frame-level API ───────────────────────────────────────────────────────────

/// Encodes a frame into the 12-byte header plus payload.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frame.wire_size());
    buf.extend_from_slice(&(frame.kind() as u32).to_le_bytes());
    buf.extend_from_slice(&(frame.payload().len() as u64).to_le_bytes());
    buf.extend_from_slice(frame.payload());
    buf
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the frame and the total number of bytes consumed (header plus
/// payload) so the caller can advance its read cursor.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FramingError> {
    if bytes.len() < HEADER_SIZE {
        return Err(FramingError::Truncated {
            needed: HEADER_SIZE as u64,
            available: bytes.len() as u64,
        });
    }

    let kind_raw = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let kind = FrameKind::try_from(kind_raw).map_err(|_| FramingError::UnknownKind(kind_raw))?;

    let payload_len = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
    check_payload_len(kind, payload_len)?;

    let total_needed = HEADER_SIZE as u64 + payload_len;
    if (bytes.len() as u64) < total_needed {
        return Err(FramingError::Truncated {
            needed: total_needed,
            available: bytes.len() as u64,
        });
    }

    let payload = bytes[HEADER_SIZE..HEADER_SIZE + payload_len as usize].to_vec();
    Ok((Frame { kind, payload }, total_needed as usize))
}

// ── Message-level API ─────────────────────────────────────────────────────────

/// Encodes a [`LogMessage`] into a complete wire frame.
///
/// # Errors
///
/// Returns [`FramingError::PixelLengthMismatch`] when an image's pixel buffer
/// does not match its declared shape.
pub fn encode_message(msg: &LogMessage) -> Result<Vec<u8>, FramingError> {
    let payload = encode_payload(msg)?;
    let frame = Frame::new(msg.kind(), payload)?;
    Ok(encode_frame(&frame))
}

/// Decodes one [`LogMessage`] from the beginning of `bytes`.
///
/// Returns the message and the total number of bytes consumed.
pub fn decode_message(bytes: &[u8]) -> Result<(LogMessage, usize), FramingError> {
    let (frame, consumed) = decode_frame(bytes)?;
    let msg = decode_payload(frame.kind(), frame.payload())?;
    Ok((msg, consumed))
}

/// Decodes the payload of an already-framed message.
///
/// Transports that read the header and payload off a socket themselves call
/// this directly instead of re-assembling a contiguous frame buffer.
pub fn decode_payload(kind: FrameKind, payload: &[u8]) -> Result<LogMessage, FramingError> {
    check_payload_len(kind, payload.len() as u64)?;
    match kind {
        FrameKind::Close => Ok(LogMessage::Close),
        FrameKind::Version => {
            let version = u32::from_le_bytes(payload.try_into().unwrap());
            Ok(LogMessage::Version(version))
        }
        FrameKind::Image => decode_image(payload).map(LogMessage::Image),
        FrameKind::Figure => decode_figure(payload).map(LogMessage::Figure),
        FrameKind::StopWhenAllWindowsClosed => Ok(LogMessage::StopWhenAllWindowsClosed),
        FrameKind::StopProcess => Ok(LogMessage::StopProcess),
    }
}

fn encode_payload(msg: &LogMessage) -> Result<Vec<u8>, FramingError> {
    let mut buf = Vec::new();
    match msg {
        LogMessage::Close
        | LogMessage::StopWhenAllWindowsClosed
        | LogMessage::StopProcess => {}
        LogMessage::Version(version) => buf.extend_from_slice(&version.to_le_bytes()),
        LogMessage::Image(m) => encode_image(&mut buf, m)?,
        LogMessage::Figure(m) => encode_figure(&mut buf, m),
    }
    Ok(buf)
}

// ── Per-message encode helpers ────────────────────────────────────────────────

fn encode_image(buf: &mut Vec<u8>, m: &ImageMessage) -> Result<(), FramingError> {
    let expected = m.expected_pixel_len();
    if m.pixels.len() as u64 != expected {
        return Err(FramingError::PixelLengthMismatch {
            expected,
            actual: m.pixels.len() as u64,
        });
    }
    write_length_prefixed_string(buf, &m.name);
    write_length_prefixed_string(buf, &m.group);
    buf.extend_from_slice(&m.width.to_le_bytes());
    buf.extend_from_slice(&m.height.to_le_bytes());
    buf.extend_from_slice(&m.channels.to_le_bytes());
    buf.push(m.sample_type as u8);
    buf.push(if m.replace { 0x01 } else { 0x00 });
    buf.extend_from_slice(&(m.pixels.len() as u64).to_le_bytes());
    buf.extend_from_slice(&m.pixels);
    Ok(())
}

fn encode_figure(buf: &mut Vec<u8>, m: &FigureMessage) {
    buf.extend_from_slice(&m.figure_id.to_le_bytes());
    write_length_prefixed_string(buf, &m.name);
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_image(p: &[u8]) -> Result<ImageMessage, FramingError> {
    let (name, off) = read_length_prefixed_string(p, 0)?;
    let (group, off) = read_length_prefixed_string(p, off)?;
    // width(4) + height(4) + channels(4) + sample_type(1) + replace(1) + pixel_len(8)
    require_len(p, off + 22, "Image header")?;
    let width = read_u32(p, off);
    let height = read_u32(p, off + 4);
    let channels = read_u32(p, off + 8);
    let sample_type = SampleType::try_from(p[off + 12]).map_err(|_| {
        FramingError::MalformedPayload(format!("unknown sample type: {}", p[off + 12]))
    })?;
    let replace = p[off + 13] != 0;
    let pixel_len = read_u64(p, off + 14);
    let pixels_start = off + 22;
    if (p.len() - pixels_start) as u64 != pixel_len {
        return Err(FramingError::MalformedPayload(format!(
            "pixel blob declares {pixel_len} bytes but {} remain",
            p.len() - pixels_start
        )));
    }

    let msg = ImageMessage {
        name,
        group,
        width,
        height,
        channels,
        sample_type,
        replace,
        pixels: p[pixels_start..].to_vec(),
    };
    let expected = msg.expected_pixel_len();
    if pixel_len != expected {
        return Err(FramingError::PixelLengthMismatch {
            expected,
            actual: pixel_len,
        });
    }
    Ok(msg)
}

fn decode_figure(p: &[u8]) -> Result<FigureMessage, FramingError> {
    require_len(p, 8, "Figure")?;
    let figure_id = read_u64(p, 0);
    let (name, end) = read_length_prefixed_string(p, 8)?;
    if end != p.len() {
        return Err(FramingError::MalformedPayload(format!(
            "{} trailing bytes after Figure payload",
            p.len() - end
        )));
    }
    Ok(FigureMessage { figure_id, name })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), FramingError> {
    if buf.len() < needed {
        Err(FramingError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after it.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), FramingError> {
    if buf.len() < offset + 2 {
        return Err(FramingError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_le_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(FramingError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| FramingError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> ImageMessage {
        ImageMessage {
            name: "lena".to_string(),
            group: "default".to_string(),
            width: 4,
            height: 4,
            channels: 4,
            sample_type: SampleType::U8,
            replace: true,
            pixels: vec![0xAB; 64],
        }
    }

    fn round_trip(msg: &LogMessage) -> LogMessage {
        let encoded = encode_message(msg).expect("encode failed");
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        decoded
    }

    // ── Header layout ────────────────────────────────────────────────────────

    #[test]
    fn test_header_is_twelve_bytes_little_endian() {
        let bytes = encode_message(&LogMessage::Version(1)).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 4);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 1); // kind
        assert_eq!(u64::from_le_bytes(bytes[4..12].try_into().unwrap()), 4); // payload_len
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 1); // version
    }

    #[test]
    fn test_close_frame_has_empty_payload() {
        let bytes = encode_message(&LogMessage::Close).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(u64::from_le_bytes(bytes[4..12].try_into().unwrap()), 0);
    }

    #[test]
    fn test_close_frame_with_payload_is_rejected() {
        let err = Frame::new(FrameKind::Close, vec![0x01]).unwrap_err();
        assert_eq!(
            err,
            FramingError::InvalidPayloadLength {
                kind: FrameKind::Close,
                len: 1
            }
        );
    }

    #[test]
    fn test_version_frame_requires_four_byte_payload() {
        assert!(Frame::new(FrameKind::Version, vec![1, 0, 0, 0]).is_ok());
        assert!(Frame::new(FrameKind::Version, vec![1, 0]).is_err());
        assert!(Frame::new(FrameKind::Version, vec![0; 8]).is_err());
    }

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn test_round_trip_close() {
        assert_eq!(round_trip(&LogMessage::Close), LogMessage::Close);
    }

    #[test]
    fn test_round_trip_version() {
        assert_eq!(round_trip(&LogMessage::Version(1)), LogMessage::Version(1));
        assert_eq!(
            round_trip(&LogMessage::Version(0xDEAD_BEEF)),
            LogMessage::Version(0xDEAD_BEEF)
        );
    }

    #[test]
    fn test_round_trip_image() {
        let msg = LogMessage::Image(sample_image());
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_round_trip_image_f32_grayscale() {
        let msg = LogMessage::Image(ImageMessage {
            name: "depth".to_string(),
            group: "sensors".to_string(),
            width: 3,
            height: 2,
            channels: 1,
            sample_type: SampleType::F32,
            replace: false,
            pixels: vec![0u8; 3 * 2 * 4],
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_round_trip_image_with_empty_name() {
        let msg = LogMessage::Image(ImageMessage {
            name: String::new(),
            group: "default".to_string(),
            width: 1,
            height: 1,
            channels: 1,
            sample_type: SampleType::Bool,
            replace: true,
            pixels: vec![1],
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_round_trip_figure() {
        let msg = LogMessage::Figure(FigureMessage {
            figure_id: 7,
            name: "loss curve".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_round_trip_stop_messages() {
        assert_eq!(
            round_trip(&LogMessage::StopWhenAllWindowsClosed),
            LogMessage::StopWhenAllWindowsClosed
        );
        assert_eq!(round_trip(&LogMessage::StopProcess), LogMessage::StopProcess);
    }

    // ── Truncation ───────────────────────────────────────────────────────────

    #[test]
    fn test_decode_truncated_at_every_length_fails() {
        let full = encode_message(&LogMessage::Image(sample_image())).unwrap();
        for n in 0..full.len() {
            let result = decode_message(&full[..n]);
            assert!(
                matches!(result, Err(FramingError::Truncated { .. })),
                "prefix of {n} bytes must fail as truncated, got {result:?}"
            );
        }
    }

    #[test]
    fn test_decode_empty_slice_is_truncated() {
        assert!(matches!(
            decode_frame(&[]),
            Err(FramingError::Truncated { needed: 12, available: 0 })
        ));
    }

    // ── Malformed input ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_unknown_kind_is_rejected() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(decode_frame(&bytes).unwrap_err(), FramingError::UnknownKind(99));
    }

    #[test]
    fn test_decode_close_with_declared_payload_is_rejected() {
        let mut bytes = vec![0u8; HEADER_SIZE + 3];
        bytes[4..12].copy_from_slice(&3u64.to_le_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(FramingError::InvalidPayloadLength {
                kind: FrameKind::Close,
                len: 3
            })
        ));
    }

    #[test]
    fn test_decode_image_with_unknown_sample_type_fails() {
        let mut encoded = encode_message(&LogMessage::Image(sample_image())).unwrap();
        // name(2+4) + group(2+7) + width(4) + height(4) + channels(4) puts the
        // sample type byte at payload offset 27, wire offset 12 + 27.
        encoded[HEADER_SIZE + 27] = 9;
        assert!(matches!(
            decode_message(&encoded),
            Err(FramingError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_encode_image_with_short_pixel_buffer_fails() {
        let mut img = sample_image();
        img.pixels.truncate(10);
        assert_eq!(
            encode_message(&LogMessage::Image(img)).unwrap_err(),
            FramingError::PixelLengthMismatch {
                expected: 64,
                actual: 10
            }
        );
    }

    #[test]
    fn test_decode_image_with_wrong_shape_fails() {
        // Re-declare the width so the shape no longer matches the pixel blob.
        let mut encoded = encode_message(&LogMessage::Image(sample_image())).unwrap();
        let width_off = HEADER_SIZE + 2 + 4 + 2 + 7;
        encoded[width_off..width_off + 4].copy_from_slice(&5u32.to_le_bytes());
        assert!(matches!(
            decode_message(&encoded),
            Err(FramingError::PixelLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_figure_with_trailing_garbage_fails() {
        let mut encoded = encode_message(&LogMessage::Figure(FigureMessage {
            figure_id: 1,
            name: "f".to_string(),
        }))
        .unwrap();
        encoded.push(0xFF);
        let payload_len = encoded.len() as u64 - HEADER_SIZE as u64;
        encoded[4..12].copy_from_slice(&payload_len.to_le_bytes());
        assert!(matches!(
            decode_message(&encoded),
            Err(FramingError::MalformedPayload(_))
        ));
    }
}
