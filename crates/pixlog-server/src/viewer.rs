//! The viewer capability boundary.
//!
//! Actual pixel rendering and window management live outside this crate,
//! behind the [`Viewer`] trait: the dispatcher hands buffers to a viewer,
//! advances it once per tick, and watches for user-driven exit intent.
//! Plotting is a second, independently optional capability behind
//! [`FigureSink`]; a server built without one degrades to a one-time warning
//! on the first figure received.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pixlog_core::ImageMessage;
use thiserror::Error;
use tracing::info;

/// Errors a viewer can report when handed an image.
#[derive(Debug, Error, PartialEq)]
pub enum ViewerError {
    /// The viewer cannot display this shape/dtype combination. The message
    /// is dropped and logged; the dispatch loop continues.
    #[error("unsupported image: {0}")]
    Unsupported(String),
}

/// One displayable window of images, owned by a viewer group.
pub trait Viewer: Send {
    /// Displays `image` under its name, replacing an existing image of the
    /// same name when `image.replace` is set.
    fn add_image(&mut self, image: &ImageMessage) -> Result<(), ViewerError>;

    /// Advances the viewer by one frame. `dt` is the seconds elapsed since
    /// the previous frame.
    fn render_frame(&mut self, dt: f32);

    /// Whether the user asked to close this viewer (e.g. closed its window).
    fn exit_requested(&self) -> bool;
}

/// Creates viewers lazily, one per group, on the first message naming the group.
pub trait ViewerFactory: Send {
    fn create(&self, group: &str) -> Box<dyn Viewer>;
}

/// Optional plotting capability for `Figure` frames.
///
/// Showing a figure under an existing name replaces the previous one.
/// Implementations own the figure registry and its user-driven close events;
/// [`FigureSink::open_count`] feeds the dispatcher's stop-on-empty condition.
pub trait FigureSink: Send {
    fn show_figure(&mut self, figure_id: u64, name: &str);

    /// Number of figures the user has not yet closed.
    fn open_count(&self) -> usize;
}

/// Shape/dtype gate shared by the dispatcher and the bundled viewer.
///
/// Checked before a group is created, so an undisplayable image leaves the
/// registry untouched.
pub fn check_displayable(image: &ImageMessage) -> Result<(), ViewerError> {
    if image.channels == 0 || image.channels > 4 {
        return Err(ViewerError::Unsupported(format!(
            "{} channel(s), displayable range is 1..=4",
            image.channels
        )));
    }
    if image.pixels.len() as u64 != image.expected_pixel_len() {
        return Err(ViewerError::Unsupported(format!(
            "{}x{}x{} {:?} implies {} bytes, buffer has {}",
            image.width,
            image.height,
            image.channels,
            image.sample_type,
            image.expected_pixel_len(),
            image.pixels.len()
        )));
    }
    Ok(())
}

// ── Headless viewer ───────────────────────────────────────────────────────────

/// Default viewer used by the shipped binary: accepts buffers and logs them
/// without opening windows. A GUI build swaps in a real [`ViewerFactory`]
/// when wiring the dispatcher in `main`.
#[derive(Default)]
pub struct HeadlessViewer {
    group: String,
    images: HashMap<String, ImageMessage>,
    frames_rendered: u64,
}

impl HeadlessViewer {
    pub fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            ..Default::default()
        }
    }
}

impl Viewer for HeadlessViewer {
    fn add_image(&mut self, image: &ImageMessage) -> Result<(), ViewerError> {
        check_displayable(image)?;
        if !image.replace && self.images.contains_key(&image.name) {
            return Ok(());
        }
        info!(
            "group '{}': image '{}' {}x{}x{} {:?}",
            self.group, image.name, image.width, image.height, image.channels, image.sample_type
        );
        self.images.insert(image.name.clone(), image.clone());
        Ok(())
    }

    fn render_frame(&mut self, _dt: f32) {
        self.frames_rendered += 1;
    }

    fn exit_requested(&self) -> bool {
        // No window, no way for the user to close one.
        false
    }
}

/// Factory for [`HeadlessViewer`]s.
pub struct HeadlessViewerFactory;

impl ViewerFactory for HeadlessViewerFactory {
    fn create(&self, group: &str) -> Box<dyn Viewer> {
        Box::new(HeadlessViewer::new(group))
    }
}

// ── Mock viewer ───────────────────────────────────────────────────────────────

/// Shared observable state of a [`MockViewer`], held by the test.
///
/// The registry owns the viewer itself, so tests keep a [`MockViewerProbe`]
/// and flip `exit_requested` or inspect the records through it.
#[derive(Default)]
pub struct MockViewerState {
    /// `(image name, replace flag)` for every accepted image, in order.
    pub added: Mutex<Vec<(String, bool)>>,
    /// Number of `render_frame` calls.
    pub frames: Mutex<u64>,
    /// When `true`, every `add_image` fails with `ViewerError::Unsupported`.
    pub reject_images: AtomicBool,
    /// Simulates the user closing the window.
    pub exit_requested: AtomicBool,
}

/// Test handle to a mock viewer's state.
pub type MockViewerProbe = Arc<MockViewerState>;

/// A viewer that records calls instead of rendering, for dispatcher and
/// registry tests.
pub struct MockViewer {
    state: MockViewerProbe,
}

impl MockViewer {
    pub fn new() -> (Self, MockViewerProbe) {
        let state = Arc::new(MockViewerState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Viewer for MockViewer {
    fn add_image(&mut self, image: &ImageMessage) -> Result<(), ViewerError> {
        if self.state.reject_images.load(Ordering::Relaxed) {
            return Err(ViewerError::Unsupported("mock rejection".to_string()));
        }
        self.state
            .added
            .lock()
            .unwrap()
            .push((image.name.clone(), image.replace));
        Ok(())
    }

    fn render_frame(&mut self, _dt: f32) {
        *self.state.frames.lock().unwrap() += 1;
    }

    fn exit_requested(&self) -> bool {
        self.state.exit_requested.load(Ordering::Relaxed)
    }
}

/// Factory that creates [`MockViewer`]s and exposes a probe per group.
#[derive(Default)]
pub struct MockViewerFactory {
    /// Probe for each created viewer, keyed by group name.
    pub probes: Mutex<HashMap<String, MockViewerProbe>>,
}

impl MockViewerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The probe for `group`, if a viewer was created for it.
    pub fn probe(&self, group: &str) -> Option<MockViewerProbe> {
        self.probes.lock().unwrap().get(group).cloned()
    }
}

impl ViewerFactory for Arc<MockViewerFactory> {
    fn create(&self, group: &str) -> Box<dyn Viewer> {
        let (viewer, probe) = MockViewer::new();
        self.probes
            .lock()
            .unwrap()
            .insert(group.to_string(), probe);
        Box::new(viewer)
    }
}

/// Shared observable state of a [`MockFigureSink`], held by the test.
#[derive(Default)]
pub struct MockFigureSinkState {
    /// `(figure_id, name)` for every shown figure, in order.
    pub shown: Mutex<Vec<(u64, String)>>,
    /// Names of figures not yet closed. Tests remove a name to simulate the
    /// user closing that figure.
    pub open: Mutex<std::collections::HashSet<String>>,
}

/// Figure sink that records shown figures, for dispatcher tests.
pub struct MockFigureSink {
    state: Arc<MockFigureSinkState>,
}

impl MockFigureSink {
    pub fn new() -> (Self, Arc<MockFigureSinkState>) {
        let state = Arc::new(MockFigureSinkState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl FigureSink for MockFigureSink {
    fn show_figure(&mut self, figure_id: u64, name: &str) {
        self.state
            .shown
            .lock()
            .unwrap()
            .push((figure_id, name.to_string()));
        // Re-showing an existing name replaces it; it stays a single open figure.
        self.state.open.lock().unwrap().insert(name.to_string());
    }

    fn open_count(&self) -> usize {
        self.state.open.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixlog_core::SampleType;

    fn image(channels: u32) -> ImageMessage {
        ImageMessage {
            name: "x".to_string(),
            group: "g".to_string(),
            width: 2,
            height: 2,
            channels,
            sample_type: SampleType::U8,
            replace: true,
            pixels: vec![0; (4 * channels) as usize],
        }
    }

    #[test]
    fn test_headless_viewer_accepts_displayable_channel_counts() {
        let mut viewer = HeadlessViewer::new("g");
        for channels in 1..=4 {
            assert_eq!(viewer.add_image(&image(channels)), Ok(()));
        }
    }

    #[test]
    fn test_headless_viewer_rejects_five_channels() {
        let mut viewer = HeadlessViewer::new("g");
        assert!(matches!(
            viewer.add_image(&image(5)),
            Err(ViewerError::Unsupported(_))
        ));
    }

    #[test]
    fn test_headless_viewer_never_requests_exit() {
        let mut viewer = HeadlessViewer::new("g");
        viewer.render_frame(0.033);
        assert!(!viewer.exit_requested());
    }

    #[test]
    fn test_headless_viewer_keeps_existing_image_without_replace() {
        let mut viewer = HeadlessViewer::new("g");
        let mut first = image(1);
        first.pixels = vec![1; 4];
        viewer.add_image(&first).unwrap();

        let mut second = image(1);
        second.replace = false;
        second.pixels = vec![2; 4];
        viewer.add_image(&second).unwrap();

        assert_eq!(viewer.images["x"].pixels, vec![1; 4]);
    }

    #[test]
    fn test_mock_viewer_records_and_exits_on_demand() {
        let (mut viewer, probe) = MockViewer::new();
        viewer.add_image(&image(3)).unwrap();
        assert_eq!(probe.added.lock().unwrap().len(), 1);

        assert!(!viewer.exit_requested());
        probe.exit_requested.store(true, Ordering::Relaxed);
        assert!(viewer.exit_requested());
    }
}
