//! The server-side run loop.
//!
//! A single cooperative task owns the viewer group registry and ticks at a
//! fixed target rate (default 30 Hz): each tick advances every live viewer
//! by one frame, drops groups whose viewer the user closed, polls the
//! transport channel for at most one inbound message, and re-evaluates the
//! termination conditions. The rate is enforced by measuring the loop body
//! and sleeping only the remainder; an overrunning body is never "caught up"
//! with extra ticks.
//!
//! Content errors (an image the viewer cannot display) are logged and the
//! message dropped; nothing a producer sends can take the loop down. Only
//! `StopProcess`, or `StopWhenAllWindowsClosed` followed by the user closing
//! the last window, ends the loop.

use std::time::Duration;

use pixlog_core::{ImageMessage, LogMessage, SampleType};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::registry::ViewerGroupRegistry;
use crate::viewer::{check_displayable, FigureSink, ViewerFactory};

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Target tick rate of the run loop.
    pub tick_rate_hz: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 30 }
    }
}

/// Routes inbound messages to per-group viewers and decides when to stop.
pub struct Dispatcher {
    registry: ViewerGroupRegistry,
    figures: Option<Box<dyn FigureSink>>,
    warned_missing_figures: bool,
    stop_when_all_windows_closed: bool,
    shutdown: bool,
    tick_period: Duration,
}

impl Dispatcher {
    /// Builds a dispatcher around a viewer factory and an optional plotting
    /// capability. Passing `None` for `figures` degrades `Figure` messages to
    /// a one-time warning.
    pub fn new(
        factory: Box<dyn ViewerFactory>,
        figures: Option<Box<dyn FigureSink>>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry: ViewerGroupRegistry::new(factory),
            figures,
            warned_missing_figures: false,
            stop_when_all_windows_closed: false,
            shutdown: false,
            tick_period: Duration::from_secs_f64(1.0 / f64::from(config.tick_rate_hz.max(1))),
        }
    }

    /// The registry of live viewer groups.
    pub fn registry(&self) -> &ViewerGroupRegistry {
        &self.registry
    }

    /// Runs the tick loop until a termination condition is met.
    pub async fn run(&mut self, rx: &mut mpsc::Receiver<LogMessage>) {
        info!(
            "dispatcher running, tick period {:?}",
            self.tick_period
        );
        while !self.should_stop() {
            let tick_start = Instant::now();
            self.tick(rx);
            if let Some(remaining) = self.tick_period.checked_sub(tick_start.elapsed()) {
                time::sleep(remaining).await;
            }
        }
        info!("dispatcher stopped");
    }

    /// One loop iteration: advance viewers, then poll for at most one
    /// inbound message.
    pub fn tick(&mut self, rx: &mut mpsc::Receiver<LogMessage>) {
        self.registry.advance_all(self.tick_period.as_secs_f32());

        match rx.try_recv() {
            Ok(msg) => self.dispatch(msg),
            Err(mpsc::error::TryRecvError::Empty) => {}
            // All transports are gone; the loop keeps ticking so open
            // viewers stay interactive until a stop condition fires.
            Err(mpsc::error::TryRecvError::Disconnected) => {}
        }
    }

    /// Applies one inbound message to the registry and flags.
    pub fn dispatch(&mut self, msg: LogMessage) {
        match msg {
            LogMessage::Image(image) => {
                if let Err(e) = check_displayable(&image) {
                    warn!("unsupported payload, dropping image '{}': {e}", image.name);
                    return;
                }
                let image = widen_bool_mask(image);
                if let Err(e) = self.registry.add_image(&image) {
                    warn!("viewer refused image '{}': {e}", image.name);
                }
            }
            LogMessage::Figure(figure) => match self.figures.as_mut() {
                Some(sink) => {
                    debug!("showing figure '{}' ({})", figure.name, figure.figure_id);
                    sink.show_figure(figure.figure_id, &figure.name);
                }
                None => {
                    if !self.warned_missing_figures {
                        warn!("received a figure, but no plotting capability is available");
                        self.warned_missing_figures = true;
                    }
                }
            },
            LogMessage::StopWhenAllWindowsClosed => {
                info!("will stop once all windows are closed");
                self.stop_when_all_windows_closed = true;
            }
            LogMessage::StopProcess => {
                info!("stop requested");
                self.shutdown = true;
            }
            // Connection-level frames are consumed by the transport; nothing
            // to route here.
            LogMessage::Close | LogMessage::Version(_) => {
                debug!("ignoring connection-level {:?} frame", msg.kind());
            }
        }
    }

    /// Termination check, evaluated once per tick.
    pub fn should_stop(&self) -> bool {
        if self.shutdown {
            return true;
        }
        let open_figures = self.figures.as_ref().map_or(0, |f| f.open_count());
        self.stop_when_all_windows_closed
            && self.registry.ever_created()
            && self.registry.is_empty()
            && open_figures == 0
    }
}

/// Widens a bool mask to `u8` (0 or 255) so viewers only ever see displayable
/// sample types.
fn widen_bool_mask(image: ImageMessage) -> ImageMessage {
    if image.sample_type != SampleType::Bool {
        return image;
    }
    ImageMessage {
        sample_type: SampleType::U8,
        pixels: image
            .pixels
            .iter()
            .map(|&b| if b != 0 { 255 } else { 0 })
            .collect(),
        ..image
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
