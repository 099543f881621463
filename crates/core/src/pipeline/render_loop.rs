use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::capture::domain::camera_source::FrameSource;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::overlay::domain::canvas::Canvas;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::overlay::domain::presenter::Presenter;

use super::cancellation::CancellationToken;
use super::frame_clock::FrameClock;

/// Counters for one loop run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub inferences: u64,
    /// Ticks that saw the same frame position as the previous inference.
    pub skipped: u64,
    /// Ticks before the source had a usable frame.
    pub idle: u64,
    pub failures: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Skipped,
    Rendered { faces: usize },
    Failed,
}

/// Frame-synchronized detect → render → present loop.
///
/// Each distinct frame position is sent to the detector at most once, with
/// a millisecond timestamp that strictly increases across calls.
pub struct RenderLoop<C: Canvas> {
    renderer: OverlayRenderer<C>,
    presenter: Option<Box<dyn Presenter<C>>>,
    token: CancellationToken,
    started: Instant,
    last_position: Option<Duration>,
    last_timestamp: Option<u64>,
    stats: LoopStats,
}

impl<C: Canvas> RenderLoop<C> {
    pub fn new(renderer: OverlayRenderer<C>) -> Self {
        Self {
            renderer,
            presenter: None,
            token: CancellationToken::new(),
            started: Instant::now(),
            last_position: None,
            last_timestamp: None,
            stats: LoopStats::default(),
        }
    }

    pub fn with_presenter(mut self, presenter: Box<dyn Presenter<C>>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Token that stops [`RenderLoop::run`] before its next tick.
    pub fn stop_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn renderer(&self) -> &OverlayRenderer<C> {
        &self.renderer
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Forgets frame history and counters and clears the stop flag.
    pub fn reset(&mut self) {
        self.token.reset();
        self.started = Instant::now();
        self.last_position = None;
        self.last_timestamp = None;
        self.stats = LoopStats::default();
    }

    /// Runs one iteration. Failures, panics included, are logged and
    /// counted, never returned.
    pub fn tick(
        &mut self,
        source: &dyn FrameSource,
        detector: &mut dyn LandmarkDetector,
    ) -> TickOutcome {
        self.stats.ticks += 1;
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| self.try_tick(source, detector)));
        let outcome = match attempt {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log::warn!("Render tick failed: {e}");
                TickOutcome::Failed
            }
            Err(payload) => {
                log::warn!("Render tick panicked: {}", panic_message(payload.as_ref()));
                TickOutcome::Failed
            }
        };
        match outcome {
            TickOutcome::Idle => self.stats.idle += 1,
            TickOutcome::Skipped => self.stats.skipped += 1,
            TickOutcome::Failed => self.stats.failures += 1,
            TickOutcome::Rendered { .. } => {}
        }
        outcome
    }

    /// Ticks until stopped, waiting on `clock` between ticks.
    pub fn run(
        &mut self,
        source: &dyn FrameSource,
        detector: &mut dyn LandmarkDetector,
        clock: &mut dyn FrameClock,
    ) -> LoopStats {
        log::debug!("Render loop started");
        while !self.is_stopped() {
            self.tick(source, detector);
            clock.wait_for_next_refresh();
        }
        let s = self.stats;
        log::info!(
            "Render loop stopped: {} ticks, {} inferences, {} skipped, {} idle, {} failures",
            s.ticks,
            s.inferences,
            s.skipped,
            s.idle,
            s.failures
        );
        s
    }

    fn try_tick(
        &mut self,
        source: &dyn FrameSource,
        detector: &mut dyn LandmarkDetector,
    ) -> Result<TickOutcome, Box<dyn std::error::Error>> {
        let Some(frame) = source.current_frame() else {
            return Ok(TickOutcome::Idle);
        };
        if !frame.has_dimensions() {
            return Ok(TickOutcome::Idle);
        }

        let canvas = self.renderer.canvas_mut();
        if canvas.width() != frame.width() || canvas.height() != frame.height() {
            log::debug!("Canvas resized to {}x{}", frame.width(), frame.height());
            canvas.resize(frame.width(), frame.height());
        }

        if self.last_position == Some(frame.position()) {
            return Ok(TickOutcome::Skipped);
        }
        self.last_position = Some(frame.position());

        let timestamp = self.next_timestamp();
        self.stats.inferences += 1;
        let result = detector.detect(&frame, timestamp)?;
        self.renderer.render(&result);

        if let Some(presenter) = self.presenter.as_mut() {
            presenter.present(&frame, self.renderer.canvas())?;
        }
        Ok(TickOutcome::Rendered {
            faces: result.faces.len(),
        })
    }

    fn next_timestamp(&mut self) -> u64 {
        let elapsed = self.started.elapsed().as_millis() as u64;
        let timestamp = match self.last_timestamp {
            Some(last) => elapsed.max(last + 1),
            None => elapsed,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
