use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::capture::domain::camera_source::{CameraProvider, CameraRequest, FrameSource};
use crate::detection::domain::landmark_detector::{LandmarkDetector, LandmarkDetectorFactory};
use crate::overlay::domain::canvas::Canvas;
use crate::shared::constants::{FIRST_FRAME_TIMEOUT_SECS, NOISY_ENGINE_INIT_LOGS};
use crate::shared::logging;

use super::frame_clock::FrameClock;
use super::lifecycle::{
    transition, InvalidTransition, LifecycleError, LifecycleEvent, RenderState, StatusUpdate,
};
use super::render_loop::{LoopStats, RenderLoop};

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub camera_request: CameraRequest,
    pub first_frame_timeout: Duration,
    /// Log text hidden while the engine is being constructed.
    pub suppressed_logs: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            camera_request: CameraRequest::default(),
            first_frame_timeout: Duration::from_secs(FIRST_FRAME_TIMEOUT_SECS),
            suppressed_logs: NOISY_ENGINE_INIT_LOGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A running engine and camera pair.
///
/// Dropping the session releases the camera and disposes the engine.
pub struct ActiveSession {
    detector: Box<dyn LandmarkDetector>,
    source: Box<dyn FrameSource>,
    released: Arc<AtomicBool>,
    torn_down: bool,
}

impl ActiveSession {
    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    /// Split borrow for driving a [`RenderLoop`].
    pub fn parts(&mut self) -> (&dyn FrameSource, &mut dyn LandmarkDetector) {
        (self.source.as_ref(), self.detector.as_mut())
    }

    /// Releases the camera and disposes the engine. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.source.release();
        self.detector.dispose();
        self.released.store(true, Ordering::Relaxed);
        log::info!("Session released");
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Brings up the engine and camera in order and reports progress.
///
/// State only moves through [`transition`]; every change is published as a
/// [`StatusUpdate`] when a status channel is attached.
pub struct LifecycleController {
    factory: Box<dyn LandmarkDetectorFactory>,
    camera: Box<dyn CameraProvider>,
    config: LifecycleConfig,
    state: RenderState,
    last_error: Option<LifecycleError>,
    released: Arc<AtomicBool>,
    status_tx: Option<Sender<StatusUpdate>>,
}

impl LifecycleController {
    pub fn new(
        factory: Box<dyn LandmarkDetectorFactory>,
        camera: Box<dyn CameraProvider>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            factory,
            camera,
            config,
            state: RenderState::Initializing,
            last_error: None,
            released: Arc::new(AtomicBool::new(false)),
            status_tx: None,
        }
    }

    pub fn with_status_channel(mut self, tx: Sender<StatusUpdate>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// True once an active session has been torn down.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }

    /// Initializes the engine, then opens the camera and waits for its
    /// first frame. The camera is never requested if the engine fails.
    pub fn activate(&mut self) -> Result<ActiveSession, LifecycleError> {
        if self.state != RenderState::Initializing {
            if let Some(e) = &self.last_error {
                return Err(e.clone());
            }
            return Err(LifecycleError::Initialization {
                detail: format!("cannot activate while {}", self.state),
            });
        }
        self.publish();

        let created = {
            let _quiet = logging::suppress(self.config.suppressed_logs.iter().cloned());
            self.factory.create()
        };
        let mut detector = match created {
            Ok(detector) => detector,
            Err(e) => {
                return Err(self.fail(
                    LifecycleEvent::EngineFailed,
                    LifecycleError::Initialization {
                        detail: e.to_string(),
                    },
                ))
            }
        };
        self.advance(LifecycleEvent::EngineReady)?;

        let source = match self.camera.open(&self.config.camera_request) {
            Ok(source) => source,
            Err(e) => {
                detector.dispose();
                return Err(self.fail(
                    LifecycleEvent::CameraFailed,
                    LifecycleError::CameraAccess {
                        detail: e.to_string(),
                    },
                ));
            }
        };

        let released = Arc::new(AtomicBool::new(false));
        let session = ActiveSession {
            detector,
            source,
            released: released.clone(),
            torn_down: false,
        };
        if let Err(e) = session.source().wait_for_first_frame(self.config.first_frame_timeout) {
            drop(session);
            return Err(self.fail(
                LifecycleEvent::CameraFailed,
                LifecycleError::CameraAccess {
                    detail: e.to_string(),
                },
            ));
        }

        self.released = released;
        self.advance(LifecycleEvent::FirstFrameDecoded)?;
        Ok(session)
    }

    /// Activates, runs `render_loop` until it is stopped, then tears down.
    pub fn run<C: Canvas>(
        &mut self,
        render_loop: &mut RenderLoop<C>,
        clock: &mut dyn FrameClock,
    ) -> Result<LoopStats, LifecycleError> {
        let mut session = self.activate()?;
        let stats = {
            let (source, detector) = session.parts();
            render_loop.run(source, detector, clock)
        };
        session.teardown();
        Ok(stats)
    }

    /// Leaves the error state so [`LifecycleController::activate`] can run
    /// again.
    pub fn restart(&mut self) -> Result<(), InvalidTransition> {
        self.state = transition(&self.state, LifecycleEvent::Restart)?;
        self.last_error = None;
        self.released = Arc::new(AtomicBool::new(false));
        log::info!("Restarting");
        Ok(())
    }

    fn advance(&mut self, event: LifecycleEvent) -> Result<(), LifecycleError> {
        match transition(&self.state, event) {
            Ok(next) => {
                self.state = next;
                self.publish();
                Ok(())
            }
            Err(e) => Err(self.fail(
                LifecycleEvent::EngineFailed,
                LifecycleError::Initialization {
                    detail: e.to_string(),
                },
            )),
        }
    }

    fn fail(&mut self, event: LifecycleEvent, error: LifecycleError) -> LifecycleError {
        log::error!("{error} ({})", error.detail());
        self.state = transition(&self.state, event).unwrap_or(RenderState::Error);
        self.last_error = Some(error.clone());
        self.publish();
        error
    }

    fn publish(&self) {
        let update = StatusUpdate::for_state(self.state, self.last_error.as_ref());
        log::debug!("Status: {} ({})", update.message, self.state);
        if let Some(tx) = &self.status_tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera_source::CaptureError;
    use crate::detection::domain::face_landmarks::DetectionResult;
    use crate::overlay::domain::overlay_renderer::OverlayRenderer;
    use crate::overlay::domain::overlay_style::OverlayStyle;
    use crate::overlay::infrastructure::raster_canvas::RasterCanvas;
    use crate::pipeline::cancellation::CancellationToken;
    use crate::shared::frame::Frame;
    use std::sync::Mutex;

    // ── Fakes ──

    #[derive(Default)]
    struct Probe {
        engines_created: usize,
        engines_disposed: usize,
        camera_requests: usize,
        cameras_released: usize,
    }

    type SharedProbe = Arc<Mutex<Probe>>;

    struct FakeDetector(SharedProbe);

    impl LandmarkDetector for FakeDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            _timestamp_ms: u64,
        ) -> Result<DetectionResult, Box<dyn std::error::Error>> {
            Ok(DetectionResult::empty())
        }

        fn dispose(&mut self) {
            self.0.lock().unwrap().engines_disposed += 1;
        }
    }

    struct FakeFactory {
        probe: SharedProbe,
        fail: bool,
    }

    impl LandmarkDetectorFactory for FakeFactory {
        fn create(&self) -> Result<Box<dyn LandmarkDetector>, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("wasm fetch failed".into());
            }
            self.probe.lock().unwrap().engines_created += 1;
            Ok(Box::new(FakeDetector(self.probe.clone())))
        }
    }

    struct FakeSource {
        probe: SharedProbe,
        frame: Option<Frame>,
        released: bool,
    }

    impl FrameSource for FakeSource {
        fn current_frame(&self) -> Option<Frame> {
            self.frame.clone()
        }

        fn wait_for_first_frame(&self, timeout: Duration) -> Result<(), CaptureError> {
            match self.frame {
                Some(_) => Ok(()),
                None => Err(CaptureError::NoFrames(timeout)),
            }
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.probe.lock().unwrap().cameras_released += 1;
            }
        }

        fn is_released(&self) -> bool {
            self.released
        }
    }

    #[derive(Clone, Copy)]
    enum CameraBehavior {
        Streams,
        Denied,
        Silent,
    }

    struct FakeCamera {
        probe: SharedProbe,
        behavior: CameraBehavior,
    }

    impl CameraProvider for FakeCamera {
        fn open(
            &mut self,
            request: &CameraRequest,
        ) -> Result<Box<dyn FrameSource>, CaptureError> {
            self.probe.lock().unwrap().camera_requests += 1;
            let frame = match self.behavior {
                CameraBehavior::Denied => {
                    return Err(CaptureError::PermissionDenied("NotAllowedError".into()))
                }
                CameraBehavior::Silent => None,
                CameraBehavior::Streams => Some(Frame::new(
                    vec![0u8; (request.ideal_width * request.ideal_height * 3) as usize],
                    request.ideal_width,
                    request.ideal_height,
                    3,
                    Duration::from_millis(33),
                )),
            };
            Ok(Box::new(FakeSource {
                probe: self.probe.clone(),
                frame,
                released: false,
            }))
        }
    }

    struct StopAfter {
        remaining: usize,
        token: CancellationToken,
    }

    impl FrameClock for StopAfter {
        fn wait_for_next_refresh(&mut self) {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.token.cancel();
            }
        }
    }

    fn controller(
        engine_fails: bool,
        camera: CameraBehavior,
    ) -> (LifecycleController, SharedProbe) {
        let probe = SharedProbe::default();
        let config = LifecycleConfig {
            camera_request: CameraRequest {
                ideal_width: 16,
                ideal_height: 9,
            },
            first_frame_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let controller = LifecycleController::new(
            Box::new(FakeFactory {
                probe: probe.clone(),
                fail: engine_fails,
            }),
            Box::new(FakeCamera {
                probe: probe.clone(),
                behavior: camera,
            }),
            config,
        );
        (controller, probe)
    }

    fn render_loop() -> RenderLoop<RasterCanvas> {
        RenderLoop::new(OverlayRenderer::new(
            RasterCanvas::new(0, 0),
            OverlayStyle::default(),
        ))
    }

    // ── Scenarios ──

    #[test]
    fn test_successful_start_reaches_active() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (controller, _probe) = controller(false, CameraBehavior::Streams);
        let mut controller = controller.with_status_channel(tx);

        let _session = controller.activate().unwrap();
        assert_eq!(controller.state(), RenderState::Active);

        let updates: Vec<StatusUpdate> = rx.try_iter().collect();
        let states: Vec<RenderState> = updates.iter().map(|u| u.state).collect();
        assert_eq!(
            states,
            vec![
                RenderState::Initializing,
                RenderState::AwaitingCamera,
                RenderState::Active
            ]
        );
        let last = updates.last().unwrap();
        assert_eq!(last.message, "AI Core Online");
        assert!(!last.loading);
    }

    #[test]
    fn test_engine_failure_never_requests_camera() {
        let (mut controller, probe) = controller(true, CameraBehavior::Streams);
        let err = controller.activate().err().unwrap();

        assert!(matches!(err, LifecycleError::Initialization { .. }));
        assert_eq!(
            err.to_string(),
            "Failed to initialize AI model. Please check your connection."
        );
        assert_eq!(err.detail(), "wasm fetch failed");
        assert_eq!(controller.state(), RenderState::Error);
        assert_eq!(probe.lock().unwrap().camera_requests, 0);
    }

    #[test]
    fn test_camera_denied_is_error_and_engine_disposed() {
        let (mut controller, probe) = controller(false, CameraBehavior::Denied);
        let err = controller.activate().err().unwrap();

        assert_eq!(
            err.to_string(),
            "Webcam access denied. Please enable camera permissions."
        );
        assert_eq!(controller.state(), RenderState::Error);
        let p = probe.lock().unwrap();
        assert_eq!(p.camera_requests, 1);
        assert_eq!(p.engines_disposed, 1);
    }

    #[test]
    fn test_camera_without_frames_times_out_and_releases() {
        let (mut controller, probe) = controller(false, CameraBehavior::Silent);
        let err = controller.activate().err().unwrap();

        assert!(matches!(err, LifecycleError::CameraAccess { .. }));
        assert_eq!(controller.state(), RenderState::Error);
        let p = probe.lock().unwrap();
        assert_eq!(p.cameras_released, 1);
        assert_eq!(p.engines_disposed, 1);
    }

    #[test]
    fn test_stop_while_active_releases_everything() {
        let (mut controller, probe) = controller(false, CameraBehavior::Streams);
        let mut render_loop = render_loop();
        let mut clock = StopAfter {
            remaining: 3,
            token: render_loop.stop_handle(),
        };

        let stats = controller.run(&mut render_loop, &mut clock).unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.inferences, 1);
        assert_eq!(controller.state(), RenderState::Active);
        assert!(controller.is_released());

        let p = probe.lock().unwrap();
        assert_eq!(p.cameras_released, 1);
        assert_eq!(p.engines_disposed, 1);
    }

    #[test]
    fn test_dropping_session_tears_down_once() {
        let (mut controller, probe) = controller(false, CameraBehavior::Streams);
        let mut session = controller.activate().unwrap();
        assert!(!controller.is_released());

        session.teardown();
        drop(session);
        assert!(controller.is_released());
        let p = probe.lock().unwrap();
        assert_eq!(p.cameras_released, 1);
        assert_eq!(p.engines_disposed, 1);
    }

    // ── Restart ──

    #[test]
    fn test_restart_from_error_reinitializes() {
        let (mut controller, probe) = controller(false, CameraBehavior::Denied);
        assert!(controller.activate().is_err());

        controller.restart().unwrap();
        assert_eq!(controller.state(), RenderState::Initializing);

        assert!(controller.activate().is_err());
        assert_eq!(probe.lock().unwrap().engines_created, 2);
    }

    #[test]
    fn test_restart_rejected_outside_error() {
        let (mut controller, _probe) = controller(false, CameraBehavior::Streams);
        assert!(controller.restart().is_err());
        let _session = controller.activate().unwrap();
        assert!(controller.restart().is_err());
        assert_eq!(controller.state(), RenderState::Active);
    }

    #[test]
    fn test_activate_in_error_returns_last_error() {
        let (mut controller, probe) = controller(true, CameraBehavior::Streams);
        let first = controller.activate().err().unwrap();
        let second = controller.activate().err().unwrap();
        assert_eq!(first, second);
        assert_eq!(probe.lock().unwrap().engines_created, 0);
    }

    #[test]
    fn test_default_config_hides_ort_session_noise() {
        let config = LifecycleConfig::default();
        let ort_lines = [
            "Some nodes were not assigned to the preferred execution providers which may or may not have an negative impact on performance. e.g. ORT explicitly assigns shape related ops to CPU to improve perf.",
            "Rerunning with verbose output on a non-minimal build will show node assignments.",
        ];
        for line in ort_lines {
            assert!(
                config.suppressed_logs.iter().any(|p| line.contains(p.as_str())),
                "{line}"
            );
        }
        assert!(config
            .suppressed_logs
            .iter()
            .all(|p| !p.contains("TensorFlow Lite")));
    }

    #[test]
    fn test_engine_logs_are_quiet_only_during_construction() {
        struct CheckingFactory(Arc<Mutex<Option<bool>>>);

        impl LandmarkDetectorFactory for CheckingFactory {
            fn create(&self) -> Result<Box<dyn LandmarkDetector>, Box<dyn std::error::Error>> {
                *self.0.lock().unwrap() = Some(logging::is_suppressed("lifecycle-noise-xyz"));
                Err("stop here".into())
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let mut controller = LifecycleController::new(
            Box::new(CheckingFactory(seen.clone())),
            Box::new(FakeCamera {
                probe: SharedProbe::default(),
                behavior: CameraBehavior::Streams,
            }),
            LifecycleConfig {
                suppressed_logs: vec!["lifecycle-noise-xyz".into()],
                ..Default::default()
            },
        );
        assert!(controller.activate().is_err());
        assert_eq!(*seen.lock().unwrap(), Some(true));
        assert!(!logging::is_suppressed("lifecycle-noise-xyz"));
    }
}
