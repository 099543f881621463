mod settings;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{Receiver, Sender};

use facehud_core::capture::domain::camera_source::CameraRequest;
use facehud_core::capture::infrastructure::ffmpeg_camera::{CameraDevice, FfmpegCameraProvider};
use facehud_core::detection::infrastructure::execution_provider::Accelerator;
use facehud_core::detection::infrastructure::onnx_face_mesh_detector::{
    FaceMeshConfig, OnnxFaceMeshDetectorFactory,
};
use facehud_core::overlay::domain::overlay_renderer::OverlayRenderer;
use facehud_core::overlay::infrastructure::image_sequence_presenter::ImageSequencePresenter;
use facehud_core::overlay::infrastructure::raster_canvas::RasterCanvas;
use facehud_core::pipeline::cancellation::CancellationToken;
use facehud_core::pipeline::frame_clock::IntervalClock;
use facehud_core::pipeline::lifecycle::{LifecycleError, RenderState, StatusUpdate};
use facehud_core::pipeline::lifecycle_controller::{LifecycleConfig, LifecycleController};
use facehud_core::pipeline::render_loop::{LoopStats, RenderLoop};
use facehud_core::shared::logging::FilteringLogger;

use settings::Settings;

/// Real-time face landmark HUD over a live camera.
#[derive(Parser)]
#[command(name = "facehud")]
struct Cli {
    /// Capture device (e.g. /dev/video0, "0" on macOS) or a video file.
    #[arg(long)]
    device: Option<String>,

    /// ffmpeg input format for the device (v4l2, avfoundation, dshow).
    /// Omit to read --device as a file.
    #[arg(long)]
    input_format: Option<String>,

    /// BlazeFace detector model (.onnx).
    #[arg(long)]
    detector_model: Option<PathBuf>,

    /// Face-mesh landmark model (.onnx).
    #[arg(long)]
    landmark_model: Option<PathBuf>,

    /// Inference accelerator preference (gpu or cpu).
    #[arg(long, value_name = "gpu|cpu")]
    accelerator: Option<Accelerator>,

    /// Run inference on the CPU only. Same as --accelerator cpu.
    #[arg(long)]
    cpu: bool,

    /// Preferred capture width.
    #[arg(long)]
    width: Option<u32>,

    /// Preferred capture height.
    #[arg(long)]
    height: Option<u32>,

    /// Render loop refresh rate.
    #[arg(long)]
    fps: Option<f64>,

    /// Maximum faces to track per frame.
    #[arg(long)]
    max_faces: Option<usize>,

    /// Write composed frames as PNGs to this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write every Nth composed frame (with --output-dir).
    #[arg(long)]
    snapshot_every: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Label drawn above each face.
    #[arg(long)]
    label: Option<String>,

    /// Settings file (default: <config dir>/FaceHUD/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the effective settings to the settings file and exit.
    #[arg(long)]
    write_config: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Restart,
    Quit,
}

fn main() {
    init_logging();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging() {
    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .build();
    let level = inner.filter();
    if FilteringLogger::install(Box::new(inner), level).is_err() {
        eprintln!("Logger already initialized");
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    apply_overrides(&mut settings, &cli);

    if cli.write_config {
        let path = cli
            .config
            .clone()
            .or_else(Settings::default_path)
            .ok_or("Could not determine the settings directory")?;
        settings.save(&path)?;
        log::info!("Settings written to {}", path.display());
        return Ok(());
    }

    settings.validate()?;
    let duration = parse_duration(cli.duration)?;

    let (status_tx, status_rx) = crossbeam_channel::unbounded();
    let (command_tx, command_rx) = crossbeam_channel::bounded(1);
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

    let worker = thread::Builder::new()
        .name("lifecycle".into())
        .spawn(move || drive(settings, status_tx, command_rx, stop_tx))?;

    let stop = stop_rx.recv()?;
    install_interrupt_handler(stop.clone(), command_tx.clone());
    watch_status(&status_rx, &command_tx, &stop, duration);

    let stats = worker
        .join()
        .map_err(|_| "lifecycle thread panicked")??;
    log::info!(
        "Processed {} frames ({} failed)",
        stats.inferences,
        stats.failures
    );
    Ok(())
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if cli.device.is_some() {
        settings.device = cli.device.clone();
    }
    if cli.input_format.is_some() {
        settings.input_format = cli.input_format.clone();
    }
    if cli.detector_model.is_some() {
        settings.detector_model = cli.detector_model.clone();
    }
    if cli.landmark_model.is_some() {
        settings.landmark_model = cli.landmark_model.clone();
    }
    if let Some(accelerator) = cli.accelerator {
        settings.use_cpu = accelerator == Accelerator::Cpu;
    }
    if cli.cpu {
        settings.use_cpu = true;
    }
    if let Some(w) = cli.width {
        settings.width = w;
    }
    if let Some(h) = cli.height {
        settings.height = h;
    }
    if let Some(fps) = cli.fps {
        settings.fps = fps;
    }
    if let Some(n) = cli.max_faces {
        settings.max_faces = n;
    }
    if cli.output_dir.is_some() {
        settings.output_dir = cli.output_dir.clone();
    }
    if let Some(n) = cli.snapshot_every {
        settings.snapshot_every = n;
    }
    if let Some(label) = &cli.label {
        settings.style.label = label.clone();
    }
}

fn parse_duration(secs: Option<f64>) -> Result<Option<Duration>, String> {
    match secs {
        None => Ok(None),
        Some(s) if s.is_finite() && s > 0.0 => Ok(Some(Duration::from_secs_f64(s))),
        Some(s) => Err(format!("Duration must be a positive number of seconds, got {s}")),
    }
}

fn camera_device(settings: &Settings) -> CameraDevice {
    match (&settings.device, &settings.input_format) {
        (Some(url), Some(format)) => CameraDevice::capture(url, format),
        (Some(path), None) => CameraDevice::file(Path::new(path)),
        (None, Some(format)) => CameraDevice {
            input_format: Some(format.clone()),
            ..CameraDevice::platform_default()
        },
        (None, None) => CameraDevice::platform_default(),
    }
}

/// Worker thread: owns the controller and the loop, restarting on request.
fn drive(
    settings: Settings,
    status_tx: Sender<StatusUpdate>,
    commands: Receiver<Command>,
    stop_tx: Sender<CancellationToken>,
) -> Result<LoopStats, LifecycleError> {
    let factory = OnnxFaceMeshDetectorFactory::new(FaceMeshConfig {
        detector_model: settings.detector_model_path(),
        landmark_model: settings.landmark_model_path(),
        accelerator: if settings.use_cpu {
            Accelerator::Cpu
        } else {
            Accelerator::Gpu
        },
        max_faces: settings.max_faces,
        min_confidence: settings.min_confidence,
    });
    let camera = FfmpegCameraProvider::new(camera_device(&settings));
    let config = LifecycleConfig {
        camera_request: CameraRequest {
            ideal_width: settings.width,
            ideal_height: settings.height,
        },
        first_frame_timeout: Duration::from_secs(settings.first_frame_timeout_secs),
        ..Default::default()
    };
    let mut controller = LifecycleController::new(Box::new(factory), Box::new(camera), config)
        .with_status_channel(status_tx);

    let renderer = OverlayRenderer::new(RasterCanvas::new(0, 0), settings.overlay_style());
    let mut render_loop = RenderLoop::new(renderer);
    if let Some(dir) = &settings.output_dir {
        log::info!("Writing frames to {}", dir.display());
        render_loop = render_loop.with_presenter(Box::new(ImageSequencePresenter::new(
            dir,
            settings.snapshot_every,
        )));
    }
    let _ = stop_tx.send(render_loop.stop_handle());
    let mut clock = IntervalClock::new(settings.fps);

    loop {
        match controller.run(&mut render_loop, &mut clock) {
            Ok(stats) => return Ok(stats),
            Err(e) => match commands.recv() {
                Ok(Command::Restart) if controller.restart().is_ok() => render_loop.reset(),
                _ => return Err(e),
            },
        }
    }
}

/// First Ctrl-C stops the loop so the session tears down; a second one
/// exits immediately.
fn install_interrupt_handler(stop: CancellationToken, command_tx: Sender<Command>) {
    let mut interrupts = 0u32;
    let installed = ctrlc::set_handler(move || {
        interrupts += 1;
        if interrupts > 1 {
            eprintln!("Interrupted again, exiting without cleanup");
            process::exit(130);
        }
        log::info!("Interrupted, stopping");
        request_quit(&stop, &command_tx);
    });
    if let Err(e) = installed {
        log::warn!("Failed to install Ctrl-C handler: {e}");
    }
}

/// Stops the render loop and answers a pending restart prompt with quit.
fn request_quit(stop: &CancellationToken, command_tx: &Sender<Command>) {
    stop.cancel();
    let _ = command_tx.try_send(Command::Quit);
}

/// Prints status changes, offers a restart after an error, and stops the
/// loop once `duration` has elapsed. Returns when the worker is done.
fn watch_status(
    status_rx: &Receiver<StatusUpdate>,
    command_tx: &Sender<Command>,
    stop: &CancellationToken,
    duration: Option<Duration>,
) {
    let timer = match duration {
        Some(d) => crossbeam_channel::after(d),
        None => crossbeam_channel::never(),
    };
    loop {
        crossbeam_channel::select! {
            recv(status_rx) -> msg => match msg {
                Ok(update) => {
                    report(&update);
                    if update.state == RenderState::Error && !stop.is_cancelled() {
                        spawn_restart_prompt(command_tx);
                    }
                }
                Err(_) => return,
            },
            recv(timer) -> _ => {
                log::info!("Duration elapsed, stopping");
                request_quit(stop, command_tx);
            }
        }
    }
}

fn report(update: &StatusUpdate) {
    match update.state {
        RenderState::Error => log::error!("{}", update.message),
        _ if update.loading => log::info!("{}", update.message),
        _ => log::info!("{} (press Ctrl-C to quit)", update.message),
    }
}

/// Reads the answer on its own thread so Ctrl-C and `--duration` still
/// reach the status loop while stdin blocks.
fn spawn_restart_prompt(command_tx: &Sender<Command>) {
    let answer_tx = command_tx.clone();
    let spawned = thread::Builder::new()
        .name("restart-prompt".into())
        .spawn(move || {
            let _ = answer_tx.try_send(prompt_restart());
        });
    if let Err(e) = spawned {
        log::warn!("Cannot prompt for restart: {e}");
        let _ = command_tx.try_send(Command::Quit);
    }
}

fn prompt_restart() -> Command {
    eprintln!("Press Enter to retry, or Ctrl-D to quit.");
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(n) if n > 0 => Command::Restart,
        _ => Command::Quit,
    }
}
