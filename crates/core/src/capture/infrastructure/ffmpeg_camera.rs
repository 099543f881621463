use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::capture::domain::camera_source::{
    CameraProvider, CameraRequest, CaptureError, FrameSource,
};
use crate::shared::frame::Frame;

const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

// errno values shared by Linux, macOS and the MSVC CRT.
const EPERM: i32 = 1;
const ENOENT: i32 = 2;
const EACCES: i32 = 13;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;

/// Where frames come from: a capture device through an ffmpeg input device
/// format (`v4l2`, `avfoundation`, `dshow`), or a media file/URL when
/// `input_format` is `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraDevice {
    pub url: String,
    pub input_format: Option<String>,
}

impl CameraDevice {
    /// First camera on this platform.
    pub fn platform_default() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self::capture("0", "avfoundation")
        }
        #[cfg(target_os = "windows")]
        {
            Self::capture("video=Integrated Camera", "dshow")
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Self::capture("/dev/video0", "v4l2")
        }
    }

    pub fn capture(url: &str, input_format: &str) -> Self {
        Self {
            url: url.to_string(),
            input_format: Some(input_format.to_string()),
        }
    }

    /// Plays a recorded file in real time, as if it were a camera.
    pub fn file(path: &Path) -> Self {
        Self {
            url: path.to_string_lossy().into_owned(),
            input_format: None,
        }
    }

    fn is_file(&self) -> bool {
        self.input_format.is_none()
    }
}

/// Opens [`CameraDevice`]s with ffmpeg-next and decodes them on a
/// dedicated capture thread.
pub struct FfmpegCameraProvider {
    device: CameraDevice,
    open_timeout: Duration,
}

impl FfmpegCameraProvider {
    pub fn new(device: CameraDevice) -> Self {
        Self {
            device,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

impl CameraProvider for FfmpegCameraProvider {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn FrameSource>, CaptureError> {
        let shared = Arc::new(SharedCapture::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), CaptureError>>(1);
        let (first_tx, first_rx) = crossbeam_channel::bounded::<()>(1);

        let ctx = CaptureContext {
            device: self.device.clone(),
            request: request.clone(),
            shared: shared.clone(),
            stop: stop.clone(),
            ready_tx,
            first_tx,
        };
        let handle = thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || run_capture(ctx))
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        match ready_rx.recv_timeout(self.open_timeout) {
            Ok(Ok(())) => {
                log::info!("Camera opened: {}", self.device.url);
                Ok(Box::new(FfmpegCameraSource {
                    shared,
                    stop,
                    first_rx,
                    handle: Some(handle),
                    released: false,
                }))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                stop.store(true, Ordering::Relaxed);
                Err(CaptureError::DeviceUnavailable(format!(
                    "timed out opening {}",
                    self.device.url
                )))
            }
        }
    }
}

#[derive(Default)]
struct SharedCapture {
    latest: Mutex<Option<Frame>>,
    failure: Mutex<Option<String>>,
}

/// Live camera stream. The capture thread keeps replacing the latest frame;
/// readers take a snapshot of whatever is current.
pub struct FfmpegCameraSource {
    shared: Arc<SharedCapture>,
    stop: Arc<AtomicBool>,
    first_rx: Receiver<()>,
    handle: Option<thread::JoinHandle<()>>,
    released: bool,
}

impl FrameSource for FfmpegCameraSource {
    fn current_frame(&self) -> Option<Frame> {
        self.shared.latest.lock().ok()?.clone()
    }

    fn wait_for_first_frame(&self, timeout: Duration) -> Result<(), CaptureError> {
        if self.current_frame().is_some() {
            return Ok(());
        }
        match self.first_rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::NoFrames(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                if self.current_frame().is_some() {
                    return Ok(());
                }
                let reason = self
                    .shared
                    .failure
                    .lock()
                    .ok()
                    .and_then(|f| f.clone())
                    .unwrap_or_else(|| "stream ended before the first frame".to_string());
                Err(CaptureError::Backend(reason))
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Camera capture thread panicked");
            }
        }
        self.released = true;
        log::info!("Camera released");
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

struct CaptureContext {
    device: CameraDevice,
    request: CameraRequest,
    shared: Arc<SharedCapture>,
    stop: Arc<AtomicBool>,
    ready_tx: Sender<Result<(), CaptureError>>,
    first_tx: Sender<()>,
}

/// Capture thread body. All ffmpeg objects are created and dropped here.
fn run_capture(ctx: CaptureContext) {
    let mut ictx = match open_input(&ctx.device, &ctx.request) {
        Ok(ictx) => ictx,
        Err(e) => {
            let _ = ctx.ready_tx.send(Err(e));
            return;
        }
    };

    let (stream_index, time_base, mut decoder) = match video_decoder(&ictx) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ctx.ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ctx.ready_tx.send(Ok(()));

    let mut converter = RgbConverter::default();
    let mut clock = PositionClock::new(time_base, ctx.device.is_file());
    let mut published_first = false;

    for (stream, packet) in ictx.packets() {
        if ctx.stop.load(Ordering::Relaxed) {
            break;
        }
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            let position = clock.position(decoded.timestamp().or(decoded.pts()));
            if clock.pace(position, &ctx.stop) {
                break;
            }
            let frame = match converter.convert(&decoded, position) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Dropping undecodable camera frame: {e}");
                    continue;
                }
            };
            if let Ok(mut latest) = ctx.shared.latest.lock() {
                *latest = Some(frame);
            }
            if !published_first {
                published_first = true;
                let _ = ctx.first_tx.try_send(());
            }
        }
    }

    if !ctx.stop.load(Ordering::Relaxed) {
        log::warn!("Camera stream ended: {}", ctx.device.url);
        if let Ok(mut failure) = ctx.shared.failure.lock() {
            failure.get_or_insert_with(|| "camera stream ended".to_string());
        }
    }
}

fn open_input(
    device: &CameraDevice,
    request: &CameraRequest,
) -> Result<ffmpeg_next::format::context::Input, CaptureError> {
    ffmpeg_next::init().map_err(|e| CaptureError::Backend(e.to_string()))?;
    ffmpeg_next::device::register_all();

    match open_with_size(device, Some(request)) {
        Ok(ictx) => Ok(ictx),
        Err(e) if !device.is_file() && retry_at_default_size(&classify(&e, &device.url)) => {
            log::warn!(
                "Device rejected {}x{} ({e}); using its default size",
                request.ideal_width,
                request.ideal_height
            );
            open_with_size(device, None).map_err(|e| classify(&e, &device.url))
        }
        Err(e) => Err(classify(&e, &device.url)),
    }
}

fn open_with_size(
    device: &CameraDevice,
    request: Option<&CameraRequest>,
) -> Result<ffmpeg_next::format::context::Input, ffmpeg_next::Error> {
    let Some(format_name) = device.input_format.as_deref() else {
        return ffmpeg_next::format::input(&device.url);
    };

    let format = ffmpeg_next::device::input::video()
        .find(|f| f.name() == format_name)
        .ok_or(ffmpeg_next::Error::DemuxerNotFound)?;

    let mut options = ffmpeg_next::Dictionary::new();
    if let Some(r) = request {
        options.set("video_size", &format!("{}x{}", r.ideal_width, r.ideal_height));
    }
    if format_name == "avfoundation" {
        // avfoundation refuses to open without an explicit rate.
        options.set("framerate", "30");
    }

    let ctx = ffmpeg_next::format::open_with(&device.url, &format, options)?;
    Ok(ctx.input())
}

fn video_decoder(
    ictx: &ffmpeg_next::format::context::Input,
) -> Result<(usize, ffmpeg_next::Rational, ffmpeg_next::decoder::Video), CaptureError> {
    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| CaptureError::DeviceUnavailable("no video stream".to_string()))?;
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    let decoder = codec_ctx
        .decoder()
        .video()
        .map_err(|e| CaptureError::Backend(e.to_string()))?;
    Ok((stream.index(), stream.time_base(), decoder))
}

/// Maps ffmpeg open failures onto the capture taxonomy.
fn classify(err: &ffmpeg_next::Error, url: &str) -> CaptureError {
    match *err {
        ffmpeg_next::Error::Other { errno } if errno == EACCES || errno == EPERM => {
            CaptureError::PermissionDenied(format!("{url}: {err}"))
        }
        ffmpeg_next::Error::Other { errno }
            if errno == ENOENT || errno == ENODEV || errno == EBUSY =>
        {
            CaptureError::DeviceUnavailable(format!("{url}: {err}"))
        }
        ffmpeg_next::Error::DemuxerNotFound => {
            CaptureError::DeviceUnavailable(format!("capture backend unavailable for {url}"))
        }
        _ => CaptureError::Backend(format!("{url}: {err}")),
    }
}

/// Only generic backend failures may be caused by the size option.
fn retry_at_default_size(err: &CaptureError) -> bool {
    matches!(err, CaptureError::Backend(_))
}

/// Converts decoded frames to RGB24, rebuilding the scaler whenever the
/// device changes size or pixel format mid-stream.
#[derive(Default)]
struct RgbConverter {
    scaler: Option<(ffmpeg_next::format::Pixel, u32, u32, ffmpeg_next::software::scaling::Context)>,
}

impl RgbConverter {
    fn convert(
        &mut self,
        decoded: &ffmpeg_next::util::frame::video::Video,
        position: Duration,
    ) -> Result<Frame, ffmpeg_next::Error> {
        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
        let stale = !matches!(
            &self.scaler,
            Some((f, w, h, _)) if *f == format && *w == width && *h == height
        );
        if stale {
            if self.scaler.is_some() {
                log::info!("Camera reconfigured to {width}x{height}");
            }
            let scaler = ffmpeg_next::software::scaling::Context::get(
                format,
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((format, width, height, scaler));
        }
        let Some((_, _, _, scaler)) = self.scaler.as_mut() else {
            return Err(ffmpeg_next::Error::Bug);
        };

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(decoded, &mut rgb_frame)?;
        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        Ok(Frame::new(pixels, width, height, 3, position))
    }
}

/// Turns stream timestamps into a non-decreasing position and, for file
/// sources, paces decoding to wall-clock time.
struct PositionClock {
    time_base: (i32, i32),
    realtime: bool,
    started: Instant,
    first: Option<Duration>,
    last: Duration,
}

impl PositionClock {
    fn new(time_base: ffmpeg_next::Rational, realtime: bool) -> Self {
        Self {
            time_base: (time_base.numerator(), time_base.denominator()),
            realtime,
            started: Instant::now(),
            first: None,
            last: Duration::ZERO,
        }
    }

    fn position(&mut self, pts: Option<i64>) -> Duration {
        let (num, den) = self.time_base;
        let from_stream = pts
            .filter(|&p| p >= 0 && den != 0)
            .map(|p| Duration::from_secs_f64(p as f64 * num as f64 / den as f64));
        let position = from_stream
            .unwrap_or_else(|| self.started.elapsed())
            .max(self.last);
        self.last = position;
        position
    }

    /// Sleeps until `position` is due. Returns true if stopped while waiting.
    fn pace(&mut self, position: Duration, stop: &AtomicBool) -> bool {
        if !self.realtime {
            return stop.load(Ordering::Relaxed);
        }
        let first = *self.first.get_or_insert(position);
        let due = self.started + position.saturating_sub(first);
        while Instant::now() < due {
            if stop.load(Ordering::Relaxed) {
                return true;
            }
            let remaining = due.saturating_duration_since(Instant::now());
            thread::sleep(remaining.min(Duration::from_millis(5)));
        }
        stop.load(Ordering::Relaxed)
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
