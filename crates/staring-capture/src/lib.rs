#![warn(missing_docs)]
//! # staring-capture
//!
//! ## Purpose
//! Provides camera acquisition and pull-model raster sampling.
//!
//! ## Responsibilities
//! - Define backend-agnostic [`FrameSource`] and [`FrameSourceProvider`] traits.
//! - Expose the local camera behind the `camera` feature.
//! - Expose a deterministic synthetic source for CI and unit tests.
//! - Keep blocking device reads off the caller's thread ([`ThreadedFrameSource`]).
//! - Provide fixed-cadence scheduling helpers used by the runtime tick.
//!
//! ## Data flow
//! Runtime acquires a source when a level starts -> samples a [`Raster`] on
//! every capture tick -> raster goes to the encoder.
//!
//! ## Ownership and lifetimes
//! A source is owned by exactly one monitoring scope. Dropping it releases the
//! device stream. Sampled rasters are owned copies. A threaded source owns a
//! detached grabber thread that exits after its current read once the source
//! is dropped.
//!
//! ## Error model
//! Missing devices and denied permissions surface as
//! [`CaptureError::DeviceUnavailable`], from `acquire` or, for threaded
//! backends, from `sample`; callers degrade instead of failing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use staring_core::Raster;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default capture width in pixels.
pub const DEFAULT_CAPTURE_WIDTH: u32 = 320;
/// Default capture height in pixels.
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 240;
/// Largest accepted capture width or height.
pub const MAX_CAPTURE_DIMENSION: u32 = 4_096;

/// Capture cadence and target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Frames sampled per second.
    pub fps: u32,
    /// Requested width in pixels.
    pub width: u32,
    /// Requested height in pixels.
    pub height: u32,
}

impl CaptureConfig {
    /// Creates validated capture configuration.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidFps`] when `fps == 0` and
    /// [`CaptureError::InvalidResolution`] for zero-sized targets or either
    /// side above [`MAX_CAPTURE_DIMENSION`].
    pub fn new(fps: u32, width: u32, height: u32) -> Result<Self, CaptureError> {
        if fps == 0 {
            return Err(CaptureError::InvalidFps);
        }
        let side = 1..=MAX_CAPTURE_DIMENSION;
        if !side.contains(&width) || !side.contains(&height) {
            return Err(CaptureError::InvalidResolution { width, height });
        }
        Ok(Self { fps, width, height })
    }

    /// Returns the capture interval in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        1_000 / self.fps as u64
    }

    /// Returns the capture interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms())
    }
}

/// A live, continuously updating raster source.
///
/// There is no "next frame" call: callers sample whenever their own tick
/// fires.
pub trait FrameSource {
    /// Human-readable device name for logs.
    fn name(&self) -> &str;

    /// Current stream dimensions, or `None` while the device is warming up.
    fn resolution(&self) -> Option<(u32, u32)>;

    /// Samples the latest raster.
    ///
    /// # Returns
    /// `Ok(None)` when no dimensions are available yet.
    ///
    /// # Errors
    /// Returns [`CaptureError::Backend`] on device read failures.
    fn sample(&mut self) -> Result<Option<Raster>, CaptureError>;
}

/// Acquires frame sources for a monitoring scope.
pub trait FrameSourceProvider {
    /// Requests camera access at the configured resolution.
    ///
    /// # Errors
    /// Returns [`CaptureError::DeviceUnavailable`] when permission is denied or
    /// no device exists. Backends that open the device on their own thread
    /// report it from the first [`FrameSource::sample`] instead.
    fn acquire(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Deterministic moving-gradient source for tests and camera-less runs.
#[derive(Debug)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    warmup_remaining: u32,
    sequence: u64,
}

impl SyntheticFrameSource {
    /// Creates a source producing `width x height` rasters.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            warmup_remaining: 0,
            sequence: 0,
        }
    }

    /// Reports no dimensions for the first `ticks` samples.
    pub fn with_warmup(mut self, ticks: u32) -> Self {
        self.warmup_remaining = ticks;
        self
    }

    /// Number of rasters produced so far.
    pub fn produced(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for SyntheticFrameSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        (self.warmup_remaining == 0).then_some((self.width, self.height))
    }

    fn sample(&mut self) -> Result<Option<Raster>, CaptureError> {
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return Ok(None);
        }

        self.sequence += 1;
        let shift = (self.sequence % 256) as u32;
        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                rgb.push(((x + shift) % 256) as u8);
                rgb.push(((y + shift) % 256) as u8);
                rgb.push(((x ^ y) % 256) as u8);
            }
        }

        Raster::new(self.width, self.height, rgb)
            .map(Some)
            .map_err(|error| CaptureError::Backend(error.to_string()))
    }
}

/// Provider handing out [`SyntheticFrameSource`]s.
#[derive(Debug, Clone, Default)]
pub struct SyntheticProvider {
    unavailable: bool,
    warmup_ticks: u32,
}

impl SyntheticProvider {
    /// Creates a provider whose sources are immediately ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that always fails like a machine without a camera.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            warmup_ticks: 0,
        }
    }

    /// Sources report no dimensions for the first `ticks` samples.
    pub fn with_warmup(mut self, ticks: u32) -> Self {
        self.warmup_ticks = ticks;
        self
    }
}

impl FrameSourceProvider for SyntheticProvider {
    fn acquire(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        if self.unavailable {
            return Err(CaptureError::DeviceUnavailable(
                "synthetic provider configured without a device".to_string(),
            ));
        }

        Ok(Box::new(
            SyntheticFrameSource::new(config.width, config.height).with_warmup(self.warmup_ticks),
        ))
    }
}

/// Pause after a failed device read before the grabber retries.
pub const GRAB_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Default)]
struct LatestRaster {
    raster: Option<Raster>,
    failure: Option<CaptureError>,
}

/// Frame source whose device runs on a dedicated grabber thread.
///
/// The thread opens the device, then reads frames back to back into a
/// single slot. [`FrameSource::sample`] copies the slot and never waits on
/// the device. A failed open or read is reported by `sample` until the next
/// good frame.
pub struct ThreadedFrameSource {
    name: String,
    latest: Arc<Mutex<LatestRaster>>,
    running: Arc<AtomicBool>,
}

impl ThreadedFrameSource {
    /// Starts the grabber thread.
    ///
    /// `open` runs on the new thread and returns the per-frame reader, so
    /// device handles never cross threads. The reader is dropped on that
    /// thread when the source goes away.
    ///
    /// # Errors
    /// Returns [`CaptureError::Backend`] when the thread cannot be spawned.
    pub fn spawn<O, G>(name: impl Into<String>, open: O) -> Result<Self, CaptureError>
    where
        O: FnOnce() -> Result<G, CaptureError> + Send + 'static,
        G: FnMut() -> Result<Raster, CaptureError>,
    {
        let name = name.into();
        let latest = Arc::new(Mutex::new(LatestRaster::default()));
        let running = Arc::new(AtomicBool::new(true));

        let slot = Arc::clone(&latest);
        let alive = Arc::clone(&running);
        let device = name.clone();
        thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || grab_frames(&device, open, &slot, &alive))
            .map_err(|error| CaptureError::Backend(format!("capture thread failed to start: {error}")))?;

        Ok(Self {
            name,
            latest,
            running,
        })
    }
}

fn grab_frames<O, G>(device: &str, open: O, slot: &Mutex<LatestRaster>, running: &AtomicBool)
where
    O: FnOnce() -> Result<G, CaptureError>,
    G: FnMut() -> Result<Raster, CaptureError>,
{
    let mut grab = match open() {
        Ok(grab) => grab,
        Err(error) => {
            warn!(device, "capture device failed to open: {error}");
            slot.lock().failure = Some(error);
            return;
        }
    };
    debug!(device, "capture thread running");

    while running.load(Ordering::Acquire) {
        match grab() {
            Ok(raster) => {
                let mut latest = slot.lock();
                latest.raster = Some(raster);
                latest.failure = None;
            }
            Err(error) => {
                slot.lock().failure = Some(error);
                thread::sleep(GRAB_RETRY_DELAY);
            }
        }
    }
    debug!(device, "capture thread stopped");
}

impl FrameSource for ThreadedFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        self.latest.lock().raster.as_ref().map(Raster::dimensions)
    }

    fn sample(&mut self) -> Result<Option<Raster>, CaptureError> {
        let latest = self.latest.lock();
        if let Some(failure) = &latest.failure {
            return Err(failure.clone());
        }
        Ok(latest.raster.clone())
    }
}

impl Drop for ThreadedFrameSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        info!(device = %self.name, "capture source released");
    }
}

#[cfg(feature = "camera")]
pub use camera::CameraProvider;

#[cfg(feature = "camera")]
mod camera {
    //! Local webcam backend built on `nokhwa`, read on a grabber thread.

    use image::imageops::FilterType;
    use nokhwa::Camera;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };
    use staring_core::Raster;
    use tracing::{info, warn};

    use super::{CaptureConfig, CaptureError, FrameSource, FrameSourceProvider, ThreadedFrameSource};

    const REQUESTED_CAMERA_FPS: u32 = 30;

    /// Opens the camera at a fixed device index.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CameraProvider {
        index: u32,
    }

    impl CameraProvider {
        /// Provider for camera `index` as enumerated by the OS.
        pub fn new(index: u32) -> Self {
            Self { index }
        }
    }

    impl FrameSourceProvider for CameraProvider {
        /// Returns at once; the device opens on the grabber thread and an
        /// open failure is reported by the first sample.
        fn acquire(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
            let index = self.index;
            let target = (config.width, config.height);
            let source = ThreadedFrameSource::spawn(format!("camera-{index}"), move || {
                let mut stream = CameraStream::open(index, target)?;
                Ok(move || stream.read())
            })?;
            Ok(Box::new(source))
        }
    }

    /// Open camera stream; stopped on drop.
    struct CameraStream {
        camera: Camera,
        name: String,
        target: (u32, u32),
    }

    impl CameraStream {
        fn open(index: u32, target: (u32, u32)) -> Result<Self, CaptureError> {
            let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                CameraFormat::new(
                    Resolution::new(target.0, target.1),
                    FrameFormat::MJPEG,
                    REQUESTED_CAMERA_FPS,
                ),
            ));

            let mut camera = Camera::new(CameraIndex::Index(index), requested)
                .map_err(|error| CaptureError::DeviceUnavailable(error.to_string()))?;
            camera
                .open_stream()
                .map_err(|error| CaptureError::DeviceUnavailable(error.to_string()))?;

            let name = camera.info().human_name();
            info!(device = %name, index, "camera stream opened");
            Ok(Self {
                camera,
                name,
                target,
            })
        }

        /// Blocks until the device delivers its next frame.
        fn read(&mut self) -> Result<Raster, CaptureError> {
            let buffer = self
                .camera
                .frame()
                .map_err(|error| CaptureError::Backend(format!("frame read failed: {error}")))?;
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|error| CaptureError::Backend(format!("frame decode failed: {error}")))?;

            let (width, height) = (decoded.width(), decoded.height());
            let rgb = image::RgbImage::from_raw(width, height, decoded.into_raw()).ok_or_else(
                || CaptureError::Backend("decoded frame buffer has wrong length".to_string()),
            )?;

            let (target_width, target_height) = self.target;
            let rgb = if (width, height) == self.target {
                rgb
            } else {
                image::imageops::resize(&rgb, target_width, target_height, FilterType::Triangle)
            };

            Raster::new(target_width, target_height, rgb.into_raw())
                .map_err(|error| CaptureError::Backend(error.to_string()))
        }
    }

    impl Drop for CameraStream {
        fn drop(&mut self) {
            if let Err(error) = self.camera.stop_stream() {
                warn!(device = %self.name, "camera stream stop failed: {error}");
            } else {
                info!(device = %self.name, "camera stream released");
            }
        }
    }
}

/// Computes deterministic tick offsets for fixed-FPS capture.
///
/// # Returns
/// Vector of `count` timestamps starting at `start_ms` with interval spacing.
pub fn scheduled_capture_times(config: CaptureConfig, start_ms: u64, count: usize) -> Vec<u64> {
    let interval = config.interval_ms();
    (0..count)
        .map(|index| start_ms.saturating_add(interval.saturating_mul(index as u64)))
        .collect()
}

/// Capture layer error type.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// FPS must be positive.
    #[error("invalid fps: must be greater than zero")]
    InvalidFps,
    /// Resolution must be non-zero.
    #[error("invalid capture resolution {width}x{height}")]
    InvalidResolution {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// Camera permission denied or no device present.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// Backend runtime failure.
    #[error("capture backend failure: {0}")]
    Backend(String),
}
