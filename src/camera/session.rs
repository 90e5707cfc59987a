use crate::camera::stream::FrameStream;
use crate::camera::FrameSource;
use crate::error::{FaceGateError, Result};
use crate::frame::{ColorSpace, Frame};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    Running,
}

struct SessionInner<S: FrameSource> {
    source: S,
    state: CaptureState,
    last_operation: Option<Instant>,
    last_good_frame: Option<Frame>,
}

/// Serializes and rate-limits access to one physical capture device.
///
/// All session state lives behind a single mutex; the throttle check and the
/// timestamp update happen atomically under that lock, so two concurrent
/// callers can never both pass the throttle window. The last successfully
/// captured frame is cached and served when a live capture fails, trading
/// freshness for availability during transient device flakiness. The cache
/// is never cleared by a failure and survives stop/start cycles.
pub struct CameraSessionManager<S: FrameSource> {
    inner: Mutex<SessionInner<S>>,
    min_operation_interval: Duration,
}

impl<S: FrameSource> CameraSessionManager<S> {
    pub fn new(source: S, min_operation_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                source,
                state: CaptureState::Stopped,
                last_operation: None,
                last_good_frame: None,
            }),
            min_operation_interval,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner<S>> {
        // A panic while holding the lock leaves no torn state worth keeping.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether an operation is allowed now. Does not consume the window;
    /// callers record `last_operation` only on an accepted transition.
    fn throttled(&self, inner: &SessionInner<S>) -> bool {
        match inner.last_operation {
            Some(at) => at.elapsed() < self.min_operation_interval,
            None => false,
        }
    }

    fn start_locked(&self, inner: &mut SessionInner<S>) -> Result<()> {
        if inner.state == CaptureState::Running {
            tracing::debug!("Camera already running; start is a no-op");
            return Ok(());
        }
        if self.throttled(inner) {
            // Intentional best-effort degradation, not a failure.
            tracing::warn!("Camera start rejected by throttle window");
            return Ok(());
        }
        inner.source.open()?;
        inner.state = CaptureState::Running;
        inner.last_operation = Some(Instant::now());
        tracing::info!("Camera started");
        Ok(())
    }

    fn stop_locked(&self, inner: &mut SessionInner<S>) {
        if inner.state == CaptureState::Stopped {
            tracing::debug!("Camera already stopped; stop is a no-op");
            return;
        }
        if self.throttled(inner) {
            tracing::warn!("Camera stop rejected by throttle window");
            return;
        }
        inner.source.close();
        inner.state = CaptureState::Stopped;
        inner.last_operation = Some(Instant::now());
        tracing::info!("Camera stopped");
    }

    /// Start capture. A no-op when already running. Throttle rejections are
    /// logged, not raised; a device that cannot be opened is
    /// `DeviceUnavailable` and is not retried internally.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        self.start_locked(&mut inner)
    }

    /// Stop capture and release the device. A no-op when already stopped;
    /// throttled identically to `start`. The cached frame is preserved.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.stop_locked(&mut inner);
    }

    /// Release the device unconditionally, bypassing the throttle. Used by
    /// stream teardown, where leaving the device open on consumer disconnect
    /// would be a resource leak.
    pub(crate) fn force_release(&self) {
        let mut inner = self.lock();
        if inner.state == CaptureState::Running {
            inner.source.close();
            inner.state = CaptureState::Stopped;
            inner.last_operation = Some(Instant::now());
            tracing::info!("Camera released");
        }
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    /// Capture a frame in the requested channel order.
    ///
    /// When stopped, attempts an implicit `start`. Any failure to start or to
    /// read falls back to the cached last good frame when one exists;
    /// `NoFrameAvailable` is returned only when there is nothing to serve.
    pub fn get_frame(&self, color_space: ColorSpace) -> Result<Frame> {
        let mut inner = self.lock();

        if inner.state != CaptureState::Running {
            if let Err(e) = self.start_locked(&mut inner) {
                tracing::warn!("Implicit camera start failed: {}", e);
            }
            if inner.state != CaptureState::Running {
                return Self::fallback(&inner, color_space);
            }
        }

        match inner.source.read_frame() {
            Ok(frame) => {
                inner.last_good_frame = Some(frame.clone());
                Ok(frame.to_color_space(color_space))
            }
            Err(e) => {
                tracing::warn!("Frame capture failed: {}; serving cached frame if any", e);
                Self::fallback(&inner, color_space)
            }
        }
    }

    fn fallback(inner: &SessionInner<S>, color_space: ColorSpace) -> Result<Frame> {
        inner
            .last_good_frame
            .as_ref()
            .map(|f| f.to_color_space(color_space))
            .ok_or(FaceGateError::NoFrameAvailable)
    }

    /// Begin an MJPEG multipart stream. Starts the camera once; a device that
    /// cannot be opened fails the stream up front. The device is released on
    /// every exit path, including the consumer dropping the iterator.
    pub fn stream_frames(&self) -> Result<FrameStream<'_, S>> {
        self.start()?;
        tracing::info!("Video stream started");
        Ok(FrameStream::new(self))
    }
}
