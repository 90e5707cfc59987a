use crate::camera::{CameraSessionManager, FrameSource};
use crate::error::Result;
use crate::frame::ColorSpace;

/// Outer content type an HTTP layer must declare when forwarding the stream.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Wrap one JPEG image as a multipart part, boundary-delimited with a declared
/// content type. Browsers consume this format verbatim.
pub fn encode_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 48);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Pull-based MJPEG stream over a camera session.
///
/// Yields encoded parts in capture order until the consumer stops pulling or
/// an unrecoverable capture error occurs. The device is released on every
/// exit path; the release bypasses the operation throttle so that a consumer
/// disconnect can never leave the device open.
pub struct FrameStream<'a, S: FrameSource> {
    session: &'a CameraSessionManager<S>,
    frames: u64,
    finished: bool,
}

impl<'a, S: FrameSource> FrameStream<'a, S> {
    pub(crate) fn new(session: &'a CameraSessionManager<S>) -> Self {
        Self {
            session,
            frames: 0,
            finished: false,
        }
    }
}

impl<S: FrameSource> Iterator for FrameStream<'_, S> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let jpeg = self
            .session
            .get_frame(ColorSpace::Rgb)
            .and_then(|frame| frame.to_jpeg());

        match jpeg {
            Ok(jpeg) => {
                self.frames += 1;
                if self.frames % 60 == 0 {
                    tracing::debug!("Streamed {} frames", self.frames);
                }
                Some(Ok(encode_part(&jpeg)))
            }
            Err(e) => {
                tracing::error!("Video stream error after {} frames: {}", self.frames, e);
                self.finished = true;
                self.session.force_release();
                Some(Err(e))
            }
        }
    }
}

impl<S: FrameSource> Drop for FrameStream<'_, S> {
    fn drop(&mut self) {
        self.session.force_release();
        tracing::info!("Video stream ended after {} frames", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::session::tests::{bgr_frame, FakeSource};
    use crate::camera::CaptureState;
    use crate::error::FaceGateError;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[test]
    fn part_is_boundary_delimited_with_content_type() {
        let part = encode_part(b"JPEGDATA");
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(b"JPEGDATA\r\n"));
    }

    #[test]
    fn consumer_disconnect_releases_device_exactly_once() {
        let reads = (0..10).map(|_| Ok(bgr_frame(4))).collect();
        let source = FakeSource::new(reads);
        let closes = source.closes.clone();
        let mgr = CameraSessionManager::new(source, Duration::from_secs(60));

        {
            let mut stream = mgr.stream_frames().unwrap();
            for _ in 0..3 {
                let part = stream.next().unwrap().unwrap();
                assert!(part.starts_with(b"--frame\r\n"));
            }
            // Consumer walks away here.
        }

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.state(), CaptureState::Stopped);
    }

    #[test]
    fn capture_error_without_cache_ends_stream_and_releases() {
        let source = FakeSource::new(vec![Err(FaceGateError::DeviceUnavailable("gone".into()))]);
        let closes = source.closes.clone();
        let mgr = CameraSessionManager::new(source, Duration::from_secs(60));

        let mut stream = mgr.stream_frames().unwrap();
        match stream.next() {
            Some(Err(FaceGateError::NoFrameAvailable)) => {}
            other => panic!("expected NoFrameAvailable, got {:?}", other.map(|r| r.err())),
        }
        assert!(stream.next().is_none());
        drop(stream);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.state(), CaptureState::Stopped);
    }

    #[test]
    fn stream_fails_up_front_when_device_cannot_open() {
        let mut source = FakeSource::new(vec![]);
        source.fail_open = true;
        let mgr = CameraSessionManager::new(source, Duration::from_secs(60));
        let result = mgr.stream_frames();
        match result {
            Err(FaceGateError::DeviceUnavailable(_)) => {}
            other => panic!("expected DeviceUnavailable, got {:?}", other.map(|_| ())),
        }
    }
}
