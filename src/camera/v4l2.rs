use crate::camera::FrameSource;
use crate::config::CameraConfig;
use crate::error::{FaceGateError, Result};
use crate::frame::{ColorSpace, Frame};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// V4L2-backed frame source. Opens `/dev/video{index}`, negotiates MJPG
/// (falling back to whatever the driver reports, with GREY handled for IR
/// cameras) and reads one frame per call through a short-lived mmap stream.
pub struct V4l2Source {
    config: CameraConfig,
    device: Option<Device>,
}

impl V4l2Source {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            device: None,
        }
    }

    fn decode(&self, fourcc: &FourCC, data: &[u8], width: u32, height: u32) -> Result<Frame> {
        match fourcc.str().unwrap_or("") {
            "MJPG" => {
                let img = image::load_from_memory(data)
                    .map_err(|e| {
                        FaceGateError::DeviceUnavailable(format!("Bad MJPG frame: {}", e))
                    })?
                    .to_rgb8();
                let (w, h) = img.dimensions();
                Frame::new(w, h, ColorSpace::Rgb, img.into_raw())
            }
            "GREY" => {
                let expected = width as usize * height as usize;
                if data.len() < expected {
                    return Err(FaceGateError::DeviceUnavailable(format!(
                        "Short GREY frame: expected {} bytes, got {}",
                        expected,
                        data.len()
                    )));
                }
                let mut rgb = Vec::with_capacity(expected * 3);
                for &luma in &data[..expected] {
                    rgb.extend_from_slice(&[luma, luma, luma]);
                }
                Frame::new(width, height, ColorSpace::Rgb, rgb)
            }
            other => Err(FaceGateError::DeviceUnavailable(format!(
                "Unsupported pixel format: {}",
                other
            ))),
        }
    }
}

impl FrameSource for V4l2Source {
    fn open(&mut self) -> Result<()> {
        let index = self.config.device_index;
        tracing::debug!("Opening camera device {}", index);

        let device = Device::new(index as usize).map_err(|e| {
            FaceGateError::DeviceUnavailable(format!("Failed to open camera {}: {}", index, e))
        })?;

        let caps = device.query_caps().map_err(|e| {
            FaceGateError::DeviceUnavailable(format!("Failed to query capabilities: {}", e))
        })?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            tracing::warn!(
                "Device {} may not support standard video capture: {:?}",
                index,
                caps.capabilities
            );
        }

        let mut fmt = device.format().map_err(|e| {
            FaceGateError::DeviceUnavailable(format!("Failed to get format: {}", e))
        })?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        // Keep GREY for IR cameras, otherwise request MJPG.
        if fmt.fourcc.str() != Ok("GREY") {
            fmt.fourcc = FourCC::new(b"MJPG");
        }
        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let actual = device.format().map_err(|e| {
            FaceGateError::DeviceUnavailable(format!("Failed to get final format: {}", e))
        })?;
        if actual.width != self.config.width || actual.height != self.config.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                actual.width,
                actual.height,
                self.config.width,
                self.config.height
            );
        }

        self.device = Some(device);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| FaceGateError::DeviceUnavailable("Device not open".into()))?;

        let fmt = device.format().map_err(|e| {
            FaceGateError::DeviceUnavailable(format!("Failed to get format: {}", e))
        })?;

        let mut stream =
            v4l::io::mmap::Stream::with_buffers(device, Type::VideoCapture, 4).map_err(|e| {
                FaceGateError::DeviceUnavailable(format!("Failed to create stream: {}", e))
            })?;

        let (buf, _meta) = stream.next().map_err(|e| {
            FaceGateError::DeviceUnavailable(format!("Failed to capture: {}", e))
        })?;

        let fourcc = fmt.fourcc;
        let data = buf.to_vec();
        drop(stream);
        self.decode(&fourcc, &data, fmt.width, fmt.height)
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!("Released camera device {}", self.config.device_index);
        }
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }
}
