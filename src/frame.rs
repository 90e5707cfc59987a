use crate::error::{FaceGateError, Result};
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

/// Pixel channel order of a frame buffer.
///
/// `Bgr` is the raw device order as produced by capture backends; `Rgb` is
/// the normalized order expected by embedding providers and JPEG encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Bgr,
    Rgb,
}

/// An immutable pixel buffer, 3 bytes per pixel, tagged with its channel order.
///
/// Frames are produced by the camera layer and consumed by the face provider
/// and by JPEG encoding for streaming. Callers that need a frame beyond the
/// current call must clone it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    width: u32,
    height: u32,
    color_space: ColorSpace,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, color_space: ColorSpace, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FaceGateError::Other(anyhow::anyhow!(
                "Frame buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            color_space,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Return this frame in the requested channel order, swapping the red and
    /// blue channels if needed. Returns a clone when no conversion is needed.
    pub fn to_color_space(&self, target: ColorSpace) -> Frame {
        if self.color_space == target {
            return self.clone();
        }
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Frame {
            width: self.width,
            height: self.height,
            color_space: target,
            data,
        }
    }

    /// Encode to JPEG. Frames in raw device order are normalized to RGB first.
    pub fn to_jpeg(&self) -> Result<Vec<u8>> {
        let rgb = self.to_color_space(ColorSpace::Rgb);
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, 80);
        encoder.encode(&rgb.data, rgb.width, rgb.height, image::ColorType::Rgb8)?;
        Ok(out)
    }

    /// Decode a JPEG buffer into an RGB frame. Used to rehydrate stored
    /// reference images for image-pair verification.
    pub fn from_jpeg(bytes: &[u8]) -> Result<Frame> {
        let img = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = img.dimensions();
        Frame::new(width, height, ColorSpace::Rgb, img.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pixel_frame() -> Frame {
        Frame::new(2, 1, ColorSpace::Bgr, vec![1, 2, 3, 4, 5, 6]).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer_size() {
        assert!(Frame::new(2, 2, ColorSpace::Rgb, vec![0; 9]).is_err());
    }

    #[test]
    fn conversion_swaps_red_and_blue() {
        let frame = two_pixel_frame();
        let rgb = frame.to_color_space(ColorSpace::Rgb);
        assert_eq!(rgb.as_bytes(), &[3, 2, 1, 6, 5, 4]);
        assert_eq!(rgb.color_space(), ColorSpace::Rgb);
    }

    #[test]
    fn conversion_to_same_space_is_identity() {
        let frame = two_pixel_frame();
        assert_eq!(frame.to_color_space(ColorSpace::Bgr), frame);
    }

    #[test]
    fn jpeg_round_trip_preserves_dimensions() {
        let data = vec![128u8; 8 * 6 * 3];
        let frame = Frame::new(8, 6, ColorSpace::Rgb, data).unwrap();
        let jpeg = frame.to_jpeg().unwrap();
        let decoded = Frame::from_jpeg(&jpeg).unwrap();
        assert_eq!(decoded.width(), 8);
        assert_eq!(decoded.height(), 6);
        assert_eq!(decoded.color_space(), ColorSpace::Rgb);
    }
}
