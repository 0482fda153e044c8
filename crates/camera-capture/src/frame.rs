//! Video frame types and processing

use image::RgbImage;

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Presentation timestamp relative to stream start (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number within the source
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(CameraError::InvalidFrame(format!(
                "{}x{} frame needs {} RGB bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        })
    }

    /// Wrap a decoded image
    pub fn from_image(image: RgbImage, timestamp_ns: u64, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Copy the pixels into an `image` buffer
    pub fn to_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::InvalidFrame("pixel buffer does not match dimensions".into())
        })
    }

    /// Replace the pixels, keeping timing metadata
    pub fn with_image(&self, image: RgbImage) -> Self {
        Self::from_image(image, self.timestamp_ns, self.sequence)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Timestamp in milliseconds
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ns / 1_000_000
    }
}

/// Timestamp of frame `offset` in a stream running at `fps`
pub fn timestamp_for(offset: u64, fps: Option<f64>) -> u64 {
    match fps {
        Some(fps) if fps.is_finite() && fps > 0.0 => (offset as f64 * 1e9 / fps) as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_buffer() {
        assert!(VideoFrame::new(vec![0; 10], 2, 2, 0, 0).is_err());
        assert!(VideoFrame::new(vec![], 0, 0, 0, 0).is_err());
        assert!(VideoFrame::new(vec![0; 12], 2, 2, 0, 0).is_ok());
    }

    #[test]
    fn test_image_round_trip_keeps_metadata() {
        let frame = VideoFrame::new(vec![7; 4 * 3 * 3], 4, 3, 1_000_000, 9).unwrap();
        let image = frame.to_image().unwrap();
        assert_eq!(image.dimensions(), (4, 3));

        let copy = frame.with_image(image);
        assert_eq!(copy, frame);
        assert_eq!(copy.timestamp_ms(), 1);
    }

    #[test]
    fn test_get_pixel_bounds() {
        let mut data = vec![0; 2 * 2 * 3];
        data[9..12].copy_from_slice(&[1, 2, 3]);
        let frame = VideoFrame::new(data, 2, 2, 0, 0).unwrap();
        assert_eq!(frame.get_pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(frame.get_pixel(2, 0), None);
    }

    #[test]
    fn test_timestamp_for() {
        assert_eq!(timestamp_for(30, Some(30.0)), 1_000_000_000);
        assert_eq!(timestamp_for(5, None), 0);
        assert_eq!(timestamp_for(5, Some(0.0)), 0);
    }
}
