//! Letterboxing
//!
//! Aspect-preserving resize into a square model input with centred gray
//! padding, and the inverse mapping for detector boxes.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::detection::BoundingBox;

/// Padding value used by YOLO models
const PAD_VALUE: u8 = 114;

/// Geometry of one source frame placed into a square input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Source → input scale factor
    pub scale: f32,
    /// Left padding in input pixels
    pub pad_x: u32,
    /// Top padding in input pixels
    pub pad_y: u32,
    /// Resized content size in input pixels
    pub content_width: u32,
    pub content_height: u32,
    /// Input side length
    pub size: u32,
    /// Source frame size
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn new(source_width: u32, source_height: u32, size: u32) -> Self {
        let scale = (size as f32 / source_width as f32).min(size as f32 / source_height as f32);
        let content_width = ((source_width as f32 * scale).round() as u32).clamp(1, size);
        let content_height = ((source_height as f32 * scale).round() as u32).clamp(1, size);

        Self {
            scale,
            pad_x: (size - content_width) / 2,
            pad_y: (size - content_height) / 2,
            content_width,
            content_height,
            size,
            source_width,
            source_height,
        }
    }

    /// Build the padded model input
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([PAD_VALUE; 3]));
        let resized = if (self.content_width, self.content_height) == image.dimensions() {
            image.clone()
        } else {
            imageops::resize(image, self.content_width, self.content_height, FilterType::Triangle)
        };
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Map an input-space box back onto the source frame, clipped to its bounds.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn to_source(&self, bbox: &BoundingBox) -> Option<BoundingBox> {
        let map_x = |x: f32| (x - self.pad_x as f32) / self.scale;
        let map_y = |y: f32| (y - self.pad_y as f32) / self.scale;

        let mapped =
            BoundingBox::new(map_x(bbox.x1), map_y(bbox.y1), map_x(bbox.x2), map_y(bbox.y2))
                .clip(self.source_width as f32, self.source_height as f32);
        mapped.is_valid().then_some(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wide_frame_geometry() {
        let lb = Letterbox::new(1280, 720, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.content_width, lb.content_height), (640, 360));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 140));
    }

    #[test]
    fn test_full_input_box_covers_full_frame() {
        let lb = Letterbox::new(1280, 720, 640);
        let full = BoundingBox::new(0.0, 0.0, 640.0, 640.0);
        assert_eq!(
            lb.to_source(&full),
            Some(BoundingBox::new(0.0, 0.0, 1280.0, 720.0))
        );
    }

    #[test]
    fn test_maps_content_box() {
        let lb = Letterbox::new(1280, 720, 640);
        // Car at (100, 200)-(300, 400) in the source
        let input = BoundingBox::new(50.0, 240.0, 150.0, 340.0);
        assert_eq!(
            lb.to_source(&input),
            Some(BoundingBox::new(100.0, 200.0, 300.0, 400.0))
        );
    }

    #[test]
    fn test_box_in_padding_is_dropped() {
        let lb = Letterbox::new(1280, 720, 640);
        let in_top_padding = BoundingBox::new(10.0, 10.0, 100.0, 120.0);
        assert_eq!(lb.to_source(&in_top_padding), None);
    }

    #[test]
    fn test_apply_pads_with_gray() {
        let image = RgbImage::from_pixel(8, 4, Rgb([255, 0, 0]));
        let lb = Letterbox::new(8, 4, 8);
        let input = lb.apply(&image);
        assert_eq!(input.dimensions(), (8, 8));
        assert_eq!(input.get_pixel(0, 0), &Rgb([PAD_VALUE; 3]));
        assert_eq!(input.get_pixel(4, 4), &Rgb([255, 0, 0]));
        assert_eq!(input.get_pixel(7, 7), &Rgb([PAD_VALUE; 3]));
    }

    #[test]
    fn test_identity_when_square_and_same_size() {
        let lb = Letterbox::new(64, 64, 64);
        let b = BoundingBox::new(10.0, 10.0, 50.0, 50.0);
        assert_eq!(lb.to_source(&b), Some(b));
    }

    proptest! {
        #[test]
        fn test_full_box_always_covers_frame(
            w in 1u32..4000,
            h in 1u32..4000,
            size in 32u32..1280,
        ) {
            let lb = Letterbox::new(w, h, size);
            let full = BoundingBox::new(0.0, 0.0, size as f32, size as f32);
            let mapped = lb.to_source(&full).unwrap();
            let tolerance = |side: u32| side as f32 * 1e-4;
            prop_assert_eq!((mapped.x1, mapped.y1), (0.0, 0.0));
            prop_assert!(mapped.x2 >= w as f32 - tolerance(w));
            prop_assert!(mapped.y2 >= h as f32 - tolerance(h));
        }
    }
}
