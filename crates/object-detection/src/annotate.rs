//! Detection overlays

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::detection::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 20.0;
/// Vertical room around the label text
const LABEL_MARGIN: i32 = 10;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Label drawn above a box: `car: 0.91`
pub fn label_text(detection: &Detection) -> String {
    format!("{}: {:.2}", detection.label, detection.confidence)
}

/// Draws boxes and labels onto frames
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    /// Use `font_path` if given, otherwise the first system font found.
    ///
    /// Without any usable font only the label backgrounds are drawn.
    pub fn new(font_path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match font_path {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        let font = candidates.iter().find_map(|path| load_font(path));
        if font.is_none() {
            warn!("No label font available; detection labels will be drawn without text");
        }

        Self {
            font,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    /// Annotator that never renders glyphs
    pub fn without_font() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn measure(&self, text: &str) -> (i32, i32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(self.scale, font, text);
                (w as i32, h as i32)
            }
            // Rough glyph box of the default scale
            None => (
                (text.chars().count() as f32 * LABEL_SCALE * 0.55) as i32,
                (LABEL_SCALE * 0.7) as i32,
            ),
        }
    }

    /// Draw every detection onto `image`
    pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            self.draw_detection(image, detection);
        }
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let b = &detection.bbox;
        let (x1, y1) = (b.x1.round() as i32, b.y1.round() as i32);
        let (x2, y2) = (b.x2.round() as i32, b.y2.round() as i32);

        for inset in 0..BOX_THICKNESS {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32),
                BOX_COLOR,
            );
        }

        let label = label_text(detection);
        let (text_w, text_h) = self.measure(&label);
        let top = y1 - text_h - LABEL_MARGIN;
        let background =
            Rect::at(x1, top).of_size((text_w + 5).max(1) as u32, (y1 - top).max(1) as u32);
        draw_filled_rect_mut(image, background, BOX_COLOR);

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                TEXT_COLOR,
                x1 + 2,
                top + LABEL_MARGIN / 2,
                self.scale,
                font,
                &label,
            );
        } else {
            debug!("Skipping label text for {}", detection);
        }
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(bytes) {
        Ok(font) => {
            debug!("Using label font {}", path.display());
            Some(font)
        }
        Err(e) => {
            warn!("Ignoring unreadable font {}: {}", path.display(), e);
            None
        }
    }
}
