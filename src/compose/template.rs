//! Template placement
//!
//! Frames are cover-fitted into fixed slot rectangles on a background
//! template. Where the template carries alpha, it is layered over the photo
//! so decorative elements stay on top.

use super::blend::mix;
use super::overlay::Overlay;
use crate::pipeline::{cover, Frame};
use crate::utils::{BoothError, BoothResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Slot rectangle in template pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SlotRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// Four 280x210 corner slots on a 1200x1800 template
pub fn default_slots() -> Vec<SlotRect> {
    vec![
        SlotRect::new(50, 50, 280, 210),
        SlotRect::new(870, 50, 280, 210),
        SlotRect::new(50, 1540, 280, 210),
        SlotRect::new(870, 1540, 280, 210),
    ]
}

pub fn place_on_template(
    frames: &[Frame],
    slots: &[SlotRect],
    template: &Overlay,
) -> BoothResult<RgbImage> {
    if frames.len() != slots.len() {
        return Err(BoothError::CompositionFailed(format!(
            "Template has {} slots but {} photos were taken",
            slots.len(),
            frames.len()
        )));
    }

    let (tw, th) = template.dimensions();
    if let Some(bad) = slots.iter().find(|s| !s.fits(tw, th)) {
        return Err(BoothError::CompositionFailed(format!(
            "Slot {:?} lies outside the {}x{} template",
            bad, tw, th
        )));
    }

    let mut canvas = match template {
        Overlay::Opaque(img) => img.clone(),
        Overlay::Alpha(img) => image::DynamicImage::ImageRgba8(img.clone()).into_rgb8(),
    };

    for (frame, slot) in frames.iter().zip(slots) {
        let photo = cover(frame.image(), slot.width, slot.height);
        for (px, py, p) in photo.enumerate_pixels() {
            let (x, y) = (slot.x + px, slot.y + py);
            let out = canvas.get_pixel_mut(x, y);
            match template {
                Overlay::Alpha(t) => {
                    let tp = t.get_pixel(x, y);
                    for c in 0..3 {
                        out[c] = mix(p[c], tp[c], tp[3]);
                    }
                }
                Overlay::Opaque(_) => *out = *p,
            }
        }
    }

    Ok(canvas)
}
