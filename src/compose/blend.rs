//! Per-pixel blending
//!
//! Alpha overlays: `out = base * (1 - a) + overlay * a`, in integer math so
//! a = 0 keeps the base and a = 255 yields the overlay exactly. Opaque
//! overlays: fixed 0.7 base / 0.3 overlay weighting.

use super::overlay::Overlay;
use image::RgbImage;

pub const BASE_WEIGHT: f32 = 0.7;
pub const OVERLAY_WEIGHT: f32 = 0.3;

#[inline]
pub fn mix(base: u8, top: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((base as u32 * (255 - a) + top as u32 * a + 127) / 255) as u8
}

#[inline]
pub fn weighted(base: u8, top: u8) -> u8 {
    (base as f32 * BASE_WEIGHT + top as f32 * OVERLAY_WEIGHT)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Blend `overlay` over the whole image, stretching it to fit
pub fn blend_into(base: &mut RgbImage, overlay: &Overlay) {
    let (w, h) = base.dimensions();
    let fitted = overlay.resized(w, h);
    blend_at(base, 0, 0, &fitted);
}

/// Blend `overlay` at its own size with its top-left corner at (x, y).
/// Pixels falling outside `base` are skipped.
pub fn blend_at(base: &mut RgbImage, x: u32, y: u32, overlay: &Overlay) {
    let (bw, bh) = base.dimensions();
    let (ow, oh) = overlay.dimensions();

    for oy in 0..oh {
        let by = y + oy;
        if by >= bh {
            break;
        }
        for ox in 0..ow {
            let bx = x + ox;
            if bx >= bw {
                break;
            }
            let px = base.get_pixel_mut(bx, by);
            match overlay {
                Overlay::Alpha(img) => {
                    let o = img.get_pixel(ox, oy);
                    let a = o[3];
                    if a == 0 {
                        continue;
                    }
                    for c in 0..3 {
                        px[c] = mix(px[c], o[c], a);
                    }
                }
                Overlay::Opaque(img) => {
                    let o = img.get_pixel(ox, oy);
                    for c in 0..3 {
                        px[c] = weighted(px[c], o[c]);
                    }
                }
            }
        }
    }
}
