//! Share link to QR code image

use crate::utils::{BoothError, BoothResult};
use image::{imageops, GrayImage, Luma};
use qrcode::{EcLevel, QrCode};

/// Light border around the code, in modules
const QUIET_ZONE: u32 = 1;

/// Render `link` as a square grayscale QR image of `size` pixels
pub fn render_qr(link: &str, size: u32) -> BoothResult<GrayImage> {
    let code = QrCode::with_error_correction_level(link.as_bytes(), EcLevel::H)
        .map_err(|e| BoothError::PublishFailed(format!("Cannot encode share link: {}", e)))?;

    let modules = code.width() as u32 + 2 * QUIET_ZONE;
    let module_px = (size / modules).max(1);
    let symbol = code
        .render::<Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(module_px, module_px)
        .build();

    // The renderer's own quiet zone is four modules wide
    let side = modules * module_px;
    let mut canvas = GrayImage::from_pixel(side, side, Luma([255]));
    let offset = (QUIET_ZONE * module_px) as i64;
    imageops::overlay(&mut canvas, &symbol, offset, offset);

    let size = size.max(side);
    if size == side {
        return Ok(canvas);
    }
    Ok(imageops::resize(&canvas, size, size, imageops::FilterType::Nearest))
}
