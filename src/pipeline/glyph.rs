//! Countdown digits burned into preview frames

use image::{Rgb, RgbImage};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// 5x7 bitmaps for 0-9, one row per byte, high bit on the left
const DIGITS: [[u8; 7]; 10] = [
    [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
    [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
];

const FILL: Rgb<u8> = Rgb([255, 255, 255]);
const SHADOW: Rgb<u8> = Rgb([0, 0, 0]);

/// Draw `value` centered on the image, sized to about a quarter of its height
pub fn burn_countdown(image: &mut RgbImage, value: u32) {
    let digits: Vec<usize> = value
        .to_string()
        .bytes()
        .map(|b| (b - b'0') as usize)
        .collect();

    let scale = (image.height() / (GLYPH_HEIGHT * 4)).max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    let total_width = advance * digits.len() as u32 - scale;
    let total_height = GLYPH_HEIGHT * scale;

    let left = image.width().saturating_sub(total_width) / 2;
    let top = image.height().saturating_sub(total_height) / 2;
    let shadow = (scale / 4).max(1);

    for (i, digit) in digits.iter().enumerate() {
        let x = left + i as u32 * advance;
        draw_digit(image, *digit, x + shadow, top + shadow, scale, SHADOW);
        draw_digit(image, *digit, x, top, scale, FILL);
    }
}

fn draw_digit(image: &mut RgbImage, digit: usize, x0: u32, y0: u32, scale: u32, color: Rgb<u8>) {
    for (row, bits) in DIGITS[digit].iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (0x10 >> col) == 0 {
                continue;
            }
            let px = x0 + col * scale;
            let py = y0 + row as u32 * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    let (x, y) = (px + dx, py + dy);
                    if x < image.width() && y < image.height() {
                        image.put_pixel(x, y, color);
                    }
                }
            }
        }
    }
}
