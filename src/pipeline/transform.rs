//! Geometric frame transforms
//!
//! Rotation, mirroring and the three ways of fitting an image into a fixed
//! rectangle: fit-to-width (crop or letterbox the height), letterbox (fit
//! inside, pad the rest) and cover (fill, center-crop the excess).

use super::frame::Frame;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Resampling filter for all scaling
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Camera orientation correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "0")]
    None,
    #[serde(rename = "90")]
    Clockwise90,
    #[serde(rename = "180")]
    Rotate180,
    #[serde(rename = "270")]
    CounterClockwise90,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Clockwise90,
        Rotation::Rotate180,
        Rotation::CounterClockwise90,
    ];

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::CounterClockwise90 => 270,
        }
    }

    pub fn apply(&self, image: RgbImage) -> RgbImage {
        match self {
            Rotation::None => image,
            Rotation::Clockwise90 => imageops::rotate90(&image),
            Rotation::Rotate180 => imageops::rotate180(&image),
            Rotation::CounterClockwise90 => imageops::rotate270(&image),
        }
    }
}

/// Exact output size plus the colour used for letterbox bars
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    pub border: Rgb<u8>,
}

impl CanvasSpec {
    pub fn new(width: u32, height: u32, border: [u8; 3]) -> Self {
        Self {
            width,
            height,
            border: Rgb(border),
        }
    }
}

/// Per-frame transform applied by the pipeline and the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTransform {
    pub rotation: Rotation,
    pub mirror: bool,
    pub canvas: CanvasSpec,
}

impl FrameTransform {
    pub fn apply(&self, frame: Frame) -> Frame {
        let rotation = self.rotation;
        let mirror = self.mirror;
        let canvas = self.canvas;
        frame.map(|image| {
            let image = rotation.apply(image);
            let image = fit_width(&image, &canvas);
            if mirror {
                imageops::flip_horizontal(&image)
            } else {
                image
            }
        })
    }
}

fn scaled(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.width() == width && image.height() == height {
        image.clone()
    } else {
        imageops::resize(image, width, height, RESIZE_FILTER)
    }
}

/// Scale to the canvas width, then center-crop or letterbox the height so
/// the result is exactly the canvas size.
pub fn fit_width(image: &RgbImage, canvas: &CanvasSpec) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = canvas.width as f64 / w.max(1) as f64;
    let scaled_height = ((h as f64 * scale).round() as u32).max(1);
    let resized = scaled(image, canvas.width, scaled_height);

    if scaled_height >= canvas.height {
        let offset = (scaled_height - canvas.height) / 2;
        imageops::crop_imm(&resized, 0, offset, canvas.width, canvas.height).to_image()
    } else {
        let mut out = RgbImage::from_pixel(canvas.width, canvas.height, canvas.border);
        let pad = (canvas.height - scaled_height) / 2;
        imageops::replace(&mut out, &resized, 0, pad as i64);
        out
    }
}

/// Scale to fit entirely inside the canvas and pad the remainder
pub fn letterbox(image: &RgbImage, canvas: &CanvasSpec) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = f64::min(
        canvas.width as f64 / w.max(1) as f64,
        canvas.height as f64 / h.max(1) as f64,
    );
    let new_width = ((w as f64 * scale) as u32).clamp(1, canvas.width);
    let new_height = ((h as f64 * scale) as u32).clamp(1, canvas.height);
    let resized = scaled(image, new_width, new_height);

    if new_width == canvas.width && new_height == canvas.height {
        return resized;
    }

    let mut out = RgbImage::from_pixel(canvas.width, canvas.height, canvas.border);
    let left = (canvas.width - new_width) / 2;
    let top = (canvas.height - new_height) / 2;
    imageops::replace(&mut out, &resized, left as i64, top as i64);
    out
}

/// Center-crop to the target aspect ratio, then scale to exactly
/// `width` x `height`.
pub fn cover(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let target_aspect = width as f64 / height as f64;
    let source_aspect = w as f64 / h as f64;

    let cropped = if source_aspect > target_aspect {
        let crop_width = ((h as f64 * target_aspect).round() as u32).clamp(1, w);
        let offset = (w - crop_width) / 2;
        imageops::crop_imm(image, offset, 0, crop_width, h).to_image()
    } else {
        let crop_height = ((w as f64 / target_aspect).round() as u32).clamp(1, h);
        let offset = (h - crop_height) / 2;
        imageops::crop_imm(image, 0, offset, w, crop_height).to_image()
    };

    scaled(&cropped, width, height)
}
