//! Overlay images and where they apply

use crate::utils::{BoothError, BoothResult};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a photo overlay is blended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlayMode {
    /// Onto each shot before placement
    #[default]
    PerShot,
    /// Once onto the assembled canvas
    FinalCanvas,
    /// Stretched over each grid column
    PerColumn,
}

/// A decoded overlay. Images with an alpha channel blend per pixel; opaque
/// images use a fixed weighted blend.
#[derive(Debug, Clone)]
pub enum Overlay {
    Opaque(RgbImage),
    Alpha(RgbaImage),
}

impl Overlay {
    pub fn load(path: &Path) -> BoothResult<Self> {
        let image = image::open(path).map_err(|e| {
            BoothError::CompositionFailed(format!("Failed to load overlay {:?}: {}", path, e))
        })?;
        Ok(Self::from_dynamic(image))
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        if image.color().has_alpha() {
            Overlay::Alpha(image.into_rgba8())
        } else {
            Overlay::Opaque(image.into_rgb8())
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Overlay::Opaque(img) => img.dimensions(),
            Overlay::Alpha(img) => img.dimensions(),
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, Overlay::Alpha(_))
    }

    /// Stretch to exactly `width` x `height`
    pub fn resized(&self, width: u32, height: u32) -> Overlay {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        match self {
            Overlay::Opaque(img) => {
                Overlay::Opaque(imageops::resize(img, width, height, FilterType::Triangle))
            }
            Overlay::Alpha(img) => {
                Overlay::Alpha(imageops::resize(img, width, height, FilterType::Triangle))
            }
        }
    }

    pub fn to_rgba(&self) -> RgbaImage {
        match self {
            Overlay::Opaque(img) => DynamicImage::ImageRgb8(img.clone()).into_rgba8(),
            Overlay::Alpha(img) => img.clone(),
        }
    }
}
