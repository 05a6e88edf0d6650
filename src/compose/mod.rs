//! Compositing engine
//!
//! Turns captured frames into the final still: a grid collage or a
//! template fill, with an optional overlay. Composition is a pure function
//! of its inputs; writing the artifact is a separate, atomic step.

pub mod blend;
pub mod collage;
pub mod layout;
pub mod overlay;
pub mod template;

pub use blend::{blend_at, blend_into};
pub use collage::build_collage;
pub use layout::CollageLayout;
pub use overlay::{Overlay, OverlayMode};
pub use template::{default_slots, place_on_template, SlotRect};

use crate::pipeline::{CanvasSpec, Frame};
use crate::settings::{BoothSettings, PhotoFormat};
use crate::utils::{BoothError, BoothResult};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Template {
    image: Overlay,
    slots: Vec<SlotRect>,
}

/// Composition inputs resolved once from settings
#[derive(Debug, Clone)]
pub struct Composer {
    print: CanvasSpec,
    overlay: Option<Arc<Overlay>>,
    mode: OverlayMode,
    template: Option<Arc<Template>>,
}

impl Composer {
    pub fn new(print: CanvasSpec) -> Self {
        Self {
            print,
            overlay: None,
            mode: OverlayMode::PerShot,
            template: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Overlay, mode: OverlayMode) -> Self {
        self.overlay = Some(Arc::new(overlay));
        self.mode = mode;
        self
    }

    /// Use a background template; it is stretched to the print canvas
    pub fn with_template(mut self, image: Overlay, slots: Vec<SlotRect>) -> Self {
        let slots = if slots.is_empty() {
            default_slots()
        } else {
            slots
        };
        self.template = Some(Arc::new(Template {
            image: image.resized(self.print.width, self.print.height),
            slots,
        }));
        self
    }

    pub fn from_settings(settings: &BoothSettings) -> BoothResult<Self> {
        let canvas = &settings.canvas;
        let mut composer = Self::new(CanvasSpec::new(
            canvas.width,
            canvas.height,
            canvas.border_color,
        ));

        if let Some(path) = &settings.photo.overlay_path {
            composer = composer.with_overlay(Overlay::load(path)?, settings.photo.overlay_mode);
        }
        if let Some(path) = &settings.photo.template_path {
            composer = composer.with_template(Overlay::load(path)?, settings.photo.slots.clone());
        }
        Ok(composer)
    }

    pub fn overlay(&self) -> Option<Arc<Overlay>> {
        self.overlay.clone()
    }

    /// Shots a template session needs, if a template is configured
    pub fn template_slots(&self) -> Option<usize> {
        self.template.as_ref().map(|t| t.slots.len())
    }

    pub fn compose(&self, frames: &[Frame]) -> BoothResult<RgbImage> {
        if frames.is_empty() {
            return Err(BoothError::CompositionFailed(
                "No photos to compose".to_string(),
            ));
        }

        if let Some(template) = &self.template {
            return place_on_template(frames, &template.slots, &template.image);
        }

        let overlay = self.overlay.as_deref().map(|o| (o, self.mode));
        build_collage(frames, overlay, &self.print)
    }
}

/// Encode `image` next to `path` and rename it into place, so a partial
/// artifact is never visible under the final name.
pub fn write_artifact(image: &RgbImage, path: &Path, format: PhotoFormat) -> BoothResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix("temp_")
        .suffix(".part")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let format = match format {
            PhotoFormat::Jpg => ImageFormat::Jpeg,
            PhotoFormat::Png => ImageFormat::Png,
        };
        image.write_to(&mut writer, format)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| BoothError::Io(e.error))?;

    tracing::info!("Saved {:?}", path);
    Ok(())
}

/// Stretch an overlay to the video canvas and save it as PNG for the
/// transcoder
pub fn write_overlay_png(overlay: &Overlay, width: u32, height: u32, path: &Path) -> BoothResult<()> {
    let rgba = imageops::resize(&overlay.to_rgba(), width, height, FilterType::Triangle);
    rgba.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
