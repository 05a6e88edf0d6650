//! Grid collages
//!
//! Each frame is cover-fitted into its cell, the grid is assembled on a
//! bordered canvas, and the result is letterboxed to the print size. The
//! overlay mode decides whether the overlay lands on each cell, each column
//! or the finished canvas.

use super::blend::{blend_at, blend_into};
use super::layout::CollageLayout;
use super::overlay::{Overlay, OverlayMode};
use crate::pipeline::{cover, letterbox, CanvasSpec, Frame};
use crate::utils::{BoothError, BoothResult};
use image::{imageops, RgbImage};

pub fn build_collage(
    frames: &[Frame],
    overlay: Option<(&Overlay, OverlayMode)>,
    print: &CanvasSpec,
) -> BoothResult<RgbImage> {
    let layout = CollageLayout::for_count(frames.len()).ok_or_else(|| {
        BoothError::CompositionFailed(format!(
            "No collage layout for {} photos (supported: 1, 4, 6)",
            frames.len()
        ))
    })?;

    if frames.len() == 1 {
        return single(&frames[0], overlay, print);
    }

    let mut grid = RgbImage::from_pixel(layout.grid_width(), layout.grid_height(), print.border);
    let cell_overlay = match overlay {
        Some((o, OverlayMode::PerShot)) => Some(o.resized(layout.cell_width, layout.cell_height)),
        _ => None,
    };

    for (i, frame) in frames.iter().enumerate() {
        let mut cell = cover(frame.image(), layout.cell_width, layout.cell_height);
        if let Some(o) = &cell_overlay {
            blend_at(&mut cell, 0, 0, o);
        }
        let (x, y) = layout.cell_origin(i);
        imageops::replace(&mut grid, &cell, x as i64, y as i64);
    }

    if let Some((o, OverlayMode::PerColumn)) = overlay {
        let column = o.resized(layout.cell_width, layout.grid_height());
        for col in 0..layout.cols {
            blend_at(&mut grid, layout.column_x(col), 0, &column);
        }
    }

    let mut canvas = letterbox(&grid, print);
    if let Some((o, OverlayMode::FinalCanvas)) = overlay {
        blend_into(&mut canvas, o);
    }

    tracing::debug!(
        "Built {}x{} collage of {} photos",
        layout.rows,
        layout.cols,
        frames.len()
    );
    Ok(canvas)
}

fn single(
    frame: &Frame,
    overlay: Option<(&Overlay, OverlayMode)>,
    print: &CanvasSpec,
) -> BoothResult<RgbImage> {
    let mut photo = frame.image().clone();
    match overlay {
        Some((o, OverlayMode::PerShot)) => blend_into(&mut photo, o),
        Some((_, OverlayMode::PerColumn)) => {
            tracing::debug!("Per-column overlay has no columns in a single photo, skipping");
        }
        _ => {}
    }

    let mut canvas = letterbox(&photo, print);
    if let Some((o, OverlayMode::FinalCanvas)) = overlay {
        blend_into(&mut canvas, o);
    }
    Ok(canvas)
}
