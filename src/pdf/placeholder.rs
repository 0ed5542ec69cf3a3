//! "Unavailable" stand-ins for documents that could not be resolved

use chrono::Utc;
use image::{Rgb, RgbImage};

use crate::config::ThumbnailConfig;
use crate::document::{DocumentRef, PlaceholderRecord, Thumbnail};
use crate::error::{ResolveError, Result};

use super::renderer::{encode_rgb, CanvasSpec};

const BACKGROUND: Rgb<u8> = Rgb([236, 236, 236]);
const MARK: Rgb<u8> = Rgb([196, 196, 196]);
const BORDER_PX: u32 = 2;
/// ISO 216 portrait, width / height
const PAPER_ASPECT: f32 = 0.707;

/// A light-grey tile with a crossed-out page, sized like a real thumbnail
pub fn placeholder_thumbnail(config: &ThumbnailConfig) -> Result<Thumbnail> {
    let canvas = CanvasSpec {
        height: config.height,
        pixel_density: config.pixel_density,
    };
    let (width, height) = canvas.canvas_size(PAPER_ASPECT, 1.0)?;

    let image = RgbImage::from_fn(width, height, |x, y| {
        let on_border = x < BORDER_PX
            || y < BORDER_PX
            || x >= width.saturating_sub(BORDER_PX)
            || y >= height.saturating_sub(BORDER_PX);
        // both diagonals, scaled into a square coordinate space
        let u = x as f32 / width as f32;
        let v = y as f32 / height as f32;
        let on_cross = (u - v).abs() < 0.006 || (u + v - 1.0).abs() < 0.006;
        if on_border || on_cross {
            MARK
        } else {
            BACKGROUND
        }
    });

    let data = encode_rgb(image, config.format)?;
    Ok(Thumbnail::new(data, width, height, config.format))
}

/// Record shown in place of a document that could not be resolved
pub fn placeholder_record(doc: &DocumentRef, cause: &ResolveError) -> PlaceholderRecord {
    PlaceholderRecord {
        document_id: doc.id.clone(),
        display_name: doc.display_name.clone(),
        reason: cause.to_string(),
        created_at: Utc::now(),
    }
}
