//! First-page thumbnail rendering
//!
//! Previews are tiles of a fixed height whose width follows the page's own
//! aspect ratio. The page is rendered with an alpha channel and flattened
//! onto opaque white, so documents with transparent page backgrounds do not
//! show up as black or checkered tiles. If any step of that pass fails,
//! including reading the page bounds, a single opaque render is used instead.
//!
//! Canvas width is capped at `MAX_ASPECT` times the height (wider pages are
//! squeezed to fit), and no canvas may exceed `MAX_CANVAS_PIXELS`.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap};

use crate::config::{ThumbnailConfig, ThumbnailFormat};
use crate::document::{Thumbnail, ValidatedDocument};
use crate::error::{ResolveError, Result};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Widest canvas, as a multiple of its height
pub const MAX_ASPECT: f32 = 4.0;
/// Largest canvas in device pixels
pub const MAX_CANVAS_PIXELS: u64 = 40_000_000;

/// Output canvas geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSpec {
    /// Logical canvas height
    pub height: u32,
    /// Device pixels per logical pixel
    pub pixel_density: f32,
}

impl CanvasSpec {
    /// Pixel size of the canvas for a page of the given size in points
    pub fn canvas_size(&self, page_width: f32, page_height: f32) -> Result<(u32, u32)> {
        if !(page_width > 0.0 && page_height > 0.0) || !page_width.is_finite() || !page_height.is_finite() {
            return Err(ResolveError::Render(format!(
                "degenerate page bounds {}x{}",
                page_width, page_height
            )));
        }
        let density = if self.pixel_density > 0.0 { self.pixel_density } else { 1.0 };
        let logical_height = self.height.max(1) as f32;
        let logical_width = (logical_height * page_width / page_height)
            .round()
            .clamp(1.0, logical_height * MAX_ASPECT);
        let width = (logical_width * density).round().max(1.0);
        let height = (logical_height * density).round().max(1.0);

        // also rejects NaN and infinity
        if !(width * height <= MAX_CANVAS_PIXELS as f32) {
            return Err(ResolveError::Render(format!(
                "canvas {}x{} exceeds {} pixels",
                width, height, MAX_CANVAS_PIXELS
            )));
        }
        Ok((width as u32, height as u32))
    }
}

/// Renders page 0 of validated documents into encoded thumbnails
#[derive(Debug, Clone)]
pub struct ThumbnailRenderer {
    canvas: CanvasSpec,
    format: ThumbnailFormat,
}

impl ThumbnailRenderer {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            canvas: CanvasSpec {
                height: config.height,
                pixel_density: config.pixel_density,
            },
            format: config.format,
        }
    }

    pub fn canvas(&self) -> CanvasSpec {
        self.canvas
    }

    /// Render the first page. Runs on the blocking pool, without a timeout.
    pub async fn render(&self, doc: &ValidatedDocument) -> Result<Thumbnail> {
        let path = doc.path().to_path_buf();
        let canvas = self.canvas;
        let format = self.format;

        tokio::task::spawn_blocking(move || {
            let image = render_first_page(&path, canvas)?;
            let (width, height) = image.dimensions();
            let data = encode_rgb(image, format)?;
            Ok(Thumbnail::new(data, width, height, format))
        })
        .await
        .map_err(|e| ResolveError::Render(format!("Task join error: {}", e)))?
    }
}

fn render_first_page(path: &Path, canvas: CanvasSpec) -> Result<RgbImage> {
    // a canvas too large even for a square page fails before any rendering
    canvas.canvas_size(1.0, 1.0)?;

    let path_str = path.to_string_lossy();
    let doc = Document::open(&*path_str).map_err(render_error)?;
    let page = doc.load_page(0).map_err(render_error)?;

    let composited = page_geometry(&page, canvas)
        .and_then(|(matrix, width, height)| composite_pass(&page, &matrix, width, height));
    match composited {
        Ok(image) => Ok(image),
        Err(e) => {
            tracing::debug!(
                path = %path.display(),
                error = %e,
                "Composited render failed, falling back to single pass"
            );
            single_pass(&page, canvas)
        }
    }
}

/// Scale matrix and canvas size derived from the page bounds
fn page_geometry(page: &Page, canvas: CanvasSpec) -> Result<(Matrix, u32, u32)> {
    let bounds = page.bounds().map_err(render_error)?;
    let page_width = bounds.x1 - bounds.x0;
    let page_height = bounds.y1 - bounds.y0;
    let (width, height) = canvas.canvas_size(page_width, page_height)?;
    let matrix = Matrix::new_scale(width as f32 / page_width, height as f32 / page_height);
    Ok((matrix, width, height))
}

/// Render with alpha, then flatten onto a white canvas
fn composite_pass(page: &Page, matrix: &Matrix, width: u32, height: u32) -> Result<RgbImage> {
    let pixmap = page
        .to_pixmap(matrix, &Colorspace::device_rgb(), true, false)
        .map_err(render_error)?;
    flatten_pixmap(&pixmap, width, height)
}

/// Opaque render straight to RGB; MuPDF clears the background to white.
///
/// Without usable bounds the page is rendered at its natural size and
/// resampled onto the canvas.
fn single_pass(page: &Page, canvas: CanvasSpec) -> Result<RgbImage> {
    if let Ok((matrix, width, height)) = page_geometry(page, canvas) {
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)
            .map_err(render_error)?;
        return flatten_pixmap(&pixmap, width, height);
    }

    let pixmap = page
        .to_pixmap(&Matrix::IDENTITY, &Colorspace::device_rgb(), false, false)
        .map_err(render_error)?;
    let (src_width, src_height) = (pixmap.width(), pixmap.height());
    let (width, height) = canvas.canvas_size(src_width as f32, src_height as f32)?;
    let natural = flatten_pixmap(&pixmap, src_width, src_height)?;
    Ok(imageops::resize(&natural, width, height, FilterType::Triangle))
}

fn flatten_pixmap(pixmap: &Pixmap, width: u32, height: u32) -> Result<RgbImage> {
    flatten_onto_white(
        pixmap.samples(),
        pixmap.n() as usize,
        pixmap.width(),
        pixmap.height(),
        width,
        height,
    )
}

/// Composite premultiplied RGB(A) samples onto an opaque white canvas.
///
/// The source may be a pixel larger or smaller than the canvas after
/// rounding; it is clipped or padded with white.
pub fn flatten_onto_white(
    samples: &[u8],
    components: usize,
    src_width: u32,
    src_height: u32,
    width: u32,
    height: u32,
) -> Result<RgbImage> {
    if components < 3 {
        return Err(ResolveError::Render(format!(
            "unsupported pixmap with {} components",
            components
        )));
    }
    let expected = src_width as usize * src_height as usize * components;
    if samples.len() < expected {
        return Err(ResolveError::Render(format!(
            "pixmap has {} samples, expected {}",
            samples.len(),
            expected
        )));
    }

    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    for y in 0..height.min(src_height) {
        for x in 0..width.min(src_width) {
            let offset = (y as usize * src_width as usize + x as usize) * components;
            let alpha = if components >= 4 { samples[offset + 3] } else { 255 };
            let uncovered = 255 - alpha;
            // premultiplied source over white: c + (1 - a) * 255
            let px = Rgb([
                samples[offset].saturating_add(uncovered),
                samples[offset + 1].saturating_add(uncovered),
                samples[offset + 2].saturating_add(uncovered),
            ]);
            canvas.put_pixel(x, y, px);
        }
    }
    Ok(canvas)
}

/// Encode an opaque image in the thumbnail format
pub(crate) fn encode_rgb(image: RgbImage, format: ThumbnailFormat) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut output), format.image_format())
        .map_err(|e| ResolveError::Render(e.to_string()))?;
    Ok(output)
}

fn render_error(err: mupdf::Error) -> ResolveError {
    ResolveError::Render(err.to_string())
}
