//! Overlap extraction for a pair of placed elements.
//!
//! Pipeline per element: resize the source to its footprint's pixel size,
//! de-rotate onto the footprint's bounding-box canvas (inverse-mapped bilinear
//! sampling), translate the shared intersection polygon into that local frame,
//! mask everything outside it and crop to the polygon's local bounding box.
//! The two crops are then reconciled to identical pixel dimensions so callers
//! can compare them index for index.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::element::MapElement;
use crate::geometry::RotatedRect;
use crate::polygon::Polygon;

// ── Error type ─────────────────────────────────────────────────────────────

/// Non-fatal per-pair failures. Callers skip the pair and continue.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Footprints share no usable interior (disjoint, touching, or degenerate
    /// intersection — including zero-size footprints).
    NoOverlap,
    /// The masked overlap rounded to an empty pixel region.
    EmptyCrop,
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOverlap => write!(f, "footprints do not overlap"),
            Self::EmptyCrop => write!(f, "overlap region is empty at pixel resolution"),
        }
    }
}

impl std::error::Error for GeometryError {}

// ── Extraction ─────────────────────────────────────────────────────────────

/// Extract pixel-aligned, mask-cropped overlap buffers for two placed
/// elements.
///
/// `scale` uniformly scales both placements about the world origin before
/// extraction, which lets a low-resolution working copy drive registration of
/// full-resolution sources. On success both buffers have identical dimensions
/// and are fully transparent outside the shared footprint.
pub fn intersect(
    a: &MapElement,
    b: &MapElement,
    scale: f64,
) -> Result<(RgbaImage, RgbaImage), GeometryError> {
    intersect_rects(a.image(), a.placement(), b.image(), b.placement(), scale)
}

/// Same as [`intersect`] but over borrowed buffers and placements, so callers
/// evaluating candidate placements never have to clone an element's pixels.
pub fn intersect_rects(
    image_a: &RgbaImage,
    rect_a: &RotatedRect,
    image_b: &RgbaImage,
    rect_b: &RotatedRect,
    scale: f64,
) -> Result<(RgbaImage, RgbaImage), GeometryError> {
    let ra = rect_a.scaled(scale);
    let rb = rect_b.scaled(scale);

    let overlap = ra.contour().intersect_convex(&rb.contour());
    if overlap.is_degenerate() {
        return Err(GeometryError::NoOverlap);
    }

    let crop_a = masked_crop(image_a, &ra, &overlap)?;
    let crop_b = masked_crop(image_b, &rb, &overlap)?;
    Ok(reconcile_sizes(crop_a, crop_b))
}

/// De-rotate, mask and crop one element's pixels to the overlap polygon.
fn masked_crop(
    source: &RgbaImage,
    rect: &RotatedRect,
    overlap: &Polygon,
) -> Result<RgbaImage, GeometryError> {
    let (w, h) = rect.size();
    let w_px = w.round() as i64;
    let h_px = h.round() as i64;
    if w_px < 1 || h_px < 1 {
        return Err(GeometryError::NoOverlap);
    }
    let (w_px, h_px) = (w_px as u32, h_px as u32);

    let resized;
    let working = if source.dimensions() == (w_px, h_px) {
        source
    } else {
        resized = imageops::resize(source, w_px, h_px, FilterType::Triangle);
        &resized
    };

    // Canvas covering the footprint's axis-aligned bounds; local frame is the
    // world frame shifted so the bounds minimum sits at the origin.
    let bounds = rect.bounds();
    let (shape_h, shape_w) = rect.shape();
    let canvas_w = shape_w.round().max(1.0) as u32;
    let canvas_h = shape_h.round().max(1.0) as u32;
    let canvas = derotate(working, rect, canvas_w, canvas_h);

    let local = overlap.translated(-bounds.min_x, -bounds.min_y);
    let mask = local.rasterize(canvas_w, canvas_h);

    let mut masked = canvas;
    for (i, px) in masked.pixels_mut().enumerate() {
        if !mask[i] {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    // Crop to the polygon's local bounding box, clamped to the canvas.
    let bb = local.bounds().ok_or(GeometryError::EmptyCrop)?;
    let x0 = bb.min_x.floor().max(0.0) as u32;
    let y0 = bb.min_y.floor().max(0.0) as u32;
    let x1 = (bb.max_x.ceil() as i64).clamp(0, canvas_w as i64) as u32;
    let y1 = (bb.max_y.ceil() as i64).clamp(0, canvas_h as i64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return Err(GeometryError::EmptyCrop);
    }
    Ok(imageops::crop_imm(&masked, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// Rotate `img` by the footprint's negative angle onto a `canvas_w`×`canvas_h`
/// canvas aligned with the footprint's world bounding box.
///
/// Inverse mapping: each canvas pixel is a world point; rotating its offset
/// from the footprint center back by `-angle` lands in the axis-aligned
/// source buffer, which is sampled bilinearly. Out-of-footprint pixels stay
/// transparent.
fn derotate(img: &RgbaImage, rect: &RotatedRect, canvas_w: u32, canvas_h: u32) -> RgbaImage {
    let bounds = rect.bounds();
    let center = rect.center();
    let (src_w, src_h) = img.dimensions();
    let src_cx = src_w as f64 / 2.0;
    let src_cy = src_h as f64 / 2.0;
    let (s, c) = (-rect.angle_deg()).to_radians().sin_cos();

    let mut out = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
    for y in 0..canvas_h {
        let wy = bounds.min_y + y as f64 + 0.5;
        for x in 0..canvas_w {
            let wx = bounds.min_x + x as f64 + 0.5;
            let dx = wx - center.x;
            let dy = wy - center.y;
            let sx = src_cx + c * dx - s * dy;
            let sy = src_cy + s * dx + c * dy;
            if let Some(px) = bilinear_sample_rgba(img, sx - 0.5, sy - 0.5) {
                out.put_pixel(x, y, px);
            }
        }
    }
    out
}

/// Sample an RGBA image at sub-pixel position using bilinear interpolation,
/// `None` outside the buffer. Coordinates are in units where pixel `(i, j)`
/// sits at `(i, j)` exactly.
#[inline]
fn bilinear_sample_rgba(img: &RgbaImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (w, h) = img.dimensions();
    if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
        return None;
    }
    let xc = x.clamp(0.0, (w - 1) as f64);
    let yc = y.clamp(0.0, (h - 1) as f64);
    let x0 = xc.floor() as u32;
    let y0 = yc.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = xc - x0 as f64;
    let fy = yc - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 4];
    for ch in 0..4 {
        let v = (1.0 - fx) * (1.0 - fy) * p00[ch] as f64
            + fx * (1.0 - fy) * p10[ch] as f64
            + (1.0 - fx) * fy * p01[ch] as f64
            + fx * fy * p11[ch] as f64;
        out[ch] = v.round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(out))
}

/// Rounding in the two independent derivations can leave the crops a pixel
/// apart; shrink the larger to the smaller with nearest-neighbor so indices
/// align.
fn reconcile_sizes(a: RgbaImage, b: RgbaImage) -> (RgbaImage, RgbaImage) {
    let (aw, ah) = a.dimensions();
    let (bw, bh) = b.dimensions();
    if (aw, ah) == (bw, bh) {
        return (a, b);
    }
    let tw = aw.min(bw);
    let th = ah.min(bh);
    let a = if (aw, ah) == (tw, th) {
        a
    } else {
        imageops::resize(&a, tw, th, FilterType::Nearest)
    };
    let b = if (bw, bh) == (tw, th) {
        b
    } else {
        imageops::resize(&b, tw, th, FilterType::Nearest)
    };
    (a, b)
}
