//! Sequence elements: one placed aerial photograph each.

use image::RgbaImage;

use crate::geometry::RotatedRect;

// ── Error type ─────────────────────────────────────────────────────────────

/// Rejected placements at construction time. None of these may ever reach a
/// correction loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementError {
    /// Center or angle contains NaN/infinity.
    NonFinite,
    /// Width or height is negative.
    NegativeSize { width: f64, height: f64 },
}

impl std::fmt::Display for PlacementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite => write!(f, "placement has non-finite center or angle"),
            Self::NegativeSize { width, height } => {
                write!(f, "placement has negative size: {}x{}", width, height)
            }
        }
    }
}

impl std::error::Error for PlacementError {}

// ── MapElement ─────────────────────────────────────────────────────────────

/// One photograph of the capture sequence: its pixels plus its current
/// placement in mosaic coordinates.
///
/// The placement is the only field a correction pass mutates, and strictly in
/// increasing `sequence_index` order.
#[derive(Debug, Clone)]
pub struct MapElement {
    image: RgbaImage,
    placement: RotatedRect,
    sequence_index: usize,
}

impl MapElement {
    /// Validates the initial placement eagerly; an invalid placement is fatal
    /// here and can never reach a correction loop.
    pub fn new(
        image: RgbaImage,
        placement: RotatedRect,
        sequence_index: usize,
    ) -> Result<Self, PlacementError> {
        if !placement.center().is_finite() || !placement.angle_deg().is_finite() {
            return Err(PlacementError::NonFinite);
        }
        let (w, h) = placement.size();
        if !w.is_finite() || !h.is_finite() {
            return Err(PlacementError::NonFinite);
        }
        if w < 0.0 || h < 0.0 {
            return Err(PlacementError::NegativeSize {
                width: w,
                height: h,
            });
        }
        Ok(Self {
            image,
            placement,
            sequence_index,
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn placement(&self) -> &RotatedRect {
        &self.placement
    }

    pub fn placement_mut(&mut self) -> &mut RotatedRect {
        &mut self.placement
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }
}
