//! Oriented-rectangle geometry primitives.
//!
//! Implements:
//! - `Point2D` value type with the few vector ops the engine needs.
//! - `RotatedRect`: center + size + orientation, with contour extraction,
//!   axis-aligned bounds and uniform scaling about the world origin.
//! - `Bounds`: axis-aligned bounding box.
//!
//! Contours are computed in f64 throughout; half-extents are never truncated
//! to integers, so sub-pixel placements of small footprints survive.

use serde::{Deserialize, Serialize};

use crate::polygon::Polygon;

// ── Point ──────────────────────────────────────────────────────────────────

/// Immutable 2D point in mosaic/world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rotate this point about `pivot` by `angle_deg` (counter-clockwise).
    pub fn rotated_about(self, pivot: Point2D, angle_deg: f64) -> Point2D {
        let (s, c) = angle_deg.to_radians().sin_cos();
        let dx = self.x - pivot.x;
        let dy = self.y - pivot.y;
        Point2D {
            x: pivot.x + c * dx - s * dy,
            y: pivot.y + s * dx + c * dy,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

// ── Bounds ─────────────────────────────────────────────────────────────────

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Smallest box containing all `points`. Returns `None` for an empty set.
    pub fn of_points(points: &[Point2D]) -> Option<Bounds> {
        let first = points.first()?;
        let mut b = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }
}

// ── RotatedRect ────────────────────────────────────────────────────────────

/// An image footprint: a rectangle of `size` centered at `center`, rotated by
/// `angle_deg` (counter-clockwise, degrees).
///
/// `angle_deg` is unconstrained; correction passes accumulate onto it freely
/// and any normalization happens at presentation time. `size` is fixed after
/// construction — registration only ever moves and rotates a placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    center: Point2D,
    size: (f64, f64),
    angle_deg: f64,
}

impl RotatedRect {
    pub fn new(center: Point2D, size: (f64, f64), angle_deg: f64) -> Self {
        Self {
            center,
            size,
            angle_deg,
        }
    }

    pub fn center(&self) -> Point2D {
        self.center
    }

    /// `(width, height)` in world pixels.
    pub fn size(&self) -> (f64, f64) {
        self.size
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    pub fn set_center(&mut self, center: Point2D) {
        self.center = center;
    }

    pub fn set_angle(&mut self, angle_deg: f64) {
        self.angle_deg = angle_deg;
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.center.x += dx;
        self.center.y += dy;
    }

    pub fn rotate_by(&mut self, delta_deg: f64) {
        self.angle_deg += delta_deg;
    }

    /// The four corners as a closed convex polygon, in consistent
    /// counter-clockwise winding before rotation.
    pub fn contour(&self) -> Polygon {
        let hw = self.size.0 / 2.0;
        let hh = self.size.1 / 2.0;
        let corners = [
            Point2D::new(self.center.x - hw, self.center.y - hh),
            Point2D::new(self.center.x + hw, self.center.y - hh),
            Point2D::new(self.center.x + hw, self.center.y + hh),
            Point2D::new(self.center.x - hw, self.center.y + hh),
        ];
        Polygon::new(
            corners
                .iter()
                .map(|p| p.rotated_about(self.center, self.angle_deg))
                .collect(),
        )
    }

    /// Axis-aligned bounding box of the contour.
    pub fn bounds(&self) -> Bounds {
        // A rect contour always has 4 vertices.
        Bounds::of_points(self.contour().vertices()).unwrap_or(Bounds {
            min_x: self.center.x,
            min_y: self.center.y,
            max_x: self.center.x,
            max_y: self.center.y,
        })
    }

    /// `(height, width)` of the bounding box, height first to match the
    /// row-major pixel-buffer convention downstream.
    pub fn shape(&self) -> (f64, f64) {
        let b = self.bounds();
        (b.height(), b.width())
    }

    /// Uniform scaling about the world origin: both the center and the size
    /// scale by `factor`, the orientation is unchanged.
    pub fn scaled(&self, factor: f64) -> RotatedRect {
        RotatedRect {
            center: Point2D::new(self.center.x * factor, self.center.y * factor),
            size: (self.size.0 * factor, self.size.1 * factor),
            angle_deg: self.angle_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_pt_eq(a: Point2D, b: Point2D, eps: f64) {
        assert_relative_eq!(a.x, b.x, epsilon = eps);
        assert_relative_eq!(a.y, b.y, epsilon = eps);
    }

    #[test]
    fn test_contour_unrotated_is_axis_aligned_box() {
        let r = RotatedRect::new(Point2D::new(10.0, 20.0), (8.0, 4.0), 0.0);
        let c = r.contour();
        let v = c.vertices();
        assert_eq!(v.len(), 4);
        assert_pt_eq(v[0], Point2D::new(6.0, 18.0), 1e-12);
        assert_pt_eq(v[1], Point2D::new(14.0, 18.0), 1e-12);
        assert_pt_eq(v[2], Point2D::new(14.0, 22.0), 1e-12);
        assert_pt_eq(v[3], Point2D::new(6.0, 22.0), 1e-12);
    }

    #[test]
    fn test_contour_full_turn_reproduces_original() {
        let r0 = RotatedRect::new(Point2D::new(-3.0, 7.5), (11.0, 5.0), 0.0);
        let r1 = RotatedRect::new(Point2D::new(-3.0, 7.5), (11.0, 5.0), 360.0);
        let v0 = r0.contour();
        let v1 = r1.contour();
        for (a, b) in v0.vertices().iter().zip(v1.vertices()) {
            assert_pt_eq(*a, *b, 1e-9);
        }
    }

    #[test]
    fn test_bounds_of_rotated_square() {
        // 45 degrees turns a 10x10 square into a bbox of side 10*sqrt(2).
        let r = RotatedRect::new(Point2D::new(0.0, 0.0), (10.0, 10.0), 45.0);
        let b = r.bounds();
        let d = 10.0 * std::f64::consts::SQRT_2;
        assert_relative_eq!(b.width(), d, epsilon = 1e-9);
        assert_relative_eq!(b.height(), d, epsilon = 1e-9);
    }

    #[test]
    fn test_shape_is_height_first() {
        let r = RotatedRect::new(Point2D::new(0.0, 0.0), (8.0, 4.0), 0.0);
        let (h, w) = r.shape();
        assert_relative_eq!(h, 4.0, epsilon = 1e-12);
        assert_relative_eq!(w, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scaled_about_origin() {
        let r = RotatedRect::new(Point2D::new(10.0, -4.0), (8.0, 4.0), 30.0);
        let s = r.scaled(0.5);
        assert_pt_eq(s.center(), Point2D::new(5.0, -2.0), 1e-12);
        assert_relative_eq!(s.size().0, 4.0, epsilon = 1e-12);
        assert_relative_eq!(s.size().1, 2.0, epsilon = 1e-12);
        assert_relative_eq!(s.angle_deg(), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_size_rect_collapses_to_point() {
        let r = RotatedRect::new(Point2D::new(1.0, 2.0), (0.0, 0.0), 15.0);
        let b = r.bounds();
        assert_relative_eq!(b.width(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.height(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_small_rect_keeps_subpixel_extents() {
        // Half-extents below one pixel must not collapse.
        let r = RotatedRect::new(Point2D::new(0.0, 0.0), (1.5, 0.9), 0.0);
        let b = r.bounds();
        assert_relative_eq!(b.width(), 1.5, epsilon = 1e-12);
        assert_relative_eq!(b.height(), 0.9, epsilon = 1e-12);
    }
}
