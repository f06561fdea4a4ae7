//! Convex polygon boolean intersection and mask rasterization.
//!
//! Footprint contours are rectangles, so every intersection this engine
//! computes is convex-vs-convex. Sutherland–Hodgman clipping is exact for that
//! case and keeps the implementation small.

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Point2D};

/// Vertices closer than this are treated as one point when deduplicating
/// clipper output.
const VERTEX_EPS: f64 = 1e-9;

/// Ordered, implicitly closed sequence of vertices.
///
/// May be empty (no intersection) or degenerate (collinear / near-zero area);
/// callers decide whether that is a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<Point2D>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point2D>) -> Self {
        Self { vertices }
    }

    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
        }
    }

    pub fn vertices(&self) -> &[Point2D] {
        &self.vertices
    }

    /// Signed area via the shoelace formula (positive for counter-clockwise
    /// winding in a y-up frame).
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            acc += a.x * b.y - b.x * a.y;
        }
        acc / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Distinct-vertex count after merging near-coincident neighbors.
    pub fn distinct_vertex_count(&self) -> usize {
        dedup_ring(&self.vertices).len()
    }

    /// True when the polygon has no usable interior: fewer than 3 distinct
    /// vertices or vanishing area.
    pub fn is_degenerate(&self) -> bool {
        self.distinct_vertex_count() < 3 || self.area() < VERTEX_EPS
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of_points(&self.vertices)
    }

    /// Translate every vertex by `(dx, dy)`.
    pub fn translated(&self, dx: f64, dy: f64) -> Polygon {
        Polygon::new(
            self.vertices
                .iter()
                .map(|p| Point2D::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }

    /// Intersection of two convex polygons (Sutherland–Hodgman).
    ///
    /// Winding of either operand does not matter; the clip ring is reoriented
    /// internally. The result may be empty or degenerate.
    pub fn intersect_convex(&self, clip: &Polygon) -> Polygon {
        let clip_ring = oriented_ccw(&clip.vertices);
        if clip_ring.len() < 3 {
            return Polygon::empty();
        }

        let mut output = self.vertices.clone();
        let n = clip_ring.len();
        for i in 0..n {
            if output.is_empty() {
                break;
            }
            let a = clip_ring[i];
            let b = clip_ring[(i + 1) % n];
            output = clip_by_edge(&output, a, b);
        }
        Polygon::new(dedup_ring(&output))
    }

    /// Rasterize into a row-major boolean mask of `width`×`height`, sampling
    /// pixel centers. Convex polygons only (half-plane membership test).
    pub fn rasterize(&self, width: u32, height: u32) -> Vec<bool> {
        let ring = oriented_ccw(&self.vertices);
        let mut mask = vec![false; (width as usize) * (height as usize)];
        if ring.len() < 3 {
            return mask;
        }
        let n = ring.len();
        for y in 0..height {
            let py = y as f64 + 0.5;
            for x in 0..width {
                let px = x as f64 + 0.5;
                let mut inside = true;
                for i in 0..n {
                    let a = ring[i];
                    let b = ring[(i + 1) % n];
                    if cross(a, b, Point2D::new(px, py)) < -VERTEX_EPS {
                        inside = false;
                        break;
                    }
                }
                if inside {
                    mask[(y as usize) * (width as usize) + x as usize] = true;
                }
            }
        }
        mask
    }
}

/// Cross product of (b - a) × (p - a).
#[inline]
fn cross(a: Point2D, b: Point2D, p: Point2D) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Clip `subject` against the half-plane left of the directed edge a→b.
fn clip_by_edge(subject: &[Point2D], a: Point2D, b: Point2D) -> Vec<Point2D> {
    let mut out = Vec::with_capacity(subject.len() + 2);
    let n = subject.len();
    for i in 0..n {
        let cur = subject[i];
        let prev = subject[(i + n - 1) % n];
        let cur_in = cross(a, b, cur) >= 0.0;
        let prev_in = cross(a, b, prev) >= 0.0;

        if cur_in {
            if !prev_in {
                if let Some(p) = edge_line_intersection(prev, cur, a, b) {
                    out.push(p);
                }
            }
            out.push(cur);
        } else if prev_in {
            if let Some(p) = edge_line_intersection(prev, cur, a, b) {
                out.push(p);
            }
        }
    }
    out
}

/// Intersection of segment p→q with the infinite line through a→b.
fn edge_line_intersection(p: Point2D, q: Point2D, a: Point2D, b: Point2D) -> Option<Point2D> {
    let d1 = cross(a, b, p);
    let d2 = cross(a, b, q);
    let denom = d1 - d2;
    if denom.abs() < 1e-15 {
        return None;
    }
    let t = d1 / denom;
    Some(Point2D::new(p.x + t * (q.x - p.x), p.y + t * (q.y - p.y)))
}

/// Ring with counter-clockwise orientation (positive signed area).
fn oriented_ccw(ring: &[Point2D]) -> Vec<Point2D> {
    let poly = Polygon::new(ring.to_vec());
    if poly.signed_area() < 0.0 {
        ring.iter().rev().copied().collect()
    } else {
        ring.to_vec()
    }
}

/// Drop consecutive near-coincident vertices, including the wrap-around pair.
fn dedup_ring(ring: &[Point2D]) -> Vec<Point2D> {
    let mut out: Vec<Point2D> = Vec::with_capacity(ring.len());
    for &p in ring {
        if let Some(&last) = out.last() {
            if (p.x - last.x).abs() < VERTEX_EPS && (p.y - last.y).abs() < VERTEX_EPS {
                continue;
            }
        }
        out.push(p);
    }
    while out.len() > 1 {
        let first = out[0];
        let last = out[out.len() - 1];
        if (first.x - last.x).abs() < VERTEX_EPS && (first.y - last.y).abs() < VERTEX_EPS {
            out.pop();
        } else {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(cx: f64, cy: f64, side: f64) -> Polygon {
        let h = side / 2.0;
        Polygon::new(vec![
            Point2D::new(cx - h, cy - h),
            Point2D::new(cx + h, cy - h),
            Point2D::new(cx + h, cy + h),
            Point2D::new(cx - h, cy + h),
        ])
    }

    #[test]
    fn test_area_of_square() {
        assert_relative_eq!(square(0.0, 0.0, 4.0).area(), 16.0, epsilon = 1e-12);
    }

    #[test]
    fn test_self_intersection_is_identity() {
        let s = square(5.0, 5.0, 10.0);
        let i = s.intersect_convex(&s);
        assert_relative_eq!(i.area(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_half_overlap() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 0.0, 10.0);
        let i = a.intersect_convex(&b);
        assert_relative_eq!(i.area(), 50.0, epsilon = 1e-9);
        let bounds = i.bounds().unwrap();
        assert_relative_eq!(bounds.min_x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.max_x, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_squares_yield_degenerate() {
        let a = square(0.0, 0.0, 4.0);
        let b = square(100.0, 0.0, 4.0);
        let i = a.intersect_convex(&b);
        assert!(i.is_degenerate());
    }

    #[test]
    fn test_touching_edges_are_degenerate() {
        // Shared edge only: zero-area strip.
        let a = square(0.0, 0.0, 4.0);
        let b = square(4.0, 0.0, 4.0);
        let i = a.intersect_convex(&b);
        assert!(i.is_degenerate());
    }

    #[test]
    fn test_winding_independence() {
        let a = square(0.0, 0.0, 10.0);
        let rev = Polygon::new(a.vertices().iter().rev().copied().collect());
        let b = square(5.0, 5.0, 10.0);
        let i1 = a.intersect_convex(&b);
        let i2 = rev.intersect_convex(&b);
        assert_relative_eq!(i1.area(), 25.0, epsilon = 1e-9);
        assert_relative_eq!(i1.area(), i2.area(), epsilon = 1e-9);
    }

    #[test]
    fn test_rasterize_full_square() {
        let s = square(2.0, 2.0, 4.0); // covers [0,4]x[0,4]
        let mask = s.rasterize(4, 4);
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn test_rasterize_half_plane() {
        // Covers x in [0,2] of a 4x4 grid: left half set, right half clear.
        let s = Polygon::new(vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(2.0, 0.0),
            Point2D::new(2.0, 4.0),
            Point2D::new(0.0, 4.0),
        ]);
        let mask = s.rasterize(4, 4);
        for y in 0..4usize {
            assert!(mask[y * 4]);
            assert!(mask[y * 4 + 1]);
            assert!(!mask[y * 4 + 2]);
            assert!(!mask[y * 4 + 3]);
        }
    }

    #[test]
    fn test_translated() {
        let s = square(0.0, 0.0, 2.0).translated(3.0, -1.0);
        let b = s.bounds().unwrap();
        assert_relative_eq!(b.min_x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(b.min_y, -2.0, epsilon = 1e-12);
    }
}
