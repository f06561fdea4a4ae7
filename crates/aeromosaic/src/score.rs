//! Similarity metrics over equally-shaped pixel buffers.
//!
//! Each comparator is a pure function bundled with its better-direction, so
//! call sites never have to guess whether a larger value means a better
//! match.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Hue × saturation bin counts for the 2D color histogram.
const HUE_BINS: usize = 50;
const SAT_BINS: usize = 60;

/// Structural-similarity comparison window (pixels).
const SSIM_WINDOW: u32 = 7;

// ── Comparator ─────────────────────────────────────────────────────────────

/// Which end of the score scale is the better match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    HigherWins,
    LowerWins,
}

/// A similarity metric plus its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Sum of absolute grayscale differences after per-image min–max
    /// normalization. 0 means identical up to normalization.
    ManhattanNorm,
    /// Count of pixels whose normalized grayscale values differ.
    ZeroNorm,
    /// Hue/saturation histogram intersection, each histogram min–max
    /// normalized to [0, 1].
    Histogram,
    /// Mean windowed structural similarity; 0 when either buffer is smaller
    /// than the comparison window.
    Ssim,
}

impl Comparator {
    pub fn direction(&self) -> Direction {
        match self {
            Self::ManhattanNorm | Self::ZeroNorm => Direction::LowerWins,
            Self::Histogram | Self::Ssim => Direction::HigherWins,
        }
    }

    /// Raw metric value. Buffers must have identical dimensions.
    pub fn score(&self, a: &RgbaImage, b: &RgbaImage) -> f64 {
        debug_assert_eq!(a.dimensions(), b.dimensions());
        match self {
            Self::ManhattanNorm => manhattan_norm(a, b),
            Self::ZeroNorm => zero_norm(a, b),
            Self::Histogram => histogram_intersection(a, b),
            Self::Ssim => ssim(a, b),
        }
    }

    /// Score mapped so that higher is always better, for argmax selection.
    pub fn ranked(&self, raw: f64) -> f64 {
        match self.direction() {
            Direction::HigherWins => raw,
            Direction::LowerWins => -raw,
        }
    }
}

// ── Grayscale helpers ──────────────────────────────────────────────────────

/// Rec.601 luma per pixel, row-major.
fn gray(img: &RgbaImage) -> Vec<f64> {
    img.pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .collect()
}

/// Min–max normalize to [0, 255] in place. A flat image maps to all zeros.
fn normalize(values: &mut [f64]) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in values.iter() {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let range = hi - lo;
    if range <= 0.0 {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - lo) / range * 255.0;
    }
}

fn normalized_gray(img: &RgbaImage) -> Vec<f64> {
    let mut g = gray(img);
    normalize(&mut g);
    g
}

// ── Metrics ────────────────────────────────────────────────────────────────

fn manhattan_norm(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let ga = normalized_gray(a);
    let gb = normalized_gray(b);
    ga.iter().zip(&gb).map(|(x, y)| (x - y).abs()).sum()
}

fn zero_norm(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let ga = normalized_gray(a);
    let gb = normalized_gray(b);
    ga.iter()
        .zip(&gb)
        .filter(|(x, y)| (x.round() - y.round()).abs() > 0.0)
        .count() as f64
}

/// 2D hue/saturation histogram of an image, min–max normalized to [0, 1].
fn hs_histogram(img: &RgbaImage) -> Vec<f64> {
    let mut hist = vec![0.0f64; HUE_BINS * SAT_BINS];
    for p in img.pixels() {
        let (h, s) = hue_saturation(p[0], p[1], p[2]);
        let hb = ((h / 360.0 * HUE_BINS as f64) as usize).min(HUE_BINS - 1);
        let sb = ((s * SAT_BINS as f64) as usize).min(SAT_BINS - 1);
        hist[hb * SAT_BINS + sb] += 1.0;
    }
    normalize(&mut hist);
    for v in hist.iter_mut() {
        *v /= 255.0;
    }
    hist
}

fn histogram_intersection(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let ha = hs_histogram(a);
    let hb = hs_histogram(b);
    ha.iter().zip(&hb).map(|(x, y)| x.min(*y)).sum()
}

/// Hue in [0, 360), saturation in [0, 1].
fn hue_saturation(r: u8, g: u8, b: u8) -> (f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max <= 0.0 { 0.0 } else { delta / max };
    (h, s)
}

/// Mean structural similarity over a sliding uniform window.
fn ssim(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let (w, h) = a.dimensions();
    if w < SSIM_WINDOW || h < SSIM_WINDOW {
        return 0.0;
    }
    let ga = gray(a);
    let gb = gray(b);
    let w = w as usize;
    let h = h as usize;
    let win = SSIM_WINDOW as usize;
    let n = (win * win) as f64;

    const C1: f64 = 6.5025; // (0.01 * 255)^2
    const C2: f64 = 58.5225; // (0.03 * 255)^2

    let mut total = 0.0;
    let mut windows = 0usize;
    for wy in 0..=(h - win) {
        for wx in 0..=(w - win) {
            let mut sum_a = 0.0;
            let mut sum_b = 0.0;
            let mut sum_aa = 0.0;
            let mut sum_bb = 0.0;
            let mut sum_ab = 0.0;
            for y in wy..wy + win {
                let row = y * w;
                for x in wx..wx + win {
                    let va = ga[row + x];
                    let vb = gb[row + x];
                    sum_a += va;
                    sum_b += vb;
                    sum_aa += va * va;
                    sum_bb += vb * vb;
                    sum_ab += va * vb;
                }
            }
            let mu_a = sum_a / n;
            let mu_b = sum_b / n;
            let var_a = sum_aa / n - mu_a * mu_a;
            let var_b = sum_bb / n - mu_b * mu_b;
            let cov = sum_ab / n - mu_a * mu_b;

            let s = ((2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2))
                / ((mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2));
            total += s;
            windows += 1;
        }
    }
    if windows == 0 {
        0.0
    } else {
        total / windows as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32, phase: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y + phase) % 2 == 0 {
                Rgba([220, 40, 40, 255])
            } else {
                Rgba([30, 30, 200, 255])
            }
        })
    }

    #[test]
    fn test_manhattan_zero_for_identical() {
        let a = checker(12, 12, 0);
        assert_eq!(Comparator::ManhattanNorm.score(&a, &a), 0.0);
    }

    #[test]
    fn test_manhattan_positive_for_different() {
        let a = checker(12, 12, 0);
        let b = checker(12, 12, 1);
        assert!(Comparator::ManhattanNorm.score(&a, &b) > 0.0);
    }

    #[test]
    fn test_zero_norm_counts_changed_pixels() {
        let a = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
        let mut b = a.clone();
        b.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        b.put_pixel(3, 3, Rgba([0, 0, 0, 255]));
        // a normalizes flat to zero; b has 2 outliers against 14 mid pixels.
        let n = Comparator::ZeroNorm.score(&a, &b);
        assert!(n >= 2.0);
        assert!(n <= 16.0);
    }

    #[test]
    fn test_histogram_self_intersection_is_maximal() {
        let a = checker(16, 16, 0);
        let b = RgbaImage::from_pixel(16, 16, Rgba([0, 255, 0, 255]));
        let self_score = Comparator::Histogram.score(&a, &a);
        let other_score = Comparator::Histogram.score(&a, &b);
        assert!(self_score > other_score);
    }

    #[test]
    fn test_ssim_identical_is_near_one() {
        let a = checker(16, 16, 0);
        let s = Comparator::Ssim.score(&a, &a);
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ssim_below_window_is_zero() {
        let a = checker(6, 16, 0);
        assert_eq!(Comparator::Ssim.score(&a, &a), 0.0);
    }

    #[test]
    fn test_directions() {
        assert_eq!(Comparator::ManhattanNorm.direction(), Direction::LowerWins);
        assert_eq!(Comparator::ZeroNorm.direction(), Direction::LowerWins);
        assert_eq!(Comparator::Histogram.direction(), Direction::HigherWins);
        assert_eq!(Comparator::Ssim.direction(), Direction::HigherWins);
    }

    #[test]
    fn test_ranked_flips_lower_wins() {
        assert_eq!(Comparator::ManhattanNorm.ranked(5.0), -5.0);
        assert_eq!(Comparator::Ssim.ranked(0.5), 0.5);
    }
}
