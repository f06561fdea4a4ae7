//! Randomized placement refinement for one adjacent pair.
//!
//! Draws candidate centers for the trailing element, scores each overlap with
//! the configured comparator, and reports the smoothed integer shift of the
//! winner. Candidates are value-type placements; only the winning shift ever
//! touches the sequence. Candidate 0 is always the unperturbed center, and
//! ties resolve to the earliest candidate, so a pass can never make a pair
//! worse than it found it.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::{AlignConfig, CandidateDistribution};
use crate::element::MapElement;
use crate::geometry::Point2D;
use crate::intersect::intersect_rects;

/// Smoothing divisor applied to the winning shift before truncation. Damps
/// oscillation when successive pairs pull the chain in opposite directions.
const SHIFT_SMOOTHING: f64 = 2.0;

/// Outcome of refining one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOutcome {
    /// Integer pixel shift to fold over all downstream elements.
    pub shift: (f64, f64),
    /// Index of the winning candidate (0 = unperturbed center).
    pub winner_index: usize,
    /// Raw comparator score of the winner, `-inf` when every candidate failed
    /// geometry.
    pub winner_score: f64,
    /// Number of candidates whose overlap could be extracted and scored.
    pub n_scored: usize,
}

/// Search candidate centers for `b` against fixed `a`.
pub(crate) fn refine_pair(
    a: &MapElement,
    b: &MapElement,
    config: &AlignConfig,
    rng: &mut StdRng,
) -> RefineOutcome {
    let original = b.placement().center();
    let candidates = draw_candidates(original, config, rng);

    let mut winner_index = 0usize;
    let mut winner_ranked = f64::NEG_INFINITY;
    let mut winner_raw = f64::NEG_INFINITY;
    let mut n_scored = 0usize;

    for (i, &center) in candidates.iter().enumerate() {
        let mut rect = *b.placement();
        rect.set_center(center);

        // Geometry failures score -inf, i.e. they can never displace the
        // running winner. Strict comparison keeps the earliest candidate on
        // ties, so an all-tied field keeps the unperturbed placement.
        if let Ok((crop_a, crop_b)) =
            intersect_rects(a.image(), a.placement(), b.image(), &rect, config.scale)
        {
            n_scored += 1;
            let raw = config.comparator.score(&crop_a, &crop_b);
            let ranked = config.comparator.ranked(raw);
            if ranked > winner_ranked {
                winner_index = i;
                winner_ranked = ranked;
                winner_raw = raw;
            }
        }
    }

    let winner = candidates[winner_index];
    let shift = (
        ((winner.x - original.x) / SHIFT_SMOOTHING).trunc(),
        ((winner.y - original.y) / SHIFT_SMOOTHING).trunc(),
    );

    RefineOutcome {
        shift,
        winner_index,
        winner_score: winner_raw,
        n_scored,
    }
}

/// Candidate 0 is the unperturbed center; `quantity` more follow the
/// configured distribution.
fn draw_candidates(center: Point2D, config: &AlignConfig, rng: &mut StdRng) -> Vec<Point2D> {
    let half = (config.spreading_range / 2.0).max(0.0);
    let mut candidates = Vec::with_capacity(config.quantity as usize + 1);
    candidates.push(center);

    match config.distribution {
        CandidateDistribution::Uniform => {
            for _ in 0..config.quantity {
                candidates.push(Point2D::new(
                    center.x + rng.gen_range(-half..=half),
                    center.y + rng.gen_range(-half..=half),
                ));
            }
        }
        CandidateDistribution::Normal => {
            // sigma = spreading_range / 2. The sigma is finite and
            // non-negative by construction; if it were ever rejected the
            // search degenerates to the unperturbed center alone.
            if let Ok(normal) = Normal::new(0.0, half) {
                for _ in 0..config.quantity {
                    candidates.push(Point2D::new(
                        center.x + normal.sample(rng),
                        center.y + normal.sample(rng),
                    ));
                }
            }
        }
    }
    candidates
}
