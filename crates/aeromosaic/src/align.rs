//! Sequence orchestration: drives correction passes over an ordered element
//! list.
//!
//! Corrections flow through [`PlacementDelta`], a pure transform folded over
//! the downstream slice `elements[i+1..]`, which keeps the propagation
//! invariant (every not-yet-processed element receives exactly the same
//! delta) mechanically checkable. Pair-level failures are logged and skipped;
//! the pass always finishes with a usable, at-worst-partially-corrected
//! sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::{AlignConfig, Strategy};
use crate::element::MapElement;
use crate::intersect::intersect;
use crate::refine::refine_pair;
use crate::register::estimate_motion;

// ── Error type ─────────────────────────────────────────────────────────────

/// Caller contract violations. No correction is meaningful below 2 elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignError {
    EmptySequence,
    SingleElement,
}

impl std::fmt::Display for AlignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySequence => write!(f, "element sequence is empty"),
            Self::SingleElement => write!(f, "element sequence has a single element"),
        }
    }
}

impl std::error::Error for AlignError {}

// ── Delta & report types ───────────────────────────────────────────────────

/// One pair's correction: a center shift plus a rotation increment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementDelta {
    pub shift: (f64, f64),
    pub rotation_deg: f64,
}

impl PlacementDelta {
    pub const IDENTITY: PlacementDelta = PlacementDelta {
        shift: (0.0, 0.0),
        rotation_deg: 0.0,
    };

    /// Fold this delta over every element of `downstream`.
    pub fn apply_to(&self, downstream: &mut [MapElement]) {
        for el in downstream {
            el.placement_mut().translate(self.shift.0, self.shift.1);
            el.placement_mut().rotate_by(self.rotation_deg);
        }
    }

    pub fn is_identity(&self) -> bool {
        self.shift == (0.0, 0.0) && self.rotation_deg == 0.0
    }
}

/// What happened to one adjacent pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PairOutcome {
    /// Affine registration succeeded; `delta` was folded downstream.
    /// `cross_angle_deg` is the diagnostic second angle of the motion matrix,
    /// computed but never applied.
    Registered {
        delta: PlacementDelta,
        correlation: f64,
        cross_angle_deg: f64,
        iterations: u32,
    },
    /// Randomized refinement picked a candidate; `delta` was folded
    /// downstream.
    Refined {
        delta: PlacementDelta,
        winner_index: usize,
        winner_score: f64,
    },
    /// The pair was left uncorrected.
    Skipped { reason: String },
}

/// Per-pair record of a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairRecord {
    /// `(i, i + 1)` sequence indices.
    pub indices: (usize, usize),
    pub outcome: PairOutcome,
}

/// Full account of one `Aligner::run`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PassReport {
    pub records: Vec<PairRecord>,
    /// True when a cancel flag stopped the run between pairs. Corrections
    /// applied before the stop remain valid.
    pub cancelled: bool,
}

// ── Aligner ────────────────────────────────────────────────────────────────

/// Owns the ordered element sequence and runs exactly one configured
/// correction strategy per mosaic build.
#[derive(Debug)]
pub struct Aligner {
    elements: Vec<MapElement>,
    config: AlignConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Aligner {
    /// Fails fast when the sequence is too short to correct.
    pub fn new(elements: Vec<MapElement>, config: AlignConfig) -> Result<Self, AlignError> {
        match elements.len() {
            0 => Err(AlignError::EmptySequence),
            1 => Err(AlignError::SingleElement),
            _ => Ok(Self {
                elements,
                config,
                cancel: None,
            }),
        }
    }

    /// Install a cancel flag polled between pairs (never mid-solver).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn elements(&self) -> &[MapElement] {
        &self.elements
    }

    /// Hand the corrected sequence to the compositing stage.
    pub fn into_elements(self) -> Vec<MapElement> {
        self.elements
    }

    /// Run the configured strategy once.
    pub fn run(&mut self) -> PassReport {
        let mut report = PassReport::default();
        match self.config.strategy {
            Strategy::Transformer => self.transformer_pass(&mut report),
            Strategy::Randomizer => self.randomizer_pass(&mut report),
            Strategy::TransformerThenRandomizer => {
                self.transformer_pass(&mut report);
                if !report.cancelled {
                    self.randomizer_pass(&mut report);
                }
            }
        }
        report
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Deterministic pass: affine registration per pair, cumulative
    /// propagation. Extraction runs at scale 1 so the estimated translation
    /// is already in placement units.
    fn transformer_pass(&mut self, report: &mut PassReport) {
        let n = self.elements.len();
        tracing::info!(pairs = n - 1, "transformer pass started");

        for i in 0..n - 1 {
            if self.is_cancelled() {
                tracing::info!(pair = i, "transformer pass cancelled");
                report.cancelled = true;
                return;
            }

            let crops = match intersect(&self.elements[i], &self.elements[i + 1], 1.0) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(pair = i, error = %e, "skipping pair: no usable overlap");
                    report.records.push(PairRecord {
                        indices: (i, i + 1),
                        outcome: PairOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let estimate = match estimate_motion(
                &crops.0,
                &crops.1,
                self.config.max_iterations,
                self.config.epsilon,
            ) {
                Ok(est) => est,
                Err(e) => {
                    tracing::warn!(pair = i, error = %e, "skipping pair: registration failed");
                    report.records.push(PairRecord {
                        indices: (i, i + 1),
                        outcome: PairOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let d = estimate.decompose();
            // The extractor maps world axes straight onto crop axes for both
            // elements, so the estimated translation is the downstream
            // element's misplacement in world units; negate both components to
            // undo it.
            let delta = PlacementDelta {
                shift: (-d.tx, -d.ty),
                rotation_deg: d.angle_deg,
            };
            delta.apply_to(&mut self.elements[i + 1..]);
            tracing::debug!(
                pair = i,
                dx = delta.shift.0,
                dy = delta.shift.1,
                angle = delta.rotation_deg,
                corr = estimate.correlation,
                "pair registered"
            );
            report.records.push(PairRecord {
                indices: (i, i + 1),
                outcome: PairOutcome::Registered {
                    delta,
                    correlation: estimate.correlation,
                    cross_angle_deg: d.cross_angle_deg,
                    iterations: estimate.iterations,
                },
            });
        }
        tracing::info!("transformer pass finished");
    }

    /// Stochastic pass: candidate search per pair, cumulative propagation.
    fn randomizer_pass(&mut self, report: &mut PassReport) {
        let n = self.elements.len();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tracing::info!(
            pairs = n - 1,
            quantity = self.config.quantity,
            "randomizer pass started"
        );

        for i in 0..n - 1 {
            if self.is_cancelled() {
                tracing::info!(pair = i, "randomizer pass cancelled");
                report.cancelled = true;
                return;
            }

            let outcome = refine_pair(
                &self.elements[i],
                &self.elements[i + 1],
                &self.config,
                &mut rng,
            );
            if outcome.n_scored == 0 {
                tracing::warn!(pair = i, "skipping pair: no scorable candidate");
                report.records.push(PairRecord {
                    indices: (i, i + 1),
                    outcome: PairOutcome::Skipped {
                        reason: "no candidate produced a scorable overlap".to_string(),
                    },
                });
                continue;
            }

            let delta = PlacementDelta {
                shift: outcome.shift,
                rotation_deg: 0.0,
            };
            delta.apply_to(&mut self.elements[i + 1..]);
            tracing::debug!(
                pair = i,
                dx = delta.shift.0,
                dy = delta.shift.1,
                winner = outcome.winner_index,
                "pair refined"
            );
            report.records.push(PairRecord {
                indices: (i, i + 1),
                outcome: PairOutcome::Refined {
                    delta,
                    winner_index: outcome.winner_index,
                    winner_score: outcome.winner_score,
                },
            });
        }
        tracing::info!("randomizer pass finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CandidateDistribution;
    use crate::geometry::{Point2D, RotatedRect};
    use crate::score::Comparator;
    use approx::assert_relative_eq;
    use image::{Rgba, RgbaImage};

    /// Smooth textured scene; broad features keep the registrar's basin wide.
    fn scene_pixel(x: f64, y: f64) -> u8 {
        let v = 120.0
            + 50.0 * (x / 16.0).sin()
            + 30.0 * (y / 19.0).cos()
            + 20.0 * ((x + y) / 23.0).sin();
        v.round().clamp(0.0, 255.0) as u8
    }

    /// Element imaging the scene at its true center, placed at
    /// `(true_cx + err_x, true_cy + err_y)`.
    fn scene_element(
        true_cx: f64,
        true_cy: f64,
        size: u32,
        err_x: f64,
        err_y: f64,
        idx: usize,
    ) -> MapElement {
        let half = size as f64 / 2.0;
        let img = RgbaImage::from_fn(size, size, |x, y| {
            let v = scene_pixel(true_cx - half + x as f64, true_cy - half + y as f64);
            Rgba([v, v, v, 255])
        });
        let rect = RotatedRect::new(
            Point2D::new(true_cx + err_x, true_cy + err_y),
            (size as f64, size as f64),
            0.0,
        );
        MapElement::new(img, rect, idx).unwrap()
    }

    fn transformer_config() -> AlignConfig {
        AlignConfig {
            strategy: Strategy::Transformer,
            max_iterations: 200,
            epsilon: 1e-7,
            ..AlignConfig::default()
        }
    }

    #[test]
    fn test_too_short_sequences_fail_fast() {
        assert_eq!(
            Aligner::new(Vec::new(), AlignConfig::default()).unwrap_err(),
            AlignError::EmptySequence
        );
        let single = vec![scene_element(32.0, 32.0, 64, 0.0, 0.0, 0)];
        assert_eq!(
            Aligner::new(single, AlignConfig::default()).unwrap_err(),
            AlignError::SingleElement
        );
    }

    #[test]
    fn test_delta_fold_applies_uniformly() {
        let mut els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 0.0, 0.0, 1),
            scene_element(96.0, 32.0, 64, 0.0, 0.0, 2),
        ];
        let before: Vec<_> = els.iter().map(|e| *e.placement()).collect();
        let delta = PlacementDelta {
            shift: (-3.0, 2.0),
            rotation_deg: 1.5,
        };
        delta.apply_to(&mut els[1..]);

        assert_eq!(els[0].placement(), &before[0]);
        for (el, prev) in els[1..].iter().zip(&before[1..]) {
            assert_relative_eq!(el.placement().center().x, prev.center().x - 3.0);
            assert_relative_eq!(el.placement().center().y, prev.center().y + 2.0);
            assert_relative_eq!(el.placement().angle_deg(), prev.angle_deg() + 1.5);
        }
    }

    #[test]
    fn test_transformer_corrects_misplaced_chain() {
        // Three elements in a line with 50% horizontal overlap; drift of
        // +10 px begins at element 1. The first pair's correction must pull
        // element 1 back and carry element 2 with it; the second pair then
        // absorbs element 2's remaining offset.
        let els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 10.0, 0.0, 1),
            scene_element(96.0, 32.0, 64, 10.0, 0.0, 2),
        ];
        let mut aligner = Aligner::new(els, transformer_config()).unwrap();
        let report = aligner.run();

        assert_eq!(report.records.len(), 2);
        let first = &report.records[0];
        match &first.outcome {
            PairOutcome::Registered { delta, .. } => {
                assert_relative_eq!(delta.shift.0, -10.0, epsilon = 1.0);
                assert_relative_eq!(delta.shift.1, 0.0, epsilon = 1.0);
                assert_relative_eq!(delta.rotation_deg, 0.0, epsilon = 0.5);
            }
            other => panic!("first pair not registered: {:?}", other),
        }

        let els = aligner.elements();
        assert_relative_eq!(els[0].placement().center().x, 32.0, epsilon = 1e-12);
        assert_relative_eq!(els[1].placement().center().x, 64.0, epsilon = 1.5);
        assert_relative_eq!(els[2].placement().center().x, 96.0, epsilon = 2.5);
        assert_relative_eq!(els[1].placement().center().y, 32.0, epsilon = 1.5);
    }

    #[test]
    fn test_transformer_corrects_vertical_misplacement() {
        // Element 1 drifts +8 px in y only; the correction must move it back
        // down, not double the error.
        let els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 0.0, 8.0, 1),
        ];
        let mut aligner = Aligner::new(els, transformer_config()).unwrap();
        let report = aligner.run();

        assert_eq!(report.records.len(), 1);
        match &report.records[0].outcome {
            PairOutcome::Registered { delta, .. } => {
                assert_relative_eq!(delta.shift.0, 0.0, epsilon = 1.0);
                assert_relative_eq!(delta.shift.1, -8.0, epsilon = 1.0);
            }
            other => panic!("pair not registered: {:?}", other),
        }
        let center = aligner.elements()[1].placement().center();
        assert_relative_eq!(center.x, 64.0, epsilon = 1.5);
        assert_relative_eq!(center.y, 32.0, epsilon = 1.5);
    }

    #[test]
    fn test_transformer_corrects_mixed_axis_misplacement() {
        let els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 6.0, -5.0, 1),
        ];
        let mut aligner = Aligner::new(els, transformer_config()).unwrap();
        let report = aligner.run();

        assert!(matches!(
            report.records[0].outcome,
            PairOutcome::Registered { .. }
        ));
        let center = aligner.elements()[1].placement().center();
        assert!(
            (center.x - 64.0).abs() < 2.0,
            "x error not reduced: {}",
            center.x
        );
        assert!(
            (center.y - 32.0).abs() < 2.0,
            "y error not reduced: {}",
            center.y
        );
    }

    #[test]
    fn test_zero_area_element_skips_without_crash() {
        let good0 = scene_element(32.0, 32.0, 64, 0.0, 0.0, 0);
        let broken = MapElement::new(
            RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])),
            RotatedRect::new(Point2D::new(64.0, 32.0), (0.0, 0.0), 0.0),
            1,
        )
        .unwrap();
        let good2 = scene_element(96.0, 32.0, 64, 0.0, 0.0, 2);

        let centers_before = [
            good0.placement().center(),
            broken.placement().center(),
            good2.placement().center(),
        ];
        let mut aligner =
            Aligner::new(vec![good0, broken, good2], transformer_config()).unwrap();
        let report = aligner.run();

        // Both pairs touch the zero-area element, so both are skipped and no
        // placement moves.
        assert_eq!(report.records.len(), 2);
        for record in &report.records {
            assert!(matches!(record.outcome, PairOutcome::Skipped { .. }));
        }
        for (el, before) in aligner.elements().iter().zip(&centers_before) {
            assert_eq!(el.placement().center(), *before);
        }
    }

    #[test]
    fn test_randomizer_does_not_degrade_and_reduces_error() {
        let els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 6.0, 0.0, 1),
        ];
        let config = AlignConfig {
            strategy: Strategy::Randomizer,
            spreading_range: 16.0,
            quantity: 48,
            distribution: CandidateDistribution::Uniform,
            comparator: Comparator::ManhattanNorm,
            seed: Some(42),
            ..AlignConfig::default()
        };
        let mut aligner = Aligner::new(els, config).unwrap();
        let report = aligner.run();

        assert_eq!(report.records.len(), 1);
        assert!(matches!(
            report.records[0].outcome,
            PairOutcome::Refined { .. }
        ));
        let err = (aligner.elements()[1].placement().center().x - 64.0).abs();
        assert!(err < 6.0, "error not reduced: {}", err);
    }

    #[test]
    fn test_cancel_flag_stops_between_pairs() {
        let els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 4.0, 0.0, 1),
            scene_element(96.0, 32.0, 64, 4.0, 0.0, 2),
        ];
        let centers_before: Vec<_> = els.iter().map(|e| e.placement().center()).collect();

        let flag = Arc::new(AtomicBool::new(true));
        let mut aligner = Aligner::new(els, transformer_config())
            .unwrap()
            .with_cancel_flag(flag);
        let report = aligner.run();

        assert!(report.cancelled);
        assert!(report.records.is_empty());
        for (el, before) in aligner.elements().iter().zip(&centers_before) {
            assert_eq!(el.placement().center(), *before);
        }
    }

    #[test]
    fn test_combined_strategy_runs_both_passes() {
        let els = vec![
            scene_element(32.0, 32.0, 64, 0.0, 0.0, 0),
            scene_element(64.0, 32.0, 64, 8.0, 0.0, 1),
        ];
        let config = AlignConfig {
            strategy: Strategy::TransformerThenRandomizer,
            max_iterations: 200,
            epsilon: 1e-7,
            spreading_range: 8.0,
            quantity: 16,
            seed: Some(3),
            ..AlignConfig::default()
        };
        let mut aligner = Aligner::new(els, config).unwrap();
        let report = aligner.run();

        // One record per pair per pass.
        assert_eq!(report.records.len(), 2);
        let err = (aligner.elements()[1].placement().center().x - 64.0).abs();
        assert!(err < 8.0);
    }
}
