//! Correction-pass configuration.
//!
//! One explicit struct threaded through the orchestrator; there is no
//! module-level solver state anywhere in the engine.

use serde::{Deserialize, Serialize};

use crate::score::Comparator;

/// Which correction strategy (or sequence of strategies) a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Deterministic affine registration only.
    Transformer,
    /// Randomized candidate search only.
    Randomizer,
    /// Affine registration first, randomized refinement second.
    TransformerThenRandomizer,
}

/// Candidate-center distribution for the randomized refiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateDistribution {
    /// Uniform over `[center ± spreading_range / 2]` per axis.
    Uniform,
    /// Normal with standard deviation `spreading_range / 2` per axis.
    Normal,
}

/// Configuration for one correction pass over an element sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignConfig {
    pub strategy: Strategy,
    /// Uniform working-resolution scale applied to placements before overlap
    /// extraction. The primary cost lever together with `quantity`.
    pub scale: f64,
    /// Iteration cap for the affine registrar's solver.
    pub max_iterations: u32,
    /// Convergence threshold on correlation improvement for the affine
    /// registrar.
    pub epsilon: f64,
    /// Full width of the candidate search region around the current center.
    pub spreading_range: f64,
    /// Number of perturbed candidates per pair (the unperturbed center is
    /// always evaluated in addition).
    pub quantity: u32,
    pub distribution: CandidateDistribution,
    pub comparator: Comparator,
    /// Seed for the randomized refiner; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Transformer,
            scale: 1.0,
            max_iterations: 50,
            epsilon: 1e-4,
            spreading_range: 20.0,
            quantity: 32,
            distribution: CandidateDistribution::Uniform,
            comparator: Comparator::ManhattanNorm,
            seed: None,
        }
    }
}
