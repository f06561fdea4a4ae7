//! aeromosaic — placement-registration engine for aerial photo mosaics.
//!
//! Takes a time-ordered sequence of overlapping photographs, each with an
//! initial georeferenced placement, and corrects placement drift between
//! neighbors by pixel-overlap analysis. The pipeline stages are:
//!
//! 1. **Geometry** – oriented-rectangle footprints and convex polygon
//!    intersection.
//! 2. **Intersection** – pixel-aligned, mask-cropped overlap buffers for a
//!    placed pair.
//! 3. **Scoring** – pluggable similarity comparators over overlap crops.
//! 4. **Registration** – iterative correlation-based Euclidean motion
//!    estimation.
//! 5. **Refinement** – randomized candidate search fallback.
//! 6. **Alignment** – sequential pass driver with cumulative downstream
//!    propagation.
//!
//! # Public API
//! [`Aligner`] plus [`AlignConfig`] are the entry points; [`MapElement`]
//! carries one photograph and its placement. Corrected placements are read
//! back from the aligner after a run. The engine has no file-format or
//! network surface of its own; decoding images and compositing the final
//! mosaic belong to the callers on either side.

mod align;
mod config;
mod element;
mod geometry;
mod intersect;
mod polygon;
mod refine;
mod register;
mod score;

pub use align::{
    AlignError, Aligner, PairOutcome, PairRecord, PassReport, PlacementDelta,
};
pub use config::{AlignConfig, CandidateDistribution, Strategy};
pub use element::{MapElement, PlacementError};
pub use geometry::{Bounds, Point2D, RotatedRect};
pub use intersect::{intersect, intersect_rects, GeometryError};
pub use polygon::Polygon;
pub use refine::RefineOutcome;
pub use register::{estimate_motion, MotionDecomposition, MotionEstimate, RegistrationError};
pub use score::{Comparator, Direction};
