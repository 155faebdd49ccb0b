//! Template location engine.
//!
//! Three matchers with different failure modes, plus a selector that
//! combines them: multi-scale intensity correlation, the same walk over
//! Canny edge maps, and a keypoint matcher backed by a RANSAC homography.
//! All of them consume frames prepared by the [`preprocess`] pass.

pub mod correlation;
pub mod edges;
pub mod features;
pub mod homography;
pub mod preprocess;
pub mod selector;
pub mod types;

#[cfg(test)]
mod tests;

pub use correlation::{ScaleHit, search_correlation};
pub use edges::search_edges;
pub use features::{FeatureHit, search_features};
pub use selector::{
    AUTO_FALLBACK_GATE, DEFAULT_STEPS, EDGE_SCORE_CALIBRATION, MatchSettings, find_template,
};
pub use types::{MatchCandidate, MatchMethod, MatchOutcome, MatchStrategy, Rect, ScaleRange};
