//! Shared geometry and result types for the template location engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// Axis-aligned rectangle in scene-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, rounded down. This is the pixel a tap or click lands on.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Which matcher produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMethod {
    #[serde(rename = "tm")]
    Correlation,
    #[serde(rename = "edges")]
    Edges,
    #[serde(rename = "orb")]
    Features,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Correlation => "tm",
            MatchMethod::Edges => "edges",
            MatchMethod::Features => "orb",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matcher selection requested by the caller.
///
/// `Tm`, `Edges` and `Orb` run a single matcher. `Hybrid` runs correlation
/// and edges and keeps the higher score. `Auto` additionally falls back to
/// the feature matcher when neither passes its confidence gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    Tm,
    Edges,
    Orb,
    Hybrid,
    #[default]
    Auto,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Tm => "tm",
            MatchStrategy::Edges => "edges",
            MatchStrategy::Orb => "orb",
            MatchStrategy::Hybrid => "hybrid",
            MatchStrategy::Auto => "auto",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tm" => Ok(MatchStrategy::Tm),
            "edges" => Ok(MatchStrategy::Edges),
            "orb" => Ok(MatchStrategy::Orb),
            "hybrid" => Ok(MatchStrategy::Hybrid),
            "auto" => Ok(MatchStrategy::Auto),
            other => Err(VisionError::invalid_config(format!(
                "unknown matcher strategy {other:?}"
            ))),
        }
    }
}

/// One located template instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub rect: Rect,
    /// Similarity in `[0, 1]`, comparable across attempts of the same method.
    pub score: f32,
    pub method: MatchMethod,
}

impl MatchCandidate {
    pub fn new(rect: Rect, score: f32, method: MatchMethod) -> Self {
        Self {
            rect,
            score,
            method,
        }
    }
}

/// Outcome of one search over a single frame.
///
/// `Abstained` means the matcher could not evaluate at all (every scale
/// skipped, too few keypoints, no homography); `NotFound` means every
/// configured matcher was tried and nothing usable came back. The split lets
/// a polling caller tell "keep waiting" apart from "this will never score".
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Found(MatchCandidate),
    Abstained,
    NotFound,
}

impl MatchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, MatchOutcome::Found(_))
    }

    pub fn candidate(&self) -> Option<&MatchCandidate> {
        match self {
            MatchOutcome::Found(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_candidate(self) -> Option<MatchCandidate> {
        match self {
            MatchOutcome::Found(c) => Some(c),
            _ => None,
        }
    }
}

/// Inclusive template scale interval walked by the multi-scale matchers.
///
/// Construction normalizes the bounds: swapped bounds are reordered and a
/// non-positive bound collapses the whole range to the identity scale, so a
/// bad pair degrades to plain single-scale matching instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct ScaleRange {
    low: f32,
    high: f32,
}

impl ScaleRange {
    pub fn new(a: f32, b: f32) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if low <= 0.0 || high <= 0.0 || !low.is_finite() || !high.is_finite() {
            return Self::unit();
        }
        Self { low, high }
    }

    /// The degenerate range holding only the identity scale.
    pub fn unit() -> Self {
        Self {
            low: 1.0,
            high: 1.0,
        }
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    /// Evenly spaced scales across the range. `steps` is clamped to at least
    /// one; a single step yields the lower bound.
    pub fn samples(&self, steps: u32) -> Vec<f32> {
        let steps = steps.max(1);
        if steps == 1 || self.low == self.high {
            return vec![self.low];
        }
        let spacing = (self.high - self.low) / (steps - 1) as f32;
        (0..steps).map(|i| self.low + spacing * i as f32).collect()
    }
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self::new(0.9, 1.1)
    }
}

impl From<[f32; 2]> for ScaleRange {
    fn from(pair: [f32; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<ScaleRange> for [f32; 2] {
    fn from(range: ScaleRange) -> Self {
        [range.low, range.high]
    }
}
