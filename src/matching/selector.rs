//! Strategy selection over the individual matchers.
//!
//! `hybrid` runs the intensity and edge matchers and keeps the better
//! candidate. `auto` additionally falls back to the feature matcher when
//! neither correlation passes a confidence gate; edge scores run a little
//! low against intensity scores on the same content, so the comparison adds
//! a small calibration offset to the edge side. The offset influences only
//! the comparison and the gate; reported scores are always the raw ones.

use image::RgbaImage;

use super::correlation::{ScaleHit, best_scale_match};
use super::edges::{CANNY_HIGH, CANNY_LOW, search_edges};
use super::features::search_features;
use super::preprocess;
use super::types::{MatchCandidate, MatchMethod, MatchOutcome, MatchStrategy, ScaleRange};
use crate::error::{VisionError, VisionResult};

/// Minimum confidence `auto` demands of a correlation result before it
/// stops trusting correlation and consults the feature matcher.
pub const AUTO_FALLBACK_GATE: f32 = 0.55;

/// Offset added to edge scores when comparing them against intensity
/// scores, compensating their systematically lower ceiling.
pub const EDGE_SCORE_CALIBRATION: f32 = 0.04;

/// Scale samples per search unless overridden.
pub const DEFAULT_STEPS: u32 = 9;

/// Everything a single-frame search needs besides the two images.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub strategy: MatchStrategy,
    pub scale_range: ScaleRange,
    pub steps: u32,
    /// Canny hysteresis thresholds, `low <= high`.
    pub canny_thresholds: (f32, f32),
    pub use_clahe: bool,
    /// The caller's acceptance threshold. Only `auto` consults it, to raise
    /// its fallback gate; no strategy filters its own result by it.
    pub threshold: f32,
    pub auto_gate: f32,
    pub edge_calibration: f32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::Auto,
            scale_range: ScaleRange::default(),
            steps: DEFAULT_STEPS,
            canny_thresholds: (CANNY_LOW, CANNY_HIGH),
            use_clahe: true,
            threshold: 0.0,
            auto_gate: AUTO_FALLBACK_GATE,
            edge_calibration: EDGE_SCORE_CALIBRATION,
        }
    }
}

impl MatchSettings {
    /// Rejects parameter combinations the matchers cannot run with.
    pub fn validate(&self) -> VisionResult<()> {
        let (low, high) = self.canny_thresholds;
        if !low.is_finite() || !high.is_finite() || low < 0.0 || low > high {
            return Err(VisionError::invalid_config(format!(
                "canny thresholds must satisfy 0 <= low <= high, got ({low}, {high})"
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(VisionError::invalid_config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.auto_gate) {
            return Err(VisionError::invalid_config(format!(
                "auto gate must be within [0, 1], got {}",
                self.auto_gate
            )));
        }
        if !self.edge_calibration.is_finite() || self.edge_calibration < 0.0 {
            return Err(VisionError::invalid_config(format!(
                "edge calibration must be a non-negative number, got {}",
                self.edge_calibration
            )));
        }
        Ok(())
    }
}

/// Searches one frame for one template under the configured strategy.
///
/// Returns `Found` with the best candidate the strategy produced, even when
/// its score is poor; thresholding is the caller's decision. `Abstained`
/// and `NotFound` carry no candidate, see [`MatchOutcome`].
pub fn find_template(
    scene: &RgbaImage,
    template: &RgbaImage,
    settings: &MatchSettings,
) -> VisionResult<MatchOutcome> {
    settings.validate()?;
    let scene_gray = preprocess::prepare(scene, settings.use_clahe)?;
    let template_gray = preprocess::prepare(template, settings.use_clahe)?;

    let outcome = match settings.strategy {
        MatchStrategy::Tm => single(
            best_scale_match(
                &scene_gray,
                &template_gray,
                settings.scale_range,
                settings.steps,
            ),
            MatchMethod::Correlation,
        ),
        MatchStrategy::Edges => single(
            search_edges(
                &scene_gray,
                &template_gray,
                settings.scale_range,
                settings.steps,
                settings.canny_thresholds,
            ),
            MatchMethod::Edges,
        ),
        MatchStrategy::Orb => match search_features(&scene_gray, &template_gray) {
            Some(hit) => MatchOutcome::Found(MatchCandidate::new(
                hit.rect,
                hit.score,
                MatchMethod::Features,
            )),
            None => MatchOutcome::Abstained,
        },
        MatchStrategy::Hybrid => hybrid(&scene_gray, &template_gray, settings),
        MatchStrategy::Auto => auto(&scene_gray, &template_gray, settings),
    };

    match &outcome {
        MatchOutcome::Found(c) => log::debug!(
            "{} candidate at ({}, {}) {}x{} score {:.3}",
            c.method,
            c.rect.x,
            c.rect.y,
            c.rect.width,
            c.rect.height,
            c.score
        ),
        MatchOutcome::Abstained => log::debug!("{} abstained", settings.strategy),
        MatchOutcome::NotFound => log::debug!("{} found nothing", settings.strategy),
    }
    Ok(outcome)
}

fn candidate(hit: ScaleHit, method: MatchMethod) -> MatchCandidate {
    MatchCandidate::new(hit.rect, hit.score, method)
}

fn single(hit: Option<ScaleHit>, method: MatchMethod) -> MatchOutcome {
    match hit {
        Some(h) => MatchOutcome::Found(candidate(h, method)),
        None => MatchOutcome::Abstained,
    }
}

/// Higher raw score wins; an exact tie goes to the edge result.
fn better_of(by_intensity: ScaleHit, by_edges: ScaleHit) -> MatchCandidate {
    if by_edges.score >= by_intensity.score {
        candidate(by_edges, MatchMethod::Edges)
    } else {
        candidate(by_intensity, MatchMethod::Correlation)
    }
}

/// Runs both correlations and keeps the better candidate. Edge results win
/// ties: when both matchers agree on confidence the contour evidence is the
/// more specific of the two.
fn hybrid(
    scene: &image::GrayImage,
    template: &image::GrayImage,
    settings: &MatchSettings,
) -> MatchOutcome {
    let by_intensity = best_scale_match(scene, template, settings.scale_range, settings.steps);
    let by_edges = search_edges(
        scene,
        template,
        settings.scale_range,
        settings.steps,
        settings.canny_thresholds,
    );
    match (by_intensity, by_edges) {
        (Some(tm), Some(ed)) => MatchOutcome::Found(better_of(tm, ed)),
        (Some(tm), None) => MatchOutcome::Found(candidate(tm, MatchMethod::Correlation)),
        (None, Some(ed)) => MatchOutcome::Found(candidate(ed, MatchMethod::Edges)),
        (None, None) => MatchOutcome::Abstained,
    }
}

/// Correlation first, feature fallback second.
///
/// The gate is the caller's threshold or [`AUTO_FALLBACK_GATE`], whichever
/// is higher: a correlation result too weak to ever be accepted is not
/// worth returning when the feature matcher might still localize the
/// template.
fn auto(
    scene: &image::GrayImage,
    template: &image::GrayImage,
    settings: &MatchSettings,
) -> MatchOutcome {
    let by_intensity = best_scale_match(scene, template, settings.scale_range, settings.steps);
    let by_edges = search_edges(
        scene,
        template,
        settings.scale_range,
        settings.steps,
        settings.canny_thresholds,
    );
    let gate = settings.threshold.max(settings.auto_gate);

    if let Some(c) = correlation_winner(by_intensity, by_edges, gate, settings.edge_calibration) {
        return MatchOutcome::Found(c);
    }

    log::debug!(
        "correlation gate missed (tm {:.3}, edges {:.3} calibrated, gate {:.2}); trying features",
        by_intensity.map_or(0.0, |h| h.score),
        calibrate_edge_score(by_edges.map_or(0.0, |h| h.score), settings.edge_calibration),
        gate
    );
    match search_features(scene, template) {
        Some(hit) => MatchOutcome::Found(MatchCandidate::new(
            hit.rect,
            hit.score,
            MatchMethod::Features,
        )),
        None => MatchOutcome::NotFound,
    }
}

/// Calibrated edge confidence: the raw score plus the bonus, capped at 1.0.
fn calibrate_edge_score(score: f32, bonus: f32) -> f32 {
    (score + bonus).min(1.0)
}

/// Compares the two correlation results under the calibrated edge score.
///
/// `None` when neither side reaches the gate or the winning side produced no
/// hit. The calibration influences only the comparison and the gate; the
/// returned candidate always carries its raw score.
fn correlation_winner(
    by_intensity: Option<ScaleHit>,
    by_edges: Option<ScaleHit>,
    gate: f32,
    edge_calibration: f32,
) -> Option<MatchCandidate> {
    let tm_score = by_intensity.map_or(0.0, |h| h.score);
    let edge_calibrated =
        calibrate_edge_score(by_edges.map_or(0.0, |h| h.score), edge_calibration);
    if tm_score.max(edge_calibrated) < gate {
        return None;
    }
    if edge_calibrated >= tm_score {
        by_edges.map(|h| candidate(h, MatchMethod::Edges))
    } else {
        by_intensity.map(|h| candidate(h, MatchMethod::Correlation))
    }
}
