//! Edge-map matcher.
//!
//! Runs Canny over both images and correlates the binary maps with the same
//! multi-scale walk the intensity matcher uses. Contours survive theme and
//! fill changes that break intensity correlation, so this matcher holds up
//! when a button is re-skinned but keeps its outline. Featureless templates
//! produce an empty edge map and score near zero.
//!
//! Scaling happens on the template's edge map, not on the grayscale input;
//! re-running Canny per scale would shift contours with the resample.

use image::GrayImage;
use imageproc::edges::canny;

use super::correlation::{ScaleHit, best_scale_match};
use super::types::ScaleRange;

/// Hysteresis thresholds used when the caller does not override them.
pub const CANNY_LOW: f32 = 80.0;
pub const CANNY_HIGH: f32 = 180.0;

/// Multi-scale search over Canny edge maps.
///
/// `thresholds` must already be validated as `0 <= low <= high`.
pub fn search_edges(
    scene: &GrayImage,
    template: &GrayImage,
    range: ScaleRange,
    steps: u32,
    thresholds: (f32, f32),
) -> Option<ScaleHit> {
    let scene_edges = canny(scene, thresholds.0, thresholds.1);
    let template_edges = canny(template, thresholds.0, thresholds.1);
    best_scale_match(&scene_edges, &template_edges, range, steps)
}
