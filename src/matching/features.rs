//! Scale- and rotation-tolerant feature matcher.
//!
//! The correlation matchers degrade quickly once a widget is redrawn at an
//! unexpected size or slightly rotated. This matcher detects FAST corners
//! over an image pyramid, describes each with a rotation-steered 256-bit
//! binary test pattern, matches descriptors by Hamming distance with a
//! ratio check, and fits a template-to-scene homography over the surviving
//! pairs. The projected template outline, clipped to the scene, becomes the
//! reported rectangle.
//!
//! Every gate failure is an abstention (`None`), never an error: a template
//! without texture simply cannot be matched this way.

use std::sync::OnceLock;

use image::GrayImage;
use image::imageops::FilterType;
use imageproc::corners::corners_fast9;
use nalgebra::Matrix3;

use super::homography::{self, RansacParams};
use super::types::Rect;

/// Keypoint budget over the whole pyramid, strongest corners first.
pub const MAX_FEATURES: usize = 700;
/// Pyramid depth and per-level downscale factor.
pub const PYRAMID_LEVELS: usize = 8;
pub const PYRAMID_SCALE: f32 = 1.2;
/// FAST-9 intensity threshold.
pub const FAST_THRESHOLD: u8 = 20;
/// Both images must yield at least this many keypoints.
pub const MIN_KEYPOINTS: usize = 6;
/// Ratio-test survivors required before a homography is attempted.
pub const MIN_RATIO_MATCHES: usize = 8;
/// Best-to-second-best Hamming distance ratio for an unambiguous match.
pub const LOWE_RATIO: f32 = 0.75;
/// Inlier count that maps to a full score of 1.0.
pub const INLIER_SCORE_DIVISOR: f32 = 40.0;

/// Margin keeping the orientation patch (radius 15) and the rotated test
/// offsets (radius 11, up to 16 after rotation) inside the level image.
const PATCH_BORDER: u32 = 16;
const ORIENTATION_RADIUS: i32 = 15;
const DESCRIPTOR_RADIUS: i8 = 11;
const DESCRIPTOR_BITS: usize = 256;
const PATTERN_SEED: u64 = 0x51DE_CA57;

/// Smallest level side that still fits one descriptor patch.
const MIN_LEVEL_SIDE: u32 = 2 * PATCH_BORDER + 1;

/// Result of a feature search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureHit {
    pub rect: Rect,
    pub score: f32,
    pub inliers: usize,
}

#[derive(Debug, Clone)]
struct Feature {
    /// Full-resolution coordinates, regardless of detection level.
    point: [f64; 2],
    descriptor: [u64; 4],
}

struct PyramidLevel {
    image: GrayImage,
    /// Multiplier from level coordinates back to full resolution.
    scale: f32,
}

/// Locates the template in the scene by keypoint consensus.
///
/// `None` means the matcher abstained: too little texture, too few
/// unambiguous matches, no homography, or a projection entirely outside
/// the scene.
pub fn search_features(scene: &GrayImage, template: &GrayImage) -> Option<FeatureHit> {
    let template_feats = extract_features(template);
    let scene_feats = extract_features(scene);
    if template_feats.len() < MIN_KEYPOINTS || scene_feats.len() < MIN_KEYPOINTS {
        log::debug!(
            "feature matcher abstains: {} template / {} scene keypoints",
            template_feats.len(),
            scene_feats.len()
        );
        return None;
    }

    let pairs = ratio_matches(&template_feats, &scene_feats);
    if pairs.len() < MIN_RATIO_MATCHES {
        log::debug!("feature matcher abstains: {} ratio-test survivors", pairs.len());
        return None;
    }

    let src: Vec<[f64; 2]> = pairs.iter().map(|&(t, _)| template_feats[t].point).collect();
    let dst: Vec<[f64; 2]> = pairs.iter().map(|&(_, s)| scene_feats[s].point).collect();
    let fit = homography::fit(&src, &dst, &RansacParams::default())?;

    let rect = project_outline(&fit.matrix, template.dimensions(), scene.dimensions())?;
    let score = (fit.inliers as f32 / INLIER_SCORE_DIVISOR).clamp(0.0, 1.0);
    Some(FeatureHit {
        rect,
        score,
        inliers: fit.inliers,
    })
}

/// Detects, orients and describes up to [`MAX_FEATURES`] keypoints.
fn extract_features(gray: &GrayImage) -> Vec<Feature> {
    let levels = build_pyramid(gray);

    let mut candidates: Vec<(usize, imageproc::corners::Corner)> = Vec::new();
    for (li, level) in levels.iter().enumerate() {
        for corner in corners_fast9(&level.image, FAST_THRESHOLD) {
            if in_patch_bounds(&level.image, corner.x, corner.y) {
                candidates.push((li, corner));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(MAX_FEATURES);

    let pattern = sampling_pattern();
    candidates
        .iter()
        .map(|&(li, ref corner)| {
            let level = &levels[li];
            let angle = orientation(&level.image, corner.x, corner.y);
            let descriptor = describe(&level.image, corner.x, corner.y, angle, pattern);
            Feature {
                point: [
                    corner.x as f64 * level.scale as f64,
                    corner.y as f64 * level.scale as f64,
                ],
                descriptor,
            }
        })
        .collect()
}

fn build_pyramid(gray: &GrayImage) -> Vec<PyramidLevel> {
    let mut levels = Vec::with_capacity(PYRAMID_LEVELS);
    for i in 0..PYRAMID_LEVELS {
        let scale = PYRAMID_SCALE.powi(i as i32);
        let width = (gray.width() as f32 / scale).round() as u32;
        let height = (gray.height() as f32 / scale).round() as u32;
        if width < MIN_LEVEL_SIDE || height < MIN_LEVEL_SIDE {
            break;
        }
        let image = if i == 0 {
            gray.clone()
        } else {
            image::imageops::resize(gray, width, height, FilterType::Triangle)
        };
        levels.push(PyramidLevel { image, scale });
    }
    levels
}

fn in_patch_bounds(image: &GrayImage, x: u32, y: u32) -> bool {
    x >= PATCH_BORDER
        && y >= PATCH_BORDER
        && x + PATCH_BORDER < image.width()
        && y + PATCH_BORDER < image.height()
}

/// Intensity-centroid orientation over a circular patch.
fn orientation(image: &GrayImage, cx: u32, cy: u32) -> f32 {
    let mut m10 = 0.0f32;
    let mut m01 = 0.0f32;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                continue;
            }
            let v = image.get_pixel((cx as i32 + dx) as u32, (cy as i32 + dy) as u32)[0] as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

/// The fixed set of point-pair intensity tests. Generated once from a fixed
/// seed so descriptors stay comparable across processes.
fn sampling_pattern() -> &'static [(i8, i8, i8, i8)] {
    static PATTERN: OnceLock<Vec<(i8, i8, i8, i8)>> = OnceLock::new();
    PATTERN.get_or_init(|| {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(PATTERN_SEED);
        let mut pick = move || rng.gen_range(-DESCRIPTOR_RADIUS..=DESCRIPTOR_RADIUS);
        (0..DESCRIPTOR_BITS)
            .map(|_| (pick(), pick(), pick(), pick()))
            .collect()
    })
}

/// 256 binary tests on the patch, steered by the keypoint orientation.
fn describe(
    image: &GrayImage,
    cx: u32,
    cy: u32,
    angle: f32,
    pattern: &[(i8, i8, i8, i8)],
) -> [u64; 4] {
    let (sin, cos) = angle.sin_cos();
    let mut bits = [0u64; 4];
    for (i, &(px, py, qx, qy)) in pattern.iter().enumerate() {
        let p = steered_sample(image, cx, cy, px, py, sin, cos);
        let q = steered_sample(image, cx, cy, qx, qy, sin, cos);
        if p < q {
            bits[i / 64] |= 1u64 << (i % 64);
        }
    }
    bits
}

fn steered_sample(image: &GrayImage, cx: u32, cy: u32, dx: i8, dy: i8, sin: f32, cos: f32) -> u8 {
    let rx = (cos * dx as f32 - sin * dy as f32).round() as i32;
    let ry = (sin * dx as f32 + cos * dy as f32).round() as i32;
    image.get_pixel((cx as i32 + rx) as u32, (cy as i32 + ry) as u32)[0]
}

fn hamming(a: &[u64; 4], b: &[u64; 4]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force nearest-neighbor matching with the two-distance ratio check.
fn ratio_matches(template: &[Feature], scene: &[Feature]) -> Vec<(usize, usize)> {
    let mut matches = Vec::new();
    for (ti, t) in template.iter().enumerate() {
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        let mut best_si = 0usize;
        for (si, s) in scene.iter().enumerate() {
            let d = hamming(&t.descriptor, &s.descriptor);
            if d < best {
                second = best;
                best = d;
                best_si = si;
            } else if d < second {
                second = d;
            }
        }
        if second != u32::MAX && (best as f32) < LOWE_RATIO * second as f32 {
            matches.push((ti, best_si));
        }
    }
    matches
}

/// Projects the template outline into the scene and returns its axis-aligned
/// bounds clipped to the scene. `None` when the projection collapses or
/// lands entirely outside.
fn project_outline(
    h: &Matrix3<f64>,
    (tw, th): (u32, u32),
    (sw, sh): (u32, u32),
) -> Option<Rect> {
    let corners = [
        [0.0, 0.0],
        [tw as f64, 0.0],
        [tw as f64, th as f64],
        [0.0, th as f64],
    ];
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for corner in corners {
        let [x, y] = homography::project(h, corner);
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    let x0 = (min_x.round() as i64).clamp(0, sw as i64);
    let x1 = (max_x.round() as i64).clamp(0, sw as i64);
    let y0 = (min_y.round() as i64).clamp(0, sh as i64);
    let y1 = (max_y.round() as i64).clamp(0, sh as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImage, Luma};

    fn noise(x: u32, y: u32, salt: u32) -> u8 {
        let mut h = x
            .wrapping_mul(0x9E37_79B1)
            .wrapping_add(y.wrapping_mul(0x85EB_CA77))
            .wrapping_add(salt.wrapping_mul(0xC2B2_AE3D));
        h ^= h >> 15;
        (h.wrapping_mul(0x27D4_EB2F) >> 24) as u8
    }

    fn noise_image(width: u32, height: u32, salt: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([noise(x, y, salt)]))
    }

    #[test]
    fn extraction_respects_the_keypoint_budget() {
        let busy = noise_image(240, 180, 5);
        let feats = extract_features(&busy);
        assert!(!feats.is_empty());
        assert!(feats.len() <= MAX_FEATURES);
    }

    #[test]
    fn extraction_finds_nothing_on_flat_input() {
        let flat = GrayImage::from_pixel(120, 120, Luma([77]));
        assert!(extract_features(&flat).is_empty());
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let zero = [0u64; 4];
        let ones = [u64::MAX; 4];
        assert_eq!(hamming(&zero, &zero), 0);
        assert_eq!(hamming(&zero, &ones), 256);
        assert_eq!(hamming(&[1, 0, 0, 0], &zero), 1);
    }

    #[test]
    fn locates_pasted_patch() {
        let patch = noise_image(100, 100, 9);
        let mut scene = GrayImage::from_pixel(320, 240, Luma([80]));
        scene.copy_from(&patch, 140, 90).unwrap();

        let hit = search_features(&scene, &patch).expect("patch should be found");
        assert!(
            (hit.rect.x as i64 - 140).abs() <= 4 && (hit.rect.y as i64 - 90).abs() <= 4,
            "rect {:?}",
            hit.rect
        );
        assert!(
            (hit.rect.width as i64 - 100).abs() <= 8 && (hit.rect.height as i64 - 100).abs() <= 8,
            "rect {:?}",
            hit.rect
        );
        assert!(hit.score >= 0.5, "score {}", hit.score);
        assert!(hit.inliers >= MIN_RATIO_MATCHES);
    }

    #[test]
    fn abstains_on_low_texture_template() {
        let scene = noise_image(200, 150, 3);
        let flat = GrayImage::from_pixel(60, 60, Luma([90]));
        assert!(search_features(&scene, &flat).is_none());
    }

    #[test]
    fn abstains_when_content_is_unrelated() {
        let scene = noise_image(320, 240, 1);
        let template = noise_image(80, 80, 2);
        assert!(search_features(&scene, &template).is_none());
    }

    #[test]
    fn projection_outside_the_scene_is_rejected() {
        // Pure translation landing past the right edge.
        let h = Matrix3::new(1.0, 0.0, 500.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(project_outline(&h, (50, 50), (400, 300)).is_none());
    }

    #[test]
    fn projection_clips_to_scene_bounds() {
        let h = Matrix3::new(1.0, 0.0, -20.0, 0.0, 1.0, 10.0, 0.0, 0.0, 1.0);
        let rect = project_outline(&h, (50, 40), (400, 300)).unwrap();
        assert_eq!(rect, Rect::new(0, 10, 30, 40));
    }
}
