//! Selector-level tests over synthetic frames.
//!
//! These exercise `find_template` end to end: preparation, the scale walk,
//! strategy arbitration and the feature fallback. Matcher internals are
//! covered next to their own modules.

use image::imageops::FilterType;
use image::{GenericImage, Rgba, RgbaImage};

use super::correlation::search_correlation;
use super::edges::search_edges;
use super::features::search_features;
use super::preprocess;
use super::selector::{MatchSettings, find_template};
use super::types::{MatchMethod, MatchOutcome, MatchStrategy, Rect, ScaleRange};
use crate::error::VisionError;

fn noise(x: u32, y: u32, salt: u32) -> u8 {
    let mut h = x
        .wrapping_mul(0x9E37_79B1)
        .wrapping_add(y.wrapping_mul(0x85EB_CA77))
        .wrapping_add(salt.wrapping_mul(0xC2B2_AE3D));
    h ^= h >> 15;
    (h.wrapping_mul(0x27D4_EB2F) >> 24) as u8
}

/// Gray noise carried in all three channels, so grayscale conversion is the
/// identity and resampling commutes with it.
fn noise_rgba(width: u32, height: u32, salt: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = noise(x, y, salt);
        Rgba([v, v, v, 255])
    })
}

fn settings(strategy: MatchStrategy) -> MatchSettings {
    MatchSettings {
        strategy,
        use_clahe: false,
        ..MatchSettings::default()
    }
}

/// 800x600 frame with a 90%-scaled 50x50 icon at (120, 200).
fn icon_scene() -> (RgbaImage, RgbaImage, u32) {
    let icon = noise_rgba(50, 50, 21);
    let scale = ScaleRange::new(0.8, 1.2).samples(9)[2];
    let side = ((50.0 * scale) as u32).max(1);
    let shrunk = image::imageops::resize(&icon, side, side, FilterType::Lanczos3);
    let mut scene = RgbaImage::from_pixel(800, 600, Rgba([40, 40, 40, 255]));
    scene.copy_from(&shrunk, 120, 200).unwrap();
    (scene, icon, side)
}

/// Dark frame with one bright block; its crop, inverted, defeats intensity
/// correlation but keeps the contour.
fn block_scene_and_inverted_crop() -> (RgbaImage, RgbaImage) {
    let mut scene = RgbaImage::from_pixel(100, 70, Rgba([20, 20, 20, 255]));
    let block = RgbaImage::from_pixel(16, 10, Rgba([210, 210, 210, 255]));
    scene.copy_from(&block, 40, 30).unwrap();
    let crop = image::imageops::crop_imm(&scene, 32, 24, 32, 22).to_image();
    let inverted = RgbaImage::from_fn(crop.width(), crop.height(), |x, y| {
        let p = crop.get_pixel(x, y);
        Rgba([255 - p[0], 255 - p[1], 255 - p[2], 255])
    });
    (scene, inverted)
}

#[test]
fn correlation_strategy_locates_scaled_icon() {
    let (scene, icon, side) = icon_scene();
    let config = MatchSettings {
        scale_range: ScaleRange::new(0.8, 1.2),
        ..settings(MatchStrategy::Tm)
    };
    let outcome = find_template(&scene, &icon, &config).unwrap();
    let c = outcome.candidate().expect("icon should be found");
    assert_eq!(c.method, MatchMethod::Correlation);
    assert_eq!(c.rect, Rect::new(120, 200, side, side));
    assert!(c.score > 0.95, "score {}", c.score);
}

#[test]
fn equalization_keeps_the_icon_findable() {
    let (scene, icon, side) = icon_scene();
    let config = MatchSettings {
        scale_range: ScaleRange::new(0.8, 1.2),
        use_clahe: true,
        ..settings(MatchStrategy::Tm)
    };
    let outcome = find_template(&scene, &icon, &config).unwrap();
    let c = outcome.candidate().expect("icon should be found");
    assert!(
        (c.rect.x as i64 - 120).abs() <= 2 && (c.rect.y as i64 - 200).abs() <= 2,
        "rect {:?}",
        c.rect
    );
    assert_eq!((c.rect.width, c.rect.height), (side, side));
    assert!(c.score > 0.75, "score {}", c.score);
}

#[test]
fn hybrid_prefers_edges_when_intensity_inverts() {
    let (scene, inverted) = block_scene_and_inverted_crop();
    let outcome = find_template(&scene, &inverted, &settings(MatchStrategy::Hybrid)).unwrap();
    let c = outcome.candidate().expect("contour should be found");
    assert_eq!(c.method, MatchMethod::Edges);
    assert_eq!((c.rect.x, c.rect.y), (32, 24));
    assert!(c.score > 0.9, "score {}", c.score);
}

#[test]
fn hybrid_abstains_when_template_never_fits() {
    let scene = noise_rgba(40, 40, 4);
    let template = noise_rgba(100, 100, 4);
    let outcome = find_template(&scene, &template, &settings(MatchStrategy::Hybrid)).unwrap();
    assert_eq!(outcome, MatchOutcome::Abstained);
}

#[test]
fn auto_reports_the_uncalibrated_edge_score() {
    let (scene, inverted) = block_scene_and_inverted_crop();
    let config = MatchSettings {
        threshold: 0.8,
        ..settings(MatchStrategy::Auto)
    };
    let outcome = find_template(&scene, &inverted, &config).unwrap();
    let c = outcome.candidate().expect("contour should be found");
    assert_eq!(c.method, MatchMethod::Edges);

    let scene_gray = preprocess::prepare(&scene, false).unwrap();
    let template_gray = preprocess::prepare(&inverted, false).unwrap();
    let direct = search_edges(
        &scene_gray,
        &template_gray,
        config.scale_range,
        config.steps,
        config.canny_thresholds,
    )
    .unwrap();
    assert!(
        (c.score - direct.score).abs() < 1e-6,
        "calibration leaked into the reported score: {} vs {}",
        c.score,
        direct.score
    );
}

#[test]
fn auto_falls_back_to_features_when_correlation_cannot_fit() {
    let patch = noise_rgba(100, 100, 9);
    let mut scene = RgbaImage::from_pixel(320, 240, Rgba([80, 80, 80, 255]));
    scene.copy_from(&patch, 140, 90).unwrap();

    // Every scale in this range exceeds the frame, so both correlations
    // abstain and the feature matcher decides.
    let config = MatchSettings {
        scale_range: ScaleRange::new(3.0, 3.5),
        ..settings(MatchStrategy::Auto)
    };
    let outcome = find_template(&scene, &patch, &config).unwrap();
    let c = outcome.candidate().expect("feature fallback should locate the patch");
    assert_eq!(c.method, MatchMethod::Features);
    assert!(
        (c.rect.x as i64 - 140).abs() <= 4 && (c.rect.y as i64 - 90).abs() <= 4,
        "rect {:?}",
        c.rect
    );
    assert!(c.score >= 0.5, "score {}", c.score);
}

#[test]
fn auto_gives_up_on_unrelated_content() {
    let scene = noise_rgba(320, 240, 1);
    let template = noise_rgba(64, 64, 2);

    let scene_gray = preprocess::prepare(&scene, false).unwrap();
    let template_gray = preprocess::prepare(&template, false).unwrap();
    let by_intensity =
        search_correlation(&scene_gray, &template_gray, ScaleRange::unit(), 1).unwrap();
    assert!(by_intensity.score < 0.5, "tm score {}", by_intensity.score);
    let by_edges = search_edges(
        &scene_gray,
        &template_gray,
        ScaleRange::unit(),
        1,
        (80.0, 180.0),
    )
    .unwrap();
    assert!(by_edges.score < 0.5, "edge score {}", by_edges.score);
    assert!(search_features(&scene_gray, &template_gray).is_none());

    let outcome = find_template(&scene, &template, &settings(MatchStrategy::Auto)).unwrap();
    assert_eq!(outcome, MatchOutcome::NotFound);
}

#[test]
fn invalid_settings_are_rejected_up_front() {
    let scene = noise_rgba(32, 32, 1);
    let template = noise_rgba(8, 8, 1);

    let swapped_canny = MatchSettings {
        canny_thresholds: (300.0, 100.0),
        ..MatchSettings::default()
    };
    assert!(matches!(
        find_template(&scene, &template, &swapped_canny),
        Err(VisionError::InvalidConfig { .. })
    ));

    let bad_threshold = MatchSettings {
        threshold: 1.5,
        ..MatchSettings::default()
    };
    assert!(matches!(
        find_template(&scene, &template, &bad_threshold),
        Err(VisionError::InvalidConfig { .. })
    ));
}

#[test]
fn empty_images_are_rejected() {
    let empty = RgbaImage::new(0, 0);
    let template = noise_rgba(8, 8, 1);
    assert!(matches!(
        find_template(&empty, &template, &MatchSettings::default()),
        Err(VisionError::InvalidImage { .. })
    ));
}

#[test]
fn repeated_searches_agree() {
    let (scene, icon, _) = icon_scene();
    let config = MatchSettings {
        scale_range: ScaleRange::new(0.8, 1.2),
        ..settings(MatchStrategy::Tm)
    };
    let first = find_template(&scene, &icon, &config).unwrap();
    let second = find_template(&scene, &icon, &config).unwrap();
    assert_eq!(first, second);
}
