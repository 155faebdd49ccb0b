//! Multi-scale correlation matcher.
//!
//! Walks the template across a scale interval and keeps the location with
//! the strongest correlation peak. Scoring uses the correlation coefficient
//! (window and template both mean-centered), so a uniform brightness or
//! contrast change between template capture and live frame does not move
//! the score. The raw cross-correlation surface comes from `imageproc`; the
//! per-window normalization terms come from integral images, which keeps
//! the whole pass at one multiply-add per window pixel.

use image::GrayImage;
use image::imageops::FilterType;
use imageproc::template_matching::{MatchTemplateMethod, match_template_parallel};

use super::types::{Rect, ScaleRange};

/// Scales closer to identity than this skip the resize entirely.
pub const SCALE_IDENTITY_EPS: f32 = 1e-3;

/// Below this variance a window or template counts as flat.
const VARIANCE_FLOOR: f64 = 1e-6;

/// Best correlation peak over one scale walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleHit {
    pub rect: Rect,
    pub score: f32,
    /// Template scale that produced the peak.
    pub scale: f32,
}

/// Multi-scale correlation search over prepared grayscale images.
///
/// Returns `None` only when no scale could be evaluated at all, which the
/// caller reports as an abstention rather than a zero score.
pub fn search_correlation(
    scene: &GrayImage,
    template: &GrayImage,
    range: ScaleRange,
    steps: u32,
) -> Option<ScaleHit> {
    best_scale_match(scene, template, range, steps)
}

pub(crate) fn best_scale_match(
    scene: &GrayImage,
    template: &GrayImage,
    range: ScaleRange,
    steps: u32,
) -> Option<ScaleHit> {
    let mut best: Option<ScaleHit> = None;
    for scale in range.samples(steps) {
        let scaled;
        let candidate = if (scale - 1.0).abs() < SCALE_IDENTITY_EPS {
            template
        } else {
            scaled = resize_template(template, scale);
            &scaled
        };
        if candidate.width() > scene.width() || candidate.height() > scene.height() {
            log::debug!(
                "scale {:.2} skipped: template {}x{} exceeds scene {}x{}",
                scale,
                candidate.width(),
                candidate.height(),
                scene.width(),
                scene.height()
            );
            continue;
        }
        let (score, (x, y)) = correlation_peak(scene, candidate);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(ScaleHit {
                rect: Rect::new(x, y, candidate.width(), candidate.height()),
                score,
                scale,
            });
        }
    }
    best
}

/// Resizes the template by `scale`, never below one pixel per side.
pub(crate) fn resize_template(template: &GrayImage, scale: f32) -> GrayImage {
    let width = ((template.width() as f32 * scale) as u32).max(1);
    let height = ((template.height() as f32 * scale) as u32).max(1);
    image::imageops::resize(template, width, height, FilterType::Lanczos3)
}

/// Location and value of the strongest correlation peak, clamped to `[0, 1]`.
///
/// Flat templates make the mean-centered score undefined, so those fall back
/// to plain normalized correlation, which still ranks windows usefully.
pub(crate) fn correlation_peak(scene: &GrayImage, template: &GrayImage) -> (f32, (u32, u32)) {
    let n = (template.width() * template.height()) as f64;
    let mut t_sum = 0.0;
    let mut t_sq = 0.0;
    for p in template.pixels() {
        let v = p[0] as f64;
        t_sum += v;
        t_sq += v * v;
    }
    let t_mean = t_sum / n;
    let t_var = t_sq - t_sum * t_sum / n;

    let cross = match_template_parallel(scene, template, MatchTemplateMethod::CrossCorrelation);
    let windows = WindowSums::new(scene, template.width(), template.height());

    let mut best_score = f64::MIN;
    let mut best_at = (0u32, 0u32);
    for (x, y, value) in cross.enumerate_pixels() {
        let w_sum = windows.sum(x, y);
        let w_sq = windows.sum_sq(x, y);
        let score = if t_var > VARIANCE_FLOOR {
            let w_var = w_sq - w_sum * w_sum / n;
            if w_var <= VARIANCE_FLOOR {
                continue;
            }
            (value[0] as f64 - t_mean * w_sum) / (t_var * w_var).sqrt()
        } else {
            let denom = (t_sq * w_sq).sqrt();
            if denom <= VARIANCE_FLOOR {
                continue;
            }
            value[0] as f64 / denom
        };
        if score > best_score {
            best_score = score;
            best_at = (x, y);
        }
    }

    if best_score == f64::MIN {
        (0.0, (0, 0))
    } else {
        (best_score.clamp(0.0, 1.0) as f32, best_at)
    }
}

/// Integral tables answering "sum of values / squares in any window" in
/// constant time.
struct WindowSums {
    values: Vec<f64>,
    squares: Vec<f64>,
    stride: usize,
    win_w: u32,
    win_h: u32,
}

impl WindowSums {
    fn new(scene: &GrayImage, win_w: u32, win_h: u32) -> Self {
        let (w, h) = scene.dimensions();
        let stride = w as usize + 1;
        let mut values = vec![0.0; stride * (h as usize + 1)];
        let mut squares = vec![0.0; stride * (h as usize + 1)];
        for y in 0..h {
            let row = (y as usize + 1) * stride;
            let prev = y as usize * stride;
            for x in 0..w {
                let i = x as usize + 1;
                let v = scene.get_pixel(x, y)[0] as f64;
                values[row + i] = v + values[prev + i] + values[row + i - 1] - values[prev + i - 1];
                squares[row + i] =
                    v * v + squares[prev + i] + squares[row + i - 1] - squares[prev + i - 1];
            }
        }
        Self {
            values,
            squares,
            stride,
            win_w,
            win_h,
        }
    }

    fn window(table: &[f64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let x0 = x as usize;
        let y0 = y as usize;
        let x1 = x0 + w as usize;
        let y1 = y0 + h as usize;
        table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
            + table[y0 * stride + x0]
    }

    fn sum(&self, x: u32, y: u32) -> f64 {
        Self::window(&self.values, self.stride, x, y, self.win_w, self.win_h)
    }

    fn sum_sq(&self, x: u32, y: u32) -> f64 {
        Self::window(&self.squares, self.stride, x, y, self.win_w, self.win_h)
    }
}
