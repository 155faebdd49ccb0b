//! Planar homography estimation for the feature matcher.
//!
//! Matched keypoints rarely come clean, so the template-to-scene mapping is
//! fitted with RANSAC around a direct linear transform. The DLT normalizes
//! both point sets (Hartley) and solves the 9x9 normal system by symmetric
//! eigendecomposition, which sidesteps thin-SVD shape issues for small
//! correspondence counts.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// RANSAC configuration. Defaults suit screen-resolution coordinates.
#[derive(Debug, Clone)]
pub struct RansacParams {
    pub max_iters: usize,
    /// Reprojection error in pixels below which a pair counts as an inlier.
    pub inlier_threshold: f64,
    /// Minimum inliers for the model to be reported at all.
    pub min_inliers: usize,
    /// Seed for the index sampler; fixed so searches are reproducible.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 5.0,
            min_inliers: 4,
            seed: 7,
        }
    }
}

/// A fitted template-to-scene mapping.
#[derive(Debug, Clone)]
pub struct HomographyFit {
    pub matrix: Matrix3<f64>,
    pub inliers: usize,
}

/// Applies `h` to a 2D point. Points mapped to the plane at infinity come
/// back as NaN and are rejected by the callers' finiteness checks.
pub fn project(h: &Matrix3<f64>, point: [f64; 2]) -> [f64; 2] {
    let p = h * Vector3::new(point[0], point[1], 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

fn reprojection_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    let p = project(h, src);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

/// Translate-and-scale transform that centers the points on the origin with
/// mean distance sqrt(2), plus the normalized points themselves.
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, normalized)
}

/// DLT estimate from point correspondences. Needs at least four pairs of
/// equal count; returns `None` on degenerate geometry.
pub fn estimate(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Matrix3<f64>> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let [sx, sy] = src_n[i];
        let [dx, dy] = dst_n[i];

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // The solution is the eigenvector of A^T A with the smallest eigenvalue.
    let eig = nalgebra::SymmetricEigen::new(a.transpose() * &a);
    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    let h_norm = Matrix3::from_fn(|r, c| eig.eigenvectors[(3 * r + c, min_idx)]);

    let h = t_dst.try_inverse()? * h_norm * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Some(h)
    } else {
        Some(h / scale)
    }
}

/// Robust fit over noisy correspondences.
///
/// Returns `None` when no model reaches `min_inliers`; the caller treats
/// that as the matcher abstaining, not as an error.
pub fn fit(src: &[[f64; 2]], dst: &[[f64; 2]], params: &RansacParams) -> Option<HomographyFit> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best_count = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h = Matrix3::identity();

    for _ in 0..params.max_iters {
        let picks = sample_indices(&mut rng, n);
        let s4: Vec<[f64; 2]> = picks.iter().map(|&i| src[i]).collect();
        let d4: Vec<[f64; 2]> = picks.iter().map(|&i| dst[i]).collect();
        let Some(h) = estimate(&s4, &d4) else {
            continue;
        };

        let mut count = 0usize;
        let mut mask = vec![false; n];
        for i in 0..n {
            if reprojection_error(&h, src[i], dst[i]) < params.inlier_threshold {
                mask[i] = true;
                count += 1;
            }
        }
        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_h = h;
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_count < params.min_inliers {
        return None;
    }

    // Refit on the consensus set, then recount against the refined model.
    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let refined = estimate(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let inliers = (0..n)
        .filter(|&i| reprojection_error(&refined, src[i], dst[i]) < params.inlier_threshold)
        .count();
    if inliers < params.min_inliers {
        return None;
    }

    Some(HomographyFit {
        matrix: refined,
        inliers,
    })
}

fn sample_indices(rng: &mut StdRng, n: usize) -> [usize; 4] {
    for _ in 0..64 {
        let mut picks = [0usize; 4];
        for p in picks.iter_mut() {
            *p = rng.gen_range(0..n);
        }
        let distinct = (0..4).all(|i| (i + 1..4).all(|j| picks[i] != picks[j]));
        if distinct {
            return picks;
        }
    }
    // A duplicated draw only wastes one iteration: the degenerate model
    // collects almost no inliers.
    [0, 1 % n, 2 % n, 3 % n]
}
