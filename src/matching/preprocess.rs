//! Frame preparation ahead of matching: grayscale conversion, local
//! contrast equalization and light smoothing.
//!
//! Equalization is contrast-limited and tile-based so that screenshots taken
//! under different brightness or gamma settings still correlate well against
//! templates captured elsewhere. `imageproc` only ships a global histogram
//! equalization, so the tiled variant lives here.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::filter::gaussian_blur_f32;

use crate::error::{VisionError, VisionResult};

/// Tile grid used for local equalization, per axis.
pub const CLAHE_GRID: u32 = 8;
/// Histogram clip limit relative to a flat distribution.
pub const CLAHE_CLIP_LIMIT: f32 = 2.0;
/// Sigma of the post-equalization blur that suppresses amplified noise.
pub const SMOOTH_SIGMA: f32 = 0.8;

/// Converts a captured frame to the grayscale representation every matcher
/// consumes, optionally running local contrast equalization first.
pub fn prepare(image: &RgbaImage, use_clahe: bool) -> VisionResult<GrayImage> {
    if image.width() == 0 || image.height() == 0 {
        return Err(VisionError::invalid_image(format!(
            "zero-sized image {}x{}",
            image.width(),
            image.height()
        )));
    }
    let gray = to_gray(image);
    if use_clahe {
        Ok(equalize(&gray))
    } else {
        Ok(gray)
    }
}

/// Plain luma conversion; alpha is ignored.
pub fn to_gray(image: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Contrast-limited adaptive equalization followed by a small blur.
pub fn equalize(gray: &GrayImage) -> GrayImage {
    let leveled = clahe(gray, CLAHE_GRID, CLAHE_CLIP_LIMIT);
    gaussian_blur_f32(&leveled, SMOOTH_SIGMA)
}

/// Tiled histogram equalization with clipping.
///
/// Each tile gets its own clipped-histogram lookup table; every output pixel
/// blends the tables of its four surrounding tiles bilinearly, which removes
/// the block seams a per-tile mapping would produce.
fn clahe(gray: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let grid_x = grid.clamp(1, width);
    let grid_y = grid.clamp(1, height);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((grid_x * grid_y) as usize);
    for ty in 0..grid_y {
        let y0 = ty * height / grid_y;
        let y1 = (ty + 1) * height / grid_y;
        for tx in 0..grid_x {
            let x0 = tx * width / grid_x;
            let x1 = (tx + 1) * width / grid_x;
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts.push(tile_lut(&hist, area, clip_limit));
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        // Fractional tile coordinate of the pixel center; the border half
        // tiles clamp to their nearest table.
        let gy = (y as f32 + 0.5) * grid_y as f32 / height as f32 - 0.5;
        let ty = gy.floor();
        let fy = gy - ty;
        let ty0 = (ty as i32).clamp(0, grid_y as i32 - 1) as u32;
        let ty1 = (ty as i32 + 1).clamp(0, grid_y as i32 - 1) as u32;
        for x in 0..width {
            let gx = (x as f32 + 0.5) * grid_x as f32 / width as f32 - 0.5;
            let tx = gx.floor();
            let fx = gx - tx;
            let tx0 = (tx as i32).clamp(0, grid_x as i32 - 1) as u32;
            let tx1 = (tx as i32 + 1).clamp(0, grid_x as i32 - 1) as u32;

            let v = gray.get_pixel(x, y)[0] as usize;
            let tl = luts[(ty0 * grid_x + tx0) as usize][v] as f32;
            let tr = luts[(ty0 * grid_x + tx1) as usize][v] as f32;
            let bl = luts[(ty1 * grid_x + tx0) as usize][v] as f32;
            let br = luts[(ty1 * grid_x + tx1) as usize][v] as f32;
            let top = tl + (tr - tl) * fx;
            let bottom = bl + (br - bl) * fx;
            let blended = top + (bottom - top) * fy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Builds the equalization table for one tile from its clipped histogram.
fn tile_lut(hist: &[u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut clipped = [0u32; 256];
    let mut excess = 0u32;
    for (bin, &count) in clipped.iter_mut().zip(hist.iter()) {
        if count > clip {
            excess += count - clip;
            *bin = clip;
        } else {
            *bin = count;
        }
    }

    // Hand the clipped mass back: an even share per bin, the remainder in
    // evenly spaced bins so near-flat histograms stay centered.
    let bonus = excess / 256;
    if bonus > 0 {
        for bin in clipped.iter_mut() {
            *bin += bonus;
        }
    }
    let leftover = (excess % 256) as usize;
    if leftover > 0 {
        let step = (256 / leftover).max(1);
        let mut i = 0;
        let mut given = 0;
        while given < leftover && i < 256 {
            clipped[i] += 1;
            i += step;
            given += 1;
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (entry, &count) in lut.iter_mut().zip(clipped.iter()) {
        cdf += count;
        *entry = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}
