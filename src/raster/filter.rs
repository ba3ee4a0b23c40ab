// filter.rs - Convolution, edge detection and contrast operators
//
// Blur, gradients, Canny and Otsu run through imageproc. Bilateral and local
// contrast stay on the float field: their inputs leave [0,1] after
// sharpening. Borders clamp to the nearest pixel. Edge thresholds are in
// 8-bit units so they read the same as the usual Canny parameters.

use imageproc::{contrast, edges, filter, gradients};
use ndarray::Array2;

use super::convert::{float_image, from_float_image, from_mask_image, gray_image};
use super::fill_rows;

/// Normalised 1D Gaussian with radius ceil(3σ), for separable passes over
/// volumes.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let two_s2 = 2.0 * sigma * sigma;
    let mut k: Vec<f32> = (-radius..=radius).map(|i| (-(i * i) as f32 / two_s2).exp()).collect();
    let sum: f32 = k.iter().sum();
    k.iter_mut().for_each(|v| *v /= sum);
    k
}

pub fn gaussian_blur(field: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 || field.is_empty() {
        return field.clone();
    }
    from_float_image(&filter::gaussian_blur_f32(&float_image(field), sigma))
}

/// Sobel gradient magnitude of a [0,1] field, in field units per pixel
/// (a full black to white step reads about 4).
pub fn gradient_magnitude(field: &Array2<f32>) -> Array2<f32> {
    if field.is_empty() {
        return field.clone();
    }
    let mag = gradients::sobel_gradients(&gray_image(field));
    Array2::from_shape_fn(field.dim(), |(y, x)| mag.get_pixel(x as u32, y as u32)[0] as f32 / 255.0)
}

#[inline]
fn at(field: &Array2<f32>, y: isize, x: isize) -> f32 {
    let (h, w) = field.dim();
    field[[y.clamp(0, h as isize - 1) as usize, x.clamp(0, w as isize - 1) as usize]]
}

/// Edge-preserving blur over a disc of the given diameter.
pub fn bilateral(field: &Array2<f32>, diameter: usize, sigma_color: f32, sigma_space: f32) -> Array2<f32> {
    let (h, w) = field.dim();
    let r = (diameter / 2).max(1) as isize;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f32;
            if d2 <= (r * r) as f32 {
                offsets.push((dy, dx, (-d2 / (2.0 * sigma_space * sigma_space)).exp()));
            }
        }
    }
    let color_denom = 2.0 * sigma_color * sigma_color;

    let mut out = Array2::zeros((h, w));
    fill_rows(&mut out, |y, mut row| {
        for x in 0..w {
            let center = field[[y, x]];
            let (mut acc, mut norm) = (0.0, 0.0);
            for &(dy, dx, ws) in &offsets {
                let v = at(field, y as isize + dy, x as isize + dx);
                let diff = v - center;
                let wt = ws * (-(diff * diff) / color_denom).exp();
                acc += wt * v;
                norm += wt;
            }
            row[x] = if norm > 0.0 { acc / norm } else { center };
        }
    });
    out
}

/// Canny edge detector on a [0,1] field with thresholds in 8-bit units.
pub fn canny(field: &Array2<f32>, low: f32, high: f32) -> Array2<bool> {
    let (h, w) = field.dim();
    if h < 3 || w < 3 {
        return Array2::from_elem((h, w), false);
    }
    from_mask_image(&edges::canny(&gray_image(field), low, high.max(low)))
}

#[inline]
fn bin(v: f32) -> usize {
    (v.clamp(0.0, 1.0) * 255.0).round() as usize
}

/// Otsu's threshold for a [0,1] field. Foreground is `v > threshold`.
pub fn otsu_threshold(field: &Array2<f32>) -> f32 {
    if field.is_empty() {
        return 0.5;
    }
    let level = contrast::otsu_level(&gray_image(field));
    (level as f32 + 0.5) / 255.0
}

/// Contrast-limited adaptive histogram equalisation over a `tiles` x `tiles` grid.
pub fn local_contrast(field: &Array2<f32>, tiles: usize, clip_limit: f32) -> Array2<f32> {
    let (h, w) = field.dim();
    if field.is_empty() {
        return field.clone();
    }
    let ty = tiles.clamp(1, h);
    let tx = tiles.clamp(1, w);
    let tile_h = h.div_ceil(ty);
    let tile_w = w.div_ceil(tx);
    let ty = h.div_ceil(tile_h);
    let tx = w.div_ceil(tile_w);

    let mut luts = vec![[0.0f32; 256]; ty * tx];
    for j in 0..ty {
        for i in 0..tx {
            let (y0, y1) = (j * tile_h, ((j + 1) * tile_h).min(h));
            let (x0, x1) = (i * tile_w, ((i + 1) * tile_w).min(w));
            let mut hist = [0.0f32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[bin(field[[y, x]])] += 1.0;
                }
            }
            let area = ((y1 - y0) * (x1 - x0)) as f32;
            let clip = (clip_limit * area / 256.0).max(1.0);
            let mut excess = 0.0;
            for c in hist.iter_mut() {
                if *c > clip {
                    excess += *c - clip;
                    *c = clip;
                }
            }
            let spread = excess / 256.0;
            let lut = &mut luts[j * tx + i];
            let mut cdf = 0.0;
            for (k, c) in hist.iter().enumerate() {
                cdf += c + spread;
                lut[k] = (cdf / area).clamp(0.0, 1.0);
            }
        }
    }

    let mut out = Array2::zeros((h, w));
    fill_rows(&mut out, |y, mut row| {
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let j0 = (fy.floor() as usize).min(ty - 1);
        let j1 = (j0 + 1).min(ty - 1);
        let wy = (fy - j0 as f32).clamp(0.0, 1.0);
        for x in 0..w {
            let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
            let i0 = (fx.floor() as usize).min(tx - 1);
            let i1 = (i0 + 1).min(tx - 1);
            let wx = (fx - i0 as f32).clamp(0.0, 1.0);
            let b = bin(field[[y, x]]);
            let top = luts[j0 * tx + i0][b] * (1.0 - wx) + luts[j0 * tx + i1][b] * wx;
            let bot = luts[j1 * tx + i0][b] * (1.0 - wx) + luts[j1 * tx + i1][b] * wx;
            row[x] = top * (1.0 - wy) + bot * wy;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(_, x)| if x < w / 2 { 0.0 } else { 1.0 })
    }

    #[test]
    fn blur_preserves_constant_fields() {
        let f = Array2::from_elem((9, 7), 0.3f32);
        let b = gaussian_blur(&f, 1.5);
        assert!(b.iter().all(|v| (v - 0.3).abs() < 1e-5));
    }

    #[test]
    fn blur_softens_a_step() {
        let b = gaussian_blur(&step(8, 16), 1.0);
        assert!(b[[4, 7]] > 0.0 && b[[4, 7]] < 0.5);
        assert!(b[[4, 8]] > 0.5 && b[[4, 8]] < 1.0);
    }

    #[test]
    fn gradient_is_zero_on_flat_ground_and_peaks_on_the_step() {
        let mag = gradient_magnitude(&step(8, 16));
        assert_eq!(mag.dim(), (8, 16));
        assert_eq!(mag[[4, 2]], 0.0);
        assert!((mag[[4, 7]] - 4.0).abs() < 0.05 && (mag[[4, 8]] - 4.0).abs() < 0.05);
    }

    #[test]
    fn canny_finds_vertical_step_edge() {
        let edges = canny(&step(16, 16), 50.0, 150.0);
        let hits: usize = (3..13).filter(|&y| (6..10).any(|x| edges[[y, x]])).count();
        assert_eq!(hits, 10);
        assert!(!edges[[8, 2]] && !edges[[8, 13]]);
        assert!(canny(&Array2::zeros((2, 9)), 50.0, 150.0).iter().all(|e| !e));
    }

    #[test]
    fn otsu_splits_bimodal_field() {
        let f = Array2::from_shape_fn((10, 10), |(y, _)| if y < 5 { 0.2 } else { 0.8 });
        let t = otsu_threshold(&f);
        assert!(t > 0.2 && t < 0.8, "threshold {t}");
    }

    #[test]
    fn bilateral_keeps_step_sharp() {
        let out = bilateral(&step(8, 16), 5, 0.1, 3.0);
        assert!(out[[4, 7]] < 0.05);
        assert!(out[[4, 8]] > 0.95);
    }

    #[test]
    fn local_contrast_stays_in_unit_range() {
        let f = Array2::from_shape_fn((40, 30), |(y, x)| ((x + y) as f32 / 68.0).powi(2));
        let out = local_contrast(&f, 16, 2.0);
        assert_eq!(out.dim(), f.dim());
        assert!(out.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
    }
}
