// resample.rs - Grid resizing and point sampling
//
// Pixel centres are aligned (half-pixel offset), matching the usual image
// library conventions, so a resize to the same size is the identity.

use ndarray::Array2;

use super::fill_rows;

#[inline]
fn clamp_at(field: &Array2<f32>, y: isize, x: isize) -> f32 {
    let (h, w) = field.dim();
    field[[y.clamp(0, h as isize - 1) as usize, x.clamp(0, w as isize - 1) as usize]]
}

/// Bilinear sample at fractional pixel coordinates, clamped to the border.
pub fn sample_bilinear(field: &Array2<f32>, x: f32, y: f32) -> f32 {
    if field.is_empty() {
        return 0.0;
    }
    let (h, w) = field.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (x.floor() as isize, y.floor() as isize);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let top = clamp_at(field, y0, x0) * (1.0 - fx) + clamp_at(field, y0, x0 + 1) * fx;
    let bot = clamp_at(field, y0 + 1, x0) * (1.0 - fx) + clamp_at(field, y0 + 1, x0 + 1) * fx;
    top * (1.0 - fy) + bot * fy
}

#[inline]
fn source_coord(dst: usize, scale: f32) -> f32 {
    (dst as f32 + 0.5) * scale - 0.5
}

pub fn resize_bilinear(field: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (h, w) = field.dim();
    let mut out = Array2::zeros((height, width));
    if field.is_empty() {
        return out;
    }
    let (sy, sx) = (h as f32 / height.max(1) as f32, w as f32 / width.max(1) as f32);
    fill_rows(&mut out, |y, mut row| {
        let fy = source_coord(y, sy);
        for x in 0..width {
            row[x] = sample_bilinear(field, source_coord(x, sx), fy);
        }
    });
    out
}

/// Keys cubic kernel with a = -0.75.
#[inline]
fn cubic(t: f32) -> f32 {
    const A: f32 = -0.75;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

/// Bicubic resize. Can overshoot the input range near sharp steps; callers
/// clamp when they need bounds.
pub fn resize_bicubic(field: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (h, w) = field.dim();
    let mut out = Array2::zeros((height, width));
    if field.is_empty() {
        return out;
    }
    let (sy, sx) = (h as f32 / height.max(1) as f32, w as f32 / width.max(1) as f32);

    // Column taps are shared by every row.
    let col_taps: Vec<(isize, [f32; 4])> = (0..width)
        .map(|x| {
            let fx = source_coord(x, sx);
            let x0 = fx.floor();
            let t = fx - x0;
            (x0 as isize, [cubic(1.0 + t), cubic(t), cubic(1.0 - t), cubic(2.0 - t)])
        })
        .collect();

    fill_rows(&mut out, |y, mut row| {
        let fy = source_coord(y, sy);
        let y0 = fy.floor();
        let t = fy - y0;
        let wy = [cubic(1.0 + t), cubic(t), cubic(1.0 - t), cubic(2.0 - t)];
        let y0 = y0 as isize;
        for (x, (x0, wx)) in col_taps.iter().enumerate() {
            let mut acc = 0.0;
            for (j, wyj) in wy.iter().enumerate() {
                let mut line = 0.0;
                for (i, wxi) in wx.iter().enumerate() {
                    line += wxi * clamp_at(field, y0 - 1 + j as isize, x0 - 1 + i as isize);
                }
                acc += wyj * line;
            }
            row[x] = acc;
        }
    });
    out
}
