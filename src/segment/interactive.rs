// interactive.rs - Rectangle-seeded iterative segmentation
//
// Starts with everything inside a centred rectangle as foreground, then
// alternates between fitting colour palettes to both sides and relabelling
// rectangle pixels by which palette explains them better. A Gaussian pass
// over the per-pixel evidence stands in for a pairwise smoothness term.

use image::{RgbImage, imageops::FilterType};
use log::trace;
use ndarray::Array2;

use super::Mask;
use crate::color::{Color, extract_pixels, kmeans, nearest_dist_sq};
use crate::raster::{self, Element};

const WORK_SIZE: u32 = 160;
const ITERATIONS: usize = 5;
const PALETTE_SIZE: usize = 5;

pub(super) fn segment(image: &RgbImage) -> Mask {
    let (w, h) = image.dimensions();
    let scale = (WORK_SIZE as f32 / w.max(h) as f32).min(1.0);
    let sw = ((w as f32 * scale).round() as u32).max(1);
    let sh = ((h as f32 * scale).round() as u32).max(1);
    let small = image::imageops::resize(image, sw, sh, FilterType::Triangle);
    let (sw, sh) = (sw as usize, sh as usize);

    let margin = sw.min(sh) / 10;
    let in_rect = |y: usize, x: usize| y >= margin && x >= margin && y + margin < sh && x + margin < sw;

    let pixels = extract_pixels(&small);
    let mut fg: Vec<bool> = (0..sh * sw).map(|i| in_rect(i / sw, i % sw)).collect();

    for iter in 0..ITERATIONS {
        let fg_px: Vec<Color> = pixels.iter().zip(&fg).filter(|&(_, &f)| f).map(|(p, _)| *p).collect();
        let bg_px: Vec<Color> = pixels.iter().zip(&fg).filter(|&(_, &f)| !f).map(|(p, _)| *p).collect();
        if fg_px.is_empty() || bg_px.is_empty() {
            break;
        }
        let fg_model = kmeans(&fg_px, PALETTE_SIZE, 5);
        let bg_model = kmeans(&bg_px, PALETTE_SIZE, 5);

        let evidence = Array2::from_shape_fn((sh, sw), |(y, x)| {
            if !in_rect(y, x) {
                return 0.0;
            }
            let c = pixels[y * sw + x];
            nearest_dist_sq(c, &bg_model).sqrt() - nearest_dist_sq(c, &fg_model).sqrt()
        });
        let smoothed = raster::gaussian_blur(&evidence, 1.0);

        let next: Vec<bool> = (0..sh * sw).map(|i| in_rect(i / sw, i % sw) && smoothed[[i / sw, i % sw]] > 0.0).collect();
        let changed = next.iter().zip(&fg).filter(|(a, b)| a != b).count();
        trace!("interactive segmentation pass {iter}: {changed} pixels changed");
        fg = next;
        if changed == 0 {
            break;
        }
    }

    let small_mask = Array2::from_shape_fn((sh, sw), |(y, x)| fg[y * sw + x]);
    let largest = raster::to_field(&raster::largest_component(&small_mask));
    let full = raster::threshold(&raster::resize_bilinear(&largest, h as usize, w as usize), 0.5);
    let closed = raster::close(&full, Element::Disc(2));
    Mask::from_values(raster::gaussian_blur(&raster::to_field(&closed), 1.1))
}
