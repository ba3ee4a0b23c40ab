// cluster.rs - Two-cluster colour segmentation
//
// Splits the image into two colour clusters and keeps the one that looks
// most like a subject: textured, central, internally contrasted.

use image::{RgbImage, imageops::FilterType};
use ndarray::Array2;

use super::Mask;
use crate::color::{assign, extract_pixels, kmeans, luminance_field};
use crate::raster::{self, Element};

const WORK_SIZE: u32 = 128;
const TEXTURE_WEIGHT: f32 = 0.4;
const CENTRALITY_WEIGHT: f32 = 0.4;
const CONTRAST_WEIGHT: f32 = 0.2;

#[derive(Clone, Copy, Default)]
struct Score {
    texture: f32,
    centrality: f32,
    contrast: f32,
}

pub(super) fn segment(image: &RgbImage) -> Mask {
    let (w, h) = image.dimensions();
    let scale = (WORK_SIZE as f32 / w.max(h) as f32).min(1.0);
    let sw = ((w as f32 * scale).round() as u32).max(1);
    let sh = ((h as f32 * scale).round() as u32).max(1);
    let small = image::imageops::resize(image, sw, sh, FilterType::Triangle);
    let (sw, sh) = (sw as usize, sh as usize);

    let pixels = extract_pixels(&small);
    let centroids = kmeans(&pixels, 2, 10);
    if centroids.len() < 2 {
        // Single colour: nothing to separate.
        return Mask::from_values(Array2::zeros((h as usize, w as usize)));
    }
    let labels = assign(&pixels, &centroids);

    let gray = luminance_field(&small);
    let mag = raster::gradient_magnitude(&gray);
    let (cy, cx) = (sh as f32 / 2.0, sw as f32 / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);

    let mut scores = [Score::default(); 2];
    for (k, score) in scores.iter_mut().enumerate() {
        let members: Vec<(usize, usize)> =
            (0..sh * sw).filter(|&i| labels[i] == k).map(|i| (i / sw, i % sw)).collect();
        if members.is_empty() {
            continue;
        }
        let n = members.len() as f32;
        score.texture = members.iter().map(|&p| mag[p]).sum::<f32>() / n;
        score.centrality = members
            .iter()
            .map(|&(y, x)| 1.0 - ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt() / max_dist)
            .sum::<f32>()
            / n;
        score.contrast = raster::mean_std(members.iter().map(|&p| gray[p])).1;
    }

    let norm = |f: fn(&Score) -> f32| {
        let m = scores.iter().map(f).fold(0.0f32, f32::max);
        move |s: &Score| if m > 0.0 { f(s) / m } else { 0.0 }
    };
    let (tex, cen, con) = (norm(|s| s.texture), norm(|s| s.centrality), norm(|s| s.contrast));
    let total: Vec<f32> = scores
        .iter()
        .map(|s| TEXTURE_WEIGHT * tex(s) + CENTRALITY_WEIGHT * cen(s) + CONTRAST_WEIGHT * con(s))
        .collect();
    let fg = if total[1] > total[0] { 1 } else { 0 };

    let small_mask = Array2::from_shape_fn((sh, sw), |(y, x)| if labels[y * sw + x] == fg { 1.0 } else { 0.0 });
    let full = raster::resize_bilinear(&small_mask, h as usize, w as usize);
    let binary = raster::largest_component(&raster::threshold(&full, 0.5));
    let cleaned = raster::open(&raster::close(&binary, Element::Disc(2)), Element::Disc(2));
    Mask::from_binary(&cleaned)
}
