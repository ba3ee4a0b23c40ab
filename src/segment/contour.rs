// contour.rs - Edge-contour segmentation

use image::RgbImage;
use ndarray::Array2;

use super::Mask;
use crate::color::luminance_field;
use crate::raster::{self, Element};

pub(super) fn segment(image: &RgbImage) -> Mask {
    let gray = luminance_field(image);
    let (h, w) = gray.dim();

    let edges = raster::dilate(&raster::canny(&gray, 30.0, 100.0), Element::Square(1));
    let min_area = ((h * w) / 100).max(1);

    let region = match raster::largest_enclosed_region(&edges, min_area) {
        Some(r) => raster::dilate(&raster::dilate(&r, Element::Square(2)), Element::Square(2)),
        None => otsu_foreground(&gray),
    };

    // Keep the frame edge clear so the silhouette never runs off the image.
    let border = (h.min(w) / 40).max(5);
    let framed = Array2::from_shape_fn((h, w), |(y, x)| {
        region[[y, x]] && y >= border && x >= border && y + border < h && x + border < w
    });

    let closed = raster::close(&framed, Element::Disc(3));
    Mask::from_values(raster::gaussian_blur(&raster::to_field(&closed), 1.1))
}

/// Global threshold; the side that owns most of the image border is background.
fn otsu_foreground(gray: &Array2<f32>) -> Array2<bool> {
    let (h, w) = gray.dim();
    let bright = raster::threshold(gray, raster::otsu_threshold(gray));
    let (mut border, mut lit) = (0usize, 0usize);
    for ((y, x), &b) in bright.indexed_iter() {
        if y == 0 || x == 0 || y + 1 == h || x + 1 == w {
            border += 1;
            lit += b as usize;
        }
    }
    if lit * 2 > border { bright.mapv(|b| !b) } else { bright }
}
