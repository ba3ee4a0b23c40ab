// proxy.rs - Image-derived depth stand-ins
//
// Brighter reads as nearer. Crude, but it keeps the pipeline producing a
// plausible relief when no network is available.

use ndarray::{Array2, Zip};

use crate::raster;

/// Unsharp luminance weighted by edge strength, then bilateral-smoothed.
pub fn refined_proxy(gray: &Array2<f32>) -> Array2<f32> {
    let blur = raster::gaussian_blur(gray, 1.0);
    let mut mag = raster::gradient_magnitude(gray);
    raster::normalize(&mut mag);

    let mut sharp = gray.clone();
    Zip::from(&mut sharp).and(&blur).and(&mag).for_each(|g, &b, &m| {
        *g = (*g + 0.35 * (*g - b) * (0.5 + 0.5 * m)).clamp(0.0, 1.0);
    });

    let mut out = raster::bilateral(&sharp, 5, 0.1, 3.0);
    raster::normalize(&mut out);
    out
}

/// 70% luminance, 30% Canny edges, lightly blurred.
pub fn edge_blend_proxy(gray: &Array2<f32>) -> Array2<f32> {
    let edges = raster::to_field(&raster::canny(gray, 50.0, 150.0));
    let mut blend = gray.clone();
    Zip::from(&mut blend).and(&edges).for_each(|g, &e| *g = 0.7 * *g + 0.3 * e);
    let mut out = raster::gaussian_blur(&blend, 1.1);
    raster::normalize(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc(n: usize) -> Array2<f32> {
        let c = n as f32 / 2.0;
        Array2::from_shape_fn((n, n), |(y, x)| {
            let r = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
            if r < n as f32 / 4.0 { 0.9 } else { 0.1 }
        })
    }

    #[test]
    fn bright_regions_come_forward() {
        for proxy in [refined_proxy(&disc(32)), edge_blend_proxy(&disc(32))] {
            assert!(proxy[[16, 16]] > proxy[[2, 2]]);
            assert!(proxy.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn flat_input_gives_flat_depth() {
        let flat = Array2::from_elem((10, 10), 0.5f32);
        assert!(refined_proxy(&flat).iter().all(|&v| v == 0.0));
    }
}
