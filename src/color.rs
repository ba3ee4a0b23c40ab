// color.rs - Color operations and clustering
//
// K-means over RGB pixels drives the cluster segmenter and the colour models
// of the interactive segmenter.

use image::RgbImage;
use ndarray::Array2;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r: r as f32, g: g as f32, b: b as f32 }
    }

    pub fn dist_sq(self, other: Color) -> f32 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        dr * dr + dg * dg + db * db
    }

    /// Rec. 601 luma in [0, 1].
    pub fn luminance(self) -> f32 {
        ((0.299 * self.r + 0.587 * self.g + 0.114 * self.b) / 255.0).clamp(0.0, 1.0)
    }
}

impl std::ops::Add for Color {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self { r: self.r + o.r, g: self.g + o.g, b: self.b + o.b }
    }
}

impl std::ops::Mul<f32> for Color {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self { r: self.r * s, g: self.g * s, b: self.b * s }
    }
}

/// Row-major pixels of an image.
pub fn extract_pixels(img: &RgbImage) -> Vec<Color> {
    img.pixels().map(|p| Color::from_rgb(p[0], p[1], p[2])).collect()
}

/// Grayscale luminance field, indexed [row, col].
pub fn luminance_field(img: &RgbImage) -> Array2<f32> {
    let (w, h) = img.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        let p = img.get_pixel(x as u32, y as u32);
        Color::from_rgb(p[0], p[1], p[2]).luminance()
    })
}

/// Index of the nearest palette color.
pub fn nearest(c: Color, palette: &[Color]) -> usize {
    palette
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| c.dist_sq(**a).total_cmp(&c.dist_sq(**b)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Distance to the nearest palette color; infinite for an empty palette.
pub fn nearest_dist_sq(c: Color, palette: &[Color]) -> f32 {
    palette.iter().map(|p| c.dist_sq(*p)).fold(f32::INFINITY, f32::min)
}

/// K-means clustering with farthest-point seeding. Deterministic.
pub fn kmeans(pixels: &[Color], k: usize, iters: usize) -> Vec<Color> {
    if pixels.is_empty() || k == 0 {
        return vec![];
    }

    let mut centroids = Vec::with_capacity(k);
    centroids.push(pixels[pixels.len() / 2]);

    for _ in 1..k {
        let (mut best_dist, mut best_idx) = (0.0f32, None);
        for (i, p) in pixels.iter().enumerate() {
            let d = nearest_dist_sq(*p, &centroids);
            if d > best_dist {
                best_dist = d;
                best_idx = Some(i);
            }
        }
        // Fewer distinct colors than clusters.
        let Some(i) = best_idx else { break };
        centroids.push(pixels[i]);
    }

    let k = centroids.len();
    let mut counts = vec![0usize; k];
    let mut sums = vec![Color::default(); k];

    for _ in 0..iters {
        counts.fill(0);
        sums.fill(Color::default());

        for p in pixels {
            let c = nearest(*p, &centroids);
            counts[c] += 1;
            sums[c] = sums[c] + *p;
        }

        for i in 0..k {
            if counts[i] > 0 {
                centroids[i] = sums[i] * (1.0 / counts[i] as f32);
            }
        }
    }

    centroids
}

/// Cluster index for every pixel.
pub fn assign(pixels: &[Color], centroids: &[Color]) -> Vec<usize> {
    pixels.iter().map(|p| nearest(*p, centroids)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmeans_separates_two_colors() {
        let mut px = vec![Color::from_rgb(250, 10, 10); 30];
        px.extend(vec![Color::from_rgb(10, 10, 250); 20]);
        let c = kmeans(&px, 2, 5);
        assert_eq!(c.len(), 2);
        let labels = assign(&px, &c);
        assert!(labels[..30].iter().all(|&l| l == labels[0]));
        assert!(labels[30..].iter().all(|&l| l == labels[30]));
        assert_ne!(labels[0], labels[30]);
    }

    #[test]
    fn kmeans_on_flat_image_yields_one_cluster() {
        let px = vec![Color::from_rgb(90, 90, 90); 16];
        assert_eq!(kmeans(&px, 3, 4).len(), 1);
    }

    #[test]
    fn luminance_range() {
        assert_eq!(Color::from_rgb(0, 0, 0).luminance(), 0.0);
        assert!((Color::from_rgb(255, 255, 255).luminance() - 1.0).abs() < 1e-5);
    }
}
