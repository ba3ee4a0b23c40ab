// label.rs - Connected components, hole filling, distance transform
//
// Labelling and distances come from imageproc; this module compacts the
// labels and keeps per-region sizes and bounding boxes.

use hashbrown::{HashMap, HashSet};
use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::region_labelling::{Connectivity, connected_components};
use ndarray::Array2;

use super::convert::mask_image;

/// Labelled foreground regions. Label 0 is background; region `i` has label `i + 1`.
#[derive(Clone, Debug)]
pub struct Components {
    pub labels: Array2<u32>,
    pub sizes: Vec<usize>,
    /// Inclusive (min_y, min_x, max_y, max_x) per region.
    pub bounds: Vec<[usize; 4]>,
}

impl Components {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Index of the region with the most pixels.
    pub fn largest(&self) -> Option<usize> {
        self.sizes.iter().enumerate().max_by_key(|&(_, s)| *s).map(|(i, _)| i)
    }

    pub fn region(&self, index: usize) -> Array2<bool> {
        let label = index as u32 + 1;
        self.labels.mapv(|l| l == label)
    }
}

/// 8-connected labelling of `true` pixels. Regions are numbered in the
/// order a row-major scan first meets them.
pub fn label_components(mask: &Array2<bool>) -> Components {
    let dim = mask.dim();
    let mut labels = Array2::<u32>::zeros(dim);
    let mut sizes = Vec::new();
    let mut bounds: Vec<[usize; 4]> = Vec::new();
    if mask.is_empty() {
        return Components { labels, sizes, bounds };
    }

    let raw = connected_components(&mask_image(mask), Connectivity::Eight, Luma([0u8]));
    let mut compact: HashMap<u32, u32> = HashMap::new();
    for ((y, x), label) in labels.indexed_iter_mut() {
        let l = raw.get_pixel(x as u32, y as u32)[0];
        if l == 0 {
            continue;
        }
        let next = compact.len() as u32 + 1;
        let id = *compact.entry(l).or_insert(next);
        if id == next {
            sizes.push(0);
            bounds.push([y, x, y, x]);
        }
        let i = id as usize - 1;
        sizes[i] += 1;
        let bb = &mut bounds[i];
        *bb = [bb[0].min(y), bb[1].min(x), bb[2].max(y), bb[3].max(x)];
        *label = id;
    }
    Components { labels, sizes, bounds }
}

/// Keep only the biggest 8-connected region. Empty in, empty out.
pub fn largest_component(mask: &Array2<bool>) -> Array2<bool> {
    let comps = label_components(mask);
    match comps.largest() {
        Some(i) => comps.region(i),
        None => mask.clone(),
    }
}

/// Turn background pockets that cannot reach the border into foreground.
/// Pockets are 4-connected, so a diagonal gap in the wall still leaks.
pub fn fill_holes(mask: &Array2<bool>) -> Array2<bool> {
    let (h, w) = mask.dim();
    if mask.is_empty() {
        return mask.clone();
    }
    let background = mask_image(&mask.mapv(|on| !on));
    let pockets = connected_components(&background, Connectivity::Four, Luma([0u8]));

    let mut outside = HashSet::new();
    for (x, y, p) in pockets.enumerate_pixels() {
        let on_border = y == 0 || x == 0 || y as usize + 1 == h || x as usize + 1 == w;
        if on_border && p[0] != 0 {
            outside.insert(p[0]);
        }
    }
    Array2::from_shape_fn((h, w), |(y, x)| {
        let l = pockets.get_pixel(x as u32, y as u32)[0];
        mask[[y, x]] || !outside.contains(&l)
    })
}

/// The largest region enclosed by an edge map, with its interior filled.
/// Regions smaller than `min_area` pixels are ignored.
pub fn largest_enclosed_region(edges: &Array2<bool>, min_area: usize) -> Option<Array2<bool>> {
    let (h, w) = edges.dim();
    let comps = label_components(edges);
    let mut best: Option<(usize, usize, Array2<bool>)> = None;

    for (i, b) in comps.bounds.iter().enumerate() {
        let (bh, bw) = (b[2] - b[0] + 1, b[3] - b[1] + 1);
        if bh * bw < min_area || best.as_ref().is_some_and(|(_, area, _)| bh * bw <= *area) {
            continue;
        }
        // Fill within the bounding box plus a one-pixel frame of background.
        let label = i as u32 + 1;
        let sub = Array2::from_shape_fn((bh + 2, bw + 2), |(y, x)| {
            let (sy, sx) = (y as isize + b[0] as isize - 1, x as isize + b[1] as isize - 1);
            sy >= 0
                && sx >= 0
                && (sy as usize) < h
                && (sx as usize) < w
                && comps.labels[[sy as usize, sx as usize]] == label
        });
        let filled = fill_holes(&sub);
        let area = filled.iter().filter(|&&v| v).count();
        if area >= min_area && best.as_ref().is_none_or(|(_, a, _)| area > *a) {
            best = Some((i, area, filled));
        }
    }

    best.map(|(i, _, filled)| {
        let b = comps.bounds[i];
        let mut out = Array2::from_elem((h, w), false);
        for ((y, x), &on) in filled.indexed_iter() {
            let (sy, sx) = (y as isize + b[0] as isize - 1, x as isize + b[1] as isize - 1);
            if on && sy >= 0 && sx >= 0 && (sy as usize) < h && (sx as usize) < w {
                out[[sy as usize, sx as usize]] = true;
            }
        }
        out
    })
}

/// Euclidean distance (in pixels) from each foreground pixel to the nearest
/// background pixel or the image border. Background pixels are 0.
pub fn distance_transform(mask: &Array2<bool>) -> Array2<f32> {
    let (h, w) = mask.dim();
    if mask.is_empty() {
        return Array2::zeros((h, w));
    }
    // A one-pixel background frame stands in for the border.
    let seeds = GrayImage::from_fn(w as u32 + 2, h as u32 + 2, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let inside = x >= 1 && y >= 1 && x <= w && y <= h && mask[[y - 1, x - 1]];
        Luma([if inside { 0 } else { 255 }])
    });
    let d2 = euclidean_squared_distance_transform(&seeds);
    Array2::from_shape_fn((h, w), |(y, x)| d2.get_pixel(x as u32 + 1, y as u32 + 1)[0].sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> Array2<bool> {
        Array2::from_shape_fn((n, n), |(y, x)| {
            let edge = y == 2 || x == 2 || y == n - 3 || x == n - 3;
            edge && (2..n - 2).contains(&y) && (2..n - 2).contains(&x)
        })
    }

    #[test]
    fn labels_separate_regions() {
        let mut m = Array2::from_elem((6, 6), false);
        m[[0, 0]] = true;
        m[[1, 1]] = true;
        m[[4, 4]] = true;
        m[[4, 5]] = true;
        m[[5, 5]] = true;
        let c = label_components(&m);
        assert_eq!(c.len(), 2);
        assert_eq!(c.sizes[c.largest().unwrap_or(0)], 3);
        assert_eq!(largest_component(&m).iter().filter(|&&v| v).count(), 3);
    }

    #[test]
    fn fill_holes_fills_ring_interior() {
        let filled = fill_holes(&ring(12));
        assert!(filled[[6, 6]]);
        assert!(!filled[[0, 0]]);
        assert_eq!(filled.iter().filter(|&&v| v).count(), 64);
    }

    #[test]
    fn enclosed_region_respects_min_area() {
        let edges = ring(12);
        assert_eq!(largest_enclosed_region(&edges, 10).map(|r| r.iter().filter(|&&v| v).count()), Some(64));
        assert!(largest_enclosed_region(&edges, 100).is_none());
    }

    #[test]
    fn labels_follow_scan_order_with_bounds() {
        let mut m = Array2::from_elem((5, 7), false);
        m[[0, 5]] = true;
        m[[1, 6]] = true;
        m[[3, 0]] = true;
        m[[3, 1]] = true;
        m[[4, 1]] = true;
        let c = label_components(&m);
        assert_eq!(c.sizes, vec![2, 3]);
        assert_eq!(c.bounds, vec![[0, 5, 1, 6], [3, 0, 4, 1]]);
        assert_eq!(c.labels[[1, 6]], 1);
        assert_eq!(c.labels[[4, 1]], 2);
        assert_eq!(c.region(1).iter().filter(|&&v| v).count(), 3);
    }

    #[test]
    fn fill_holes_leaves_open_bays_alone() {
        let mut bay = ring(12);
        bay[[2, 6]] = false;
        let filled = fill_holes(&bay);
        assert!(!filled[[6, 6]]);
        assert_eq!(filled, bay);
    }

    #[test]
    fn distance_peaks_in_the_middle() {
        let m = Array2::from_elem((11, 11), true);
        let d = distance_transform(&m);
        assert!((d[[0, 0]] - 1.0).abs() < 1e-6);
        assert!((d[[5, 5]] - 6.0).abs() < 1e-6);
        assert!(d[[5, 5]] > d[[2, 5]]);
    }

    #[test]
    fn distance_is_euclidean_around_a_hole() {
        let mut m = Array2::from_elem((21, 21), true);
        m[[10, 10]] = false;
        let d = distance_transform(&m);
        assert_eq!(d[[10, 10]], 0.0);
        assert!((d[[13, 14]] - 5.0).abs() < 1e-5);
        assert!((d[[11, 11]] - 2f32.sqrt()).abs() < 1e-5);
    }
}
