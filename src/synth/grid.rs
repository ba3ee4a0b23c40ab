// grid.rs - Sampling grid planning and resampling
//
// The grid is sized from the triangle budget (two triangles per cell on
// each of the two surfaces), scaled by the quality profile, and kept at the
// image's aspect ratio.

use log::debug;
use ndarray::Array2;

use crate::config::QualitySettings;
use crate::depth::DepthMap;
use crate::raster;
use crate::segment::Mask;

/// Grid vertex counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridPlan {
    pub rows: usize,
    pub cols: usize,
}

pub fn plan_grid(image_rows: usize, image_cols: usize, target_triangles: usize, settings: &QualitySettings) -> GridPlan {
    let (h, w) = (image_rows.max(1) as f64, image_cols.max(1) as f64);
    let aspect = h / w;
    let cells = (target_triangles / 4).max(1) as f64;

    let mut gw = (cells / aspect).sqrt() * settings.grid_multiplier as f64;
    let mut gh = gw * aspect;

    // Joint scaling keeps the aspect ratio: floor first, ceiling wins.
    let shorter = gw.min(gh);
    if shorter < settings.min_grid as f64 {
        let s = settings.min_grid as f64 / shorter;
        gw *= s;
        gh *= s;
    }
    let longer = gw.max(gh);
    if longer > settings.max_grid as f64 {
        let s = settings.max_grid as f64 / longer;
        gw *= s;
        gh *= s;
    }
    // No finer than the source pixels.
    if gw > w {
        let s = w / gw;
        gw *= s;
        gh *= s;
    }

    let plan = GridPlan { rows: (gh.round() as usize).max(2), cols: (gw.round() as usize).max(2) };
    debug!("grid {}x{} for {}x{} image, target {} triangles", plan.cols, plan.rows, image_cols, image_rows, target_triangles);
    plan
}

/// Depth and mask resampled onto the grid, finite and in [0, 1].
#[derive(Clone, Debug)]
pub struct GridSamples {
    pub depth: Array2<f32>,
    pub mask: Array2<f32>,
}

pub fn sample_grid(depth: &DepthMap, mask: &Mask, plan: GridPlan) -> GridSamples {
    let mut d = raster::resize_bicubic(depth.values(), plan.rows, plan.cols);
    let median = raster::finite_median(&d).unwrap_or(0.0);
    raster::scrub_non_finite(&mut d, median);
    d.mapv_inplace(|v| v.clamp(0.0, 1.0));

    let mut m = raster::resize_bicubic(mask.values(), plan.rows, plan.cols);
    raster::scrub_non_finite(&mut m, 0.0);
    m.mapv_inplace(|v| v.clamp(0.0, 1.0));

    GridSamples { depth: d, mask: m }
}
