// heightfield.rs - Relief extrusion over a sampling grid
//
// A grid vertex (row, col) sits at x = col·dx, y = (rows-1-row)·dy, so image
// up is +Y. A cell is active when any of its corners is inside the mask (or
// always, for the full frame). Active cells get a top and a bottom quad; walls
// run along every edge between an active and an inactive cell, so the shell
// is closed whatever the mask looks like.

use log::{debug, info};
use ndarray::Array2;
use nalgebra::Point3;

use super::{SynthesisInput, Synthesizer, amplify, apply_shaping, plan_grid, sample_grid};
use crate::config::{Dimensions, PipelineConfig, QualitySettings, SynthConfig};
use crate::error::SynthesisError;
use crate::mesh::Mesh;

/// Knobs shared by the relief strategies.
#[derive(Clone, Copy, Debug)]
pub(super) struct ReliefParams {
    pub dims: Dimensions,
    pub quality: QualitySettings,
    pub target_triangles: usize,
    pub synth: SynthConfig,
}

impl ReliefParams {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            dims: config.dimensions,
            quality: config.quality.settings(),
            target_triangles: config.target_triangles,
            synth: config.synth,
        }
    }
}

/// Shaped heights on the sampling grid.
pub(super) struct ReliefGrid {
    /// Normalised height per vertex, 0 outside the mask.
    pub heights: Array2<f32>,
    /// Vertices inside the mask.
    pub inside: Array2<bool>,
    /// Cells that get geometry.
    pub active: Array2<bool>,
    pub dx: f64,
    pub dy: f64,
}

pub(super) fn relief_grid(input: &SynthesisInput<'_>, params: &ReliefParams, masked: bool) -> Result<ReliefGrid, SynthesisError> {
    let (rows, cols) = input.dim()?;
    if rows < 2 || cols < 2 {
        return Err(SynthesisError::EmptyMask(0.0));
    }
    let plan = plan_grid(rows, cols, params.target_triangles, &params.quality);
    let samples = sample_grid(input.depth, input.mask, plan);

    let threshold = params.synth.mask_threshold;
    let inside = if masked {
        samples.mask.mapv(|m| m > threshold)
    } else {
        Array2::from_elem(samples.mask.dim(), true)
    };
    let inside_count = inside.iter().filter(|v| **v).count();
    let coverage = inside_count as f32 / inside.len().max(1) as f32;
    if inside_count == 0 {
        return Err(SynthesisError::EmptyMask(coverage));
    }

    let mut heights = samples.depth;
    if masked {
        renormalize_inside(&mut heights, &inside);
    }
    apply_shaping(&mut heights, params.synth.shaping);
    amplify(&mut heights, &inside, &params.synth.amplification, params.quality.max_amplification);

    let active = if masked {
        let mut a = Array2::from_shape_fn((plan.rows - 1, plan.cols - 1), |(r, c)| {
            inside[[r, c]] || inside[[r, c + 1]] || inside[[r + 1, c]] || inside[[r + 1, c + 1]]
        });
        bridge_diagonals(&mut a);
        a
    } else {
        Array2::from_elem((plan.rows - 1, plan.cols - 1), true)
    };

    let aspect = rows as f64 / cols as f64;
    let width = params.dims.width_mm;
    debug!("relief grid {}x{}, coverage {:.3}", plan.cols, plan.rows, coverage);
    Ok(ReliefGrid {
        heights,
        inside,
        active,
        dx: width / (plan.cols - 1) as f64,
        dy: width * aspect / (plan.rows - 1) as f64,
    })
}

/// Rescale inside values to [0, 1]; outside values become 0.
fn renormalize_inside(heights: &mut Array2<f32>, inside: &Array2<bool>) {
    let (lo, hi) = heights
        .iter()
        .zip(inside.iter())
        .filter(|(_, i)| **i)
        .fold((f32::MAX, f32::MIN), |(lo, hi), (v, _)| (lo.min(*v), hi.max(*v)));
    let range = hi - lo;
    ndarray::Zip::from(heights).and(inside).for_each(|h, &i| {
        *h = match (i, range > 1e-6) {
            (false, _) => 0.0,
            (true, true) => (*h - lo) / range,
            (true, false) => *h,
        };
    });
}

/// Cells touching only at a corner would share one vertical wall edge four
/// ways. Activate a bridging cell until no such pair is left.
fn bridge_diagonals(active: &mut Array2<bool>) {
    let (rows, cols) = active.dim();
    loop {
        let mut changed = false;
        for r in 0..rows.saturating_sub(1) {
            for c in 0..cols.saturating_sub(1) {
                let (a, b, d, e) = (active[[r, c]], active[[r, c + 1]], active[[r + 1, c]], active[[r + 1, c + 1]]);
                if (a && e && !b && !d) || (b && d && !a && !e) {
                    let fill = if a { [r, c + 1] } else { [r, c] };
                    active[fill] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// Lazily numbered top and bottom vertices for a grid shell.
struct ShellBuilder<'a> {
    top: &'a Array2<f64>,
    bottom: &'a Array2<f64>,
    dx: f64,
    dy: f64,
    top_index: Array2<u32>,
    bottom_index: Array2<u32>,
    mesh: Mesh,
}

const UNSET: u32 = u32::MAX;

impl ShellBuilder<'_> {
    fn position(&self, r: usize, c: usize, z: f64) -> Point3<f64> {
        let rows = self.top.nrows();
        Point3::new(c as f64 * self.dx, (rows - 1 - r) as f64 * self.dy, z)
    }

    fn top(&mut self, r: usize, c: usize) -> u32 {
        if self.top_index[[r, c]] == UNSET {
            self.top_index[[r, c]] = self.mesh.vertices.len() as u32;
            let p = self.position(r, c, self.top[[r, c]]);
            self.mesh.vertices.push(p);
        }
        self.top_index[[r, c]]
    }

    fn bottom(&mut self, r: usize, c: usize) -> u32 {
        if self.bottom_index[[r, c]] == UNSET {
            self.bottom_index[[r, c]] = self.mesh.vertices.len() as u32;
            let p = self.position(r, c, self.bottom[[r, c]]);
            self.mesh.vertices.push(p);
        }
        self.bottom_index[[r, c]]
    }

    /// Wall under the directed top edge u→v, interior on the left.
    fn wall(&mut self, u: (usize, usize), v: (usize, usize)) {
        let (ut, vt) = (self.top(u.0, u.1), self.top(v.0, v.1));
        let (ub, vb) = (self.bottom(u.0, u.1), self.bottom(v.0, v.1));
        self.mesh.triangles.push([ut, ub, vb]);
        self.mesh.triangles.push([ut, vb, vt]);
    }
}

/// Closed shell over the active cells: top surface at `top`, bottom at
/// `bottom` (both per grid vertex, millimetres), walls on the region border.
pub(super) fn build_shell(active: &Array2<bool>, top: &Array2<f64>, bottom: &Array2<f64>, dx: f64, dy: f64) -> Mesh {
    let dim = top.dim();
    let mut b = ShellBuilder {
        top,
        bottom,
        dx,
        dy,
        top_index: Array2::from_elem(dim, UNSET),
        bottom_index: Array2::from_elem(dim, UNSET),
        mesh: Mesh::default(),
    };
    let (cell_rows, cell_cols) = active.dim();
    let is_active = |r: isize, c: isize| {
        r >= 0 && c >= 0 && (r as usize) < cell_rows && (c as usize) < cell_cols && active[[r as usize, c as usize]]
    };

    for ((r, c), _) in active.indexed_iter().filter(|(_, a)| **a) {
        // a b
        // c d   (row grows downward, i.e. toward -Y)
        let (ta, tb, tc, td) = (b.top(r, c), b.top(r, c + 1), b.top(r + 1, c), b.top(r + 1, c + 1));
        b.mesh.triangles.push([tc, td, tb]);
        b.mesh.triangles.push([tc, tb, ta]);
        let (ba, bb, bc, bd) = (b.bottom(r, c), b.bottom(r, c + 1), b.bottom(r + 1, c), b.bottom(r + 1, c + 1));
        b.mesh.triangles.push([bc, bb, bd]);
        b.mesh.triangles.push([bc, ba, bb]);

        let (ri, ci) = (r as isize, c as isize);
        if !is_active(ri + 1, ci) {
            b.wall((r + 1, c), (r + 1, c + 1));
        }
        if !is_active(ri, ci + 1) {
            b.wall((r + 1, c + 1), (r, c + 1));
        }
        if !is_active(ri - 1, ci) {
            b.wall((r, c + 1), (r, c));
        }
        if !is_active(ri, ci - 1) {
            b.wall((r, c), (r + 1, c));
        }
    }
    b.mesh
}

pub struct HeightfieldSynthesizer {
    params: ReliefParams,
    masked: bool,
}

impl HeightfieldSynthesizer {
    pub fn new(config: &PipelineConfig, masked: bool) -> Self {
        Self { params: ReliefParams::from_config(config), masked }
    }
}

impl Synthesizer for HeightfieldSynthesizer {
    fn name(&self) -> &'static str {
        if self.masked { "relief" } else { "slab" }
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<Mesh, SynthesisError> {
        let grid = relief_grid(input, &self.params, self.masked)?;
        let dims = &self.params.dims;
        let (base, height) = dims.shell(self.params.synth.min_base_mm);
        let top = grid.heights.mapv(|h| base + h as f64 * height);
        let bottom = Array2::zeros(top.dim());

        let mesh = build_shell(&grid.active, &top, &bottom, grid.dx, grid.dy);
        if mesh.triangle_count() < 4 {
            return Err(SynthesisError::Degenerate { vertices: mesh.vertex_count(), triangles: mesh.triangle_count() });
        }
        info!(
            "{}: {} vertices, {} triangles from {} active cells",
            self.name(),
            mesh.vertex_count(),
            mesh.triangle_count(),
            grid.active.iter().filter(|a| **a).count()
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::DepthMap;
    use crate::mesh::analyze;
    use crate::segment::Mask;
    use image::RgbImage;

    fn config(target: usize) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.target_triangles = target;
        cfg.dimensions.width_mm = 80.0;
        cfg
    }

    fn run(depth: Array2<f32>, mask: Mask, masked: bool) -> Result<Mesh, SynthesisError> {
        let (h, w) = depth.dim();
        let image = RgbImage::new(w as u32, h as u32);
        let depth = DepthMap::from_raw(depth);
        let synth = HeightfieldSynthesizer::new(&config(1000), masked);
        synth.synthesize(&SynthesisInput { image: &image, depth: &depth, mask: &mask })
    }

    #[test]
    fn flat_depth_gives_closed_slab() {
        let mesh = run(Array2::zeros((32, 48)), Mask::full(32, 48), false).expect("slab");
        let report = analyze(&mesh);
        assert!(report.is_watertight(), "{report:?}");
        assert!(mesh.signed_volume() > 0.0);
        let b = mesh.bounds().expect("bounds");
        assert!((b.max.x - 80.0).abs() < 1e-9);
        assert!((b.max.y - 80.0 * 32.0 / 48.0).abs() < 1e-9);
        assert!((b.max.z - 4.0).abs() < 1e-9);
    }

    #[test]
    fn masked_relief_is_watertight_and_bounded() {
        let depth = Array2::from_shape_fn((40, 40), |(r, c)| (r + c) as f32);
        let mask = Mask::centered_disc(40, 40, 0.3);
        let mesh = run(depth, mask, true).expect("relief");
        let report = analyze(&mesh);
        assert!(report.is_watertight() && report.is_manifold(), "{report:?}");
        let b = mesh.bounds().expect("bounds");
        assert!(b.max.z <= 24.0 + 1e-9 && b.min.z >= 0.0);
        assert!(b.max.x < 80.0, "relief should stop inside the frame");
    }

    #[test]
    fn zero_base_stays_inside_the_height_envelope() {
        let mut cfg = config(1000);
        cfg.dimensions.base_mm = 0.0;
        let depth = DepthMap::from_raw(Array2::from_shape_fn((24, 24), |(r, c)| (r * c) as f32));
        let image = RgbImage::new(24, 24);
        let mask = Mask::full(24, 24);
        let synth = HeightfieldSynthesizer::new(&cfg, false);
        let mesh = synth.synthesize(&SynthesisInput { image: &image, depth: &depth, mask: &mask }).expect("slab");
        let b = mesh.bounds().expect("bounds");
        assert!(b.max.z <= 20.0 + 1e-9, "top at {}", b.max.z);
        assert!(b.min.z >= 0.0);
        assert!(analyze(&mesh).is_watertight());
    }

    #[test]
    fn empty_mask_is_an_error() {
        let err = run(Array2::zeros((16, 16)), Mask::from_values(Array2::zeros((16, 16))), true);
        assert!(matches!(err, Err(SynthesisError::EmptyMask(_))));
    }

    #[test]
    fn diagonal_cells_are_bridged() {
        let mut a = Array2::from_elem((2, 2), false);
        a[[0, 0]] = true;
        a[[1, 1]] = true;
        bridge_diagonals(&mut a);
        assert_eq!(a.iter().filter(|v| **v).count(), 3);

        let top = Array2::from_elem((3, 3), 1.0);
        let bottom = Array2::zeros((3, 3));
        let report = analyze(&build_shell(&a, &top, &bottom, 1.0, 1.0));
        assert!(report.is_watertight(), "{report:?}");
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let image = RgbImage::new(8, 8);
        let depth = DepthMap::from_raw(Array2::zeros((8, 8)));
        let mask = Mask::full(4, 4);
        let synth = HeightfieldSynthesizer::new(&config(1000), true);
        let err = synth.synthesize(&SynthesisInput { image: &image, depth: &depth, mask: &mask });
        assert!(matches!(err, Err(SynthesisError::ShapeMismatch { .. })));
    }
}
