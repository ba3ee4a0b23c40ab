// voxel.rs - Volumetric reconstruction from a density grid
//
// Each mask column fills an R×R×R grid from the floor up to a height set by
// depth, with density falling off toward the top of the column. The grid is
// smoothed, renormalised and handed to surface nets as a signed field
// (threshold − density, negative inside) padded with one empty layer so the
// extracted surface is closed.
//
// Volume layout is [z, y, x]; grid y grows toward the top of the image.

use fast_surface_nets::ndshape::Shape;
use fast_surface_nets::{SurfaceNetsBuffer, surface_nets};
use log::{debug, info, warn};
use nalgebra::{Point3, Vector3};
use ndarray::{Array2, Array3, ArrayViewMut2, Axis, Zip};

use super::{SynthesisInput, Synthesizer};
use crate::config::{Dimensions, PipelineConfig};
use crate::error::SynthesisError;
use crate::mesh::{Mesh, remove_unreferenced_vertices};
use crate::raster;

/// Mask value a column must exceed to be filled.
const COLUMN_MASK_THRESHOLD: f32 = 0.1;
/// Fraction of the grid height the tallest column reaches.
const COLUMN_HEIGHT_FRACTION: f32 = 0.85;
/// Density of a column's floor voxel before texture and edge terms.
const FLOOR_DENSITY: f32 = 0.8;
/// Width of the edge fade as a fraction of R.
const EDGE_MARGIN: f32 = 0.05;
/// A voxel counts as filled above this density (before smoothing).
const FILLED_DENSITY: f32 = 0.1;
/// Minimum share of mask pixels above the column threshold.
const MIN_MASK_COVERAGE: f32 = 0.01;

/// Smoothed, normalised density grid.
#[derive(Clone, Debug)]
pub struct VoxelVolume {
    pub density: Array3<f32>,
}

impl VoxelVolume {
    pub fn resolution(&self) -> usize {
        self.density.len_of(Axis(0))
    }

    /// Fill columns from the depth, mask and colour of `input`. Returns the
    /// volume and how many voxels were filled.
    pub fn fill(input: &SynthesisInput<'_>, resolution: usize) -> Result<(Self, usize), SynthesisError> {
        let (h, w) = input.dim()?;
        if h == 0 || w == 0 {
            return Err(SynthesisError::EmptyMask(0.0));
        }
        let r = resolution.max(4);
        let mask = input.mask.values();
        let depth = input.depth.values();

        let coverage = mask.iter().filter(|m| **m > COLUMN_MASK_THRESHOLD).count() as f32 / mask.len().max(1) as f32;
        if coverage < MIN_MASK_COVERAGE {
            return Err(SynthesisError::EmptyMask(coverage));
        }

        let step = 1.0 / (r - 1) as f32;
        let margin = r as f32 * EDGE_MARGIN;
        let edge = |i: usize| {
            let i = i as f32;
            if i < margin || i > r as f32 - margin { i.min(r as f32 - i) / margin } else { 1.0 }
        };

        // Per-column height (in voxels) and density scale, indexed [y, x].
        let mut heights = Array2::<f32>::zeros((r, r));
        let mut scales = Array2::<f32>::zeros((r, r));
        Zip::indexed(&mut heights).and(&mut scales).for_each(|(j, i), height, scale| {
            let px = i as f32 * step * (w - 1) as f32;
            let py = (1.0 - j as f32 * step) * (h - 1) as f32;
            let m = raster::sample_bilinear(mask, px, py);
            if m <= COLUMN_MASK_THRESHOLD {
                return;
            }
            let d = raster::sample_bilinear(depth, px, py).clamp(0.0, 1.0);
            let curve = 1.0 / (1.0 + (-5.0 * (d - 0.5)).exp());
            *height = (curve * r as f32 * COLUMN_HEIGHT_FRACTION).floor().max(1.0);

            let intensity = match input.image.dimensions() {
                (0, _) | (_, 0) => 0.5,
                (iw, ih) => {
                    let pixel = input.image.get_pixel((px as u32).min(iw - 1), (py as u32).min(ih - 1));
                    pixel.0.iter().map(|c| *c as f32).sum::<f32>() / (3.0 * 255.0)
                }
            };
            *scale = m * FLOOR_DENSITY * (0.9 + 0.2 * intensity) * edge(i) * edge(j);
        });

        let mut density = Array3::<f32>::zeros((r, r, r));
        for_each_slab(&mut density, |k, mut slab| {
            Zip::from(&mut slab).and(&heights).and(&scales).for_each(|v, &top, &scale| {
                if (k as f32) < top {
                    let ratio = k as f32 / top;
                    *v = (scale * (1.0 - ratio.powf(1.5))).min(1.0);
                }
            });
        });

        let filled = density.iter().filter(|v| **v > FILLED_DENSITY).count();
        debug!("voxel fill: {filled} of {} voxels, mask coverage {coverage:.3}", density.len());
        if filled == 0 {
            return Err(SynthesisError::EmptyVolume);
        }
        Ok((Self { density }, filled))
    }

    /// Gaussian blur, 3×3×3 median, then rescale so the peak is 1.
    pub fn smooth(&mut self) {
        let sigma = (self.resolution() as f32 / 256.0).max(0.5);
        let kernel = raster::gaussian_kernel(sigma);
        for axis in 0..3 {
            blur_axis(&mut self.density, Axis(axis), &kernel);
        }
        self.density = median3(&self.density);

        let peak = self.density.iter().copied().fold(0.0f32, f32::max);
        if peak > 0.0 {
            self.density.mapv_inplace(|v| v / peak);
        }
    }

    pub fn occupied(&self, threshold: f32) -> usize {
        self.density.iter().filter(|v| **v > threshold).count()
    }

    /// Surface at `threshold`, in voxel units (one empty layer of padding
    /// shifts coordinates by one).
    pub fn extract(&self, threshold: f32) -> SurfaceNetsBuffer {
        let r = self.resolution() as u32;
        let shape = PaddedShape { n: r + 2 };
        let mut field = vec![threshold; shape.usize()];
        for ((z, y, x), v) in self.density.indexed_iter() {
            field[shape.linearize([x as u32 + 1, y as u32 + 1, z as u32 + 1]) as usize] = threshold - v;
        }
        let mut buffer = SurfaceNetsBuffer::default();
        surface_nets(&field, &shape, [0; 3], shape.as_array().map(|x| x - 1), &mut buffer);
        buffer
    }

    /// Largest density in the voxel cell containing a padded-grid point.
    fn support(&self, [x, y, z]: [f32; 3]) -> f32 {
        let r = self.resolution() as isize;
        let (bx, by, bz) = (x.floor() as isize - 1, y.floor() as isize - 1, z.floor() as isize - 1);
        let mut best = 0.0f32;
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let (i, j, k) = (bx + dx, by + dy, bz + dz);
                    if (0..r).contains(&i) && (0..r).contains(&j) && (0..r).contains(&k) {
                        best = best.max(self.density[[k as usize, j as usize, i as usize]]);
                    }
                }
            }
        }
        best
    }
}

/// Cube grid with x varying fastest, as the density field is laid out.
#[derive(Clone, Copy)]
struct PaddedShape {
    n: u32,
}

impl Shape<3> for PaddedShape {
    type Coord = u32;

    fn size(&self) -> Self::Coord {
        self.n * self.n * self.n
    }

    fn usize(&self) -> usize {
        self.size() as usize
    }

    fn as_array(&self) -> [Self::Coord; 3] {
        [self.n; 3]
    }

    fn linearize(&self, [x, y, z]: [Self::Coord; 3]) -> Self::Coord {
        (z * self.n + y) * self.n + x
    }

    fn delinearize(&self, index: Self::Coord) -> [Self::Coord; 3] {
        let z = index / (self.n * self.n);
        let rem = index % (self.n * self.n);
        [rem % self.n, rem / self.n, z]
    }
}

fn for_each_slab<F>(volume: &mut Array3<f32>, slab: F)
where
    F: Fn(usize, ArrayViewMut2<f32>) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use ndarray::parallel::prelude::*;
        volume
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(k, s)| slab(k, s));
    }
    #[cfg(not(feature = "parallel"))]
    {
        volume.axis_iter_mut(Axis(0)).enumerate().for_each(|(k, s)| slab(k, s));
    }
}

/// Separable pass along one axis, clamped at the borders.
fn blur_axis(volume: &mut Array3<f32>, axis: Axis, kernel: &[f32]) {
    let src = volume.clone();
    let r = kernel.len() / 2;
    Zip::from(volume.lanes_mut(axis)).and(src.lanes(axis)).for_each(|mut out, lane| {
        let n = lane.len();
        for t in 0..n {
            out[t] = kernel.iter().enumerate().map(|(k, kv)| kv * lane[(t + k).saturating_sub(r).min(n - 1)]).sum();
        }
    });
}

fn median3(volume: &Array3<f32>) -> Array3<f32> {
    let (nz, ny, nx) = volume.dim();
    let clamp = |v: usize, d: isize, n: usize| (v as isize + d).clamp(0, n as isize - 1) as usize;
    let mut window = Vec::with_capacity(27);
    Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| {
        window.clear();
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    window.push(volume[[clamp(z, dz, nz), clamp(y, dy, ny), clamp(x, dx, nx)]]);
                }
            }
        }
        let (_, m, _) = window.select_nth_unstable_by(13, f32::total_cmp);
        *m
    })
}

pub struct VoxelSynthesizer {
    dims: Dimensions,
    resolution: usize,
    threshold: f32,
    trim_percentile: Option<f32>,
}

impl VoxelSynthesizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dims: config.dimensions,
            resolution: config.synth.voxel_resolution,
            threshold: config.effective_voxel_threshold(),
            trim_percentile: config.synth.support_trim_percentile,
        }
    }

    fn to_mesh(&self, volume: &VoxelVolume, buffer: &SurfaceNetsBuffer) -> Mesh {
        let span = (volume.resolution() - 1) as f64;
        let scale = Vector3::new(self.dims.width_mm / span, self.dims.depth_mm / span, self.dims.max_height_mm / span);
        let vertices = buffer
            .positions
            .iter()
            .map(|&[x, y, z]| {
                Point3::new((x as f64 - 1.0) * scale.x, (y as f64 - 1.0) * scale.y, (z as f64 - 1.0) * scale.z)
            })
            .collect();
        let triangles = buffer.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect();
        let mut mesh = Mesh::new(vertices, triangles);

        // Field gradients point outward; wind faces to agree with them.
        let agree: isize = mesh
            .triangles
            .iter()
            .map(|t| {
                let n = t.iter().fold(Vector3::zeros(), |acc, &i| {
                    let [x, y, z] = buffer.normals[i as usize];
                    acc + Vector3::new(x as f64 * scale.x, y as f64 * scale.y, z as f64 * scale.z)
                });
                if mesh.face_cross(t).dot(&n) >= 0.0 { 1 } else { -1 }
            })
            .sum();
        if agree < 0 {
            mesh.flip_all();
        }

        if let Some(bounds) = mesh.bounds() {
            mesh.translate(Vector3::new(0.0, 0.0, -bounds.min.z));
        }
        mesh
    }

    /// Drop vertices whose density support is in the bottom `percentile`.
    fn trim_low_support(mesh: &mut Mesh, volume: &VoxelVolume, buffer: &SurfaceNetsBuffer, percentile: f32) {
        let support: Vec<f32> = buffer.positions.iter().map(|p| volume.support(*p)).collect();
        let mut sorted = support.clone();
        sorted.sort_unstable_by(f32::total_cmp);
        let idx = ((percentile.clamp(0.0, 100.0) / 100.0) * (sorted.len().saturating_sub(1)) as f32) as usize;
        let Some(&cutoff) = sorted.get(idx) else { return };

        let before = mesh.triangle_count();
        mesh.triangles.retain(|t| t.iter().all(|&i| support[i as usize] >= cutoff));
        remove_unreferenced_vertices(mesh);
        debug!("support trim at {percentile}%: {} triangles dropped", before - mesh.triangle_count());
    }
}

impl Synthesizer for VoxelSynthesizer {
    fn name(&self) -> &'static str {
        "voxel"
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<Mesh, SynthesisError> {
        let (mut volume, filled) = VoxelVolume::fill(input, self.resolution)?;
        volume.smooth();
        let occupied = volume.occupied(self.threshold);
        if occupied == 0 {
            warn!("no voxel above threshold {:.3} after smoothing", self.threshold);
            return Err(SynthesisError::EmptyVolume);
        }

        let buffer = volume.extract(self.threshold);
        if buffer.positions.is_empty() {
            return Err(SynthesisError::NoSurfacePoints);
        }
        let mut mesh = self.to_mesh(&volume, &buffer);
        if let Some(p) = self.trim_percentile {
            Self::trim_low_support(&mut mesh, &volume, &buffer, p);
        }
        if mesh.vertex_count() < 4 || mesh.triangle_count() < 4 {
            return Err(SynthesisError::Degenerate { vertices: mesh.vertex_count(), triangles: mesh.triangle_count() });
        }
        info!(
            "voxel: R={}, {filled} filled, {occupied} above {:.3}, {} vertices, {} triangles",
            volume.resolution(),
            self.threshold,
            mesh.vertex_count(),
            mesh.triangle_count()
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
    use image::{Rgb, RgbImage};

    fn config(resolution: usize) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.synth.voxel_resolution = resolution;
        cfg
    }

    fn inputs(mask: Mask) -> (RgbImage, DepthMap, Mask) {
        let (h, w) = mask.dim();
        let image = RgbImage::from_pixel(w as u32, h as u32, Rgb([128, 128, 128]));
        let depth = DepthMap::from_raw(Array2::from_shape_fn((h, w), |(r, c)| {
            let (dy, dx) = (r as f32 - h as f32 / 2.0, c as f32 - w as f32 / 2.0);
            -(dx * dx + dy * dy).sqrt()
        }));
        (image, depth, mask)
    }

    #[test]
    fn disc_mask_gives_closed_outward_surface() {
        let (image, depth, mask) = inputs(Mask::centered_disc(48, 48, 0.35));
        let mesh = VoxelSynthesizer::new(&config(24))
            .synthesize(&SynthesisInput { image: &image, depth: &depth, mask: &mask })
            .expect("voxel mesh");
        let report = analyze(&mesh);
        assert_eq!(report.boundary_edges, 0, "{report:?}");
        assert!(mesh.signed_volume() > 0.0);

        let b = mesh.bounds().expect("bounds");
        assert!(b.min.z.abs() < 1e-9);
        let d = Dimensions::default();
        assert!(b.max.x <= d.width_mm && b.max.y <= d.depth_mm && b.max.z <= d.max_height_mm);
    }

    #[test]
    fn empty_mask_is_rejected() {
        let (image, depth, mask) = inputs(Mask::from_values(Array2::zeros((20, 20))));
        let err = VoxelSynthesizer::new(&config(16)).synthesize(&SynthesisInput { image: &image, depth: &depth, mask: &mask });
        assert!(matches!(err, Err(SynthesisError::EmptyMask(_))));
    }

    #[test]
    fn smoothing_renormalises() {
        let (image, depth, mask) = inputs(Mask::full(16, 16));
        let (mut volume, filled) =
            VoxelVolume::fill(&SynthesisInput { image: &image, depth: &depth, mask: &mask }, 12).expect("fill");
        assert!(filled > 0);
        volume.smooth();
        let peak = volume.density.iter().copied().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
        assert!(volume.density.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn padded_shape_round_trips() {
        let s = PaddedShape { n: 5 };
        for idx in [0u32, 7, 31, 124] {
            assert_eq!(s.linearize(s.delinearize(idx)), idx);
        }
    }

    #[test]
    fn support_trim_removes_geometry() {
        let (image, depth, mask) = inputs(Mask::centered_disc(48, 48, 0.35));
        let input = SynthesisInput { image: &image, depth: &depth, mask: &mask };
        let full = VoxelSynthesizer::new(&config(20)).synthesize(&input).expect("full");
        let mut cfg = config(20);
        cfg.synth.support_trim_percentile = Some(10.0);
        let trimmed = VoxelSynthesizer::new(&cfg).synthesize(&input).expect("trimmed");
        assert!(trimmed.triangle_count() < full.triangle_count());
    }
}
