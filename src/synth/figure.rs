// figure.rs - Two-sided relief with a shaped back
//
// The front is the usual relief. The back bulges away from the base plane in
// proportion to the distance from the silhouette plus a share of the front
// depth, so the figure reads as rounded from both sides. The shell is then
// lifted to sit on z = 0.

use log::info;
use nalgebra::Vector3;
use ndarray::Array2;

use super::heightfield::{ReliefParams, build_shell, relief_grid};
use super::{SynthesisInput, Synthesizer};
use crate::config::PipelineConfig;
use crate::error::SynthesisError;
use crate::mesh::Mesh;
use crate::raster;

/// Back depth weights, as fractions of the relief height.
const SILHOUETTE_WEIGHT: f64 = 0.5;
const FRONT_WEIGHT: f64 = 0.25;

pub struct FigureSynthesizer {
    params: ReliefParams,
}

impl FigureSynthesizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self { params: ReliefParams::from_config(config) }
    }
}

impl Synthesizer for FigureSynthesizer {
    fn name(&self) -> &'static str {
        "figure"
    }

    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<Mesh, SynthesisError> {
        let grid = relief_grid(input, &self.params, true)?;
        let dims = &self.params.dims;
        let min_base = self.params.synth.min_base_mm.max(0.1);
        let (base, height) = dims.shell(min_base);

        let dist = raster::distance_transform(&grid.inside);
        let max_dist = dist.iter().copied().fold(0.0f32, f32::max);
        let dist_n = if max_dist > 0.0 { dist.mapv(|d| (d / max_dist) as f64) } else { Array2::zeros(dist.dim()) };

        let top = grid.heights.mapv(|h| base + h as f64 * height);
        let bottom = Array2::from_shape_fn(top.dim(), |(r, c)| {
            let bulge = (SILHOUETTE_WEIGHT * dist_n[[r, c]] + FRONT_WEIGHT * grid.heights[[r, c]] as f64) * height;
            let back = base - bulge;
            back.min(top[[r, c]] - min_base)
        });

        let mut mesh = build_shell(&grid.active, &top, &bottom, grid.dx, grid.dy);
        if mesh.triangle_count() < 4 {
            return Err(SynthesisError::Degenerate { vertices: mesh.vertex_count(), triangles: mesh.triangle_count() });
        }
        if let Some(bounds) = mesh.bounds() {
            mesh.translate(Vector3::new(0.0, 0.0, -bounds.min.z));
        }
        info!("figure: {} vertices, {} triangles", mesh.vertex_count(), mesh.triangle_count());
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

    #[test]
    fn figure_is_closed_and_rests_on_plane() {
        let mut cfg = PipelineConfig::default();
        cfg.target_triangles = 2000;
        let depth = DepthMap::from_raw(Array2::from_shape_fn((40, 40), |(r, c)| ((r * c) % 7) as f32));
        let mask = Mask::centered_disc(40, 40, 0.35);
        let image = RgbImage::new(40, 40);

        let mesh = FigureSynthesizer::new(&cfg)
            .synthesize(&SynthesisInput { image: &image, depth: &depth, mask: &mask })
            .expect("figure");
        let report = analyze(&mesh);
        assert!(report.is_watertight(), "{report:?}");
        assert!(mesh.signed_volume() > 0.0);

        let b = mesh.bounds().expect("bounds");
        assert!(b.min.z.abs() < 1e-9);
        // The back drops below the base plane before the lift.
        assert!(b.max.z > cfg.dimensions.base_mm + 1.0);
    }
}
