// sanitize.rs - Mesh cleanup before export
//
// A linear sequence of passes over the synthesized mesh: scrub, index
// cleanup, topology repair, smoothing, decimation, final validation. Passes
// that can damage geometry (smoothing, decimation, hole capping) are checked
// afterwards and rolled back when they did. Whenever the mesh runs empty, the
// fallback solid takes its place. Counts never grow except through that
// substitution.

use log::{debug, info, warn};

use crate::config::{Dimensions, PipelineConfig, SanitizeConfig};
use crate::mesh::{
    DecimateParams, Mesh, TopologyReport, analyze, close_holes, decimate, fallback_solid, merge_duplicate_vertices,
    orient_consistently, orient_outward, remove_degenerate_triangles, remove_duplicate_triangles,
    remove_non_manifold_faces, remove_out_of_range_triangles, remove_unreferenced_vertices, scrub_non_finite_vertices,
    taubin_smooth,
};

/// Vertices closer than this (mm) are welded.
const WELD_TOLERANCE: f64 = 1e-6;
/// Faces smaller than this (mm²) are dropped.
const MIN_FACE_AREA: f64 = 1e-12;

/// What each pass did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SanitizeReport {
    pub input_vertices: usize,
    pub input_triangles: usize,
    pub non_finite_scrubbed: usize,
    pub out_of_range_removed: usize,
    pub welded: usize,
    pub degenerate_removed: usize,
    pub duplicates_removed: usize,
    pub unreferenced_removed: usize,
    pub non_manifold_removed: usize,
    pub faces_flipped: usize,
    pub orientable: bool,
    pub holes_closed: usize,
    pub smoothed: bool,
    /// Triangle count before and after, when decimation was kept.
    pub decimated: Option<(usize, usize)>,
    /// The mesh was replaced by the fallback solid.
    pub fell_back: bool,
    pub topology: Option<TopologyReport>,
}

pub struct Sanitizer {
    config: SanitizeConfig,
    smoothing_iterations: usize,
    target_triangles: usize,
    dims: Dimensions,
}

impl Sanitizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.sanitize,
            smoothing_iterations: config.effective_smoothing(),
            target_triangles: config.target_triangles,
            dims: config.dimensions,
        }
    }

    pub fn with_target(mut self, target_triangles: usize) -> Self {
        self.target_triangles = target_triangles;
        self
    }

    /// Clean `mesh` for export. The result is never empty.
    pub fn sanitize(&self, mut mesh: Mesh) -> (Mesh, SanitizeReport) {
        let mut report = SanitizeReport {
            input_vertices: mesh.vertex_count(),
            input_triangles: mesh.triangle_count(),
            orientable: true,
            ..SanitizeReport::default()
        };

        report.non_finite_scrubbed = scrub_non_finite_vertices(&mut mesh);
        report.out_of_range_removed = remove_out_of_range_triangles(&mut mesh);
        report.welded = merge_duplicate_vertices(&mut mesh, WELD_TOLERANCE);
        report.degenerate_removed = remove_degenerate_triangles(&mut mesh, MIN_FACE_AREA);
        report.duplicates_removed = remove_duplicate_triangles(&mut mesh);
        report.unreferenced_removed = remove_unreferenced_vertices(&mut mesh);
        if mesh.is_empty() {
            return self.fall_back(report, "index cleanup");
        }

        self.repair_topology(&mut mesh, &mut report);
        if mesh.is_empty() {
            return self.fall_back(report, "topology repair");
        }

        self.smooth(&mut mesh, &mut report);
        self.reduce(&mut mesh, &mut report);

        report.out_of_range_removed += remove_out_of_range_triangles(&mut mesh);
        report.degenerate_removed += remove_degenerate_triangles(&mut mesh, 0.0);
        report.unreferenced_removed += remove_unreferenced_vertices(&mut mesh);
        report.non_finite_scrubbed += scrub_non_finite_vertices(&mut mesh);
        if mesh.is_empty() {
            return self.fall_back(report, "final validation");
        }

        let topology = analyze(&mesh);
        log_summary(&mesh, &topology);
        report.topology = Some(topology);
        (mesh, report)
    }

    fn repair_topology(&self, mesh: &mut Mesh, report: &mut SanitizeReport) {
        report.non_manifold_removed = remove_non_manifold_faces(mesh);
        if report.non_manifold_removed > 0 {
            report.unreferenced_removed += remove_unreferenced_vertices(mesh);
        }

        let outcome = orient_consistently(mesh);
        report.faces_flipped = outcome.flipped;
        report.orientable = outcome.orientable;
        if !outcome.orientable {
            warn!("mesh is not orientable; winding left partially inconsistent");
        }

        if self.config.close_holes && analyze(mesh).boundary_edges > 0 {
            self.cap_holes(mesh, report);
        }
        report.faces_flipped += orient_outward(mesh);
    }

    /// Cap boundary loops. Caps that push the face count past the input are
    /// decimated away again, or dropped when that fails.
    fn cap_holes(&self, mesh: &mut Mesh, report: &mut SanitizeReport) {
        let before = mesh.clone();
        let closed = close_holes(mesh, None);
        if closed == 0 {
            return;
        }
        let ceiling = report.input_triangles;
        if mesh.triangle_count() > ceiling {
            let params = DecimateParams {
                target_triangles: ceiling,
                boundary_weight: self.config.boundary_weight,
                ..DecimateParams::default()
            };
            let result = decimate(mesh, &params);
            if result.final_triangles <= ceiling && is_usable(&result.mesh) {
                *mesh = result.mesh;
            } else {
                warn!("hole caps would exceed the input face count; leaving {closed} holes open");
                *mesh = before;
                return;
            }
        }
        debug!("closed {closed} holes");
        report.holes_closed = closed;
    }

    fn smooth(&self, mesh: &mut Mesh, report: &mut SanitizeReport) {
        if self.smoothing_iterations == 0 || mesh.triangle_count() <= self.config.smoothing_min_triangles {
            return;
        }
        let Some(bounds) = mesh.bounds() else { return };
        let before = mesh.vertices.clone();
        taubin_smooth(mesh, self.config.taubin_lambda, self.config.taubin_mu, self.smoothing_iterations, true);
        if mesh.has_non_finite() {
            warn!("smoothing produced non-finite coordinates; keeping unsmoothed mesh");
            mesh.vertices = before;
            return;
        }
        for p in &mut mesh.vertices {
            *p = bounds.clamp(*p);
        }
        report.smoothed = true;
    }

    fn reduce(&self, mesh: &mut Mesh, report: &mut SanitizeReport) {
        let count = mesh.triangle_count();
        let limit = self.target_triangles as f64 * (1.0 + self.config.decimate_tolerance);
        if self.target_triangles == 0 || (count as f64) <= limit {
            return;
        }
        let params = DecimateParams {
            target_triangles: self.target_triangles,
            max_error: self.config.max_collapse_error,
            boundary_weight: self.config.boundary_weight,
            ..DecimateParams::default()
        };
        let result = decimate(mesh, &params);
        if !is_usable(&result.mesh) {
            warn!("decimation produced an unusable mesh; keeping {count} triangles");
            return;
        }
        if !result.reached_target {
            warn!(
                "decimation stopped at {} triangles (target {}) to stay within the error bound",
                result.final_triangles, self.target_triangles
            );
        }
        report.decimated = Some((count, result.final_triangles));
        *mesh = result.mesh;
    }

    fn fall_back(&self, mut report: SanitizeReport, stage: &str) -> (Mesh, SanitizeReport) {
        warn!("mesh empty after {stage}; substituting fallback solid");
        let mesh = fallback_solid(&self.dims);
        report.fell_back = true;
        report.topology = Some(analyze(&mesh));
        (mesh, report)
    }
}

fn is_usable(mesh: &Mesh) -> bool {
    mesh.vertex_count() >= 3 && mesh.triangle_count() >= 1 && mesh.indices_valid() && !mesh.has_non_finite()
}

fn log_summary(mesh: &Mesh, topology: &TopologyReport) {
    let extent = mesh.bounds().map(|b| b.extent()).unwrap_or_else(nalgebra::Vector3::zeros);
    info!(
        "final mesh: {} vertices, {} triangles, {:.1}x{:.1}x{:.1} mm, watertight {}, manifold {}, oriented {}",
        mesh.vertex_count(),
        mesh.triangle_count(),
        extent.x,
        extent.y,
        extent.z,
        topology.is_watertight(),
        topology.is_manifold(),
        topology.consistent_orientation
    );
    if !topology.is_watertight() {
        warn!(
            "mesh is not watertight: {} boundary edges, {} non-manifold edges",
            topology.boundary_edges, topology.non_manifold_edges
        );
    }
}
