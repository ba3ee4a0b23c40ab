//! Test support library
//! Synthetic images, quick configs and mesh invariants shared by the
//! integration tests.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use relief_engine::config::{DepthConfig, PipelineConfig, QualityProfile};
use relief_engine::mesh::{Mesh, analyze};

/// Uniform image.
pub fn solid_image(w: u32, h: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([value, value, value]))
}

/// Dark background with a bright, lightly textured disc in the middle.
pub fn subject_image(w: u32, h: u32) -> RgbImage {
    let (cx, cy, r) = (w as f32 / 2.0, h as f32 / 2.0, w.min(h) as f32 * 0.3);
    RgbImage::from_fn(w, h, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if d < r {
            let shade = (255.0 * (1.0 - 0.5 * d / r)) as u8;
            Rgb([shade, shade.saturating_sub(40), 60])
        } else {
            Rgb([20, 30, 40])
        }
    })
}

/// Smooth radial brightness falloff filling the frame.
pub fn dome_image(w: u32, h: u32) -> RgbImage {
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let max = (cx * cx + cy * cy).sqrt();
    RgbImage::from_fn(w, h, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt() / max;
        let v = (255.0 * (1.0 - d).clamp(0.0, 1.0)) as u8;
        Rgb([v, v, v])
    })
}

/// Defaults with the depth model disabled and a small triangle budget.
pub fn quick_config(target_triangles: usize) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.depth = DepthConfig { model_path: None, ..DepthConfig::default() };
    cfg.quality = QualityProfile::Normal;
    cfg.target_triangles = target_triangles;
    cfg
}

/// Non-empty, in-range indices, finite coordinates, no repeated corners.
pub fn assert_valid_mesh(mesh: &Mesh) {
    assert!(mesh.vertex_count() > 0, "mesh has no vertices");
    assert!(mesh.triangle_count() > 0, "mesh has no triangles");
    assert!(mesh.indices_valid(), "triangle index out of range");
    assert!(!mesh.has_non_finite(), "non-finite vertex coordinate");
    for t in &mesh.triangles {
        assert!(t[0] != t[1] && t[1] != t[2] && t[0] != t[2], "degenerate triangle {t:?}");
    }
}

pub fn assert_watertight(mesh: &Mesh) {
    let report = analyze(mesh);
    assert!(report.is_watertight(), "{report:?}");
}

/// Quick helper to compare floating-point results with an acceptable tolerance.
pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
}
