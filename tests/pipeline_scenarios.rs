mod support;

use image::RgbImage;
use ndarray::Array2;
use relief_engine::config::DepthConfig;
use relief_engine::depth::{DepthEstimator, DepthModel, DepthSource};
use relief_engine::error::DepthError;
use relief_engine::mesh::{MeshFormat, analyze, validate_obj};
use relief_engine::sanitize::Sanitizer;
use relief_engine::synth::SynthesisMode;
use relief_engine::{Pipeline, QualityProfile};

use support::*;

/// Model that always errors, as a broken runtime or corrupt weights would.
struct FailingModel;

impl DepthModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn infer(&mut self, _image: &RgbImage) -> Result<Array2<f32>, DepthError> {
        Err(DepthError::OutputShape(vec![1, 0]))
    }
}

#[test]
fn solid_gray_image_gives_bounded_mesh() {
    let mut cfg = quick_config(1000);
    cfg.dimensions.width_mm = 80.0;
    cfg.dimensions.max_height_mm = 20.0;
    let (base, height) = (cfg.dimensions.base_mm, cfg.dimensions.max_height_mm);

    let out = Pipeline::new(cfg).run(&solid_image(64, 64, 128)).expect("pipeline");
    assert_valid_mesh(&out.mesh);
    let b = out.mesh.bounds().expect("bounds");
    assert!(b.max.z - b.min.z <= base + height + 1e-6, "height {}", b.max.z - b.min.z);
}

#[test]
fn zero_base_never_exceeds_requested_height() {
    let mut cfg = quick_config(2000);
    cfg.synth.mode = SynthesisMode::Heightfield { masked: false };
    cfg.dimensions.base_mm = 0.0;
    cfg.dimensions.max_height_mm = 20.0;

    let out = Pipeline::new(cfg).run(&dome_image(60, 40)).expect("pipeline");
    assert_watertight(&out.mesh);
    let b = out.mesh.bounds().expect("bounds");
    assert!(b.max.z <= 20.0 + 1e-6, "top at {}", b.max.z);
    assert!(b.max.z > 10.0, "relief should still rise, top at {}", b.max.z);
}

#[test]
fn empty_foreground_falls_back_to_centred_mask() {
    let cfg = quick_config(3000);
    let width = cfg.dimensions.width_mm;
    let out = Pipeline::new(cfg).run(&solid_image(80, 80, 200)).expect("pipeline");

    assert!(out.mask_fallback);
    assert!(!out.synthesis_fallback);
    assert_valid_mesh(&out.mesh);

    let b = out.mesh.bounds().expect("bounds");
    let centre = (b.min.x + b.max.x) / 2.0;
    assert!(approx_eq(centre, width / 2.0, width * 0.05), "centre {centre}");
    assert!(b.extent().x < width * 0.9, "fallback disc should not span the frame");
}

#[test]
fn model_failure_uses_proxy_transparently() {
    let cfg = quick_config(2000);
    let estimator = DepthEstimator::with_model(DepthConfig::default(), Box::new(FailingModel));
    assert!(estimator.is_ready());

    let mut pipeline = Pipeline::new(cfg).with_depth_estimator(estimator);
    let out = pipeline.run(&subject_image(64, 48)).expect("pipeline");
    assert_eq!(out.depth_source, DepthSource::Proxy);
    assert_valid_mesh(&out.mesh);
}

#[test]
fn large_image_is_decimated_to_budget() {
    let mut cfg = quick_config(50_000);
    cfg.quality = QualityProfile::Normal;
    cfg.synth.mode = SynthesisMode::Heightfield { masked: false };

    let out = Pipeline::new(cfg).run(&dome_image(400, 300)).expect("pipeline");
    let n = out.mesh.triangle_count() as f64;
    assert!((40_000.0..=60_000.0).contains(&n), "{n} triangles");
    assert_watertight(&out.mesh);
}

#[test]
fn black_frame_gives_flat_closed_slab() {
    let mut cfg = quick_config(2000);
    cfg.synth.mode = SynthesisMode::Heightfield { masked: false };
    let base = cfg.dimensions.base_mm;

    let out = Pipeline::new(cfg).run(&solid_image(40, 30, 0)).expect("pipeline");
    assert_watertight(&out.mesh);
    let b = out.mesh.bounds().expect("bounds");
    assert!(approx_eq(b.max.z, base, 1e-6) && approx_eq(b.min.z, 0.0, 1e-6));
    assert!(out.mesh.signed_volume() > 0.0);
}

#[test]
fn sanitizing_pipeline_output_again_is_stable() {
    let cfg = quick_config(8000);
    let sanitizer = Sanitizer::new(&cfg);
    let out = Pipeline::new(cfg).run(&subject_image(96, 72)).expect("pipeline");
    let watertight = analyze(&out.mesh).is_watertight();

    let (again, report) = sanitizer.sanitize(out.mesh.clone());
    assert!(!report.fell_back);
    let drift = (again.triangle_count() as f64 - out.mesh.triangle_count() as f64).abs();
    assert!(drift <= out.mesh.triangle_count() as f64 * 0.05, "drift {drift}");
    assert!(again.vertex_count() <= out.mesh.vertex_count());
    if watertight {
        assert_watertight(&again);
    }
}

#[test]
fn every_mode_writes_a_valid_obj() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("subject.png");
    subject_image(72, 60).save(&input).expect("write png");

    for mode in ["relief", "slab", "figure", "voxel"] {
        let mut cfg = quick_config(3000);
        cfg.synth.mode = mode.parse().expect("mode");
        cfg.synth.voxel_resolution = 24;
        let output = dir.path().join(format!("{mode}.obj"));

        let (out, format) = Pipeline::new(cfg).run_file(&input, &output).expect("run");
        assert_eq!(format, MeshFormat::Obj);
        assert!(!out.synthesis_fallback, "{mode} fell back");

        let text = std::fs::read_to_string(&output).expect("read obj");
        let report = validate_obj(&text);
        assert!(report.is_valid(), "{mode}: {report:?}");
        assert_eq!(report.vertices, out.mesh.vertex_count());
        assert_eq!(report.faces, out.mesh.triangle_count());
    }
}

#[test]
fn stl_output_has_one_record_per_triangle() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("dome.png");
    dome_image(50, 40).save(&input).expect("write png");
    let output = dir.path().join("dome.stl");

    let (out, format) = Pipeline::new(quick_config(2000)).run_file(&input, &output).expect("run");
    assert_eq!(format, MeshFormat::StlBinary);
    let len = std::fs::metadata(&output).expect("stat").len() as usize;
    assert_eq!(len, 84 + 50 * out.mesh.triangle_count());
}
