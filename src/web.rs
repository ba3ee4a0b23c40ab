// web.rs - Browser bindings
//
// The page hands over an RGBA canvas buffer and gets a mesh back. Vertex and
// index buffers stay in wasm memory; JS views them through the ptr/len pairs
// (rebuild the views after any call that may grow memory). No depth model is
// available here, so depth always comes from the image proxy.

use std::str::FromStr;

use image::RgbImage;
use wasm_bindgen::prelude::*;

use crate::config::{Dimensions, PipelineConfig, QualityProfile};
use crate::mesh::{Mesh, to_obj_string, to_stl_binary};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::segment::SegmentStrategy;
use crate::synth::SynthesisMode;

fn js_error(msg: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&msg.to_string()).into()
}

/// Drop the alpha channel of a tightly packed RGBA buffer.
fn rgba_to_rgb(rgba: &[u8], width: u32, height: u32) -> Result<RgbImage, String> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 {
        return Err("image has zero area".into());
    }
    if rgba.len() != expected {
        return Err(format!("expected {expected} RGBA bytes for {width}x{height}, got {}", rgba.len()));
    }
    let rgb: Vec<u8> = rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect();
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| "buffer does not match dimensions".into())
}

fn build(config: &PipelineConfig, rgba: &[u8], width: u32, height: u32) -> Result<PipelineOutput, String> {
    let image = rgba_to_rgb(rgba, width, height)?;
    Pipeline::new(config.clone()).run(&image).map_err(|e| e.to_string())
}

fn apply_dimensions(config: &mut PipelineConfig, dims: Dimensions) -> Result<(), String> {
    dims.validate()?;
    config.dimensions = dims;
    Ok(())
}

fn apply_target(config: &mut PipelineConfig, target: u32) -> Result<(), String> {
    if target == 0 {
        return Err("target triangle count must be positive".into());
    }
    config.target_triangles = target as usize;
    Ok(())
}

fn parse<T: FromStr<Err = String>>(value: &str) -> Result<T, JsValue> {
    value.parse().map_err(js_error)
}

#[wasm_bindgen]
pub struct ReliefBuilder {
    config: PipelineConfig,
}

#[wasm_bindgen]
impl ReliefBuilder {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let mut config = PipelineConfig::default();
        config.depth.model_path = None;
        Self { config }
    }

    /// Sizes in mm. Rejected values leave the previous dimensions in place.
    pub fn set_dimensions(
        &mut self,
        width_mm: f64,
        depth_mm: f64,
        max_height_mm: f64,
        base_mm: f64,
    ) -> Result<(), JsValue> {
        let dims = Dimensions { width_mm, depth_mm, max_height_mm, base_mm };
        apply_dimensions(&mut self.config, dims).map_err(js_error)
    }

    pub fn set_target_triangles(&mut self, target: u32) -> Result<(), JsValue> {
        apply_target(&mut self.config, target).map_err(js_error)
    }

    pub fn set_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        self.config.synth.mode = parse::<SynthesisMode>(mode)?;
        Ok(())
    }

    pub fn set_quality(&mut self, quality: &str) -> Result<(), JsValue> {
        self.config.quality = parse::<QualityProfile>(quality)?;
        Ok(())
    }

    pub fn set_segment(&mut self, strategy: &str) -> Result<(), JsValue> {
        self.config.segment.strategy = parse::<SegmentStrategy>(strategy)?;
        Ok(())
    }

    pub fn set_invert(&mut self, invert: bool) {
        self.config.depth.invert = invert;
    }

    pub fn build(&self, rgba: &[u8], width: u32, height: u32) -> Result<ReliefMesh, JsValue> {
        let out = build(&self.config, rgba, width, height).map_err(js_error)?;
        let degraded = out.degraded();
        Ok(ReliefMesh::new(out.mesh, degraded))
    }
}

impl Default for ReliefBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
pub struct ReliefMesh {
    mesh: Mesh,
    positions: Vec<f32>,
    indices: Vec<u32>,
    degraded: bool,
}

impl ReliefMesh {
    fn new(mesh: Mesh, degraded: bool) -> Self {
        let positions = mesh.position_buffer();
        let indices = mesh.index_buffer();
        Self { mesh, positions, indices, degraded }
    }
}

#[wasm_bindgen]
impl ReliefMesh {
    pub fn positions_ptr(&self) -> *const f32 { self.positions.as_ptr() }
    pub fn positions_len(&self) -> usize { self.positions.len() }
    pub fn indices_ptr(&self) -> *const u32 { self.indices.as_ptr() }
    pub fn indices_len(&self) -> usize { self.indices.len() }
    pub fn vertex_count(&self) -> usize { self.mesh.vertex_count() }
    pub fn triangle_count(&self) -> usize { self.mesh.triangle_count() }

    /// Some stage fell back to a simpler result.
    pub fn degraded(&self) -> bool { self.degraded }

    pub fn to_obj(&self) -> String {
        to_obj_string(&self.mesh)
    }

    pub fn to_stl(&self) -> Result<Vec<u8>, JsValue> {
        to_stl_binary(&self.mesh).map_err(js_error)
    }
}
