// error.rs - Error types for each pipeline stage
//
// Stages return these; the orchestrator decides whether a failure is
// recovered locally (fallback) or propagated to the caller.

use std::path::PathBuf;

/// Depth estimation failures. Never surfaced past `DepthEstimator::estimate`.
#[derive(Debug, thiserror::Error)]
pub enum DepthError {
    #[error("depth model not loaded")]
    NotLoaded,
    #[error("depth model file not found: {0}")]
    ModelMissing(PathBuf),
    #[cfg(not(target_arch = "wasm32"))]
    #[error("onnx runtime: {0}")]
    Runtime(#[from] ort::Error),
    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),
    #[error("model produced no finite values")]
    NonFinite,
}

#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("image has zero area")]
    EmptyImage,
    #[error("segmentation produced {coverage:.4} coverage, below floor {floor:.4}")]
    LowCoverage { coverage: f32, floor: f32 },
}

/// Geometry synthesis failures. Recovered by the orchestrator with a fallback solid.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("mask coverage {0:.4} too low to build geometry")]
    EmptyMask(f32),
    #[error("voxel fill produced no occupied cells")]
    EmptyVolume,
    #[error("surface extraction produced no points")]
    NoSurfacePoints,
    #[error("synthesized mesh is degenerate ({vertices} vertices, {triangles} triangles)")]
    Degenerate { vertices: usize, triangles: usize },
    #[error("depth map {depth:?} and mask {mask:?} differ in shape")]
    ShapeMismatch { depth: (usize, usize), mask: (usize, usize) },
}

#[derive(Debug, thiserror::Error)]
pub enum MeshIoError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to write an empty mesh to {0}")]
    Empty(PathBuf),
    #[error("mesh contains non-finite coordinates")]
    NonFinite,
}

/// Terminal pipeline failures: only bad input and failed writes reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to read input image {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("input image has zero area")]
    EmptyInput,
    #[error(transparent)]
    Write(#[from] MeshIoError),
    #[error("geometry is empty even after fallback")]
    EmptyGeometry,
}
