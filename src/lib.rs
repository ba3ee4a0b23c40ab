// relief-engine - Printable meshes from single images
//
// One image goes in; an OBJ or STL comes out. Depth comes from an ONNX
// monocular depth model when one is available and from the image itself
// otherwise. The subject is separated from the background, turned into a
// relief, figure or voxel solid, and cleaned until it is safe to slice.
//
// The same pipeline runs natively (img2mesh) and in the browser (web).

pub mod color;
pub mod config;
pub mod depth;
pub mod error;
pub mod mesh;
pub mod pipeline;
pub mod raster;
pub mod sanitize;
pub mod segment;
pub mod synth;
pub mod web;

pub use config::{Dimensions, PipelineConfig, QualityProfile};
pub use depth::{DepthEstimator, DepthMap, DepthModel, DepthSource};
pub use error::{DepthError, MeshIoError, PipelineError, SegmentError, SynthesisError};
pub use mesh::{Mesh, MeshFormat};
pub use pipeline::{LogObserver, Pipeline, PipelineOutput, Stage, StageEvent, StageObserver};
pub use sanitize::{SanitizeReport, Sanitizer};
pub use segment::{Mask, SegmentStrategy, Segmenter};
pub use synth::{SynthesisMode, Synthesizer};
