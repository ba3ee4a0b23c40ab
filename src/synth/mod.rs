// synth/ - Geometry synthesis from depth and mask
//
// Three strategies share one contract: take a depth map, a mask and the
// image, return a mesh in millimetres with Z up. Failures are returned, not
// papered over; the orchestrator owns the fallback solid.

mod figure;
mod grid;
mod heightfield;
mod shaping;
mod voxel;

pub use figure::FigureSynthesizer;
pub use grid::*;
pub use heightfield::HeightfieldSynthesizer;
pub use shaping::*;
pub use voxel::{VoxelSynthesizer, VoxelVolume};

use std::fmt;
use std::str::FromStr;

use image::RgbImage;

use crate::config::PipelineConfig;
use crate::depth::DepthMap;
use crate::error::SynthesisError;
use crate::mesh::Mesh;
use crate::segment::Mask;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesisMode {
    /// Front relief over a flat back. `masked` restricts it to the subject.
    Heightfield { masked: bool },
    /// Density volume extracted as an isosurface.
    VolumetricVoxel,
    /// Two-sided relief with a shaped back shell.
    FullFigure,
}

impl SynthesisMode {
    /// Whether segmentation has to run for this mode.
    pub fn uses_mask(self) -> bool {
        !matches!(self, SynthesisMode::Heightfield { masked: false })
    }
}

impl FromStr for SynthesisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relief" | "heightfield" | "masked" => Ok(SynthesisMode::Heightfield { masked: true }),
            "slab" | "frame" | "full-frame" => Ok(SynthesisMode::Heightfield { masked: false }),
            "voxel" | "volumetric" => Ok(SynthesisMode::VolumetricVoxel),
            "figure" | "full-figure" => Ok(SynthesisMode::FullFigure),
            other => Err(format!("unknown mode '{other}' (relief, slab, voxel, figure)")),
        }
    }
}

impl fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SynthesisMode::Heightfield { masked: true } => "relief",
            SynthesisMode::Heightfield { masked: false } => "slab",
            SynthesisMode::VolumetricVoxel => "voxel",
            SynthesisMode::FullFigure => "figure",
        })
    }
}

/// Everything a synthesizer reads. Depth and mask share the image's shape.
#[derive(Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub image: &'a RgbImage,
    pub depth: &'a DepthMap,
    pub mask: &'a Mask,
}

impl SynthesisInput<'_> {
    /// (rows, cols), or an error if depth and mask disagree.
    pub fn dim(&self) -> Result<(usize, usize), SynthesisError> {
        let (depth, mask) = (self.depth.dim(), self.mask.dim());
        if depth != mask {
            return Err(SynthesisError::ShapeMismatch { depth, mask });
        }
        Ok(depth)
    }
}

pub trait Synthesizer {
    fn name(&self) -> &'static str;

    fn synthesize(&self, input: &SynthesisInput<'_>) -> Result<Mesh, SynthesisError>;
}

pub fn synthesizer_for(config: &PipelineConfig) -> Box<dyn Synthesizer> {
    match config.synth.mode {
        SynthesisMode::Heightfield { masked } => Box::new(HeightfieldSynthesizer::new(config, masked)),
        SynthesisMode::VolumetricVoxel => Box::new(VoxelSynthesizer::new(config)),
        SynthesisMode::FullFigure => Box::new(FigureSynthesizer::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for m in [
            SynthesisMode::Heightfield { masked: true },
            SynthesisMode::Heightfield { masked: false },
            SynthesisMode::VolumetricVoxel,
            SynthesisMode::FullFigure,
        ] {
            assert_eq!(m.to_string().parse::<SynthesisMode>(), Ok(m));
        }
        assert!("mesh".parse::<SynthesisMode>().is_err());
    }

    #[test]
    fn only_full_frame_skips_segmentation() {
        assert!(!SynthesisMode::Heightfield { masked: false }.uses_mask());
        assert!(SynthesisMode::Heightfield { masked: true }.uses_mask());
        assert!(SynthesisMode::VolumetricVoxel.uses_mask());
    }
}
