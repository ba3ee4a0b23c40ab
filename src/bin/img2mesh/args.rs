// args.rs - Command-line flags
//
// Long names follow the older tools (widthMM, targetTris, ...) as aliases so
// existing scripts keep working.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

use relief_engine::config::{Amplification, PipelineConfig, QualityProfile, Shaping};
use relief_engine::segment::SegmentStrategy;
use relief_engine::synth::SynthesisMode;

#[derive(Parser, Debug)]
#[command(name = "img2mesh")]
#[command(about = "Turn a single image into a printable OBJ/STL mesh", long_about = None)]
pub struct Args {
    /// Input image (png, jpeg, bmp, gif, webp)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output mesh; `.obj` writes OBJ, `.stla` ASCII STL, anything else binary STL
    #[arg(short, long)]
    pub output: PathBuf,

    /// Print width in mm
    #[arg(long, alias = "widthMM", default_value_t = 100.0)]
    pub width: f64,

    /// Footprint depth in mm (voxel and fallback solids)
    #[arg(long, alias = "depthMM", default_value_t = 60.0)]
    pub depth: f64,

    /// Relief height above the base in mm
    #[arg(long, alias = "maxHeightMM", default_value_t = 20.0)]
    pub height: f64,

    /// Base thickness in mm
    #[arg(long, alias = "baseMM", default_value_t = 4.0)]
    pub base: f64,

    /// Triangle budget for the final mesh
    #[arg(long = "target-tris", alias = "targetTris", default_value_t = 350_000)]
    pub target_tris: usize,

    /// Voxel grid edge length for `--mode voxel`
    #[arg(long, default_value_t = 64)]
    pub resolution: usize,

    /// Taubin smoothing iterations (the quality profile may add more)
    #[arg(long, default_value_t = 1)]
    pub smoothing: usize,

    /// Mask threshold for reliefs, surface threshold for voxels
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Swap near and far in the depth map
    #[arg(long)]
    pub invert: bool,

    /// normal, high or maximum
    #[arg(long, default_value = "high")]
    pub quality: QualityProfile,

    /// relief, slab, voxel or figure
    #[arg(long, default_value = "relief")]
    pub mode: SynthesisMode,

    /// interactive, cluster or contour
    #[arg(long, default_value = "interactive")]
    pub segment: SegmentStrategy,

    /// ONNX depth model (defaults to models/midas_small.onnx)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Skip the depth model and use the image proxy
    #[arg(long)]
    pub no_model: bool,

    /// Older spelling of `--no-model false/true`
    #[arg(long = "useMiDaS", value_name = "BOOL")]
    pub use_midas: Option<bool>,

    /// Compute backend for the depth model (only cpu is supported)
    #[arg(long)]
    pub device: Option<String>,

    /// Scale relief contrast from subject coverage and depth spread
    #[arg(long)]
    pub amplify: bool,

    /// Sigmoid steepness for the height curve
    #[arg(long, conflicts_with = "gamma")]
    pub sigmoid: Option<f32>,

    /// Gamma exponent for the height curve
    #[arg(long)]
    pub gamma: Option<f32>,

    /// Drop voxel surface vertices below this support percentile
    #[arg(long)]
    pub trim: Option<f32>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn to_config(&self) -> Result<PipelineConfig> {
        if self.target_tris == 0 {
            bail!("--target-tris must be positive");
        }

        let mut cfg = PipelineConfig::default();
        cfg.dimensions.width_mm = self.width;
        cfg.dimensions.depth_mm = self.depth;
        cfg.dimensions.max_height_mm = self.height;
        cfg.dimensions.base_mm = self.base;
        if let Err(msg) = cfg.dimensions.validate() {
            bail!("--{msg}");
        }
        cfg.quality = self.quality;
        cfg.target_triangles = self.target_tris;

        if let Some(model) = &self.model {
            cfg.depth.model_path = Some(model.clone());
        }
        if self.no_model || self.use_midas == Some(false) {
            cfg.depth.model_path = None;
        }
        cfg.depth.device = self.device.clone();
        cfg.depth.invert = self.invert;

        cfg.segment.strategy = self.segment;
        cfg.synth.mode = self.mode;
        cfg.synth.voxel_resolution = self.resolution.clamp(8, 512);
        cfg.synth.support_trim_percentile = self.trim;
        cfg.synth.amplification = Amplification { enabled: self.amplify, ..Amplification::default() };
        cfg.synth.shaping = match (self.sigmoid, self.gamma) {
            (Some(steepness), _) => Shaping::Sigmoid { steepness },
            (_, Some(g)) => Shaping::Gamma(g),
            _ => Shaping::Identity,
        };
        if let Some(t) = self.threshold {
            if !(0.0..1.0).contains(&t) {
                bail!("--threshold must be in [0, 1), got {t}");
            }
            match self.mode {
                SynthesisMode::VolumetricVoxel => cfg.synth.voxel_threshold = t,
                _ => cfg.synth.mask_threshold = t,
            }
        }
        cfg.sanitize.smoothing_iterations = self.smoothing;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["img2mesh", "-i", "in.png", "-o", "out.stl"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).expect("valid flags")
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let args = parse(&["--widthMM", "80", "--maxHeightMM", "12", "--baseMM", "2", "--targetTris", "1000"]);
        let cfg = args.to_config().expect("config");
        assert_eq!(cfg.dimensions.width_mm, 80.0);
        assert_eq!(cfg.dimensions.max_height_mm, 12.0);
        assert_eq!(cfg.dimensions.base_mm, 2.0);
        assert_eq!(cfg.target_triangles, 1000);
    }

    #[test]
    fn threshold_goes_to_the_active_mode() {
        let cfg = parse(&["--mode", "voxel", "--threshold", "0.2"]).to_config().expect("config");
        assert_eq!(cfg.synth.voxel_threshold, 0.2);
        let cfg = parse(&["--threshold", "0.4"]).to_config().expect("config");
        assert_eq!(cfg.synth.mask_threshold, 0.4);
    }

    #[test]
    fn model_can_be_disabled() {
        assert!(parse(&["--no-model"]).to_config().expect("config").depth.model_path.is_none());
        assert!(parse(&["--useMiDaS", "false"]).to_config().expect("config").depth.model_path.is_none());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse(&["--width=-5"]).to_config().is_err());
        assert!(parse(&["--height", "0"]).to_config().is_err());
        assert!(parse(&["--base=-1"]).to_config().is_err());
        assert!(parse(&["--target-tris", "0"]).to_config().is_err());
        assert!(Args::try_parse_from(["img2mesh", "-i", "a.png", "-o", "b.stl", "--quality", "ultra"]).is_err());
    }

    #[test]
    fn zero_base_is_accepted() {
        let cfg = parse(&["--base", "0", "--height", "20"]).to_config().expect("config");
        assert_eq!(cfg.dimensions.base_mm, 0.0);
        let (base, height) = cfg.dimensions.shell(cfg.synth.min_base_mm);
        assert!(base + height <= 20.0 + 1e-9);
    }
}
