// config.rs - Run configuration and quality profiles
//
// Everything tunable lives here with the defaults the printing tools shipped
// with. Amplification coefficients and blend weights are empirical; treat
// them as starting points, not invariants.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::segment::SegmentStrategy;
use crate::synth::SynthesisMode;

/// Named bundle of density/smoothing/amplification knobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QualityProfile {
    Normal,
    #[default]
    High,
    Maximum,
}

/// Numeric knobs a profile expands to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualitySettings {
    pub min_grid: usize,
    pub max_grid: usize,
    pub grid_multiplier: f32,
    /// Scales the voxel surface threshold (lower = more sensitive).
    pub threshold_scale: f32,
    /// Added to the requested smoothing iteration count.
    pub extra_smoothing: usize,
    /// Ceiling for dynamic depth amplification.
    pub max_amplification: f32,
}

impl QualityProfile {
    pub fn settings(self) -> QualitySettings {
        match self {
            QualityProfile::Normal => QualitySettings {
                min_grid: 120,
                max_grid: 800,
                grid_multiplier: 0.8,
                threshold_scale: 1.0,
                extra_smoothing: 0,
                max_amplification: 1.8,
            },
            QualityProfile::High => QualitySettings {
                min_grid: 180,
                max_grid: 1200,
                grid_multiplier: 1.0,
                threshold_scale: 0.8,
                extra_smoothing: 2,
                max_amplification: 2.2,
            },
            QualityProfile::Maximum => QualitySettings {
                min_grid: 250,
                max_grid: 1600,
                grid_multiplier: 1.2,
                threshold_scale: 0.6,
                extra_smoothing: 5,
                max_amplification: 2.5,
            },
        }
    }
}

impl FromStr for QualityProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(QualityProfile::Normal),
            "high" | "alta" => Ok(QualityProfile::High),
            "maximum" | "max" | "maxima" => Ok(QualityProfile::Maximum),
            other => Err(format!("unknown quality profile '{other}' (normal, high, maximum)")),
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityProfile::Normal => "normal",
            QualityProfile::High => "high",
            QualityProfile::Maximum => "maximum",
        })
    }
}

/// Physical target size in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dimensions {
    /// X extent of the print.
    pub width_mm: f64,
    /// Y extent for volumetric models and fallback solids. Heightfields derive
    /// Y from the image aspect ratio instead.
    pub depth_mm: f64,
    /// Relief height above the base (heightfields) or total Z (voxels).
    pub max_height_mm: f64,
    pub base_mm: f64,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { width_mm: 100.0, depth_mm: 60.0, max_height_mm: 20.0, base_mm: 4.0 }
    }
}

impl Dimensions {
    /// Reject sizes no solid can be built from.
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [("width", self.width_mm), ("depth", self.depth_mm), ("height", self.max_height_mm)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(format!("{name} must be a positive number of millimetres, got {v}"));
            }
        }
        if !(self.base_mm.is_finite() && self.base_mm >= 0.0) {
            return Err(format!("base must be zero or more millimetres, got {}", self.base_mm));
        }
        Ok(())
    }

    /// Base and relief height actually built. A base thinner than `min_base`
    /// is thickened out of the relief height, so the top never rises above
    /// `base_mm + max_height_mm`.
    pub fn shell(&self, min_base: f64) -> (f64, f64) {
        let total = self.base_mm + self.max_height_mm;
        let base = self.base_mm.max(min_base.min(total));
        (base, total - base)
    }
}

/// How depth height is shaped before scaling to millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shaping {
    Identity,
    /// Logistic curve centred at 0.5, renormalised to [0,1].
    Sigmoid { steepness: f32 },
    Gamma(f32),
}

/// Coefficients for data-dependent relief amplification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Amplification {
    pub enabled: bool,
    pub base: f32,
    pub coverage_weight: f32,
    pub variance_weight: f32,
    pub range_weight: f32,
    pub min: f32,
}

impl Default for Amplification {
    fn default() -> Self {
        Self {
            enabled: false,
            base: 1.0,
            coverage_weight: 0.6,
            variance_weight: 4.0,
            range_weight: 0.5,
            min: 1.2,
        }
    }
}

/// Weights for blending model depth with luminance and edge detail.
/// Must sum to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnhanceWeights {
    pub depth: f32,
    pub luminance: f32,
    pub edges: f32,
}

impl EnhanceWeights {
    pub fn new(depth: f32, luminance: f32, edges: f32) -> Option<Self> {
        let sum = depth + luminance + edges;
        let valid = [depth, luminance, edges].iter().all(|w| w.is_finite() && *w >= 0.0);
        (valid && (sum - 1.0).abs() < 1e-4).then_some(Self { depth, luminance, edges })
    }
}

impl Default for EnhanceWeights {
    fn default() -> Self {
        Self { depth: 0.8, luminance: 0.1, edges: 0.1 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DepthConfig {
    /// ONNX model path; `None` skips the model and uses the proxy.
    pub model_path: Option<PathBuf>,
    /// Square input edge the network expects.
    pub model_input: u32,
    /// Requested compute backend. Only "cpu" is wired up.
    pub device: Option<String>,
    /// Local-contrast blend on model output (70% raw / 30% equalised).
    pub contrast_enhance: bool,
    pub enhance: Option<EnhanceWeights>,
    pub invert: bool,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            model_path: Some(default_model_path()),
            model_input: 256,
            device: None,
            contrast_enhance: true,
            enhance: None,
            invert: false,
        }
    }
}

pub fn default_model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/midas_small.onnx")
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentConfig {
    pub strategy: SegmentStrategy,
    /// Minimum foreground fraction before the centred fallback kicks in.
    pub min_coverage: f32,
    /// Fallback circle radius as a fraction of the shorter image side.
    pub fallback_radius: f32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self { strategy: SegmentStrategy::Interactive, min_coverage: 0.01, fallback_radius: 0.3 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthConfig {
    pub mode: SynthesisMode,
    /// Mask value above which a cell counts as inside.
    pub mask_threshold: f32,
    pub shaping: Shaping,
    pub amplification: Amplification,
    /// Voxel grid edge length R.
    pub voxel_resolution: usize,
    /// Base voxel surface threshold before the quality scale.
    pub voxel_threshold: f32,
    /// Drop surface vertices below this support percentile.
    pub support_trim_percentile: Option<f32>,
    /// Thinnest allowed back shell for full-figure mode.
    pub min_base_mm: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            mode: SynthesisMode::Heightfield { masked: true },
            mask_threshold: 0.3,
            shaping: Shaping::Identity,
            amplification: Amplification::default(),
            voxel_resolution: 64,
            voxel_threshold: 0.15,
            support_trim_percentile: None,
            min_base_mm: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SanitizeConfig {
    pub smoothing_iterations: usize,
    pub taubin_lambda: f64,
    pub taubin_mu: f64,
    /// Only smooth meshes with more triangles than this.
    pub smoothing_min_triangles: usize,
    /// Decimate only when above target by more than this fraction.
    pub decimate_tolerance: f64,
    /// Upper bound on quadric error for a single collapse, in mm².
    pub max_collapse_error: f64,
    /// Quadric weight for boundary-preserving constraint planes.
    pub boundary_weight: f64,
    pub close_holes: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            smoothing_iterations: 1,
            taubin_lambda: 0.5,
            taubin_mu: -0.53,
            smoothing_min_triangles: 1000,
            decimate_tolerance: 0.2,
            max_collapse_error: 1.0,
            boundary_weight: 100.0,
            close_holes: true,
        }
    }
}

/// Full run configuration, chosen once per invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub dimensions: Dimensions,
    pub quality: QualityProfile,
    pub target_triangles: usize,
    pub depth: DepthConfig,
    pub segment: SegmentConfig,
    pub synth: SynthConfig,
    pub sanitize: SanitizeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::default(),
            quality: QualityProfile::default(),
            target_triangles: 350_000,
            depth: DepthConfig::default(),
            segment: SegmentConfig::default(),
            synth: SynthConfig::default(),
            sanitize: SanitizeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Smoothing iterations after the profile's extra passes.
    pub fn effective_smoothing(&self) -> usize {
        self.sanitize.smoothing_iterations + self.quality.settings().extra_smoothing
    }

    /// Voxel surface threshold after the profile's sensitivity scale.
    pub fn effective_voxel_threshold(&self) -> f32 {
        self.synth.voxel_threshold * self.quality.settings().threshold_scale
    }
}
