// pipeline.rs - Image to printable mesh
//
// estimate depth → segment → synthesize → sanitize → write
//
// Each stage reports a StageEvent to the observer. Stage failures are
// recovered here: the depth proxy stands in for the model, the centred disc
// for an empty mask, the fallback solid for failed synthesis. Only unreadable
// input and failed writes reach the caller.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use image::RgbImage;
use log::{debug, info, warn};
use web_time::Instant;

use crate::config::PipelineConfig;
use crate::depth::{DepthEstimator, DepthSource, ProxyKind};
use crate::error::PipelineError;
use crate::mesh::{self, Mesh, MeshFormat, fallback_solid};
use crate::sanitize::{SanitizeReport, Sanitizer};
use crate::segment::{Mask, Segmenter};
use crate::synth::{SynthesisInput, SynthesisMode, synthesizer_for};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Depth,
    Segment,
    Synthesize,
    Sanitize,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Depth => "depth",
            Stage::Segment => "segment",
            Stage::Synthesize => "synthesize",
            Stage::Sanitize => "sanitize",
            Stage::Write => "write",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageEvent {
    pub stage: Stage,
    pub elapsed: Duration,
    /// The stage substituted a fallback for its normal output.
    pub fallback: bool,
}

/// Receives one event per completed stage.
pub trait StageObserver {
    fn on_stage(&self, event: &StageEvent);
}

/// Forwards stage events to the `log` facade.
pub struct LogObserver;

impl StageObserver for LogObserver {
    fn on_stage(&self, event: &StageEvent) {
        if event.fallback {
            warn!("stage {} finished in {:.1?} using fallback", event.stage, event.elapsed);
        } else {
            info!("stage {} finished in {:.1?}", event.stage, event.elapsed);
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub mesh: Mesh,
    pub depth_source: DepthSource,
    /// Segmentation came back near-empty and the centred disc was used.
    pub mask_fallback: bool,
    /// Synthesis failed and the fallback solid was used.
    pub synthesis_fallback: bool,
    pub report: SanitizeReport,
}

impl PipelineOutput {
    /// Any stage degraded its output.
    pub fn degraded(&self) -> bool {
        self.depth_source == DepthSource::Proxy || self.mask_fallback || self.synthesis_fallback || self.report.fell_back
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    estimator: DepthEstimator,
    observer: Box<dyn StageObserver>,
}

/// Proxy that suits a synthesis mode: voxel columns want crisper edges.
fn proxy_for(mode: SynthesisMode) -> ProxyKind {
    match mode {
        SynthesisMode::VolumetricVoxel => ProxyKind::EdgeBlend,
        _ => ProxyKind::Refined,
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let estimator = DepthEstimator::new(config.depth.clone()).with_proxy(proxy_for(config.synth.mode));
        Self { config, estimator, observer: Box::new(LogObserver) }
    }

    /// Replace the depth estimator, e.g. with one wrapping a custom model.
    pub fn with_depth_estimator(mut self, estimator: DepthEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn depth_estimator(&mut self) -> &mut DepthEstimator {
        &mut self.estimator
    }

    fn report(&self, stage: Stage, started: Instant, fallback: bool) {
        self.observer.on_stage(&StageEvent { stage, elapsed: started.elapsed(), fallback });
    }

    pub fn run(&mut self, image: &RgbImage) -> Result<PipelineOutput, PipelineError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(PipelineError::EmptyInput);
        }
        let mode = self.config.synth.mode;
        info!("{w}x{h} image, mode {mode}, quality {}, target {} triangles", self.config.quality, self.config.target_triangles);

        let started = Instant::now();
        let depth = self.estimator.estimate(image);
        self.report(Stage::Depth, started, depth.source == DepthSource::Proxy);

        let started = Instant::now();
        let (mask, mask_fallback) = if mode.uses_mask() {
            match Segmenter::new(self.config.segment).segment(image) {
                Ok(s) => (s.mask, s.fell_back),
                Err(e) => {
                    warn!("segmentation failed ({e}), using centred mask");
                    (Mask::centered_disc(h as usize, w as usize, self.config.segment.fallback_radius), true)
                }
            }
        } else {
            (Mask::full(h as usize, w as usize), false)
        };
        debug!("mask coverage {:.3}", mask.coverage(0.5));
        self.report(Stage::Segment, started, mask_fallback);

        let started = Instant::now();
        let synthesizer = synthesizer_for(&self.config);
        let input = SynthesisInput { image, depth: &depth.map, mask: &mask };
        let (raw, synthesis_fallback) = match synthesizer.synthesize(&input) {
            Ok(m) => (m, false),
            Err(e) => {
                warn!("{} synthesis failed ({e}), using fallback solid", synthesizer.name());
                (fallback_solid(&self.config.dimensions), true)
            }
        };
        self.report(Stage::Synthesize, started, synthesis_fallback);

        let started = Instant::now();
        let (mesh, report) = Sanitizer::new(&self.config).sanitize(raw);
        self.report(Stage::Sanitize, started, report.fell_back);
        if mesh.is_empty() {
            return Err(PipelineError::EmptyGeometry);
        }

        Ok(PipelineOutput { mesh, depth_source: depth.source, mask_fallback, synthesis_fallback, report })
    }

    /// Read `input`, run, and write the mesh to `output` in the format its
    /// extension names.
    pub fn run_file(&mut self, input: &Path, output: &Path) -> Result<(PipelineOutput, MeshFormat), PipelineError> {
        let image = image::open(input)
            .map_err(|source| PipelineError::Input { path: input.to_path_buf(), source })?
            .to_rgb8();
        let out = self.run(&image)?;

        let started = Instant::now();
        let format = mesh::save(&out.mesh, output)?;
        self.report(Stage::Write, started, false);
        Ok((out, format))
    }
}
