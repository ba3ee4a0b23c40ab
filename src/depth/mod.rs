// depth/ - Per-pixel relative depth estimation
//
// A DepthMap is finite, normalised to [0, 1], near = high, and has the
// input image's shape. The estimator never fails: when the model is absent
// or errors, it degrades to an image-derived proxy and says so.

#[cfg(not(target_arch = "wasm32"))]
mod model;
mod proxy;

#[cfg(not(target_arch = "wasm32"))]
pub use model::OnnxDepthModel;
pub use proxy::*;

use image::RgbImage;
use log::{debug, info, warn};
use ndarray::{Array2, Zip};

use crate::color::luminance_field;
use crate::config::{DepthConfig, EnhanceWeights};
use crate::error::DepthError;
use crate::raster;

/// Normalised relative depth, indexed [row, col].
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    values: Array2<f32>,
}

impl DepthMap {
    /// Scrub, then normalise arbitrary-range values. Higher input = nearer.
    pub fn from_raw(mut values: Array2<f32>) -> Self {
        raster::normalize(&mut values);
        Self { values }
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.values[[y, x]]
    }

    /// Swap near and far.
    pub fn invert(&mut self) {
        self.values.mapv_inplace(|v| 1.0 - v);
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.values
    }
}

/// Where a depth map came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthSource {
    Model,
    Proxy,
}

/// Whether a model reports larger values for nearer or farther points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthConvention {
    NearHigh,
    FarHigh,
}

/// Image-derived stand-in used when no model is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProxyKind {
    /// Unsharp + bilateral luminance.
    #[default]
    Refined,
    /// Luminance blended with Canny edges.
    EdgeBlend,
}

/// A monocular depth network. Output may be any size and range.
pub trait DepthModel {
    fn name(&self) -> &str;

    fn convention(&self) -> DepthConvention {
        DepthConvention::NearHigh
    }

    fn infer(&mut self, image: &RgbImage) -> Result<Array2<f32>, DepthError>;
}

#[derive(Clone, Debug)]
pub struct DepthEstimate {
    pub map: DepthMap,
    pub source: DepthSource,
}

/// Lazily loads a depth model once and falls back to a proxy on any failure.
pub struct DepthEstimator {
    config: DepthConfig,
    proxy: ProxyKind,
    model: Option<Box<dyn DepthModel>>,
    load_attempted: bool,
}

impl DepthEstimator {
    /// No model is touched until the first estimate or `try_load`.
    pub fn new(config: DepthConfig) -> Self {
        Self { config, proxy: ProxyKind::default(), model: None, load_attempted: false }
    }

    /// Use an already constructed model instead of loading from disk.
    pub fn with_model(config: DepthConfig, model: Box<dyn DepthModel>) -> Self {
        Self { config, proxy: ProxyKind::default(), model: Some(model), load_attempted: true }
    }

    pub fn with_proxy(mut self, proxy: ProxyKind) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn set_proxy(&mut self, proxy: ProxyKind) {
        self.proxy = proxy;
    }

    /// Load the model if configured. Only the first call does any work.
    pub fn try_load(&mut self) -> bool {
        if self.model.is_some() {
            return true;
        }
        if self.load_attempted {
            return false;
        }
        self.load_attempted = true;
        match self.load() {
            Ok(model) => {
                info!("depth model '{}' loaded", model.name());
                self.model = Some(model);
                true
            }
            Err(e) => {
                warn!("depth model unavailable ({e}), using image proxy");
                false
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn load(&self) -> Result<Box<dyn DepthModel>, DepthError> {
        let path = self.config.model_path.as_ref().ok_or(DepthError::NotLoaded)?;
        if let Some(device) = self.config.device.as_deref().filter(|d| !d.eq_ignore_ascii_case("cpu")) {
            warn!("device '{device}' not supported, running depth model on cpu");
        }
        Ok(Box::new(OnnxDepthModel::load(path, self.config.model_input)?))
    }

    #[cfg(target_arch = "wasm32")]
    fn load(&self) -> Result<Box<dyn DepthModel>, DepthError> {
        Err(DepthError::NotLoaded)
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn estimate(&mut self, image: &RgbImage) -> DepthEstimate {
        let (w, h) = image.dimensions();
        let gray = luminance_field(image);

        let (mut values, source) = match self.infer_model(image, h as usize, w as usize) {
            Ok(v) => (v, DepthSource::Model),
            Err(reason) => {
                if self.model.is_some() {
                    warn!("depth inference failed ({reason}), using image proxy");
                } else {
                    debug!("no depth model: {reason}");
                }
                let proxy = match self.proxy {
                    ProxyKind::Refined => refined_proxy(&gray),
                    ProxyKind::EdgeBlend => edge_blend_proxy(&gray),
                };
                (proxy, DepthSource::Proxy)
            }
        };

        if let Some(weights) = self.config.enhance {
            values = enhance(&values, &gray, weights);
        }

        let mut map = DepthMap::from_raw(values);
        if self.config.invert {
            map.invert();
        }
        DepthEstimate { map, source }
    }

    fn infer_model(&mut self, image: &RgbImage, h: usize, w: usize) -> Result<Array2<f32>, DepthError> {
        if !self.try_load() {
            return Err(DepthError::NotLoaded);
        }
        let model = self.model.as_mut().ok_or(DepthError::NotLoaded)?;
        let raw = model.infer(image)?;
        if raster::finite_min_max(&raw).is_none() {
            return Err(DepthError::NonFinite);
        }

        let mut depth = raster::resize_bicubic(&raw, h, w);
        raster::normalize(&mut depth);
        if model.convention() == DepthConvention::FarHigh {
            depth.mapv_inplace(|v| 1.0 - v);
        }
        if self.config.contrast_enhance {
            let local = raster::local_contrast(&depth, 16, 2.0);
            Zip::from(&mut depth).and(&local).for_each(|d, &l| *d = 0.7 * *d + 0.3 * l);
        }
        Ok(depth)
    }
}

/// Blend depth with luminance and edge detail. Output is re-normalised.
pub fn enhance(depth: &Array2<f32>, gray: &Array2<f32>, weights: EnhanceWeights) -> Array2<f32> {
    let mut edges = raster::gradient_magnitude(gray);
    raster::normalize(&mut edges);
    let mut out = depth.clone();
    Zip::from(&mut out).and(gray).and(&edges).for_each(|d, &g, &e| {
        *d = weights.depth * *d + weights.luminance * g + weights.edges * e;
    });
    raster::normalize(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct Ramp(DepthConvention);

    impl DepthModel for Ramp {
        fn name(&self) -> &str {
            "ramp"
        }
        fn convention(&self) -> DepthConvention {
            self.0
        }
        fn infer(&mut self, _: &RgbImage) -> Result<Array2<f32>, DepthError> {
            Ok(Array2::from_shape_fn((8, 8), |(_, x)| x as f32 * 10.0))
        }
    }

    struct Broken;

    impl DepthModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn infer(&mut self, _: &RgbImage) -> Result<Array2<f32>, DepthError> {
            Ok(Array2::from_elem((4, 4), f32::NAN))
        }
    }

    fn quiet() -> DepthConfig {
        DepthConfig { model_path: None, contrast_enhance: false, ..DepthConfig::default() }
    }

    fn gradient_image() -> RgbImage {
        RgbImage::from_fn(24, 16, |x, _| Rgb([(x * 10) as u8; 3]))
    }

    #[test]
    fn no_model_path_means_proxy() {
        let mut est = DepthEstimator::new(quiet());
        let out = est.estimate(&gradient_image());
        assert_eq!(out.source, DepthSource::Proxy);
        assert!(!est.is_ready());
        assert_eq!(out.map.dim(), (16, 24));
        assert!(out.map.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn missing_model_file_falls_back() {
        let cfg = DepthConfig { model_path: Some("/nonexistent/model.onnx".into()), ..quiet() };
        let mut est = DepthEstimator::new(cfg);
        assert!(!est.try_load());
        assert_eq!(est.estimate(&gradient_image()).source, DepthSource::Proxy);
    }

    #[test]
    fn model_output_is_resized_and_oriented() {
        let mut near = DepthEstimator::with_model(quiet(), Box::new(Ramp(DepthConvention::NearHigh)));
        let out = near.estimate(&gradient_image());
        assert_eq!(out.source, DepthSource::Model);
        assert_eq!(out.map.dim(), (16, 24));
        assert!(out.map.get(8, 23) > out.map.get(8, 0));

        let mut far = DepthEstimator::with_model(quiet(), Box::new(Ramp(DepthConvention::FarHigh)));
        let out = far.estimate(&gradient_image());
        assert!(out.map.get(8, 23) < out.map.get(8, 0));
    }

    #[test]
    fn non_finite_model_output_uses_proxy() {
        let mut est = DepthEstimator::with_model(quiet(), Box::new(Broken));
        let out = est.estimate(&gradient_image());
        assert_eq!(out.source, DepthSource::Proxy);
        assert!(out.map.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn invert_flips_depth() {
        let cfg = DepthConfig { invert: true, ..quiet() };
        let mut est = DepthEstimator::with_model(cfg, Box::new(Ramp(DepthConvention::NearHigh)));
        let out = est.estimate(&gradient_image());
        assert!(out.map.get(8, 0) > out.map.get(8, 23));
    }
}
