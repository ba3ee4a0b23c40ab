// segment/ - Foreground extraction
//
// Every strategy yields a soft mask in [0, 1] at image resolution. The
// segmenter guarantees a usable mask: when a strategy finds (almost)
// nothing, a centred disc stands in for the subject.

mod cluster;
mod contour;
mod interactive;

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use log::{debug, warn};
use ndarray::Array2;

use crate::config::SegmentConfig;
use crate::error::SegmentError;

/// Soft foreground mask, indexed [row, col].
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    values: Array2<f32>,
}

impl Mask {
    /// Clamp to [0, 1]; non-finite values count as background.
    pub fn from_values(mut values: Array2<f32>) -> Self {
        values.mapv_inplace(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 });
        Self { values }
    }

    pub fn from_binary(mask: &Array2<bool>) -> Self {
        Self { values: crate::raster::to_field(mask) }
    }

    pub fn full(height: usize, width: usize) -> Self {
        Self { values: Array2::ones((height, width)) }
    }

    /// Disc centred in the frame with radius `radius_frac * min(h, w)`.
    pub fn centered_disc(height: usize, width: usize, radius_frac: f32) -> Self {
        let (cy, cx) = (height as f32 / 2.0, width as f32 / 2.0);
        let r = radius_frac * height.min(width) as f32;
        let values = Array2::from_shape_fn((height, width), |(y, x)| {
            let (dy, dx) = (y as f32 + 0.5 - cy, x as f32 + 0.5 - cx);
            if dx * dx + dy * dy <= r * r { 1.0 } else { 0.0 }
        });
        Self { values }
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.values[[y, x]]
    }

    /// Fraction of pixels above `threshold`.
    pub fn coverage(&self, threshold: f32) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().filter(|&&v| v > threshold).count() as f32 / self.values.len() as f32
    }

    pub fn binary(&self, threshold: f32) -> Array2<bool> {
        crate::raster::threshold(&self.values, threshold)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentStrategy {
    /// Two-cluster k-means scored by texture, centrality and contrast.
    Cluster,
    /// Largest closed edge contour, Otsu threshold when none is found.
    Contour,
    /// Iterative colour-model refinement from a centred rectangle.
    #[default]
    Interactive,
}

impl FromStr for SegmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cluster" | "kmeans" => Ok(SegmentStrategy::Cluster),
            "contour" | "edges" => Ok(SegmentStrategy::Contour),
            "interactive" | "grabcut" => Ok(SegmentStrategy::Interactive),
            other => Err(format!("unknown segmentation strategy '{other}' (cluster, contour, interactive)")),
        }
    }
}

impl fmt::Display for SegmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SegmentStrategy::Cluster => "cluster",
            SegmentStrategy::Contour => "contour",
            SegmentStrategy::Interactive => "interactive",
        })
    }
}

#[derive(Clone, Debug)]
pub struct Segmentation {
    pub mask: Mask,
    /// The strategy came back near-empty and the centred disc was used.
    pub fell_back: bool,
}

pub struct Segmenter {
    config: SegmentConfig,
}

impl Segmenter {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, image: &RgbImage) -> Result<Segmentation, SegmentError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(SegmentError::EmptyImage);
        }

        let mask = match self.config.strategy {
            SegmentStrategy::Cluster => cluster::segment(image),
            SegmentStrategy::Contour => contour::segment(image),
            SegmentStrategy::Interactive => interactive::segment(image),
        };

        let coverage = mask.coverage(0.5);
        debug!("{} segmentation coverage {:.3}", self.config.strategy, coverage);
        if coverage < self.config.min_coverage {
            let err = SegmentError::LowCoverage { coverage, floor: self.config.min_coverage };
            warn!("{err}, using centred fallback mask");
            let mask = Mask::centered_disc(h as usize, w as usize, self.config.fallback_radius);
            return Ok(Segmentation { mask, fell_back: true });
        }
        Ok(Segmentation { mask, fell_back: false })
    }
}
