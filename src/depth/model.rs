// model.rs - ONNX depth inference (MiDaS)
//
// Runs a MiDaS-style network through onnxruntime. Output is raw inverse
// depth at network resolution; the estimator resizes and normalises it.

use std::path::Path;

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Value;

use super::DepthModel;
use crate::error::DepthError;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct OnnxDepthModel {
    session: Session,
    input_size: u32,
    name: String,
}

impl OnnxDepthModel {
    pub fn load(path: &Path, input_size: u32) -> Result<Self, DepthError> {
        if !path.exists() {
            return Err(DepthError::ModelMissing(path.to_path_buf()));
        }
        let session = Session::builder()?.commit_from_file(path)?;
        let name = path.file_stem().map_or_else(|| "onnx".into(), |s| s.to_string_lossy().into_owned());
        Ok(Self { session, input_size, name })
    }
}

impl DepthModel for OnnxDepthModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&mut self, image: &RgbImage) -> Result<Array2<f32>, DepthError> {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Lanczos3);

        // Prepare input tensor
        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, p) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (p[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            }
        }

        let input_val = Value::from_array(input)?;
        let input_name = self.session.inputs.first().map(|i| i.name.clone()).unwrap_or_else(|| "image".into());
        let outputs = self.session.run(ort::inputs![input_name => input_val])?;
        let arr = outputs[0].try_extract_array::<f32>()?;

        let shape = arr.shape().to_vec();
        let (oh, ow) = match shape.len() {
            4 => (shape[2], shape[3]),
            3 => (shape[1], shape[2]),
            2 => (shape[0], shape[1]),
            _ => return Err(DepthError::OutputShape(shape)),
        };

        let flat: Vec<f32> = arr.iter().copied().collect();
        Array2::from_shape_vec((oh, ow), flat).map_err(|_| DepthError::OutputShape(shape))
    }
}
