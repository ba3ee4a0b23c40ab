// morph.rs - Binary morphology
//
// Out-of-bounds pixels are ignored, so erosion does not eat in from the
// image border and dilation does not grow out of it.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use ndarray::Array2;

use super::convert::{from_mask_image, mask_image};

/// Structuring element, by radius. `Disc(r)` is the Euclidean ball.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    Square(usize),
    Disc(usize),
}

impl Element {
    fn norm(self) -> (Norm, u8) {
        match self {
            Element::Square(r) => (Norm::LInf, r.min(u8::MAX as usize) as u8),
            Element::Disc(r) => (Norm::L2, r.min(u8::MAX as usize) as u8),
        }
    }
}

fn apply(mask: &Array2<bool>, element: Element, op: fn(&GrayImage, Norm, u8) -> GrayImage) -> Array2<bool> {
    if mask.is_empty() {
        return mask.clone();
    }
    let (norm, k) = element.norm();
    from_mask_image(&op(&mask_image(mask), norm, k))
}

pub fn dilate(mask: &Array2<bool>, element: Element) -> Array2<bool> {
    apply(mask, element, morphology::dilate)
}

pub fn erode(mask: &Array2<bool>, element: Element) -> Array2<bool> {
    apply(mask, element, morphology::erode)
}

/// Dilate then erode: bridges small gaps.
pub fn close(mask: &Array2<bool>, element: Element) -> Array2<bool> {
    apply(mask, element, morphology::close)
}

/// Erode then dilate: drops specks.
pub fn open(mask: &Array2<bool>, element: Element) -> Array2<bool> {
    apply(mask, element, morphology::open)
}

pub fn threshold(field: &Array2<f32>, t: f32) -> Array2<bool> {
    field.mapv(|v| v > t)
}

pub fn to_field(mask: &Array2<bool>) -> Array2<f32> {
    mask.mapv(|b| if b { 1.0 } else { 0.0 })
}
