// convert.rs - Moving fields in and out of image buffers
//
// imageproc works on `image` buffers addressed (x, y); fields here are
// `Array2` addressed [row, col]. Masks travel as 0/255 gray images.

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array2;

pub(crate) type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

pub(crate) fn float_image(field: &Array2<f32>) -> FloatImage {
    let (h, w) = field.dim();
    ImageBuffer::from_fn(w as u32, h as u32, |x, y| Luma([field[[y as usize, x as usize]]]))
}

pub(crate) fn from_float_image(img: &FloatImage) -> Array2<f32> {
    Array2::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0]
    })
}

/// [0,1] field to 8-bit gray, clamping out-of-range values.
pub(crate) fn gray_image(field: &Array2<f32>) -> GrayImage {
    let (h, w) = field.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = field[[y as usize, x as usize]];
        Luma([if v.is_finite() { (v.clamp(0.0, 1.0) * 255.0).round() as u8 } else { 0 }])
    })
}

pub(crate) fn mask_image(mask: &Array2<bool>) -> GrayImage {
    let (h, w) = mask.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| Luma([if mask[[y as usize, x as usize]] { 255 } else { 0 }]))
}

/// Any non-zero pixel is set.
pub(crate) fn from_mask_image(img: &GrayImage) -> Array2<bool> {
    Array2::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0] > 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_are_not_swapped() {
        let field = Array2::from_shape_fn((2, 3), |(y, x)| (y * 3 + x) as f32 / 5.0);
        let img = float_image(&field);
        assert_eq!((img.width(), img.height()), (3, 2));
        assert_eq!(img.get_pixel(2, 1)[0], field[[1, 2]]);
        assert_eq!(from_float_image(&img), field);

        let gray = gray_image(&field);
        assert_eq!(gray.get_pixel(2, 0)[0], 102);
    }

    #[test]
    fn masks_survive_the_trip() {
        let mask = Array2::from_shape_fn((3, 4), |(y, x)| (x + y) % 2 == 0);
        let img = mask_image(&mask);
        assert_eq!(img.get_pixel(1, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 1)[0], 255);
        assert_eq!(from_mask_image(&img), mask);
    }
}
