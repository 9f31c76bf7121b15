//! Turn frames into model input tensors.
//!
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::{tract_ndarray, Tensor};

use crate::nn::{InputShape, Layout};

/// Resize a frame to the model input and rescale pixel values from `[0, 255]` to `[0, 1]`.
///
/// The returned tensor has a leading batch dimension of one and exactly the dimensions of
/// `shape.dims()`.
pub fn preprocess(frame: &RgbImage, shape: InputShape) -> Tensor {
    let side = shape.side;
    let resized: RgbImage = image::imageops::resize(frame, side, side, FilterType::Triangle);
    let pixel = |x: usize, y: usize, c: usize| resized[(x as u32, y as u32)][c] as f32 / 255.0;

    let [n, d1, d2, d3] = shape.dims();
    match shape.layout {
        Layout::Nchw => {
            tract_ndarray::Array4::from_shape_fn((n, d1, d2, d3), |(_, c, y, x)| pixel(x, y, c))
                .into()
        }
        Layout::Nhwc => {
            tract_ndarray::Array4::from_shape_fn((n, d1, d2, d3), |(_, y, x, c)| pixel(x, y, c))
                .into()
        }
    }
}

#[cfg(test)]
mod test {

    use image::Rgb;

    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_shape_and_range() {
        for (width, height) in [(640, 480), (31, 200), (1, 1)] {
            let frame = gradient(width, height);
            for layout in [Layout::Nhwc, Layout::Nchw] {
                let shape = InputShape::new(64, layout);
                let tensor = preprocess(&frame, shape);

                assert_eq!(tensor.shape(), &shape.dims()[..]);
                let values = tensor.to_array_view::<f32>().unwrap();
                assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn test_extremes_map_to_unit_range() {
        let white = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let black = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let shape = InputShape::new(4, Layout::Nhwc);

        let white = preprocess(&white, shape);
        let black = preprocess(&black, shape);

        assert!(white.to_array_view::<f32>().unwrap().iter().all(|v| *v > 0.99));
        assert!(black.to_array_view::<f32>().unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_channels_land_in_place() {
        let red = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));

        let nchw = preprocess(&red, InputShape::new(2, Layout::Nchw));
        let nchw = nchw.to_array_view::<f32>().unwrap();
        assert!(nchw[&[0usize, 0, 1, 1][..]] > 0.99);
        assert_eq!(nchw[&[0usize, 1, 1, 1][..]], 0.0);

        let nhwc = preprocess(&red, InputShape::new(2, Layout::Nhwc));
        let nhwc = nhwc.to_array_view::<f32>().unwrap();
        assert!(nhwc[&[0usize, 1, 1, 0][..]] > 0.99);
        assert_eq!(nhwc[&[0usize, 1, 1, 2][..]], 0.0);
    }

    #[test]
    fn test_deterministic() {
        let frame = gradient(97, 53);
        let shape = InputShape::new(32, Layout::Nchw);
        assert_eq!(preprocess(&frame, shape), preprocess(&frame, shape));
    }
}
