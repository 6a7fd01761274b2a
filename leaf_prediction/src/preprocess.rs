use crate::error::PredictionError;
use base64::{prelude::BASE64_STANDARD, Engine};
use image::imageops::FilterType;
use ndarray::{Array, Ix4};
use serde::{Serialize, Serializer};
use std::io::Cursor;

/// Side length the deployed model was trained on.
pub const INPUT_SIZE: u32 = 227;
pub const CHANNELS: usize = 3;

/// A `[1, 227, 227, 3]` batch of raw `0..=255` RGB values.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array<f32, Ix4>);

impl ImageTensor {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array<f32, Ix4> {
        &self.0
    }
}

impl Serialize for ImageTensor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nested: Vec<Vec<Vec<Vec<f32>>>> = self
            .0
            .outer_iter()
            .map(|image| {
                image
                    .outer_iter()
                    .map(|row| row.outer_iter().map(|pixel| pixel.to_vec()).collect())
                    .collect()
            })
            .collect();
        nested.serialize(serializer)
    }
}

fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    }
}

/// Decodes a base64 image, forces RGB and stretches it to the model input size.
pub fn preprocess(encoded: &str) -> Result<ImageTensor, PredictionError> {
    let payload: String = strip_data_url(encoded.trim())
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let image_bytes = BASE64_STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| PredictionError::Preprocessing(format!("invalid base64: {}", e)))?;

    let original_img = image::ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|e| PredictionError::Preprocessing(format!("unreadable image data: {}", e)))?
        .decode()
        .map_err(|e| PredictionError::Preprocessing(format!("cannot decode image: {}", e)))?;

    tracing::debug!(
        width = original_img.width(),
        height = original_img.height(),
        color = ?original_img.color(),
        "Decoded input image"
    );

    let rgb = image::imageops::resize(
        &original_img.to_rgb8(),
        INPUT_SIZE,
        INPUT_SIZE,
        FilterType::CatmullRom,
    );

    let side = INPUT_SIZE as usize;
    let values: Vec<f32> = rgb.into_raw().into_iter().map(f32::from).collect();
    let input = Array::from_shape_vec((1, side, side, CHANNELS), values)
        .map_err(|e| PredictionError::Preprocessing(format!("invalid tensor shape: {}", e)))?;

    Ok(ImageTensor(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, LumaA, Rgb, Rgba};

    fn near(value: f32, expected: f32) -> bool {
        (value - expected).abs() <= 1.0
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> String {
        let mut bytes: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        BASE64_STANDARD.encode(bytes)
    }

    #[test]
    fn test_preprocess_rgb_png() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 60, Rgb([255, 0, 0]));
        let tensor = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)).unwrap();

        assert_eq!(tensor.shape(), &[1, 227, 227, 3]);
        let array = tensor.as_array();
        assert!(near(array[[0, 0, 0, 0]], 255.0));
        assert!(near(array[[0, 113, 113, 1]], 0.0));
        assert!(near(array[[0, 226, 226, 2]], 0.0));
    }

    #[test]
    fn test_preprocess_drops_alpha() {
        let img = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(300, 500, Rgba([10, 20, 30, 40]));
        let tensor =
            preprocess(&encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)).unwrap();

        assert_eq!(tensor.shape(), &[1, 227, 227, 3]);
        let array = tensor.as_array();
        assert!(near(array[[0, 50, 50, 0]], 10.0));
        assert!(near(array[[0, 50, 50, 1]], 20.0));
        assert!(near(array[[0, 50, 50, 2]], 30.0));
    }

    #[test]
    fn test_preprocess_grayscale_expands_to_rgb() {
        let gray = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(64, 64, Luma([128]));
        let tensor = preprocess(&encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png)).unwrap();
        assert_eq!(tensor.shape(), &[1, 227, 227, 3]);
        assert!(tensor.as_array().iter().all(|v| near(*v, 128.0)));

        let gray_alpha = ImageBuffer::<LumaA<u8>, Vec<u8>>::from_pixel(8, 300, LumaA([7, 0]));
        let tensor =
            preprocess(&encode(DynamicImage::ImageLumaA8(gray_alpha), ImageFormat::Png)).unwrap();
        assert_eq!(tensor.shape(), &[1, 227, 227, 3]);
    }

    #[test]
    fn test_preprocess_jpeg_values_stay_in_pixel_range() {
        let img = ImageBuffer::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let tensor = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)).unwrap();

        assert_eq!(tensor.shape(), &[1, 227, 227, 3]);
        assert!(tensor.as_array().iter().all(|v| (0.0..=255.0).contains(v)));
        assert!(tensor.as_array().iter().any(|v| *v > 1.0));
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let img = ImageBuffer::from_fn(50, 80, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]));
        let encoded = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        assert_eq!(preprocess(&encoded).unwrap(), preprocess(&encoded).unwrap());
    }

    #[test]
    fn test_preprocess_accepts_data_url() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(4, 4, Rgb([1, 2, 3]));
        let encoded = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);
        let data_url = format!("data:image/png;base64,{}", encoded);

        assert_eq!(preprocess(&data_url).unwrap(), preprocess(&encoded).unwrap());
    }

    #[test]
    fn test_preprocess_rejects_invalid_base64() {
        let err = preprocess("not base64 at all!!").unwrap_err();
        assert!(matches!(err, PredictionError::Preprocessing(_)));
        assert!(err.to_string().contains("invalid base64"));
    }

    #[test]
    fn test_preprocess_rejects_non_image_bytes() {
        let err = preprocess(&BASE64_STANDARD.encode(b"definitely not an image")).unwrap_err();
        assert!(matches!(err, PredictionError::Preprocessing(_)));
    }

    #[test]
    fn test_tensor_serializes_as_nested_arrays() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(2, 2, Rgb([9, 8, 7]));
        let tensor = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)).unwrap();
        let value = serde_json::to_value(&tensor).unwrap();

        let batch = value.as_array().unwrap();
        assert_eq!(batch.len(), 1);
        let rows = batch[0].as_array().unwrap();
        assert_eq!(rows.len(), 227);
        let row = rows[0].as_array().unwrap();
        assert_eq!(row.len(), 227);
        let pixel: Vec<f64> = row[0]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();
        assert_eq!(pixel.len(), 3);
        assert!(near(pixel[0] as f32, 9.0) && near(pixel[2] as f32, 7.0));
    }
}
