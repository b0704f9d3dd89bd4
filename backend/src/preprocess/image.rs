use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4, ArrayView3, Axis};

use super::PreprocessError;
use super::clahe::{self, ClaheParams};

pub const MIN_IMAGE_SIDE: u32 = 50;
pub const MAX_IMAGE_MB: u32 = 10;

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))
}

/// Builds the `(1, H, W, 3)` float batch the CNN expects, values in [0, 1].
/// `target_size` is `(width, height)`.
pub fn preprocess(image: &DynamicImage, target_size: (u32, u32)) -> Array4<f32> {
    let (width, height) = target_size;
    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Lanczos3);
    rgb_to_tensor(&resized).insert_axis(Axis(0))
}

pub fn validate(image: Option<&DynamicImage>) -> Result<(), PreprocessError> {
    let image = image.ok_or(PreprocessError::MissingImage)?;
    let (width, height) = (image.width(), image.height());

    if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
        return Err(PreprocessError::ImageTooSmall(MIN_IMAGE_SIDE));
    }

    // Uncompressed RGB estimate, not the upload size.
    let estimated_mb = (width as f64) * (height as f64) * 3.0 / (1024.0 * 1024.0);
    if estimated_mb > MAX_IMAGE_MB as f64 {
        return Err(PreprocessError::ImageTooLarge(MAX_IMAGE_MB));
    }
    Ok(())
}

/// Contrast enhancement on a single `(H, W, 3)` image in [0, 1]: CLAHE on the
/// L channel of CIE L*a*b*, chroma untouched.
pub fn enhance(image: ArrayView3<f32>) -> Result<Array3<f32>, PreprocessError> {
    let shape = image.shape();
    if shape[2] != 3 {
        return Err(PreprocessError::Shape(format!("expected 3 channels, got {}", shape[2])));
    }
    let (height, width) = (shape[0], shape[1]);

    let mut lightness = Vec::with_capacity(height * width);
    let mut chroma = Vec::with_capacity(height * width);
    for y in 0..height {
        for x in 0..width {
            let rgb = [
                to_u8(image[[y, x, 0]]),
                to_u8(image[[y, x, 1]]),
                to_u8(image[[y, x, 2]]),
            ];
            let [l, a, b] = clahe::rgb_to_lab(rgb);
            lightness.push(l);
            chroma.push((a, b));
        }
    }

    let equalized = clahe::apply(&lightness, width, height, &ClaheParams::default());

    let mut out = Array3::<f32>::zeros((height, width, 3));
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let (a, b) = chroma[idx];
            let rgb = clahe::lab_to_rgb([equalized[idx], a, b]);
            for c in 0..3 {
                out[[y, x, c]] = rgb[c] as f32 / 255.0;
            }
        }
    }
    Ok(out)
}

fn rgb_to_tensor(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array3::<f32>::zeros((height as usize, width as usize, 3));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

// Truncates like a numpy uint8 cast; `as` also saturates out-of-range values.
fn to_u8(value: f32) -> u8 {
    (value * 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
        let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn assert_model_ready(tensor: &Array4<f32>) {
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_preprocess_shape_for_any_mode() {
        let rgb = gradient_rgb(640, 480);
        assert_model_ready(&preprocess(&rgb, (224, 224)));

        let rgba: RgbaImage = ImageBuffer::from_fn(80, 300, |x, y| Rgba([x as u8, y as u8, 7, 128]));
        assert_model_ready(&preprocess(&DynamicImage::ImageRgba8(rgba), (224, 224)));

        let gray: GrayImage = ImageBuffer::from_fn(60, 60, |x, _| Luma([(x * 4) as u8]));
        let gray_tensor = preprocess(&DynamicImage::ImageLuma8(gray), (224, 224));
        assert_model_ready(&gray_tensor);
        // Grayscale expands into three equal channels.
        assert_eq!(gray_tensor[[0, 10, 10, 0]], gray_tensor[[0, 10, 10, 2]]);
    }

    #[test]
    fn test_preprocess_honors_target_size() {
        let tensor = preprocess(&gradient_rgb(100, 100), (128, 64));
        assert_eq!(tensor.shape(), &[1, 64, 128, 3]);
    }

    #[test]
    fn test_decode_roundtrips_png_bytes() {
        let mut bytes = Vec::new();
        gradient_rgb(64, 64)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(err.to_string().starts_with("Invalid image"));
    }

    #[test]
    fn test_validate_image() {
        assert_eq!(validate(None), Err(PreprocessError::MissingImage));

        let err = validate(Some(&gradient_rgb(10, 10))).unwrap_err();
        assert!(err.to_string().contains("too small"));

        let err = validate(Some(&gradient_rgb(40, 400))).unwrap_err();
        assert!(err.to_string().contains("too small"));

        assert!(validate(Some(&gradient_rgb(50, 50))).is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_images() {
        // 2000 x 1800 x 3 bytes is just over 10MB.
        let img = DynamicImage::new_rgb8(2000, 1800);
        let err = validate(Some(&img)).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_enhance_preserves_shape_and_range() {
        let tensor = preprocess(&gradient_rgb(300, 200), (224, 224));
        let single = tensor.index_axis(Axis(0), 0);
        let enhanced = enhance(single).unwrap();
        assert_eq!(enhanced.shape(), &[224, 224, 3]);
        assert!(enhanced.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_enhance_keeps_uniform_image_uniform() {
        let flat = Array3::<f32>::from_elem((64, 64, 3), 0.5);
        let enhanced = enhance(flat.view()).unwrap();
        let first = enhanced[[0, 0, 0]];
        assert!(enhanced
            .indexed_iter()
            .filter(|((_, _, c), _)| *c == 0)
            .all(|(_, v)| (*v - first).abs() < 1e-6));
    }

    #[test]
    fn test_enhance_rejects_wrong_channel_count() {
        let four = Array3::<f32>::zeros((8, 8, 4));
        assert!(matches!(enhance(four.view()), Err(PreprocessError::Shape(_))));
    }
}
