use super::post::LetterboxTransform;
use common::span_debug;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Builds the `[1, 3, H, W]` tensors fed to the models.
#[derive(Debug, Clone, Copy)]
pub struct PreProcessor {
    /// `(width, height)` of the model input.
    pub input_size: (u32, u32),
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self { input_size }
    }

    /// Stretches the image to the input size (Lanczos3) and scales to `[0, 1]`.
    ///
    /// Aspect ratio is not preserved; [`crate::Rescale`] maps boxes back.
    pub fn preprocess(&self, image: &RgbImage) -> anyhow::Result<Array<f32, IxDyn>> {
        let (width, height) = self.input_size;
        let resized = resize(image, width, height, FilterType::Lanczos3)?;
        normalize(resized.buffer(), width, height)
    }

    /// Resizes keeping the aspect ratio and pads with gray to the input size.
    pub fn letterbox(
        &self,
        image: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, LetterboxTransform)> {
        let _s = span_debug!("letterbox");

        let (width, height) = image.dimensions();
        let (input_w, input_h) = self.input_size;

        let scale = (input_w as f32 / width as f32).min(input_h as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, input_w);
        let new_height = ((height as f32 * scale) as u32).clamp(1, input_h);

        let offset_x = (input_w - new_width) / 2;
        let offset_y = (input_h - new_height) / 2;

        let resized = resize(image, new_width, new_height, FilterType::Bilinear)?;

        let mut letterboxed = vec![LETTERBOX_COLOR; (input_w * input_h * 3) as usize];
        let resized_data = resized.buffer();
        let stride = input_w * 3;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            letterboxed[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        let tensor = normalize(&letterboxed, input_w, input_h)?;
        let transform = LetterboxTransform {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        };

        Ok((tensor, transform))
    }
}

fn resize(
    image: &RgbImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> anyhow::Result<Image<'static>> {
    if image.width() == 0 || image.height() == 0 {
        anyhow::bail!("Cannot resize an empty image");
    }

    let src = ImageRef::new(image.width(), image.height(), image.as_raw(), PixelType::U8x3)?;
    let mut resized = Image::new(width, height, PixelType::U8x3);

    Resizer::new().resize(
        &src,
        &mut resized,
        &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(filter)),
    )?;

    Ok(resized)
}

/// Interleaved RGB bytes to planar `[1, 3, H, W]` floats in `[0, 1]`.
fn normalize(pixels: &[u8], width: u32, height: u32) -> anyhow::Result<Array<f32, IxDyn>> {
    let _s = span_debug!("normalize");

    let width = width as usize;
    let height = height as usize;
    let spatial = width * height;

    if pixels.len() != spatial * 3 {
        anyhow::bail!(
            "Buffer size mismatch: expected {}, got {} bytes",
            spatial * 3,
            pixels.len()
        );
    }

    let mut output = vec![0.0f32; 3 * spatial];
    for (i, px) in pixels.chunks_exact(3).enumerate() {
        output[i] = px[0] as f32 / 255.0;
        output[i + spatial] = px[1] as f32 / 255.0;
        output[i + 2 * spatial] = px[2] as f32 / 255.0;
    }

    Ok(Array::from_shape_vec(
        IxDyn(&[1, 3, height, width]),
        output,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_output_shape_and_range() {
        let image = RgbImage::from_fn(37, 21, |x, y| Rgb([(x * 6) as u8, (y * 12) as u8, 255]));

        let tensor = PreProcessor::new((640, 640)).preprocess(&image).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_preprocess_is_planar() {
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 0, 51]));

        let tensor = PreProcessor::new((8, 6)).preprocess(&image).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 6, 8]);
        assert!((tensor[[0, 0, 3, 4]] - 1.0).abs() < 1e-3);
        assert!(tensor[[0, 1, 3, 4]].abs() < 1e-3);
        assert!((tensor[[0, 2, 3, 4]] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        let image = RgbImage::from_pixel(800, 600, Rgb([128, 128, 128]));

        let (tensor, transform) = PreProcessor::new((640, 640)).letterbox(&image).unwrap();

        // min(640/800, 640/600) = 0.8 -> 640x480 centered vertically
        assert_eq!(transform.scale, 0.8);
        assert_eq!(transform.offset_x, 0.0);
        assert_eq!(transform.offset_y, 80.0);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);

        let pad = LETTERBOX_COLOR as f32 / 255.0;
        assert!((tensor[[0, 0, 10, 320]] - pad).abs() < 1e-6, "top band is padding");
        assert!((tensor[[0, 0, 320, 320]] - 128.0 / 255.0).abs() < 1e-2);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = RgbImage::new(0, 0);
        let err = PreProcessor::new((640, 640)).preprocess(&image).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
