//! Data Augmentation Module
//!
//! On-the-fly image augmentations applied to the training stream only.
//! Validation and test images are resized and rescaled without augmentation.
//!
//! The transforms mirror the training generator configuration: small random
//! rotation, pixel shifts, zoom, and horizontal flip, with out-of-frame
//! regions filled with constant black.

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Maximum horizontal shift in pixels (applies ±width_shift)
    pub width_shift: f32,
    /// Maximum vertical shift in pixels (applies ±height_shift)
    pub height_shift: f32,
    /// Zoom range: scale factor drawn from [1 - zoom_range, 1 + zoom_range]
    pub zoom_range: f32,
    /// Whether to randomly flip horizontally (probability 0.5)
    pub horizontal_flip: bool,
    /// Whether to randomly flip vertically (probability 0.5)
    pub vertical_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 10.0,
            width_shift: 10.0,
            height_shift: 10.0,
            zoom_range: 0.3,
            horizontal_flip: true,
            vertical_flip: false,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            rotation_degrees: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
            vertical_flip: false,
        }
    }

    /// Whether any transform is enabled
    pub fn is_enabled(&self) -> bool {
        self.rotation_degrees > 0.0
            || self.width_shift > 0.0
            || self.height_shift > 0.0
            || self.zoom_range > 0.0
            || self.horizontal_flip
            || self.vertical_flip
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Create an augmenter with no augmentation (for validation/inference)
    pub fn no_augmentation(image_size: u32) -> Self {
        Self::new(AugmentationConfig::none(), image_size)
    }

    /// Access the configuration
    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply the configured random transforms to an image
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let mut result = img;

        if self.config.horizontal_flip && rng.gen::<f32>() < 0.5 {
            result = result.fliph();
        }

        if self.config.vertical_flip && rng.gen::<f32>() < 0.5 {
            result = result.flipv();
        }

        let angle = if self.config.rotation_degrees > 0.0 {
            rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees)
        } else {
            0.0
        };
        let shift_x = if self.config.width_shift > 0.0 {
            rng.gen_range(-self.config.width_shift..=self.config.width_shift)
        } else {
            0.0
        };
        let shift_y = if self.config.height_shift > 0.0 {
            rng.gen_range(-self.config.height_shift..=self.config.height_shift)
        } else {
            0.0
        };
        let zoom = if self.config.zoom_range > 0.0 {
            rng.gen_range(1.0 - self.config.zoom_range..=1.0 + self.config.zoom_range)
        } else {
            1.0
        };

        if angle != 0.0 || shift_x != 0.0 || shift_y != 0.0 || zoom != 1.0 {
            result = self.affine(&result, angle, shift_x, shift_y, zoom);
        }

        result
    }

    /// Apply a combined rotation/shift/zoom with bilinear sampling
    ///
    /// Out-of-frame samples are filled with constant black.
    fn affine(
        &self,
        img: &DynamicImage,
        angle_degrees: f32,
        shift_x: f32,
        shift_y: f32,
        zoom: f32,
    ) -> DynamicImage {
        let angle_rad = angle_degrees.to_radians();
        let (width, height) = img.dimensions();
        let rgb = img.to_rgb8();

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;

        let cos_a = angle_rad.cos();
        let sin_a = angle_rad.sin();

        let mut output = ImageBuffer::new(width, height);

        // Inverse mapping: for each output pixel, find the source location by
        // undoing the shift, then the rotation, then the zoom around center.
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx - shift_x;
                let dy = y as f32 - cy - shift_y;

                let rx = dx * cos_a + dy * sin_a;
                let ry = -dx * sin_a + dy * cos_a;

                let src_x = cx + rx / zoom;
                let src_y = cy + ry / zoom;

                let pixel = bilinear_sample(&rgb, src_x, src_y);
                output.put_pixel(x, y, pixel);
            }
        }

        DynamicImage::ImageRgb8(output)
    }

    /// Resize image to target size (always applied, not random)
    pub fn resize(&self, img: DynamicImage) -> DynamicImage {
        img.resize_exact(
            self.image_size,
            self.image_size,
            image::imageops::FilterType::Triangle,
        )
    }

    /// Convert image to CHW float tensor data rescaled to [0, 1]
    pub fn to_tensor_data(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut data = Vec::with_capacity(3 * height as usize * width as usize);

        for c in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    let pixel = rgb.get_pixel(x, y);
                    data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        data
    }

    /// Full preprocessing pipeline: augment (optional), resize, rescale
    pub fn preprocess(&self, img: DynamicImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let mut result = img;

        if let Some(rng) = rng {
            result = self.augment(result, rng);
        }

        result = self.resize(result);

        self.to_tensor_data(&result)
    }
}

/// Sample a pixel using bilinear interpolation, black outside the frame
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x >= width as f32 - 1.0 || y >= height as f32 - 1.0 {
        // Constant fill outside the source frame
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;

        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}
