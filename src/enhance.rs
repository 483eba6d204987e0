use crate::error::QrError;
use image::{imageops, DynamicImage, GrayImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::separable_filter_equal;
use log::{debug, info};
use rayon::prelude::*;

/// Largest accepted output edge, in pixels.
pub const MAX_SIDE: u32 = 16_384;
/// Largest accepted output area, in pixels.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Binomial 3-tap kernel; applied on both axes it is the 3x3 Gaussian.
const BLUR_KERNEL: [f32; 3] = [0.25, 0.5, 0.25];

/// Tunables for the sharpening pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnhanceConfig {
    /// Linear upscale factor applied to both dimensions.
    pub scale: f32,
    /// Smooth with a 3x3 Gaussian before thresholding.
    pub blur: bool,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            blur: false,
        }
    }
}

impl EnhanceConfig {
    pub fn validate(&self) -> Result<(), QrError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(QrError::InvalidSetting(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Target size after resizing; truncates like an integer cast, never below 1.
    /// Fails when either edge exceeds `MAX_SIDE` or the area exceeds `MAX_PIXELS`.
    pub fn scaled_dimensions(&self, width: u32, height: u32) -> Result<(u32, u32), QrError> {
        let scale = |v: u32| -> Result<u32, QrError> {
            let scaled = (v as f64 * self.scale as f64).floor().max(1.0);
            if scaled > MAX_SIDE as f64 {
                return Err(QrError::InvalidSetting(format!(
                    "scale {} turns a {v}px edge into {scaled}px, above the {MAX_SIDE}px limit",
                    self.scale
                )));
            }
            Ok(scaled as u32)
        };

        let (w, h) = (scale(width)?, scale(height)?);
        let area = (w as u64)
            .checked_mul(h as u64)
            .filter(|area| *area <= MAX_PIXELS)
            .ok_or_else(|| {
                QrError::InvalidSetting(format!(
                    "scaled image {w}x{h} exceeds the {MAX_PIXELS} pixel limit"
                ))
            })?;
        debug!("Scaled area: {area} pixels");

        Ok((w, h))
    }
}

/// Grayscale -> Lanczos upscale -> optional blur -> Otsu binarization.
pub struct Enhancer {
    config: EnhanceConfig,
}

impl Enhancer {
    pub fn new(config: EnhanceConfig) -> Result<Self, QrError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn enhance(&self, img: &DynamicImage) -> Result<GrayImage, QrError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(QrError::InvalidImage("image has no pixels".into()));
        }

        let gray = img.to_luma8();
        let (width, height) = self.config.scaled_dimensions(gray.width(), gray.height())?;
        info!(
            "Resizing {}x{} -> {}x{}",
            gray.width(),
            gray.height(),
            width,
            height
        );
        let resized = imageops::resize(&gray, width, height, imageops::FilterType::Lanczos3);

        let smoothed = if self.config.blur {
            gaussian_blur_3x3(&resized)
        } else {
            resized
        };

        Ok(binarize_otsu(&smoothed))
    }
}

/// [1 2 1]/4 on each axis, edges clamped.
pub fn gaussian_blur_3x3(img: &GrayImage) -> GrayImage {
    separable_filter_equal(img, &BLUR_KERNEL)
}

/// Pixels strictly above the Otsu level become white, the rest black.
pub fn binarize_otsu(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    debug!("Otsu level: {level}");

    let mut out = img.clone();
    let samples: &mut [u8] = &mut out;
    samples
        .par_iter_mut()
        .for_each(|p| *p = if *p > level { 255 } else { 0 });
    out
}
