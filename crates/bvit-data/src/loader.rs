//! # Image Loading
//!
//! Decodes an image file into ``[height, width, 3]`` row-major ``f32``
//! pixels in ``[0, 1]``; normalization happens in the batcher.

use anyhow::Context;
use burn::config::Config;
use image::imageops::FilterType;
use std::path::Path;

/// ImageNet per-channel mean.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Number of color channels produced by the loader.
pub const CHANNELS: usize = 3;

/// Image decode/resize/normalize configuration.
#[derive(Config, Debug, PartialEq)]
pub struct ImageLoaderConfig {
    /// Output height.
    pub height: usize,

    /// Output width.
    pub width: usize,

    /// Per-channel mean subtracted by the batcher.
    #[config(default = "IMAGENET_MEAN")]
    pub normalize_mean: [f32; 3],

    /// Per-channel standard deviation divided out by the batcher.
    #[config(default = "IMAGENET_STD")]
    pub normalize_std: [f32; 3],
}

impl ImageLoaderConfig {
    /// Number of ``f32`` values in one loaded image.
    pub fn pixels_len(&self) -> usize {
        self.height * self.width * CHANNELS
    }

    /// Load, resize and scale one image.
    ///
    /// # Returns
    ///
    /// ``[height, width, 3]`` pixels in ``[0, 1]``.
    ///
    /// # Errors
    ///
    /// If the file can't be opened or decoded.
    pub fn load_image<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> anyhow::Result<Vec<f32>> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;

        let image = if image.width() as usize == self.width && image.height() as usize == self.height
        {
            image
        } else {
            image.resize_exact(self.width as u32, self.height as u32, FilterType::Triangle)
        };

        Ok(image
            .to_rgb8()
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_solid_png;

    #[test]
    fn test_config_defaults() {
        let config = ImageLoaderConfig::new(32, 48);
        assert_eq!(config.normalize_mean, IMAGENET_MEAN);
        assert_eq!(config.normalize_std, IMAGENET_STD);
        assert_eq!(config.pixels_len(), 32 * 48 * 3);
    }

    #[test]
    fn test_load_image_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_solid_png(&dir.path().join("a.png"), 8, 6, [255, 0, 51]);

        let config = ImageLoaderConfig::new(4, 5);
        let pixels = config.load_image(&path).unwrap();

        assert_eq!(pixels.len(), 4 * 5 * 3);
        for px in pixels.chunks(3) {
            assert!((px[0] - 1.0).abs() < 1e-6);
            assert!(px[1].abs() < 1e-6);
            assert!((px[2] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_load_image_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageLoaderConfig::new(4, 4)
            .load_image(dir.path().join("nope.png"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to decode image"), "{err}");
    }
}
