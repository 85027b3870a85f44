//! # Image Batcher

use crate::loader::{CHANNELS, ImageLoaderConfig};
use crate::scanning::ImageItem;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Int, Tensor, TensorData};

/// A batch of normalized images and their labels.
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// ``[batch, 3, height, width]`` normalized images.
    pub images: Tensor<B, 4>,

    /// ``[batch]`` class labels.
    pub targets: Tensor<B, 1, Int>,
}

/// Loads and normalizes [`ImageItem`]s into [`ImageBatch`]es.
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    loader: ImageLoaderConfig,
}

impl ImageBatcher {
    /// Create a batcher.
    pub fn new(loader: ImageLoaderConfig) -> Self {
        Self { loader }
    }

    /// The loader configuration.
    pub fn loader(&self) -> &ImageLoaderConfig {
        &self.loader
    }

    /// Normalize ``[batch, height, width, 3]`` pixels to ``[batch, 3, height, width]``.
    pub fn normalize<B: Backend>(
        &self,
        pixels: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let device = pixels.device();
        let mean = Tensor::<B, 1>::from_floats(self.loader.normalize_mean, &device)
            .reshape([1, CHANNELS, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(self.loader.normalize_std, &device)
            .reshape([1, CHANNELS, 1, 1]);

        (pixels.permute([0, 3, 1, 2]) - mean) / std
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(
        &self,
        items: Vec<ImageItem>,
        device: &B::Device,
    ) -> ImageBatch<B> {
        let batch_size = items.len();
        let mut pixels = Vec::with_capacity(batch_size * self.loader.pixels_len());
        let mut labels = Vec::with_capacity(batch_size);

        for item in &items {
            // Batcher::batch is infallible; a bad file aborts the worker.
            let image = self
                .loader
                .load_image(&item.path)
                .unwrap_or_else(|err| panic!("{err:#}"));
            pixels.extend(image);
            labels.push(item.label as i64);
        }

        let pixels = Tensor::<B, 4>::from_data(
            TensorData::new(
                pixels,
                [batch_size, self.loader.height, self.loader.width, CHANNELS],
            ),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::from(labels.as_slice()), device);

        ImageBatch {
            images: self.normalize(pixels),
            targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageFolderDataset;
    use crate::testing::write_image_folder;
    use burn::backend::NdArray;
    use burn::data::dataset::Dataset;
    use burn::tensor::Tolerance;

    type B = NdArray<f32>;

    #[test]
    fn test_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_image_folder(
            dir.path(),
            &[("red", 1, [255, 0, 0]), ("white", 1, [255, 255, 255])],
        );
        let dataset = ImageFolderDataset::new(dir.path()).unwrap();

        let batcher = ImageBatcher::new(
            ImageLoaderConfig::new(3, 2)
                .with_normalize_mean([0.5, 0.5, 0.5])
                .with_normalize_std([0.5, 0.5, 0.5]),
        );
        let device = Default::default();
        let batch: ImageBatch<B> = batcher.batch(dataset.iter().collect(), &device);

        assert_eq!(batch.images.dims(), [2, 3, 3, 2]);
        batch
            .targets
            .to_data()
            .assert_eq(&TensorData::from([0i64, 1]), false);

        // red: (1, 0, 0) -> (1, -1, -1); white: (1, 1, 1) -> (1, 1, 1).
        let channel_means = batch.images.mean_dim(3).mean_dim(2).reshape([2, 3]);
        channel_means.to_data().assert_approx_eq::<f32>(
            &TensorData::from([[1.0, -1.0, -1.0], [1.0, 1.0, 1.0]]),
            Tolerance::absolute(1e-5),
        );
    }

    #[test]
    fn test_normalize_layout() {
        let batcher = ImageBatcher::new(
            ImageLoaderConfig::new(1, 2)
                .with_normalize_mean([0.0, 1.0, 2.0])
                .with_normalize_std([1.0, 2.0, 4.0]),
        );
        let device = Default::default();
        // [1, h=1, w=2, c=3]
        let pixels = Tensor::<B, 4>::from_data([[[[0.0, 3.0, 6.0], [1.0, 5.0, 10.0]]]], &device);

        let images = batcher.normalize(pixels);
        images.to_data().assert_eq(
            &TensorData::from([[[[0.0f32, 1.0]], [[1.0, 2.0]], [[1.0, 2.0]]]]),
            false,
        );
    }
}
