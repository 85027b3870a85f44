//! # Image Folder Dataset

use crate::scanning::{ImageFolderIndex, ImageItem, scan_image_folder};
use burn::data::dataset::Dataset;
use std::path::Path;

/// A [`Dataset`] of [`ImageItem`]s from a scanned image folder.
///
/// Items are paths; decoding is left to the batcher so that it runs on
/// dataloader workers.
#[derive(Clone, Debug)]
pub struct ImageFolderDataset {
    index: ImageFolderIndex,
}

impl ImageFolderDataset {
    /// Scan `root` and build a dataset.
    ///
    /// # Errors
    ///
    /// See [`scan_image_folder`].
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        Ok(Self::from_index(scan_image_folder(root)?))
    }

    /// Wrap an existing index.
    pub fn from_index(index: ImageFolderIndex) -> Self {
        Self { index }
    }

    /// The underlying index.
    pub fn index(&self) -> &ImageFolderIndex {
        &self.index
    }

    /// Sorted class names.
    pub fn classes(&self) -> &[String] {
        &self.index.classes
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.index.num_classes()
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(
        &self,
        index: usize,
    ) -> Option<ImageItem> {
        self.index.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.index.items.len()
    }
}
