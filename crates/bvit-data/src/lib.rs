#![warn(missing_docs)]
//!# bvit-data - Image Folder Datasets for bvit
//!
//! Loads classification datasets laid out as one directory per class:
//!
//! ```text
//! root/
//!   airplane/
//!     0001.png
//!     ...
//!   bird/
//!     ...
//! ```
//!
//! * [`scanning`] - find images and assign labels.
//! * [`dataset`] - a [`burn::data::dataset::Dataset`] over scanned images.
//! * [`loader`] - decode, resize and scale one image.
//! * [`batcher`] - a [`burn::data::dataloader::batcher::Batcher`] producing
//!   normalized ``[batch, 3, height, width]`` image tensors.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod batcher;
pub mod dataset;
pub mod loader;
pub mod scanning;

#[cfg(test)]
pub(crate) mod testing;
