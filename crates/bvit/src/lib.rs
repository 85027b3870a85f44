#![warn(missing_docs)]
//!# bvit - Burn Vision Transformers
//!
//! Annotated implementations of published vision transformer architectures,
//! declared against [`burn`].
//!
//! ## Notable Components
//!
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::activation`] - activation layer abstraction wrapper.
//!   * [`layers::drop::drop_path`] - drop path / stochastic depth.
//!   * [`layers::mlp`] - two layer feed-forward block.
//!   * [`layers::patching::patch_embed`] - 2d patch embedding layer.
//! * [`models`] - complete model families.
//!   * [`models::swin`] - The Swin family.
//!     * [`models::swin::v1`] - The Swin Transformer.
//!     * [`models::swin::v2`] - The Swin Transformer V2.
//!   * [`models::vit`] - The Vision Transformer.
//!   * [`models::gan::dcgan`] - DCGAN generator and discriminator.
//! * [`prefabs`] - named, well-known model configs.
//! * [`utility`] - misc. helpers.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod layers;
pub mod models;
pub mod prefabs;
pub mod utility;
