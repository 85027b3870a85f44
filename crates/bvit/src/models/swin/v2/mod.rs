//! # Implementation of the Swin Transformer V2 model.
//! See: [SWIN-V2](https://arxiv.org/abs/2111.09883)
//!
//! Differences from [`crate::models::swin::v1`]:
//!
//! * residual post-norm instead of pre-norm,
//! * scaled cosine attention with a learned, clamped, per-head logit scale,
//! * a continuous position bias computed by an MLP over log-spaced offsets,
//! * patch merging normalizes after the reduction.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bvit::models::swin::layer_config::LayerConfig;
//! use bvit::models::swin::v2::swin_model::{SwinTransformerV2, SwinTransformerV2Config};
//! use burn::backend::NdArray;
//!
//! let image_dimensions = [256, 256];
//! let patch_size = 4;
//! let image_channels = 3;
//! let num_classes = 10;
//! let embed_dim = 96;
//! let window_size = 8;
//!
//! let device = Default::default();
//!
//! let swin_model: SwinTransformerV2<NdArray> = SwinTransformerV2Config::new(
//!     image_dimensions,
//!     patch_size,
//!     image_channels,
//!     num_classes,
//!     embed_dim,
//!     vec![LayerConfig::new(8, 6), LayerConfig::new(8, 12)],
//! )
//! .with_window_size(window_size)
//! .with_attn_drop_rate(0.2)
//! .with_drop_rate(0.2)
//! .init(&device);
//! ```

pub mod block_sequence;
pub mod patch_merge;
pub mod swin_block;
pub mod swin_model;
pub mod window_attention;
