//! # Implementation of the Swin Transformer (V1) model.
//! See: [Swin Transformer](https://arxiv.org/pdf/2103.14030)
//!
//! ## Example
//!
//! ```rust,no_run
//! use bvit::models::swin::layer_config::LayerConfig;
//! use bvit::models::swin::v1::swin_model::{SwinTransformerV1, SwinTransformerV1Config};
//! use burn::backend::NdArray;
//!
//! let device = Default::default();
//!
//! let swin_model: SwinTransformerV1<NdArray> = SwinTransformerV1Config::new(
//!     [224, 224],
//!     4,
//!     3,
//!     10,
//!     96,
//!     vec![
//!         LayerConfig::new(2, 3),
//!         LayerConfig::new(2, 6),
//!         LayerConfig::new(6, 12),
//!         LayerConfig::new(2, 24),
//!     ],
//! )
//! .with_drop_path_rate(0.2)
//! .init(&device);
//! ```

pub mod block_sequence;
pub mod patch_merge;
pub mod swin_block;
pub mod swin_model;
pub mod window_attention;
