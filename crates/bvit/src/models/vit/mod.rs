//! # Vision Transformer (ViT)
//! See: [An Image is Worth 16x16 Words](https://arxiv.org/abs/2010.11929)
//!
//! Patch embedding, a learned class token, a learned absolute position
//! embedding, a stack of pre-norm [`encoder_block::ViTEncoderBlock`]s,
//! and a linear head on the class token.
pub mod encoder_block;
pub mod vit_model;
