//! # Model Families
//!
//! * [`swin`] - Swin Transformer V1 and V2.
//! * [`vit`] - Vision Transformer.
//! * [`gan`] - DCGAN generator and discriminator.
pub mod gan;
pub mod swin;
pub mod vit;
