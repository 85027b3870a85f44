//! # Patching Layers
pub mod patch_embed;
