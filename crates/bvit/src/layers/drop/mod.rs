//! # Dropout Layers
pub mod drop_path;
