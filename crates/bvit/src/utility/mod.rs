//! # Miscellaneous Utilities
pub mod burn;
pub mod probability;
