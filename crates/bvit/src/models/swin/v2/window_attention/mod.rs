//! Window attention operations for Swin Transformer v2.
mod attention;
mod pos_bias;

pub use attention::*;
pub use pos_bias::*;
