//! # Generative Adversarial Networks
pub mod dcgan;
