//! # Transformer Feed-Forward Block
//!
//! [`Mlp`] is the ``Linear -> Act -> Dropout -> Linear -> Dropout``
//! feed-forward block shared by the Swin and ViT families.

use crate::layers::activation::{Activation, ActivationConfig};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// [`Mlp`] Meta API.
pub trait MlpMeta {
    /// Input feature size.
    fn in_features(&self) -> usize;

    /// Hidden feature size.
    fn hidden_features(&self) -> usize;

    /// Output feature size.
    fn out_features(&self) -> usize;
}

/// [`Mlp`] Config.
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Input feature size.
    pub in_features: usize,

    /// Hidden feature size; defaults to `in_features`.
    #[config(default = "None")]
    pub hidden_features: Option<usize>,

    /// Output feature size; defaults to `in_features`.
    #[config(default = "None")]
    pub out_features: Option<usize>,

    /// Hidden activation.
    #[config(default = "ActivationConfig::Gelu")]
    pub activation: ActivationConfig,

    /// Dropout rate.
    #[config(default = 0.0)]
    pub drop: f64,
}

impl MlpMeta for MlpConfig {
    fn in_features(&self) -> usize {
        self.in_features
    }

    fn hidden_features(&self) -> usize {
        self.hidden_features.unwrap_or(self.in_features)
    }

    fn out_features(&self) -> usize {
        self.out_features.unwrap_or(self.in_features)
    }
}

impl MlpConfig {
    /// Configure the hidden size as ``in_features * ratio``.
    pub fn with_mlp_ratio(
        self,
        ratio: f64,
    ) -> Self {
        let hidden = ((self.in_features as f64) * ratio) as usize;
        self.with_hidden_features(Some(hidden))
    }

    /// Initialize a [`Mlp`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Mlp<B> {
        Mlp {
            fc1: LinearConfig::new(self.in_features(), self.hidden_features()).init(device),
            act: self.activation.init(device),
            fc2: LinearConfig::new(self.hidden_features(), self.out_features()).init(device),
            drop: DropoutConfig::new(self.drop).init(),
        }
    }
}

/// Two layer feed-forward block.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    /// Input projection.
    pub fc1: Linear<B>,

    /// Hidden activation.
    pub act: Activation<B>,

    /// Output projection.
    pub fc2: Linear<B>,

    /// Dropout, applied after each projection.
    pub drop: Dropout,
}

impl<B: Backend> MlpMeta for Mlp<B> {
    fn in_features(&self) -> usize {
        self.fc1.weight.dims()[0]
    }

    fn hidden_features(&self) -> usize {
        self.fc1.weight.dims()[1]
    }

    fn out_features(&self) -> usize {
        self.fc2.weight.dims()[1]
    }
}

impl<B: Backend> Mlp<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[..., in_features]``.
    ///
    /// # Returns
    ///
    /// ``[..., out_features]``
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let x = self.fc1.forward(input);
        let x = self.act.forward(x);
        let x = self.drop.forward(x);
        let x = self.fc2.forward(x);
        self.drop.forward(x)
    }
}
