//! # Continuous Relative Position Bias
//!
//! Swin V2 replaces the learned bias table with a small MLP evaluated
//! over log-spaced relative coordinates, so the bias is a smooth
//! function of the offset.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::models::swin::pos_grid::{log_spaced_relative_coords, relative_position_index};
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::activation::sigmoid;

/// Upper bound of the bias magnitude; ``16 * sigmoid(.)``.
pub const CPB_BIAS_SCALE: f64 = 16.0;

/// [`RelativePositionBiasV2`] Config.
#[derive(Config, Debug)]
pub struct RelativePositionBiasV2Config {
    /// Window shape, ``[height, width]``.
    pub window_shape: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Hidden size of the bias MLP.
    #[config(default = 512)]
    pub hidden_dim: usize,
}

impl RelativePositionBiasV2Config {
    /// Initialize a [`RelativePositionBiasV2`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> RelativePositionBiasV2<B> {
        RelativePositionBiasV2 {
            window_shape: self.window_shape,
            num_heads: self.num_heads,
            fc1: LinearConfig::new(2, self.hidden_dim).init(device),
            act: ActivationConfig::Relu.init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.num_heads)
                .with_bias(false)
                .init(device),
            relative_coords_table: log_spaced_relative_coords(self.window_shape, device),
            relative_position_index: relative_position_index(self.window_shape, device),
        }
    }
}

/// Continuous position bias (CPB) module.
#[derive(Module, Debug)]
pub struct RelativePositionBiasV2<B: Backend> {
    /// Window shape.
    pub window_shape: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// ``2 -> hidden_dim``.
    pub fc1: Linear<B>,

    /// Hidden activation.
    pub act: Activation<B>,

    /// ``hidden_dim -> num_heads``, no bias.
    pub fc2: Linear<B>,

    /// ``[(2*wh-1)*(2*ww-1), 2]`` log-spaced offsets.
    pub relative_coords_table: Tensor<B, 2>,

    /// ``[wh*ww, wh*ww]`` offset row for each token pair.
    pub relative_position_index: Tensor<B, 2, Int>,
}

impl<B: Backend> RelativePositionBiasV2<B> {
    /// Number of tokens in a window.
    pub fn window_area(&self) -> usize {
        self.window_shape[0] * self.window_shape[1]
    }

    /// Per-offset bias, before gathering.
    ///
    /// # Returns
    ///
    /// ``[(2*wh-1)*(2*ww-1), num_heads]``
    pub fn bias_table(&self) -> Tensor<B, 2> {
        let x = self.fc1.forward(self.relative_coords_table.clone());
        let x = self.act.forward(x);
        self.fc2.forward(x)
    }

    /// Compute the bias.
    ///
    /// # Returns
    ///
    /// ``[num_heads, window_area, window_area]``, each value in ``(0, 16)``.
    pub fn forward(&self) -> Tensor<B, 3> {
        let n = self.window_area();
        let index = self.relative_position_index.clone().reshape([n * n]);

        let bias = self
            .bias_table()
            .select(0, index)
            .reshape([n, n, self.num_heads])
            .permute([2, 0, 1]);

        sigmoid(bias).mul_scalar(CPB_BIAS_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_pos_bias() {
        let device = Default::default();

        let cpb: RelativePositionBiasV2<B> =
            RelativePositionBiasV2Config::new([4, 4], 3).init(&device);
        assert_eq!(cpb.relative_coords_table.dims(), [49, 2]);
        assert_eq!(cpb.bias_table().dims(), [49, 3]);
        assert!(cpb.fc2.bias.is_none());

        let bias = cpb.forward();
        assert_eq!(bias.dims(), [3, 16, 16]);

        let min: f32 = bias.clone().min().into_scalar();
        let max: f32 = bias.max().into_scalar();
        assert_that!(min, greater_than(0.0));
        assert_that!(max, less_than(16.0));
    }

    #[test]
    fn test_pos_bias_diagonal_is_shared() {
        let device = Default::default();

        let cpb: RelativePositionBiasV2<B> =
            RelativePositionBiasV2Config::new([2, 2], 2).with_hidden_dim(8).init(&device);
        let bias = cpb.forward();

        let first = bias.clone().slice([0..2, 0..1, 0..1]).reshape([2]);
        for i in 1..4 {
            let diag = bias.clone().slice([0..2, i..i + 1, i..i + 1]).reshape([2]);
            diag.to_data().assert_eq(&first.to_data(), true);
        }
    }
}
