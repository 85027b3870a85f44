//! # Swin Transformer Block (V2)
//!
//! Residual post-norm block:
//!
//! ```text
//! x = x + drop_path(norm1(W-MSA(x)))
//! x = x + drop_path(norm2(mlp(x)))
//! ```

use crate::layers::drop::drop_path::{DropPath, apply_drop_path, maybe_drop_path};
use crate::layers::mlp::{Mlp, MlpConfig};
use crate::models::swin::attention_mask::sw_attn_mask;
use crate::models::swin::effective_window;
use crate::models::swin::v1::swin_block::SwinBlockMeta;
use crate::models::swin::v1::window_attention::WindowAttentionMeta;
use crate::models::swin::v2::window_attention::{WindowAttentionV2, WindowAttentionV2Config};
use crate::models::swin::windowing::shifted_window_apply;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::{Backend, Bool, Tensor};

/// [`SwinBlockV2`] Config.
#[derive(Config, Debug)]
pub struct SwinBlockV2Config {
    /// Token feature size.
    pub dim: usize,

    /// Feature map resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Requested window edge length.
    #[config(default = 8)]
    pub window_size: usize,

    /// Requested cyclic shift; ``0`` for W-MSA.
    #[config(default = 0)]
    pub shift_size: usize,

    /// Ratio of mlp hidden size to `dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable the query / value biases.
    #[config(default = true)]
    pub qkv_bias: bool,

    /// Dropout rate.
    #[config(default = 0.0)]
    pub drop: f64,

    /// Attention dropout rate.
    #[config(default = 0.0)]
    pub attn_drop: f64,

    /// Drop path rate.
    #[config(default = 0.0)]
    pub drop_path: f64,
}

impl SwinBlockMeta for SwinBlockV2Config {
    fn dim(&self) -> usize {
        self.dim
    }

    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn window_size(&self) -> usize {
        effective_window(self.input_resolution, self.window_size, self.shift_size).0
    }

    fn shift_size(&self) -> usize {
        effective_window(self.input_resolution, self.window_size, self.shift_size).1
    }
}

impl SwinBlockV2Config {
    /// Initialize a [`SwinBlockV2`].
    ///
    /// # Panics
    ///
    /// If the resolution is not a multiple of the window size,
    /// or the shift is not smaller than the window.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> SwinBlockV2<B> {
        let window_size = self.window_size();
        let shift_size = self.shift_size();
        let [height, width] = self.input_resolution;
        assert!(
            height % window_size == 0 && width % window_size == 0,
            "input_resolution {:?} is not a multiple of window_size {}",
            self.input_resolution,
            window_size,
        );

        SwinBlockV2 {
            input_resolution: self.input_resolution,
            window_size,
            shift_size,
            attn: WindowAttentionV2Config::new(self.dim, [window_size, window_size], self.num_heads)
                .with_qkv_bias(self.qkv_bias)
                .with_attn_drop(self.attn_drop)
                .with_proj_drop(self.drop)
                .init(device),
            norm1: LayerNormConfig::new(self.dim).init(device),
            drop_path: maybe_drop_path(self.drop_path),
            mlp: MlpConfig::new(self.dim)
                .with_mlp_ratio(self.mlp_ratio)
                .with_drop(self.drop)
                .init(device),
            norm2: LayerNormConfig::new(self.dim).init(device),
            attn_mask: (shift_size > 0)
                .then(|| sw_attn_mask(self.input_resolution, window_size, shift_size, device)),
        }
    }
}

/// Swin Transformer V2 Block.
#[derive(Module, Debug)]
pub struct SwinBlockV2<B: Backend> {
    /// Feature map resolution.
    pub input_resolution: [usize; 2],

    /// Effective window edge length.
    pub window_size: usize,

    /// Effective cyclic shift.
    pub shift_size: usize,

    /// Window attention.
    pub attn: WindowAttentionV2<B>,

    /// Post-attention norm.
    pub norm1: LayerNorm<B>,

    /// Optional drop path on both residual branches.
    pub drop_path: Option<DropPath>,

    /// Feed-forward block.
    pub mlp: Mlp<B>,

    /// Post-mlp norm.
    pub norm2: LayerNorm<B>,

    /// Precomputed shifted-window mask; present iff ``shift_size > 0``.
    pub attn_mask: Option<Tensor<B, 3, Bool>>,
}

impl<B: Backend> SwinBlockMeta for SwinBlockV2<B> {
    fn dim(&self) -> usize {
        self.attn.dim()
    }

    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn num_heads(&self) -> usize {
        self.attn.num_heads()
    }

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn shift_size(&self) -> usize {
        self.shift_size
    }
}

impl<B: Backend> SwinBlockV2<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, height*width, dim]``.
    ///
    /// # Returns
    ///
    /// ``[batch, height*width, dim]``
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let [height, width] = self.input_resolution;
        let [batch, dim] = unpack_shape_contract!(
            ["batch", "tokens", "dim"],
            &input,
            &["batch", "dim"],
            &[("tokens", self.num_tokens()), ("dim", self.dim())],
        );

        let x = shifted_window_apply(
            input.clone().reshape([batch, height, width, dim]),
            self.window_size,
            self.shift_size,
            |windows| self.attn.forward(windows, self.attn_mask.clone()),
        );
        let x = self.norm1.forward(x.reshape([batch, height * width, dim]));
        let x = input + apply_drop_path(&self.drop_path, x);

        let y = self.norm2.forward(self.mlp.forward(x.clone()));
        x + apply_drop_path(&self.drop_path, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_config_meta() {
        let config = SwinBlockV2Config::new(96, [64, 64], 3).with_shift_size(4);
        assert_eq!(config.window_size(), 8);
        assert_eq!(config.shift_size(), 4);

        let config = SwinBlockV2Config::new(96, [4, 4], 3).with_shift_size(4);
        assert_eq!(config.window_size(), 4);
        assert_eq!(config.shift_size(), 0);
    }

    #[test]
    fn test_forward() {
        let device = Default::default();

        for shift_size in [0, 2] {
            let block: SwinBlockV2<B> = SwinBlockV2Config::new(16, [8, 8], 2)
                .with_window_size(4)
                .with_shift_size(shift_size)
                .with_drop_path(0.1)
                .init(&device);
            assert_eq!(block.attn_mask.is_some(), shift_size > 0);

            let input: Tensor<B, 3> = Tensor::random([2, 64, 16], Distribution::Default, &device);
            assert_eq!(block.forward(input).dims(), [2, 64, 16]);
        }
    }

    #[test]
    fn test_zero_input_backward_is_finite() {
        type AB = Autodiff<B>;
        let device = Default::default();

        let block: SwinBlockV2<AB> = SwinBlockV2Config::new(8, [4, 4], 2)
            .with_window_size(2)
            .init(&device);
        let input: Tensor<AB, 3> = Tensor::zeros([1, 16, 8], &device).require_grad();

        let grads = block.forward(input.clone()).sum().backward();

        let input_grad = input.grad(&grads).unwrap().to_data().to_vec::<f32>().unwrap();
        assert!(input_grad.iter().all(|v| v.is_finite()), "{input_grad:?}");

        let qkv_grad = block
            .attn
            .qkv
            .weight
            .grad(&grads)
            .unwrap()
            .to_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(qkv_grad.iter().all(|v| v.is_finite()));
    }

    #[test]
    #[should_panic]
    fn test_forward_wrong_tokens() {
        let device = Default::default();
        let block: SwinBlockV2<B> = SwinBlockV2Config::new(16, [8, 8], 2)
            .with_window_size(4)
            .init(&device);
        block.forward(Tensor::zeros([1, 63, 16], &device));
    }
}
