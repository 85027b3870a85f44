//! # Swin Transformer Block (V1)
//!
//! Pre-norm residual block:
//!
//! ```text
//! x = x + drop_path(W-MSA(norm1(x)))
//! x = x + drop_path(mlp(norm2(x)))
//! ```
//!
//! Odd blocks of a stage use shifted windows (SW-MSA).

use crate::layers::drop::drop_path::{DropPath, apply_drop_path, maybe_drop_path};
use crate::layers::mlp::{Mlp, MlpConfig};
use crate::models::swin::attention_mask::sw_attn_mask;
use crate::models::swin::effective_window;
use crate::models::swin::v1::window_attention::{
    WindowAttentionMeta, WindowAttentionV1, WindowAttentionV1Config,
};
use crate::models::swin::windowing::shifted_window_apply;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::{Backend, Bool, Tensor};

/// Swin block meta API; shared by both block versions.
pub trait SwinBlockMeta {
    /// Token feature size.
    fn dim(&self) -> usize;

    /// Feature map resolution, ``[height, width]``.
    fn input_resolution(&self) -> [usize; 2];

    /// Number of attention heads.
    fn num_heads(&self) -> usize;

    /// Window edge length, after clamping to the resolution.
    fn window_size(&self) -> usize;

    /// Cyclic shift, after clamping to the resolution.
    fn shift_size(&self) -> usize;

    /// Number of tokens in the feature map.
    fn num_tokens(&self) -> usize {
        let [h, w] = self.input_resolution();
        h * w
    }
}

/// [`SwinBlockV1`] Config.
#[derive(Config, Debug)]
pub struct SwinBlockV1Config {
    /// Token feature size.
    pub dim: usize,

    /// Feature map resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Requested window edge length.
    #[config(default = 7)]
    pub window_size: usize,

    /// Requested cyclic shift; ``0`` for W-MSA.
    #[config(default = 0)]
    pub shift_size: usize,

    /// Ratio of mlp hidden size to `dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable bias on the qkv projection.
    #[config(default = true)]
    pub qkv_bias: bool,

    /// Override for the query scale.
    #[config(default = "None")]
    pub qk_scale: Option<f64>,

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

impl SwinBlockMeta for SwinBlockV1Config {
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

impl SwinBlockV1Config {
    /// Initialize a [`SwinBlockV1`].
    ///
    /// # Panics
    ///
    /// If the resolution is not a multiple of the window size,
    /// or the shift is not smaller than the window.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> SwinBlockV1<B> {
        let window_size = self.window_size();
        let shift_size = self.shift_size();
        let [height, width] = self.input_resolution;
        assert!(
            height % window_size == 0 && width % window_size == 0,
            "input_resolution {:?} is not a multiple of window_size {}",
            self.input_resolution,
            window_size,
        );

        let attn_mask = if shift_size > 0 {
            Some(sw_attn_mask(
                self.input_resolution,
                window_size,
                shift_size,
                device,
            ))
        } else {
            None
        };

        SwinBlockV1 {
            input_resolution: self.input_resolution,
            window_size,
            shift_size,
            norm1: LayerNormConfig::new(self.dim).init(device),
            attn: WindowAttentionV1Config::new(self.dim, [window_size, window_size], self.num_heads)
                .with_qkv_bias(self.qkv_bias)
                .with_qk_scale(self.qk_scale)
                .with_attn_drop(self.attn_drop)
                .with_proj_drop(self.drop)
                .init(device),
            drop_path: maybe_drop_path(self.drop_path),
            norm2: LayerNormConfig::new(self.dim).init(device),
            mlp: MlpConfig::new(self.dim)
                .with_mlp_ratio(self.mlp_ratio)
                .with_drop(self.drop)
                .init(device),
            attn_mask,
        }
    }
}

/// Swin Transformer Block.
#[derive(Module, Debug)]
pub struct SwinBlockV1<B: Backend> {
    /// Feature map resolution.
    pub input_resolution: [usize; 2],

    /// Effective window edge length.
    pub window_size: usize,

    /// Effective cyclic shift.
    pub shift_size: usize,

    /// Pre-attention norm.
    pub norm1: LayerNorm<B>,

    /// Window attention.
    pub attn: WindowAttentionV1<B>,

    /// Optional drop path on both residual branches.
    pub drop_path: Option<DropPath>,

    /// Pre-mlp norm.
    pub norm2: LayerNorm<B>,

    /// Feed-forward block.
    pub mlp: Mlp<B>,

    /// Precomputed shifted-window mask; present iff ``shift_size > 0``.
    pub attn_mask: Option<Tensor<B, 3, Bool>>,
}

impl<B: Backend> SwinBlockMeta for SwinBlockV1<B> {
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

impl<B: Backend> SwinBlockV1<B> {
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

        let shortcut = input.clone();

        let x = self.norm1.forward(input).reshape([batch, height, width, dim]);
        let x = shifted_window_apply(x, self.window_size, self.shift_size, |windows| {
            self.attn.forward(windows, self.attn_mask.clone())
        });
        let x = x.reshape([batch, height * width, dim]);

        let x = shortcut + apply_drop_path(&self.drop_path, x);

        let y = self.mlp.forward(self.norm2.forward(x.clone()));
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
        let config = SwinBlockV1Config::new(96, [56, 56], 3).with_shift_size(3);
        assert_eq!(config.window_size(), 7);
        assert_eq!(config.shift_size(), 3);
        assert_eq!(config.num_tokens(), 56 * 56);

        let config = SwinBlockV1Config::new(96, [7, 7], 3).with_shift_size(3);
        assert_eq!(config.window_size(), 7);
        assert_eq!(config.shift_size(), 0);
    }

    #[test]
    fn test_init() {
        let device = Default::default();

        let block: SwinBlockV1<B> = SwinBlockV1Config::new(16, [8, 8], 2)
            .with_window_size(4)
            .with_shift_size(2)
            .with_drop_path(0.1)
            .init(&device);

        assert_eq!(block.dim(), 16);
        assert_eq!(block.num_heads(), 2);
        assert_eq!(block.window_size(), 4);
        assert_eq!(block.shift_size(), 2);
        assert!(block.drop_path.is_some());
        assert_eq!(block.attn_mask.as_ref().map(|m| m.dims()), Some([4, 16, 16]));

        let block: SwinBlockV1<B> = SwinBlockV1Config::new(16, [8, 8], 2)
            .with_window_size(4)
            .init(&device);
        assert!(block.attn_mask.is_none());
        assert!(block.drop_path.is_none());
    }

    #[test]
    #[should_panic(expected = "not a multiple of window_size")]
    fn test_init_bad_window() {
        let device = Default::default();
        let _: SwinBlockV1<B> = SwinBlockV1Config::new(16, [10, 10], 2)
            .with_window_size(4)
            .init(&device);
    }

    #[test]
    fn test_forward() {
        let device = Default::default();

        for shift_size in [0, 2] {
            let block: SwinBlockV1<B> = SwinBlockV1Config::new(16, [8, 8], 2)
                .with_window_size(4)
                .with_shift_size(shift_size)
                .init(&device);

            let input: Tensor<B, 3> = Tensor::random([2, 64, 16], Distribution::Default, &device);
            let y = block.forward(input);
            assert_eq!(y.dims(), [2, 64, 16]);
        }
    }

    #[test]
    fn test_forward_autodiff() {
        type AB = Autodiff<B>;
        let device = Default::default();

        let block: SwinBlockV1<AB> = SwinBlockV1Config::new(8, [4, 4], 2)
            .with_window_size(2)
            .with_shift_size(1)
            .with_drop_path(0.5)
            .init(&device);

        let input: Tensor<AB, 3> =
            Tensor::random([2, 16, 8], Distribution::Default, &device).require_grad();
        let y = block.forward(input.clone());
        let grads = y.sum().backward();

        let grad = input.grad(&grads).expect("input grad");
        assert_eq!(grad.dims(), [2, 16, 8]);
    }
}
