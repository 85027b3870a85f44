//! # Window Attention (V2)
//!
//! Scaled cosine attention:
//!
//! ```text
//! attn = normalize(q) @ normalize(k)^T * exp(min(logit_scale, ln 100)) + cpb
//! ```

use crate::models::swin::v1::window_attention::{
    WindowAttentionMeta, finish_attention, split_qkv,
};
use crate::models::swin::v2::window_attention::{
    RelativePositionBiasV2, RelativePositionBiasV2Config,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Bool, Tensor};

/// Initial per-head logit scale; ``ln(10)``.
pub const LOGIT_SCALE_INIT: f64 = std::f64::consts::LN_10;

/// Upper clamp of the logit scale; ``ln(100)``.
pub const LOGIT_SCALE_MAX: f64 = 2.0 * std::f64::consts::LN_10;

/// Floor on vector norms in [`l2_normalize`].
pub const NORM_EPS: f64 = 1e-12;

/// [`WindowAttentionV2`] Config.
#[derive(Config, Debug)]
pub struct WindowAttentionV2Config {
    /// Token feature size.
    pub dim: usize,

    /// Window shape, ``[height, width]``.
    pub window_shape: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Enable the learned query / value biases.
    #[config(default = true)]
    pub qkv_bias: bool,

    /// Dropout rate on the attention weights.
    #[config(default = 0.0)]
    pub attn_drop: f64,

    /// Dropout rate on the output projection.
    #[config(default = 0.0)]
    pub proj_drop: f64,

    /// Hidden size of the position bias MLP.
    #[config(default = 512)]
    pub cpb_hidden_dim: usize,
}

impl WindowAttentionMeta for WindowAttentionV2Config {
    fn dim(&self) -> usize {
        self.dim
    }

    fn window_shape(&self) -> [usize; 2] {
        self.window_shape
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }
}

impl WindowAttentionV2Config {
    /// Initialize a [`WindowAttentionV2`].
    ///
    /// # Panics
    ///
    /// If `dim` is not a multiple of `num_heads`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WindowAttentionV2<B> {
        assert_eq!(
            self.dim % self.num_heads,
            0,
            "dim ({}) must be a multiple of num_heads ({})",
            self.dim,
            self.num_heads
        );

        let zero_bias = || Param::from_tensor(Tensor::zeros([self.dim], device));

        WindowAttentionV2 {
            window_shape: self.window_shape,
            num_heads: self.num_heads,
            qkv: LinearConfig::new(self.dim, 3 * self.dim)
                .with_bias(false)
                .init(device),
            q_bias: self.qkv_bias.then(zero_bias),
            v_bias: self.qkv_bias.then(zero_bias),
            logit_scale: Param::from_tensor(
                Tensor::ones([self.num_heads, 1, 1], device).mul_scalar(LOGIT_SCALE_INIT),
            ),
            cpb: RelativePositionBiasV2Config::new(self.window_shape, self.num_heads)
                .with_hidden_dim(self.cpb_hidden_dim)
                .init(device),
            attn_drop: DropoutConfig::new(self.attn_drop).init(),
            proj: LinearConfig::new(self.dim, self.dim).init(device),
            proj_drop: DropoutConfig::new(self.proj_drop).init(),
        }
    }
}

/// Window based multi-head scaled cosine attention.
#[derive(Module, Debug)]
pub struct WindowAttentionV2<B: Backend> {
    /// Window shape, ``[height, width]``.
    pub window_shape: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Fused qkv projection, without bias.
    pub qkv: Linear<B>,

    /// Optional ``[dim]`` query bias.
    pub q_bias: Option<Param<Tensor<B, 1>>>,

    /// Optional ``[dim]`` value bias.
    pub v_bias: Option<Param<Tensor<B, 1>>>,

    /// ``[num_heads, 1, 1]`` log of the attention temperature.
    pub logit_scale: Param<Tensor<B, 3>>,

    /// Continuous position bias.
    pub cpb: RelativePositionBiasV2<B>,

    /// Attention weight dropout.
    pub attn_drop: Dropout,

    /// Output projection.
    pub proj: Linear<B>,

    /// Output dropout.
    pub proj_drop: Dropout,
}

impl<B: Backend> WindowAttentionMeta for WindowAttentionV2<B> {
    fn dim(&self) -> usize {
        self.proj.weight.dims()[1]
    }

    fn window_shape(&self) -> [usize; 2] {
        self.window_shape
    }

    fn num_heads(&self) -> usize {
        self.num_heads
    }
}

impl<B: Backend> WindowAttentionV2<B> {
    /// The fused ``[q_bias, 0, v_bias]`` qkv bias, if enabled.
    fn qkv_bias(&self) -> Option<Tensor<B, 1>> {
        match (&self.q_bias, &self.v_bias) {
            (Some(q_bias), Some(v_bias)) => {
                let q_bias = q_bias.val();
                let k_bias = Tensor::zeros([self.dim()], &q_bias.device());
                Some(Tensor::cat(vec![q_bias, k_bias, v_bias.val()], 0))
            }
            _ => None,
        }
    }

    /// Per-head attention temperature, ``exp(min(logit_scale, ln 100))``.
    ///
    /// # Returns
    ///
    /// ``[num_heads, 1, 1]``
    pub fn logit_temperature(&self) -> Tensor<B, 3> {
        self.logit_scale.val().clamp_max(LOGIT_SCALE_MAX).exp()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch*num_windows, window_area, dim]``.
    /// - `mask`: optional ``[num_windows, window_area, window_area]`` shifted-window mask.
    ///
    /// # Returns
    ///
    /// ``[batch*num_windows, window_area, dim]``
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        mask: Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 3> {
        let [b_nw] = unpack_shape_contract!(
            ["b_nw", "window_area", "dim"],
            &input,
            &["b_nw"],
            &[("window_area", self.window_area()), ("dim", self.dim())],
        );

        let qkv = self.qkv.forward(input);
        let qkv = match self.qkv_bias() {
            Some(bias) => qkv + bias.unsqueeze::<3>(),
            None => qkv,
        };
        let [q, k, v] = split_qkv(qkv, self.num_heads);

        let attn = l2_normalize(q).matmul(l2_normalize(k).transpose());
        let attn = attn * self.logit_temperature().unsqueeze::<4>();
        let attn = attn + self.cpb.forward().unsqueeze::<4>();

        let x = finish_attention(attn, v, mask, &self.attn_drop);
        let x = self.proj.forward(x);
        let x = self.proj_drop.forward(x);

        assert_shape_contract_periodically!(
            ["b_nw", "window_area", "dim"],
            &x,
            &[
                ("b_nw", b_nw),
                ("window_area", self.window_area()),
                ("dim", self.dim())
            ]
        );

        x
    }
}

/// Normalize the last dimension to unit L2 norm.
pub fn l2_normalize<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let norm = x
        .clone()
        .powi_scalar(2)
        .sum_dim(D - 1)
        // Clamp before the root; sqrt has no finite gradient at 0.
        .clamp_min(NORM_EPS * NORM_EPS)
        .sqrt();
    x / norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::swin::attention_mask::sw_attn_mask;
    use burn::backend::{Autodiff, NdArray};
    use burn::prelude::TensorData;
    use burn::tensor::{Distribution, Tolerance};

    type B = NdArray<f32>;

    #[test]
    fn test_l2_normalize() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::from_floats([[3.0, 4.0], [0.0, 0.0]], &device);

        l2_normalize(x).to_data().assert_approx_eq::<f32>(
            &TensorData::from([[0.6f32, 0.8], [0.0, 0.0]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn test_l2_normalize_zero_rows_have_finite_grad() {
        type AB = Autodiff<B>;
        let device = Default::default();
        let x: Tensor<AB, 2> =
            Tensor::from_floats([[3.0, 4.0], [0.0, 0.0]], &device).require_grad();

        let grads = l2_normalize(x.clone()).sum().backward();
        let grad = x.grad(&grads).unwrap().to_data().to_vec::<f32>().unwrap();
        assert!(grad.iter().all(|v| v.is_finite()), "{grad:?}");
    }

    #[test]
    fn test_init() {
        let device = Default::default();
        let attn: WindowAttentionV2<B> = WindowAttentionV2Config::new(12, [4, 4], 3).init(&device);

        assert_eq!(attn.dim(), 12);
        assert!(attn.qkv.bias.is_none());
        assert_eq!(attn.q_bias.as_ref().map(|b| b.dims()), Some([12]));
        assert_eq!(attn.qkv_bias().map(|b| b.dims()), Some([36]));

        attn.logit_temperature().to_data().assert_approx_eq::<f32>(
            &TensorData::from([[[10.0f32]], [[10.0]], [[10.0]]]),
            Tolerance::default(),
        );

        let attn: WindowAttentionV2<B> = WindowAttentionV2Config::new(12, [4, 4], 3)
            .with_qkv_bias(false)
            .init(&device);
        assert!(attn.q_bias.is_none());
        assert!(attn.qkv_bias().is_none());
    }

    #[test]
    fn test_logit_scale_clamp() {
        let device = Default::default();
        let mut attn: WindowAttentionV2<B> =
            WindowAttentionV2Config::new(4, [2, 2], 2).init(&device);
        attn.logit_scale = Param::from_tensor(Tensor::full([2, 1, 1], 10.0, &device));

        attn.logit_temperature().to_data().assert_approx_eq::<f32>(
            &TensorData::from([[[100.0f32]], [[100.0]]]),
            Tolerance::rel_abs(1e-4, 1e-3),
        );
    }

    #[test]
    fn test_forward() {
        let device = Default::default();
        let attn: WindowAttentionV2<B> = WindowAttentionV2Config::new(8, [2, 2], 2)
            .with_cpb_hidden_dim(16)
            .init(&device);

        let input: Tensor<B, 3> = Tensor::random([8, 4, 8], Distribution::Default, &device);
        assert_eq!(attn.forward(input.clone(), None).dims(), [8, 4, 8]);

        let mask = sw_attn_mask::<B>([4, 4], 2, 1, &device);
        assert_eq!(attn.forward(input, Some(mask)).dims(), [8, 4, 8]);
    }

    #[test]
    fn test_backward_reaches_biases() {
        type AB = Autodiff<B>;
        let device = Default::default();

        let attn: WindowAttentionV2<AB> = WindowAttentionV2Config::new(8, [2, 2], 2)
            .with_cpb_hidden_dim(16)
            .init(&device);
        let input: Tensor<AB, 3> = Tensor::random([2, 4, 8], Distribution::Default, &device);

        let grads = attn.forward(input, None).sum().backward();
        assert!(attn.logit_scale.grad(&grads).is_some());
        assert!(attn.cpb.fc1.weight.grad(&grads).is_some());
        assert!(attn.v_bias.as_ref().and_then(|b| b.grad(&grads)).is_some());
    }
}
