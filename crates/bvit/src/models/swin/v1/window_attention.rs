//! # Window Attention (V1)
//!
//! [`WindowAttentionV1`] is multi-head self-attention restricted to a window,
//! with a learned relative position bias table.
//!
//! [`WindowAttentionMeta`] is the common meta API for [`WindowAttentionV1`]
//! and [`WindowAttentionV1Config`].

use crate::models::swin::attention_mask::apply_attention_mask;
use crate::models::swin::pos_grid::{num_relative_offsets, relative_position_index};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Bool, Int, Tensor};
use burn::tensor::Distribution;
use burn::tensor::activation::softmax;

/// Window attention meta API.
pub trait WindowAttentionMeta {
    /// Token feature size.
    fn dim(&self) -> usize;

    /// Window shape, ``[height, width]``.
    fn window_shape(&self) -> [usize; 2];

    /// Number of attention heads.
    fn num_heads(&self) -> usize;

    /// Per-head feature size.
    fn head_dim(&self) -> usize {
        self.dim() / self.num_heads()
    }

    /// Number of tokens in a window.
    fn window_area(&self) -> usize {
        let [h, w] = self.window_shape();
        h * w
    }
}

/// [`WindowAttentionV1`] Config.
#[derive(Config, Debug)]
pub struct WindowAttentionV1Config {
    /// Token feature size.
    pub dim: usize,

    /// Window shape, ``[height, width]``.
    pub window_shape: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Enable bias on the qkv projection.
    #[config(default = true)]
    pub qkv_bias: bool,

    /// Override for the ``head_dim^-0.5`` query scale.
    #[config(default = "None")]
    pub qk_scale: Option<f64>,

    /// Dropout rate on the attention weights.
    #[config(default = 0.0)]
    pub attn_drop: f64,

    /// Dropout rate on the output projection.
    #[config(default = 0.0)]
    pub proj_drop: f64,
}

impl WindowAttentionMeta for WindowAttentionV1Config {
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

impl WindowAttentionV1Config {
    /// Initialize a [`WindowAttentionV1`].
    ///
    /// # Panics
    ///
    /// If `dim` is not a multiple of `num_heads`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> WindowAttentionV1<B> {
        assert_eq!(
            self.dim % self.num_heads,
            0,
            "dim ({}) must be a multiple of num_heads ({})",
            self.dim,
            self.num_heads
        );
        let scale = self
            .qk_scale
            .unwrap_or_else(|| (self.head_dim() as f64).powf(-0.5));

        WindowAttentionV1 {
            window_shape: self.window_shape,
            num_heads: self.num_heads,
            scale,
            qkv: LinearConfig::new(self.dim, 3 * self.dim)
                .with_bias(self.qkv_bias)
                .init(device),
            relative_position_bias_table: Param::from_tensor(Tensor::random(
                [num_relative_offsets(self.window_shape), self.num_heads],
                Distribution::Normal(0.0, 0.02),
                device,
            )),
            relative_position_index: relative_position_index(self.window_shape, device),
            attn_drop: DropoutConfig::new(self.attn_drop).init(),
            proj: LinearConfig::new(self.dim, self.dim).init(device),
            proj_drop: DropoutConfig::new(self.proj_drop).init(),
        }
    }
}

/// Window based multi-head self attention with a learned relative position bias.
#[derive(Module, Debug)]
pub struct WindowAttentionV1<B: Backend> {
    /// Window shape, ``[height, width]``.
    pub window_shape: [usize; 2],

    /// Number of attention heads.
    pub num_heads: usize,

    /// Query scale.
    pub scale: f64,

    /// Fused qkv projection.
    pub qkv: Linear<B>,

    /// ``[(2*wh-1)*(2*ww-1), num_heads]`` learned bias per relative offset.
    pub relative_position_bias_table: Param<Tensor<B, 2>>,

    /// ``[wh*ww, wh*ww]`` table row for each token pair.
    pub relative_position_index: Tensor<B, 2, Int>,

    /// Attention weight dropout.
    pub attn_drop: Dropout,

    /// Output projection.
    pub proj: Linear<B>,

    /// Output dropout.
    pub proj_drop: Dropout,
}

impl<B: Backend> WindowAttentionMeta for WindowAttentionV1<B> {
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

impl<B: Backend> WindowAttentionV1<B> {
    /// The relative position bias for every head and token pair.
    ///
    /// # Returns
    ///
    /// ``[num_heads, window_area, window_area]``
    pub fn relative_position_bias(&self) -> Tensor<B, 3> {
        let n = self.window_area();
        let index = self.relative_position_index.clone().reshape([n * n]);

        self.relative_position_bias_table
            .val()
            .select(0, index)
            .reshape([n, n, self.num_heads])
            .permute([2, 0, 1])
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

        let [q, k, v] = split_qkv(self.qkv.forward(input), self.num_heads);

        let attn = q.mul_scalar(self.scale).matmul(k.transpose());
        let attn = attn + self.relative_position_bias().unsqueeze::<4>();

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

/// Split a fused qkv projection into per-head queries, keys and values.
///
/// # Arguments
///
/// - `qkv`: ``[batch, tokens, 3*dim]``.
///
/// # Returns
///
/// ``[q, k, v]``, each ``[batch, num_heads, tokens, dim/num_heads]``.
pub fn split_qkv<B: Backend>(
    qkv: Tensor<B, 3>,
    num_heads: usize,
) -> [Tensor<B, 4>; 3] {
    let [batch, tokens, fused] = qkv.dims();
    let dim = fused / 3;
    let head_dim = dim / num_heads;

    let qkv = qkv.reshape([batch, tokens, 3, num_heads, head_dim]);
    let part = |i: usize| {
        qkv.clone()
            .narrow(2, i, 1)
            .reshape([batch, tokens, num_heads, head_dim])
            .swap_dims(1, 2)
    };

    [part(0), part(1), part(2)]
}

/// Masked softmax, weighted sum of values, and head merge.
///
/// # Arguments
///
/// - `attn`: ``[batch*num_windows, heads, tokens, tokens]`` logits.
/// - `v`: ``[batch*num_windows, heads, tokens, head_dim]``.
///
/// # Returns
///
/// ``[batch*num_windows, tokens, heads*head_dim]``
pub fn finish_attention<B: Backend>(
    attn: Tensor<B, 4>,
    v: Tensor<B, 4>,
    mask: Option<Tensor<B, 3, Bool>>,
    attn_drop: &Dropout,
) -> Tensor<B, 3> {
    let attn = match mask {
        Some(mask) => apply_attention_mask(attn, mask),
        None => attn,
    };
    let attn = softmax(attn, 3);
    let attn = attn_drop.forward(attn);

    let [b_nw, heads, tokens, head_dim] = v.dims();
    attn.matmul(v)
        .swap_dims(1, 2)
        .reshape([b_nw, tokens, heads * head_dim])
}
