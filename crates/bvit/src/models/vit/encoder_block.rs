//! # ViT Encoder Block

use crate::layers::drop::drop_path::{DropPath, apply_drop_path, maybe_drop_path};
use crate::layers::mlp::{Mlp, MlpConfig};
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig};
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::{Backend, Tensor};

/// LayerNorm epsilon used throughout ViT.
pub const VIT_NORM_EPS: f64 = 1e-6;

/// [`ViTEncoderBlock`] Config.
#[derive(Config, Debug)]
pub struct ViTEncoderBlockConfig {
    /// Token feature size.
    pub dim: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Ratio of mlp hidden size to `dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

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

impl ViTEncoderBlockConfig {
    /// Initialize a [`ViTEncoderBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ViTEncoderBlock<B> {
        assert_eq!(
            self.dim % self.num_heads,
            0,
            "dim ({}) must be a multiple of num_heads ({})",
            self.dim,
            self.num_heads
        );

        ViTEncoderBlock {
            norm1: LayerNormConfig::new(self.dim)
                .with_epsilon(VIT_NORM_EPS)
                .init(device),
            attn: MultiHeadAttentionConfig::new(self.dim, self.num_heads)
                .with_dropout(self.attn_drop)
                .init(device),
            drop_path: maybe_drop_path(self.drop_path),
            norm2: LayerNormConfig::new(self.dim)
                .with_epsilon(VIT_NORM_EPS)
                .init(device),
            mlp: MlpConfig::new(self.dim)
                .with_mlp_ratio(self.mlp_ratio)
                .with_drop(self.drop)
                .init(device),
        }
    }
}

/// Pre-norm transformer encoder block.
#[derive(Module, Debug)]
pub struct ViTEncoderBlock<B: Backend> {
    /// Pre-attention norm.
    pub norm1: LayerNorm<B>,

    /// Multi-head self attention.
    pub attn: MultiHeadAttention<B>,

    /// Optional drop path on both residual branches.
    pub drop_path: Option<DropPath>,

    /// Pre-mlp norm.
    pub norm2: LayerNorm<B>,

    /// Feed-forward block.
    pub mlp: Mlp<B>,
}

impl<B: Backend> ViTEncoderBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, tokens, dim]``.
    ///
    /// # Returns
    ///
    /// ``[batch, tokens, dim]``
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let [batch, tokens, dim] = input.dims();

        let attn = self
            .attn
            .forward(MhaInput::self_attn(self.norm1.forward(input.clone())))
            .context;
        let x = input + apply_drop_path(&self.drop_path, attn);

        let y = self.mlp.forward(self.norm2.forward(x.clone()));
        let x = x + apply_drop_path(&self.drop_path, y);

        assert_shape_contract_periodically!(
            ["batch", "tokens", "dim"],
            &x,
            &[("batch", batch), ("tokens", tokens), ("dim", dim)]
        );
        x
    }
}
