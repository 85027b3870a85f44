//! # Vision Transformer Model

use crate::layers::drop::drop_path::drop_path_schedule;
use crate::layers::patching::patch_embed::{PatchEmbed, PatchEmbedConfig, PatchEmbedMeta};
use crate::models::vit::encoder_block::{VIT_NORM_EPS, ViTEncoderBlock, ViTEncoderBlockConfig};
use crate::utility::probability::expect_probability;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;

/// [`VisionTransformer`] Meta API.
pub trait VisionTransformerMeta {
    /// Input image resolution, ``[height, width]``.
    fn input_resolution(&self) -> [usize; 2];

    /// Patch size.
    fn patch_size(&self) -> usize;

    /// Token feature size.
    fn embed_dim(&self) -> usize;

    /// Number of encoder blocks.
    fn depth(&self) -> usize;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Number of patch tokens.
    fn num_patches(&self) -> usize {
        let [h, w] = self.input_resolution();
        (h / self.patch_size()) * (w / self.patch_size())
    }

    /// Sequence length, including the class token.
    fn seq_len(&self) -> usize {
        self.num_patches() + 1
    }
}

/// [`VisionTransformer`] Config.
#[derive(Config, Debug)]
pub struct VisionTransformerConfig {
    /// Input image resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Patch size.
    pub patch_size: usize,

    /// Input image channels.
    pub in_channels: usize,

    /// Number of output classes.
    pub num_classes: usize,

    /// Token feature size.
    pub embed_dim: usize,

    /// Number of encoder blocks.
    pub depth: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Ratio of mlp hidden size to `embed_dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Dropout rate.
    #[config(default = 0.0)]
    pub drop_rate: f64,

    /// Attention dropout rate.
    #[config(default = 0.0)]
    pub attn_drop_rate: f64,

    /// Stochastic depth rate of the final block.
    #[config(default = 0.0)]
    pub drop_path_rate: f64,
}

impl VisionTransformerMeta for VisionTransformerConfig {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn patch_size(&self) -> usize {
        self.patch_size
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl VisionTransformerConfig {
    /// Encoder block configs, with the stochastic depth schedule applied.
    pub fn block_configs(&self) -> Vec<ViTEncoderBlockConfig> {
        drop_path_schedule(self.depth, self.drop_path_rate)
            .into_iter()
            .map(|drop_path| {
                ViTEncoderBlockConfig::new(self.embed_dim, self.num_heads)
                    .with_mlp_ratio(self.mlp_ratio)
                    .with_drop(self.drop_rate)
                    .with_attn_drop(self.attn_drop_rate)
                    .with_drop_path(drop_path)
            })
            .collect()
    }

    /// Initialize a [`VisionTransformer`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> VisionTransformer<B> {
        expect_probability(self.drop_rate);

        let patch_embed: PatchEmbed<B> = PatchEmbedConfig::new(
            self.input_resolution,
            self.patch_size,
            self.in_channels,
            self.embed_dim,
        )
        .with_enable_patch_norm(false)
        .init(device);

        tracing::debug!(
            input_resolution = ?self.input_resolution,
            seq_len = self.seq_len(),
            depth = self.depth,
            "initialized vit"
        );

        VisionTransformer {
            num_classes: self.num_classes,
            patch_embed,
            class_token: Param::from_tensor(Tensor::zeros([1, 1, self.embed_dim], device)),
            pos_embed: Param::from_tensor(Tensor::random(
                [1, self.seq_len(), self.embed_dim],
                Distribution::Normal(0.0, 0.02),
                device,
            )),
            pos_drop: DropoutConfig::new(self.drop_rate).init(),
            blocks: self
                .block_configs()
                .iter()
                .map(|config| config.init(device))
                .collect(),
            norm: LayerNormConfig::new(self.embed_dim)
                .with_epsilon(VIT_NORM_EPS)
                .init(device),
            head: LinearConfig::new(self.embed_dim, self.num_classes).init(device),
        }
    }
}

/// Vision Transformer image classifier.
#[derive(Module, Debug)]
pub struct VisionTransformer<B: Backend> {
    /// Number of output classes.
    pub num_classes: usize,

    /// Image to token embedding; no token norm.
    pub patch_embed: PatchEmbed<B>,

    /// ``[1, 1, embed_dim]`` learned class token.
    pub class_token: Param<Tensor<B, 3>>,

    /// ``[1, 1 + num_patches, embed_dim]`` learned position embedding.
    pub pos_embed: Param<Tensor<B, 3>>,

    /// Dropout after embedding.
    pub pos_drop: Dropout,

    /// Encoder blocks.
    pub blocks: Vec<ViTEncoderBlock<B>>,

    /// Final norm.
    pub norm: LayerNorm<B>,

    /// Classification head.
    pub head: Linear<B>,
}

impl<B: Backend> VisionTransformerMeta for VisionTransformer<B> {
    fn input_resolution(&self) -> [usize; 2] {
        self.patch_embed.input_resolution()
    }

    fn patch_size(&self) -> usize {
        self.patch_embed.patch_size()
    }

    fn embed_dim(&self) -> usize {
        self.patch_embed.embed_dim()
    }

    fn depth(&self) -> usize {
        self.blocks.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> VisionTransformer<B> {
    /// Embed images as a class token plus patch tokens.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, 1 + num_patches, embed_dim]``
    pub fn embed(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 3> {
        let batch = input.dims()[0];
        let x = self.patch_embed.forward(input);

        let class_token = self.class_token.val().repeat_dim(0, batch);
        let x = Tensor::cat(vec![class_token, x], 1);

        self.pos_drop.forward(x + self.pos_embed.val())
    }

    /// Normalized class token features.
    ///
    /// # Returns
    ///
    /// ``[batch, embed_dim]``
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[
                ("in_channels", self.patch_embed.in_channels()),
                ("height", self.input_resolution()[0]),
                ("width", self.input_resolution()[1]),
            ],
        );

        let x = self.embed(input);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        let x = self.norm.forward(x);

        let embed_dim = self.embed_dim();
        x.slice([0..batch, 0..1, 0..embed_dim])
            .reshape([batch, embed_dim])
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        self.head.forward(self.forward_features(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = NdArray<f32>;

    fn tiny_config() -> VisionTransformerConfig {
        VisionTransformerConfig::new([16, 16], 4, 3, 7, 16, 2, 2)
    }

    #[test]
    fn test_meta() {
        let config = tiny_config();
        assert_eq!(config.num_patches(), 16);
        assert_eq!(config.seq_len(), 17);

        let config = tiny_config().with_drop_path_rate(0.2);
        let rates: Vec<f64> = config.block_configs().iter().map(|b| b.drop_path).collect();
        assert_eq!(rates, vec![0.0, 0.2]);
    }

    #[test]
    fn test_embed() {
        let device = Default::default();
        let model: VisionTransformer<B> = tiny_config().init(&device);

        assert_eq!(model.class_token.dims(), [1, 1, 16]);
        assert_eq!(model.pos_embed.dims(), [1, 17, 16]);
        assert!(model.patch_embed.norm.is_none());

        let input: Tensor<B, 4> = Tensor::random([3, 3, 16, 16], Distribution::Default, &device);
        let x = model.embed(input);
        assert_eq!(x.dims(), [3, 17, 16]);

        // Token 0 is the (zero) class token plus its position embedding.
        let expected = model.pos_embed.val().slice([0..1, 0..1, 0..16]);
        x.slice([1..2, 0..1, 0..16])
            .to_data()
            .assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_forward() {
        let device = Default::default();
        let model: VisionTransformer<B> = tiny_config().init(&device);

        let input: Tensor<B, 4> = Tensor::random([2, 3, 16, 16], Distribution::Default, &device);
        assert_eq!(model.forward(input).dims(), [2, 7]);
    }

    #[test]
    fn test_backward_reaches_class_token() {
        type AB = Autodiff<B>;
        let device = Default::default();
        let model: VisionTransformer<AB> = tiny_config().init(&device);

        let input: Tensor<AB, 4> = Tensor::random([1, 3, 16, 16], Distribution::Default, &device);
        let grads = model.forward(input).sum().backward();
        assert!(model.class_token.grad(&grads).is_some());
        assert!(model.pos_embed.grad(&grads).is_some());
    }
}
