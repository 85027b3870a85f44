//! # Swin Transformer V2 Model
//!
//! [`SwinTransformerV2Config`] describes the full hierarchy;
//! [`SwinTransformerV2`] maps ``[batch, channels, height, width]`` images
//! to ``[batch, num_classes]`` logits.

use crate::layers::drop::drop_path::drop_path_schedule;
use crate::layers::patching::patch_embed::{PatchEmbed, PatchEmbedConfig, PatchEmbedMeta};
use crate::models::swin::layer_config::{LayerConfig, split_per_stage, total_depth};
use crate::models::swin::v1::block_sequence::StageMeta;
use crate::models::swin::v1::swin_model::SwinTransformerMeta;
use crate::models::swin::v2::block_sequence::{StageV2, StageV2Config};
use crate::utility::probability::expect_probability;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;

/// [`SwinTransformerV2`] Config.
#[derive(Config, Debug)]
pub struct SwinTransformerV2Config {
    /// Input image resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Patch size.
    pub patch_size: usize,

    /// Input image channels.
    pub in_channels: usize,

    /// Number of output classes.
    pub num_classes: usize,

    /// Patch embedding size.
    pub embed_dim: usize,

    /// Stage layouts.
    pub layers: Vec<LayerConfig>,

    /// Window edge length.
    #[config(default = 8)]
    pub window_size: usize,

    /// Ratio of mlp hidden size to the token size.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable the query / value biases.
    #[config(default = true)]
    pub qkv_bias: bool,

    /// Dropout rate.
    #[config(default = 0.0)]
    pub drop_rate: f64,

    /// Attention dropout rate.
    #[config(default = 0.0)]
    pub attn_drop_rate: f64,

    /// Stochastic depth rate of the final block.
    #[config(default = 0.1)]
    pub drop_path_rate: f64,

    /// Add a learned absolute position embedding to the patch tokens.
    #[config(default = false)]
    pub enable_ape: bool,

    /// Normalize the patch tokens.
    #[config(default = true)]
    pub enable_patch_norm: bool,
}

impl SwinTransformerMeta for SwinTransformerV2Config {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn patch_size(&self) -> usize {
        self.patch_size
    }

    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl SwinTransformerV2Config {
    /// The patch embedding config.
    pub fn patch_embed_config(&self) -> PatchEmbedConfig {
        PatchEmbedConfig::new(
            self.input_resolution,
            self.patch_size,
            self.in_channels,
            self.embed_dim,
        )
        .with_enable_patch_norm(self.enable_patch_norm)
    }

    /// The stage configs, with the stochastic depth schedule applied.
    ///
    /// # Panics
    ///
    /// If there are no layers.
    pub fn stage_configs(&self) -> Vec<StageV2Config> {
        assert!(!self.layers.is_empty(), "at least one layer is required");
        let schedule = drop_path_schedule(total_depth(&self.layers), self.drop_path_rate);
        let num_layers = self.num_layers();

        split_per_stage(&self.layers, &schedule)
            .into_iter()
            .zip(self.layers.iter())
            .enumerate()
            .map(|(i, (drop_path, layer))| {
                StageV2Config::new(
                    self.stage_dim(i),
                    self.stage_resolution(i),
                    layer.depth,
                    layer.num_heads,
                )
                .with_window_size(self.window_size)
                .with_mlp_ratio(self.mlp_ratio)
                .with_qkv_bias(self.qkv_bias)
                .with_drop(self.drop_rate)
                .with_attn_drop(self.attn_drop_rate)
                .with_drop_path(drop_path)
                .with_downsample(i + 1 < num_layers)
            })
            .collect()
    }

    /// Initialize a [`SwinTransformerV2`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> SwinTransformerV2<B> {
        expect_probability(self.drop_rate);
        expect_probability(self.attn_drop_rate);

        let patch_embed = self.patch_embed_config().init(device);
        let stages: Vec<StageV2<B>> = self
            .stage_configs()
            .iter()
            .map(|config| config.init(device))
            .collect();

        tracing::debug!(
            input_resolution = ?self.input_resolution,
            num_layers = self.num_layers(),
            num_features = self.num_features(),
            "initialized swin v2"
        );

        SwinTransformerV2 {
            num_classes: self.num_classes,
            absolute_pos_embed: if self.enable_ape {
                Some(Param::from_tensor(Tensor::random(
                    [1, patch_embed.num_patches(), self.embed_dim],
                    Distribution::Normal(0.0, 0.02),
                    device,
                )))
            } else {
                None
            },
            patch_embed,
            pos_drop: DropoutConfig::new(self.drop_rate).init(),
            stages,
            norm: LayerNormConfig::new(self.num_features()).init(device),
            head: LinearConfig::new(self.num_features(), self.num_classes).init(device),
        }
    }
}

/// Swin Transformer V2 image classifier.
#[derive(Module, Debug)]
pub struct SwinTransformerV2<B: Backend> {
    /// Number of output classes.
    pub num_classes: usize,

    /// Image to token embedding.
    pub patch_embed: PatchEmbed<B>,

    /// Optional ``[1, num_patches, embed_dim]`` absolute position embedding.
    pub absolute_pos_embed: Option<Param<Tensor<B, 3>>>,

    /// Dropout after embedding.
    pub pos_drop: Dropout,

    /// Stages, in order.
    pub stages: Vec<StageV2<B>>,

    /// Final norm.
    pub norm: LayerNorm<B>,

    /// Classification head.
    pub head: Linear<B>,
}

impl<B: Backend> SwinTransformerMeta for SwinTransformerV2<B> {
    fn input_resolution(&self) -> [usize; 2] {
        self.patch_embed.input_resolution()
    }

    fn patch_size(&self) -> usize {
        self.patch_embed.patch_size()
    }

    fn in_channels(&self) -> usize {
        self.patch_embed.in_channels()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn embed_dim(&self) -> usize {
        self.patch_embed.embed_dim()
    }

    fn num_layers(&self) -> usize {
        self.stages.len()
    }
}

impl<B: Backend> SwinTransformerV2<B> {
    /// Pooled features.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_features]``
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[
                ("in_channels", self.in_channels()),
                ("height", self.input_resolution()[0]),
                ("width", self.input_resolution()[1]),
            ],
        );

        let x = self.patch_embed.forward(input);
        let x = match &self.absolute_pos_embed {
            Some(pos_embed) => x + pos_embed.val(),
            None => x,
        };
        let x = self.pos_drop.forward(x);

        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        let x = self.norm.forward(x);
        x.mean_dim(1).reshape([batch, self.num_features()])
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

    /// Output resolution of the last stage.
    pub fn final_resolution(&self) -> [usize; 2] {
        self.stages
            .last()
            .map(|stage| stage.output_resolution())
            .unwrap_or(self.patches_resolution())
    }
}
