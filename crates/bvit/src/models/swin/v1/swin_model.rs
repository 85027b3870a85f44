//! # Swin Transformer (V1) Model
//!
//! [`SwinTransformerV1Config`] describes the full hierarchy;
//! [`SwinTransformerV1`] maps ``[batch, channels, height, width]`` images
//! to ``[batch, num_classes]`` logits.

use crate::layers::drop::drop_path::drop_path_schedule;
use crate::layers::patching::patch_embed::{PatchEmbed, PatchEmbedConfig, PatchEmbedMeta};
use crate::models::swin::layer_config::{LayerConfig, split_per_stage, total_depth};
use crate::models::swin::v1::block_sequence::{StageMeta, StageV1, StageV1Config};
use crate::utility::probability::expect_probability;
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;

/// Swin model meta API; shared by both model versions.
pub trait SwinTransformerMeta {
    /// Input image resolution, ``[height, width]``.
    fn input_resolution(&self) -> [usize; 2];

    /// Patch size.
    fn patch_size(&self) -> usize;

    /// Input image channels.
    fn in_channels(&self) -> usize;

    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Patch embedding size.
    fn embed_dim(&self) -> usize;

    /// Number of stages.
    fn num_layers(&self) -> usize;

    /// Patch grid resolution.
    fn patches_resolution(&self) -> [usize; 2] {
        let [h, w] = self.input_resolution();
        [h / self.patch_size(), w / self.patch_size()]
    }

    /// Resolution seen by stage `i`.
    fn stage_resolution(
        &self,
        i: usize,
    ) -> [usize; 2] {
        let [h, w] = self.patches_resolution();
        [h >> i, w >> i]
    }

    /// Feature size of stage `i`.
    fn stage_dim(
        &self,
        i: usize,
    ) -> usize {
        self.embed_dim() << i
    }

    /// Final feature size; ``embed_dim * 2^(num_layers-1)``.
    fn num_features(&self) -> usize {
        self.stage_dim(self.num_layers().saturating_sub(1))
    }
}

/// [`SwinTransformerV1`] Config.
#[derive(Config, Debug)]
pub struct SwinTransformerV1Config {
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
    #[config(default = 7)]
    pub window_size: usize,

    /// Ratio of mlp hidden size to the token size.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable bias on the qkv projections.
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

impl SwinTransformerMeta for SwinTransformerV1Config {
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

impl SwinTransformerV1Config {
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
    pub fn stage_configs(&self) -> Vec<StageV1Config> {
        assert!(!self.layers.is_empty(), "at least one layer is required");
        let schedule = drop_path_schedule(total_depth(&self.layers), self.drop_path_rate);
        let num_layers = self.num_layers();

        split_per_stage(&self.layers, &schedule)
            .into_iter()
            .zip(self.layers.iter())
            .enumerate()
            .map(|(i, (drop_path, layer))| {
                StageV1Config::new(
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

    /// Initialize a [`SwinTransformerV1`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> SwinTransformerV1<B> {
        expect_probability(self.drop_rate);
        expect_probability(self.attn_drop_rate);

        let patch_embed = self.patch_embed_config().init(device);
        let stages: Vec<StageV1<B>> = self
            .stage_configs()
            .iter()
            .map(|config| config.init(device))
            .collect();

        tracing::debug!(
            input_resolution = ?self.input_resolution,
            num_layers = self.num_layers(),
            num_features = self.num_features(),
            "initialized swin v1"
        );

        SwinTransformerV1 {
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

/// Swin Transformer image classifier.
#[derive(Module, Debug)]
pub struct SwinTransformerV1<B: Backend> {
    /// Number of output classes.
    pub num_classes: usize,

    /// Image to token embedding.
    pub patch_embed: PatchEmbed<B>,

    /// Optional ``[1, num_patches, embed_dim]`` absolute position embedding.
    pub absolute_pos_embed: Option<Param<Tensor<B, 3>>>,

    /// Dropout after embedding.
    pub pos_drop: Dropout,

    /// Stages, in order.
    pub stages: Vec<StageV1<B>>,

    /// Final norm.
    pub norm: LayerNorm<B>,

    /// Classification head.
    pub head: Linear<B>,
}

impl<B: Backend> SwinTransformerMeta for SwinTransformerV1<B> {
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

impl<B: Backend> SwinTransformerV1<B> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = NdArray<f32>;

    fn tiny_config() -> SwinTransformerV1Config {
        SwinTransformerV1Config::new(
            [32, 32],
            2,
            3,
            10,
            16,
            vec![LayerConfig::new(2, 2), LayerConfig::new(2, 4)],
        )
        .with_window_size(4)
    }

    #[test]
    fn test_meta() {
        let config = tiny_config();
        assert_eq!(config.patches_resolution(), [16, 16]);
        assert_eq!(config.stage_resolution(1), [8, 8]);
        assert_eq!(config.stage_dim(1), 32);
        assert_eq!(config.num_features(), 32);

        let swin_t = SwinTransformerV1Config::new(
            [224, 224],
            4,
            3,
            1000,
            96,
            vec![
                LayerConfig::new(2, 3),
                LayerConfig::new(2, 6),
                LayerConfig::new(6, 12),
                LayerConfig::new(2, 24),
            ],
        );
        assert_eq!(swin_t.num_features(), 768);
        assert_eq!(swin_t.stage_resolution(3), [7, 7]);
    }

    #[test]
    fn test_stage_configs() {
        let config = tiny_config().with_drop_path_rate(0.3);
        let stages = config.stage_configs();

        assert_eq!(stages.len(), 2);
        assert!(stages[0].downsample);
        assert!(!stages[1].downsample);
        assert_eq!(stages[1].input_resolution, [8, 8]);
        assert_eq!(stages[1].dim, 32);

        let rates: Vec<f64> = stages.iter().flat_map(|s| s.drop_path.clone()).collect();
        assert_eq!(rates.len(), 4);
        assert_eq!(rates[0], 0.0);
        assert!((rates[3] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_forward() {
        let device = Default::default();

        let model: SwinTransformerV1<B> = tiny_config().with_enable_ape(true).init(&device);
        assert_eq!(model.num_layers(), 2);
        assert_eq!(model.final_resolution(), [8, 8]);
        assert!(model.absolute_pos_embed.is_some());

        let input: Tensor<B, 4> = Tensor::random([2, 3, 32, 32], Distribution::Default, &device);
        let logits = model.forward(input);
        assert_eq!(logits.dims(), [2, 10]);
    }

    #[test]
    fn test_backward() {
        type AB = Autodiff<B>;
        let device = Default::default();

        let model: SwinTransformerV1<AB> = tiny_config().init(&device);
        let input: Tensor<AB, 4> = Tensor::random([1, 3, 32, 32], Distribution::Default, &device);

        let grads = model.forward(input).sum().backward();
        let table_grad = model.stages[0].blocks[0]
            .attn
            .relative_position_bias_table
            .grad(&grads);
        assert!(table_grad.is_some());
    }

    #[test]
    #[should_panic]
    fn test_wrong_input_resolution() {
        let device = Default::default();
        let model: SwinTransformerV1<B> = tiny_config().init(&device);
        let input: Tensor<B, 4> = Tensor::zeros([1, 3, 16, 16], &device);
        model.forward(input);
    }
}
