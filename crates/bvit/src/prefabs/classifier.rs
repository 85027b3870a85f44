//! # Image Classifier Prefabs
//!
//! [`ClassifierConfig`] wraps the transformer family configs so that a
//! training program can select a model by name:
//!
//! ```rust,no_run
//! use bvit::prefabs::classifier::{Classifier, PREFAB_CLASSIFIER_MAP};
//! use burn::backend::NdArray;
//!
//! let device = Default::default();
//! let config = PREFAB_CLASSIFIER_MAP
//!     .expect_lookup_prefab("swin_tiny_32")
//!     .new_config()
//!     .with_image([32, 32], 3, 10);
//! let model: Classifier<NdArray> = config.init(&device);
//! ```

use crate::models::swin::check_swin_geometry;
use crate::models::swin::layer_config::LayerConfig;
use crate::models::swin::v1::swin_model::{
    SwinTransformerMeta, SwinTransformerV1, SwinTransformerV1Config,
};
use crate::models::swin::v2::swin_model::{SwinTransformerV2, SwinTransformerV2Config};
use crate::models::vit::vit_model::{
    VisionTransformer, VisionTransformerConfig, VisionTransformerMeta,
};
use crate::prefabs::prefab_map::{StaticPreFabConfig, StaticPreFabMap};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Config for any supported image classifier.
#[derive(Config, Debug)]
pub enum ClassifierConfig {
    /// Swin Transformer.
    SwinV1(SwinTransformerV1Config),

    /// Swin Transformer V2.
    SwinV2(SwinTransformerV2Config),

    /// Vision Transformer.
    ViT(VisionTransformerConfig),
}

impl ClassifierConfig {
    /// Short family name.
    pub fn family(&self) -> &'static str {
        match self {
            Self::SwinV1(_) => "swin",
            Self::SwinV2(_) => "swin_v2",
            Self::ViT(_) => "vit",
        }
    }

    /// Input image resolution, ``[height, width]``.
    pub fn input_resolution(&self) -> [usize; 2] {
        match self {
            Self::SwinV1(config) => config.input_resolution,
            Self::SwinV2(config) => config.input_resolution,
            Self::ViT(config) => config.input_resolution,
        }
    }

    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        match self {
            Self::SwinV1(config) => config.num_classes,
            Self::SwinV2(config) => config.num_classes,
            Self::ViT(config) => config.num_classes,
        }
    }

    /// Rewrite the input and head geometry.
    pub fn with_image(
        self,
        input_resolution: [usize; 2],
        in_channels: usize,
        num_classes: usize,
    ) -> Self {
        match self {
            Self::SwinV1(mut config) => {
                config.input_resolution = input_resolution;
                config.in_channels = in_channels;
                config.num_classes = num_classes;
                Self::SwinV1(config)
            }
            Self::SwinV2(mut config) => {
                config.input_resolution = input_resolution;
                config.in_channels = in_channels;
                config.num_classes = num_classes;
                Self::SwinV2(config)
            }
            Self::ViT(mut config) => {
                config.input_resolution = input_resolution;
                config.in_channels = in_channels;
                config.num_classes = num_classes;
                Self::ViT(config)
            }
        }
    }

    /// Check that the input geometry fits the architecture.
    ///
    /// [`ClassifierConfig::init`] panics on the same conditions; this lets
    /// callers report them instead.
    ///
    /// # Errors
    ///
    /// A description of the first mismatch found.
    pub fn check_geometry(&self) -> Result<(), String> {
        match self {
            Self::SwinV1(config) => check_swin_geometry(
                config.input_resolution,
                config.patch_size,
                config.num_layers(),
                config.window_size,
            ),
            Self::SwinV2(config) => check_swin_geometry(
                config.input_resolution,
                config.patch_size,
                config.num_layers(),
                config.window_size,
            ),
            Self::ViT(config) => {
                let [h, w] = config.input_resolution;
                if h % config.patch_size != 0 || w % config.patch_size != 0 {
                    Err(format!(
                        "input_resolution {:?} is not a multiple of patch_size {}",
                        config.input_resolution, config.patch_size
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Set the stochastic depth rate of the final block.
    pub fn with_drop_path_rate(
        self,
        drop_path_rate: f64,
    ) -> Self {
        match self {
            Self::SwinV1(config) => Self::SwinV1(config.with_drop_path_rate(drop_path_rate)),
            Self::SwinV2(config) => Self::SwinV2(config.with_drop_path_rate(drop_path_rate)),
            Self::ViT(config) => Self::ViT(config.with_drop_path_rate(drop_path_rate)),
        }
    }

    /// Initialize a [`Classifier`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Classifier<B> {
        match self {
            Self::SwinV1(config) => Classifier::SwinV1(config.init(device)),
            Self::SwinV2(config) => Classifier::SwinV2(config.init(device)),
            Self::ViT(config) => Classifier::ViT(config.init(device)),
        }
    }
}

impl From<SwinTransformerV1Config> for ClassifierConfig {
    fn from(config: SwinTransformerV1Config) -> Self {
        Self::SwinV1(config)
    }
}

impl From<SwinTransformerV2Config> for ClassifierConfig {
    fn from(config: SwinTransformerV2Config) -> Self {
        Self::SwinV2(config)
    }
}

impl From<VisionTransformerConfig> for ClassifierConfig {
    fn from(config: VisionTransformerConfig) -> Self {
        Self::ViT(config)
    }
}

/// Any supported image classifier.
#[derive(Module, Debug)]
pub enum Classifier<B: Backend> {
    /// Swin Transformer.
    SwinV1(SwinTransformerV1<B>),

    /// Swin Transformer V2.
    SwinV2(SwinTransformerV2<B>),

    /// Vision Transformer.
    ViT(VisionTransformer<B>),
}

impl<B: Backend> Classifier<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        match self {
            Self::SwinV1(model) => model.num_classes(),
            Self::SwinV2(model) => model.num_classes(),
            Self::ViT(model) => model.num_classes(),
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `images`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        match self {
            Self::SwinV1(model) => model.forward(images),
            Self::SwinV2(model) => model.forward(images),
            Self::ViT(model) => model.forward(images),
        }
    }
}

fn swin_layers(
    depths: [usize; 4],
    heads: [usize; 4],
) -> Vec<LayerConfig> {
    depths
        .into_iter()
        .zip(heads)
        .map(|(depth, num_heads)| LayerConfig::new(depth, num_heads))
        .collect()
}

fn swin_v1(
    embed_dim: usize,
    depths: [usize; 4],
    heads: [usize; 4],
    drop_path_rate: f64,
) -> ClassifierConfig {
    SwinTransformerV1Config::new([224, 224], 4, 3, 1000, embed_dim, swin_layers(depths, heads))
        .with_window_size(7)
        .with_drop_path_rate(drop_path_rate)
        .into()
}

fn swin_v2(
    embed_dim: usize,
    depths: [usize; 4],
    heads: [usize; 4],
    drop_path_rate: f64,
) -> ClassifierConfig {
    SwinTransformerV2Config::new([256, 256], 4, 3, 1000, embed_dim, swin_layers(depths, heads))
        .with_window_size(8)
        .with_drop_path_rate(drop_path_rate)
        .into()
}

fn vit_16(
    embed_dim: usize,
    depth: usize,
    num_heads: usize,
) -> ClassifierConfig {
    VisionTransformerConfig::new([224, 224], 16, 3, 1000, embed_dim, depth, num_heads).into()
}

/// Well-known classifier configs.
///
/// Geometry defaults to ImageNet; use [`ClassifierConfig::with_image`] to adapt.
pub static PREFAB_CLASSIFIER_MAP: StaticPreFabMap<ClassifierConfig> = StaticPreFabMap {
    name: "classifier",
    description: "Well-known vision transformer classifier configs",

    items: &[
        &StaticPreFabConfig {
            name: "swin_t",
            description: "Swin-T; C=96, depths [2, 2, 6, 2], 224px, window 7",
            builder: || swin_v1(96, [2, 2, 6, 2], [3, 6, 12, 24], 0.2),
        },
        &StaticPreFabConfig {
            name: "swin_s",
            description: "Swin-S; C=96, depths [2, 2, 18, 2], 224px, window 7",
            builder: || swin_v1(96, [2, 2, 18, 2], [3, 6, 12, 24], 0.3),
        },
        &StaticPreFabConfig {
            name: "swin_b",
            description: "Swin-B; C=128, depths [2, 2, 18, 2], 224px, window 7",
            builder: || swin_v1(128, [2, 2, 18, 2], [4, 8, 16, 32], 0.5),
        },
        &StaticPreFabConfig {
            name: "swin_v2_t",
            description: "SwinV2-T; C=96, depths [2, 2, 6, 2], 256px, window 8",
            builder: || swin_v2(96, [2, 2, 6, 2], [3, 6, 12, 24], 0.2),
        },
        &StaticPreFabConfig {
            name: "swin_v2_s",
            description: "SwinV2-S; C=96, depths [2, 2, 18, 2], 256px, window 8",
            builder: || swin_v2(96, [2, 2, 18, 2], [3, 6, 12, 24], 0.3),
        },
        &StaticPreFabConfig {
            name: "swin_v2_b",
            description: "SwinV2-B; C=128, depths [2, 2, 18, 2], 256px, window 8",
            builder: || swin_v2(128, [2, 2, 18, 2], [4, 8, 16, 32], 0.5),
        },
        &StaticPreFabConfig {
            name: "vit_b_16",
            description: "ViT-B/16; D=768, 12 blocks, 12 heads, 224px",
            builder: || vit_16(768, 12, 12),
        },
        &StaticPreFabConfig {
            name: "vit_s_16",
            description: "ViT-S/16; D=384, 12 blocks, 6 heads, 224px",
            builder: || vit_16(384, 12, 6),
        },
        &StaticPreFabConfig {
            name: "vit_ti_16",
            description: "ViT-Ti/16; D=192, 12 blocks, 3 heads, 224px",
            builder: || vit_16(192, 12, 3),
        },
        &StaticPreFabConfig {
            name: "swin_tiny_32",
            description: "Small Swin for 32px images; patch 2, C=48, depths [2, 2, 2], window 4",
            builder: || {
                SwinTransformerV1Config::new(
                    [32, 32],
                    2,
                    3,
                    10,
                    48,
                    vec![LayerConfig::new(2, 3), LayerConfig::new(2, 6), LayerConfig::new(2, 12)],
                )
                .with_window_size(4)
                .into()
            },
        },
        &StaticPreFabConfig {
            name: "swin_v2_tiny_32",
            description: "Small SwinV2 for 32px images; patch 2, C=48, depths [2, 2, 2], window 4",
            builder: || {
                SwinTransformerV2Config::new(
                    [32, 32],
                    2,
                    3,
                    10,
                    48,
                    vec![LayerConfig::new(2, 3), LayerConfig::new(2, 6), LayerConfig::new(2, 12)],
                )
                .with_window_size(4)
                .into()
            },
        },
        &StaticPreFabConfig {
            name: "vit_tiny_32",
            description: "Small ViT for 32px images; patch 4, D=192, 6 blocks, 3 heads",
            builder: || {
                VisionTransformerConfig::new([32, 32], 4, 3, 10, 192, 6, 3)
                    .with_drop_path_rate(0.1)
                    .into()
            },
        },
    ],
};
