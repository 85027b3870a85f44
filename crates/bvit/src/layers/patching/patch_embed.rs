//! # 2D Patch Embedding
//!
//! Cuts an image into non-overlapping ``patch_size x patch_size`` patches and
//! projects each patch to an `embed_dim` token, using a strided [`Conv2d`].
//!
//! ```text
//! [batch, channels, height, width] -> [batch, (height/p) * (width/p), embed_dim]
//! ```

use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::{Backend, Tensor};

/// [`PatchEmbed`] Meta API.
pub trait PatchEmbedMeta {
    /// Input image resolution, ``[height, width]``.
    fn input_resolution(&self) -> [usize; 2];

    /// Patch size.
    fn patch_size(&self) -> usize;

    /// Input channels.
    fn in_channels(&self) -> usize;

    /// Token embedding size.
    fn embed_dim(&self) -> usize;

    /// Height of the patch grid.
    fn patches_height(&self) -> usize {
        self.input_resolution()[0] / self.patch_size()
    }

    /// Width of the patch grid.
    fn patches_width(&self) -> usize {
        self.input_resolution()[1] / self.patch_size()
    }

    /// Resolution of the patch grid, ``[height/p, width/p]``.
    fn patches_resolution(&self) -> [usize; 2] {
        [self.patches_height(), self.patches_width()]
    }

    /// Number of patch tokens.
    fn num_patches(&self) -> usize {
        self.patches_height() * self.patches_width()
    }
}

/// [`PatchEmbed`] Config.
#[derive(Config, Debug)]
pub struct PatchEmbedConfig {
    /// Input image resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Patch size.
    pub patch_size: usize,

    /// Input channels.
    pub in_channels: usize,

    /// Token embedding size.
    pub embed_dim: usize,

    /// Apply a [`LayerNorm`] to the tokens.
    #[config(default = true)]
    pub enable_patch_norm: bool,
}

impl PatchEmbedMeta for PatchEmbedConfig {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn patch_size(&self) -> usize {
        self.patch_size
    }

    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn embed_dim(&self) -> usize {
        self.embed_dim
    }
}

impl PatchEmbedConfig {
    /// Initialize a [`PatchEmbed`].
    ///
    /// # Panics
    ///
    /// If the input resolution is not a multiple of the patch size.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> PatchEmbed<B> {
        let [height, width] = self.input_resolution;
        let patch_size = self.patch_size;
        assert!(
            height % patch_size == 0 && width % patch_size == 0,
            "input_resolution {:?} is not a multiple of patch_size {}",
            self.input_resolution,
            patch_size,
        );

        PatchEmbed {
            input_resolution: self.input_resolution,
            patch_size,
            proj: Conv2dConfig::new(
                [self.in_channels, self.embed_dim],
                [patch_size, patch_size],
            )
            .with_stride([patch_size, patch_size])
            .init(device),
            norm: if self.enable_patch_norm {
                Some(LayerNormConfig::new(self.embed_dim).init(device))
            } else {
                None
            },
        }
    }
}

/// 2D image to patch-token embedding.
#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    /// Input image resolution.
    pub input_resolution: [usize; 2],

    /// Patch size.
    pub patch_size: usize,

    /// Strided patch projection.
    pub proj: Conv2d<B>,

    /// Optional token norm.
    pub norm: Option<LayerNorm<B>>,
}

impl<B: Backend> PatchEmbedMeta for PatchEmbed<B> {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn patch_size(&self) -> usize {
        self.patch_size
    }

    fn in_channels(&self) -> usize {
        self.proj.weight.dims()[1]
    }

    fn embed_dim(&self) -> usize {
        self.proj.weight.dims()[0]
    }
}

impl<B: Backend> PatchEmbed<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height=h_patches*patch_size, width=w_patches*patch_size]``.
    ///
    /// # Returns
    ///
    /// ``[batch, h_patches*w_patches, embed_dim]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 3> {
        let [batch] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "height" = "h_patches" * "patch_size",
                "width" = "w_patches" * "patch_size"
            ],
            &input,
            &["batch"],
            &[
                ("in_channels", self.in_channels()),
                ("patch_size", self.patch_size),
                ("h_patches", self.patches_height()),
                ("w_patches", self.patches_width()),
            ]
        );

        let x = self.proj.forward(input);
        // [b, d, h, w] -> [b, h*w, d]
        let x = x.flatten::<3>(2, 3).swap_dims(1, 2);

        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "num_patches", "embed_dim"],
            &x,
            &[
                ("batch", batch),
                ("num_patches", self.num_patches()),
                ("embed_dim", self.embed_dim())
            ]
        );

        x
    }
}
