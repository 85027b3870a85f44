//! # Patch Merging (V1)
//!
//! Halves the resolution and doubles the channels: gather each 2x2
//! neighborhood, normalize, then project ``4*dim -> 2*dim``.

use crate::models::swin::merging::gather_2x2_patches;
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// Patch merging meta API; shared by both merging versions.
pub trait PatchMergingMeta {
    /// Input resolution, ``[height, width]``.
    fn input_resolution(&self) -> [usize; 2];

    /// Input feature size.
    fn in_dim(&self) -> usize;

    /// Output resolution; ``[height/2, width/2]``.
    fn output_resolution(&self) -> [usize; 2] {
        let [h, w] = self.input_resolution();
        [h / 2, w / 2]
    }

    /// Output feature size; ``2*in_dim``.
    fn out_dim(&self) -> usize {
        2 * self.in_dim()
    }
}

/// [`PatchMergingV1`] Config.
#[derive(Config, Debug)]
pub struct PatchMergingV1Config {
    /// Input resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Input feature size.
    pub in_dim: usize,
}

impl PatchMergingMeta for PatchMergingV1Config {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn in_dim(&self) -> usize {
        self.in_dim
    }
}

impl PatchMergingV1Config {
    /// Initialize a [`PatchMergingV1`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> PatchMergingV1<B> {
        let [h, w] = self.input_resolution;
        assert!(
            h % 2 == 0 && w % 2 == 0,
            "input_resolution {:?} is not a multiple of 2",
            self.input_resolution
        );
        PatchMergingV1 {
            input_resolution: self.input_resolution,
            norm: LayerNormConfig::new(4 * self.in_dim).init(device),
            reduction: LinearConfig::new(4 * self.in_dim, self.out_dim())
                .with_bias(false)
                .init(device),
        }
    }
}

/// Swin patch merging layer; norm before reduction.
#[derive(Module, Debug)]
pub struct PatchMergingV1<B: Backend> {
    /// Input resolution.
    pub input_resolution: [usize; 2],

    /// Norm over the gathered ``4*dim`` features.
    pub norm: LayerNorm<B>,

    /// ``4*dim -> 2*dim`` projection.
    pub reduction: Linear<B>,
}

impl<B: Backend> PatchMergingMeta for PatchMergingV1<B> {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn in_dim(&self) -> usize {
        self.reduction.weight.dims()[0] / 4
    }
}

impl<B: Backend> PatchMergingV1<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, height*width, in_dim]``.
    ///
    /// # Returns
    ///
    /// ``[batch, (height/2)*(width/2), 2*in_dim]``
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let batch = input.dims()[0];
        let x = gather_2x2_patches(input, self.input_resolution);
        let x = self.norm.forward(x);
        let x = self.reduction.forward(x);

        let [oh, ow] = self.output_resolution();
        assert_shape_contract_periodically!(
            ["batch", "tokens", "out_dim"],
            &x,
            &[
                ("batch", batch),
                ("tokens", oh * ow),
                ("out_dim", self.out_dim())
            ]
        );

        x
    }
}
