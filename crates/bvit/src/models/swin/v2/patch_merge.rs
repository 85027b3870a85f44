//! # Patch Merging (V2)
//!
//! Like V1, but the norm follows the reduction.

use crate::models::swin::merging::gather_2x2_patches;
use crate::models::swin::v1::patch_merge::PatchMergingMeta;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// [`PatchMergingV2`] Config.
#[derive(Config, Debug)]
pub struct PatchMergingV2Config {
    /// Input resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Input feature size.
    pub in_dim: usize,
}

impl PatchMergingMeta for PatchMergingV2Config {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn in_dim(&self) -> usize {
        self.in_dim
    }
}

impl PatchMergingV2Config {
    /// Initialize a [`PatchMergingV2`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> PatchMergingV2<B> {
        let [h, w] = self.input_resolution;
        assert!(
            h % 2 == 0 && w % 2 == 0,
            "input_resolution {:?} is not a multiple of 2",
            self.input_resolution
        );
        PatchMergingV2 {
            input_resolution: self.input_resolution,
            reduction: LinearConfig::new(4 * self.in_dim, self.out_dim())
                .with_bias(false)
                .init(device),
            norm: LayerNormConfig::new(self.out_dim()).init(device),
        }
    }
}

/// Swin V2 patch merging layer; reduction before norm.
#[derive(Module, Debug)]
pub struct PatchMergingV2<B: Backend> {
    /// Input resolution.
    pub input_resolution: [usize; 2],

    /// ``4*dim -> 2*dim`` projection.
    pub reduction: Linear<B>,

    /// Norm over the reduced ``2*dim`` features.
    pub norm: LayerNorm<B>,
}

impl<B: Backend> PatchMergingMeta for PatchMergingV2<B> {
    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn in_dim(&self) -> usize {
        self.reduction.weight.dims()[0] / 4
    }
}

impl<B: Backend> PatchMergingV2<B> {
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
        let x = gather_2x2_patches(input, self.input_resolution);
        let x = self.reduction.forward(x);
        self.norm.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_patch_merging() {
        let device = Default::default();
        let layer: PatchMergingV2<B> = PatchMergingV2Config::new([4, 4], 8).init(&device);

        assert_eq!(layer.in_dim(), 8);
        assert_eq!(layer.out_dim(), 16);
        assert_eq!(layer.output_resolution(), [2, 2]);
        assert_eq!(layer.norm.gamma.dims(), [16]);

        let input: Tensor<B, 3> = Tensor::random([3, 16, 8], Distribution::Default, &device);
        let y = layer.forward(input);
        assert_eq!(y.dims(), [3, 4, 16]);

        // Post-norm: every output token has ~zero mean.
        let means = y.mean_dim(2).abs().max().into_scalar();
        assert!(means < 1e-4, "token means {means}");
    }
}
