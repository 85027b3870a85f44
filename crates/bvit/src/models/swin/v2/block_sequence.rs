//! # Swin Stage (V2)

use crate::models::swin::v1::block_sequence::{StageMeta, stage_drop_path};
use crate::models::swin::v1::patch_merge::PatchMergingMeta;
use crate::models::swin::v1::swin_block::SwinBlockMeta;
use crate::models::swin::v2::patch_merge::{PatchMergingV2, PatchMergingV2Config};
use crate::models::swin::v2::swin_block::{SwinBlockV2, SwinBlockV2Config};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// [`StageV2`] Config.
#[derive(Config, Debug)]
pub struct StageV2Config {
    /// Input token feature size.
    pub dim: usize,

    /// Input resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Number of blocks.
    pub depth: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Window edge length.
    #[config(default = 8)]
    pub window_size: usize,

    /// Ratio of mlp hidden size to `dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable the query / value biases.
    #[config(default = true)]
    pub qkv_bias: bool,

    /// Dropout rate.
    #[config(default = 0.0)]
    pub drop: f64,

    /// Attention dropout rate.
    #[config(default = 0.0)]
    pub attn_drop: f64,

    /// Per-block drop path rates; empty means all zero.
    #[config(default = "Vec::new()")]
    pub drop_path: Vec<f64>,

    /// End the stage with patch merging.
    #[config(default = false)]
    pub downsample: bool,
}

impl StageMeta for StageV2Config {
    fn dim(&self) -> usize {
        self.dim
    }

    fn input_resolution(&self) -> [usize; 2] {
        self.input_resolution
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn downsample(&self) -> bool {
        self.downsample
    }
}

impl StageV2Config {
    /// Block configs for the stage; odd blocks are shifted by half a window.
    pub fn block_configs(&self) -> Vec<SwinBlockV2Config> {
        stage_drop_path(&self.drop_path, self.depth)
            .into_iter()
            .enumerate()
            .map(|(i, drop_path)| {
                SwinBlockV2Config::new(self.dim, self.input_resolution, self.num_heads)
                    .with_window_size(self.window_size)
                    .with_shift_size(if i % 2 == 0 { 0 } else { self.window_size / 2 })
                    .with_mlp_ratio(self.mlp_ratio)
                    .with_qkv_bias(self.qkv_bias)
                    .with_drop(self.drop)
                    .with_attn_drop(self.attn_drop)
                    .with_drop_path(drop_path)
            })
            .collect()
    }

    /// Initialize a [`StageV2`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> StageV2<B> {
        StageV2 {
            blocks: self
                .block_configs()
                .iter()
                .map(|config| config.init(device))
                .collect(),
            downsample: self
                .downsample
                .then(|| PatchMergingV2Config::new(self.input_resolution, self.dim).init(device)),
        }
    }
}

/// A Swin V2 stage.
#[derive(Module, Debug)]
pub struct StageV2<B: Backend> {
    /// Blocks, in order.
    pub blocks: Vec<SwinBlockV2<B>>,

    /// Optional trailing patch merging.
    pub downsample: Option<PatchMergingV2<B>>,
}

impl<B: Backend> StageMeta for StageV2<B> {
    fn dim(&self) -> usize {
        match (self.blocks.first(), &self.downsample) {
            (Some(block), _) => block.dim(),
            (None, Some(downsample)) => downsample.in_dim(),
            (None, None) => 0,
        }
    }

    fn input_resolution(&self) -> [usize; 2] {
        match (self.blocks.first(), &self.downsample) {
            (Some(block), _) => block.input_resolution(),
            (None, Some(downsample)) => downsample.input_resolution,
            (None, None) => [0, 0],
        }
    }

    fn depth(&self) -> usize {
        self.blocks.len()
    }

    fn downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

impl<B: Backend> StageV2<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, height*width, dim]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_height*out_width, out_dim]``
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let x = self
            .blocks
            .iter()
            .fold(input, |x, block| block.forward(x));

        match &self.downsample {
            Some(downsample) => downsample.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_stage() {
        let device = Default::default();
        let config = StageV2Config::new(8, [8, 8], 2, 2)
            .with_window_size(4)
            .with_downsample(true);

        let shifts: Vec<usize> = config.block_configs().iter().map(|b| b.shift_size()).collect();
        assert_eq!(shifts, vec![0, 2]);

        let stage: StageV2<B> = config.init(&device);
        assert_eq!(stage.depth(), 2);
        assert_eq!(stage.output_resolution(), [4, 4]);
        assert_eq!(stage.out_dim(), 16);

        let input: Tensor<B, 3> = Tensor::random([1, 64, 8], Distribution::Default, &device);
        assert_eq!(stage.forward(input).dims(), [1, 16, 16]);
    }
}
