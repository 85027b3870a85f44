//! # Swin Stage (V1)
//!
//! A sequence of [`SwinBlockV1`]s alternating W-MSA / SW-MSA,
//! optionally followed by [`PatchMergingV1`].

use crate::models::swin::v1::patch_merge::{PatchMergingMeta, PatchMergingV1, PatchMergingV1Config};
use crate::models::swin::v1::swin_block::{SwinBlockMeta, SwinBlockV1, SwinBlockV1Config};
use crate::utility::probability::expect_probability;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Stage meta API; shared by both stage versions.
pub trait StageMeta {
    /// Input token feature size.
    fn dim(&self) -> usize;

    /// Input resolution, ``[height, width]``.
    fn input_resolution(&self) -> [usize; 2];

    /// Number of blocks.
    fn depth(&self) -> usize;

    /// Whether the stage ends with patch merging.
    fn downsample(&self) -> bool;

    /// Output resolution.
    fn output_resolution(&self) -> [usize; 2] {
        let [h, w] = self.input_resolution();
        if self.downsample() { [h / 2, w / 2] } else { [h, w] }
    }

    /// Output token feature size.
    fn out_dim(&self) -> usize {
        if self.downsample() {
            2 * self.dim()
        } else {
            self.dim()
        }
    }
}

/// [`StageV1`] Config.
#[derive(Config, Debug)]
pub struct StageV1Config {
    /// Input token feature size.
    pub dim: usize,

    /// Input resolution, ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Number of blocks.
    pub depth: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Window edge length.
    #[config(default = 7)]
    pub window_size: usize,

    /// Ratio of mlp hidden size to `dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Enable bias on the qkv projections.
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

impl StageMeta for StageV1Config {
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

impl StageV1Config {
    /// Block configs for the stage.
    ///
    /// # Panics
    ///
    /// If `drop_path` is neither empty nor `depth` long.
    pub fn block_configs(&self) -> Vec<SwinBlockV1Config> {
        let drop_path = stage_drop_path(&self.drop_path, self.depth);
        (0..self.depth)
            .map(|i| {
                SwinBlockV1Config::new(self.dim, self.input_resolution, self.num_heads)
                    .with_window_size(self.window_size)
                    .with_shift_size(if i % 2 == 0 { 0 } else { self.window_size / 2 })
                    .with_mlp_ratio(self.mlp_ratio)
                    .with_qkv_bias(self.qkv_bias)
                    .with_drop(self.drop)
                    .with_attn_drop(self.attn_drop)
                    .with_drop_path(drop_path[i])
            })
            .collect()
    }

    /// Initialize a [`StageV1`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> StageV1<B> {
        StageV1 {
            blocks: self
                .block_configs()
                .iter()
                .map(|config| config.init(device))
                .collect(),
            downsample: if self.downsample {
                Some(PatchMergingV1Config::new(self.input_resolution, self.dim).init(device))
            } else {
                None
            },
        }
    }
}

/// Resolve a stage's drop path rates to one per block.
pub fn stage_drop_path(
    drop_path: &[f64],
    depth: usize,
) -> Vec<f64> {
    if drop_path.is_empty() {
        return vec![0.0; depth];
    }
    assert_eq!(
        drop_path.len(),
        depth,
        "drop_path has {} rates for {} blocks",
        drop_path.len(),
        depth
    );
    drop_path.iter().map(|&p| expect_probability(p)).collect()
}

/// A Swin stage.
#[derive(Module, Debug)]
pub struct StageV1<B: Backend> {
    /// Blocks, in order.
    pub blocks: Vec<SwinBlockV1<B>>,

    /// Optional trailing patch merging.
    pub downsample: Option<PatchMergingV1<B>>,
}

impl<B: Backend> StageMeta for StageV1<B> {
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

impl<B: Backend> StageV1<B> {
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
    fn test_block_configs() {
        let config = StageV1Config::new(32, [8, 8], 3, 2)
            .with_window_size(4)
            .with_drop_path(vec![0.0, 0.1, 0.2]);

        let blocks = config.block_configs();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks.iter().map(|b| b.shift_size()).collect::<Vec<_>>(),
            vec![0, 2, 0]
        );
        assert_eq!(
            blocks.iter().map(|b| b.drop_path).collect::<Vec<_>>(),
            vec![0.0, 0.1, 0.2]
        );
    }

    #[test]
    #[should_panic(expected = "rates for")]
    fn test_bad_drop_path() {
        StageV1Config::new(32, [8, 8], 3, 2)
            .with_drop_path(vec![0.1])
            .block_configs();
    }

    #[test]
    fn test_stage_forward() {
        let device = Default::default();

        let config = StageV1Config::new(16, [8, 8], 2, 2)
            .with_window_size(4)
            .with_downsample(true);
        assert_eq!(config.output_resolution(), [4, 4]);
        assert_eq!(config.out_dim(), 32);

        let stage: StageV1<B> = config.init(&device);
        assert_eq!(stage.dim(), 16);
        assert_eq!(stage.depth(), 2);
        assert_eq!(stage.input_resolution(), [8, 8]);
        assert_eq!(stage.out_dim(), 32);

        let input: Tensor<B, 3> = Tensor::random([2, 64, 16], Distribution::Default, &device);
        let y = stage.forward(input);
        assert_eq!(y.dims(), [2, 16, 32]);
    }
}
