//! # `DropPath` / Stochastic Depth
//!
//! Drops the whole residual branch for randomly selected samples of a batch.
//! See: [Deep Networks with Stochastic Depth](https://arxiv.org/abs/1603.09382)
//!
//! [`DropPathConfig`] implements [`Config`], and provides
//! [`DropPathConfig::init`] to initialize a [`DropPath`].

use crate::utility::probability::expect_probability;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;

/// [`DropPath`] Config.
#[derive(Config, Debug)]
pub struct DropPathConfig {
    /// Probability of dropping the path of a sample.
    #[config(default = 0.0)]
    pub drop_prob: f64,

    /// Rescale kept samples by ``1 / keep_prob``.
    #[config(default = true)]
    pub scale_by_keep: bool,
}

impl DropPathConfig {
    /// Initialize a [`DropPath`].
    ///
    /// # Panics
    ///
    /// If `drop_prob` is not a probability.
    pub fn init(&self) -> DropPath {
        DropPath {
            drop_prob: expect_probability(self.drop_prob),
            scale_by_keep: self.scale_by_keep,
        }
    }
}

/// Per-sample residual branch dropout.
///
/// Only active when the backend is tracking gradients; inference is an identity.
#[derive(Module, Clone, Debug)]
pub struct DropPath {
    /// Probability of dropping the path of a sample.
    pub drop_prob: f64,

    /// Rescale kept samples by ``1 / keep_prob``.
    pub scale_by_keep: bool,
}

impl DropPath {
    /// Keep probability.
    pub fn keep_prob(&self) -> f64 {
        1.0 - self.drop_prob
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, ...]`` tensor.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        if !B::ad_enabled() || self.drop_prob == 0.0 {
            return input;
        }

        let keep_prob = self.keep_prob();

        let mut mask_shape = [1; D];
        mask_shape[0] = input.dims()[0];

        let mask =
            Tensor::<B, D>::random(mask_shape, Distribution::Bernoulli(keep_prob), &input.device());
        let mask = if self.scale_by_keep && keep_prob > 0.0 {
            mask.div_scalar(keep_prob)
        } else {
            mask
        };

        input * mask
    }
}

/// Optional [`DropPath`] for a block; `None` when the rate is zero.
pub fn maybe_drop_path(drop_prob: f64) -> Option<DropPath> {
    if expect_probability(drop_prob) == 0.0 {
        None
    } else {
        Some(DropPathConfig::new().with_drop_prob(drop_prob).init())
    }
}

/// Apply an optional [`DropPath`].
pub fn apply_drop_path<B: Backend, const D: usize>(
    drop_path: &Option<DropPath>,
    input: Tensor<B, D>,
) -> Tensor<B, D> {
    match drop_path {
        Some(drop_path) => drop_path.forward(input),
        None => input,
    }
}

/// Stochastic depth decay rule.
///
/// Drop rates rise linearly from ``0.0`` at the first block to `max_rate`
/// at the last block of the whole model.
///
/// # Arguments
///
/// - `total_depth`: total number of blocks across all stages.
/// - `max_rate`: the rate of the final block.
pub fn drop_path_schedule(
    total_depth: usize,
    max_rate: f64,
) -> Vec<f64> {
    let max_rate = expect_probability(max_rate);
    match total_depth {
        0 => vec![],
        1 => vec![0.0],
        n => (0..n)
            .map(|i| max_rate * (i as f64) / ((n - 1) as f64))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use hamcrest::prelude::*;

    #[test]
    fn test_config() {
        let config = DropPathConfig::new();
        assert_eq!(config.drop_prob, 0.0);
        assert!(config.scale_by_keep);

        let layer = config.with_drop_prob(0.25).init();
        assert_eq!(layer.drop_prob, 0.25);
        assert_eq!(layer.keep_prob(), 0.75);
    }

    #[test]
    #[should_panic(expected = "Expected a probability")]
    fn test_config_panic() {
        DropPathConfig::new().with_drop_prob(2.0).init();
    }

    #[test]
    fn test_inference_is_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer = DropPathConfig::new().with_drop_prob(0.9).init();

        let input: Tensor<B, 3> = Tensor::ones([4, 3, 2], &device);
        let output = layer.forward(input.clone());
        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_zero_prob_is_identity() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let layer = DropPathConfig::new().init();

        let input: Tensor<B, 3> = Tensor::ones([4, 3, 2], &device);
        let output = layer.forward(input.clone());
        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_drop_all() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let layer = DropPathConfig::new().with_drop_prob(1.0).init();

        let input: Tensor<B, 2> = Tensor::ones([5, 3], &device);
        let output = layer.forward(input);
        output
            .to_data()
            .assert_eq(&Tensor::<B, 2>::zeros([5, 3], &device).to_data(), true);
    }

    #[test]
    fn test_training_drops_whole_samples() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let layer = DropPathConfig::new().with_drop_prob(0.5).init();

        let input: Tensor<B, 3> = Tensor::ones([16, 2, 3], &device);
        let output = layer.forward(input);

        let values = output.to_data().to_vec::<f32>().unwrap();
        for sample in values.chunks(6) {
            let first = sample[0];
            assert!(first == 0.0 || first == 2.0, "unexpected value {first}");
            assert!(sample.iter().all(|v| *v == first), "{sample:?}");
        }
    }

    #[test]
    fn test_maybe_drop_path() {
        assert!(maybe_drop_path(0.0).is_none());
        let layer = maybe_drop_path(0.1).unwrap();
        assert_eq!(layer.drop_prob, 0.1);
    }

    #[test]
    fn test_drop_path_schedule() {
        assert_that!(drop_path_schedule(0, 0.2).len(), is(equal_to(0)));
        assert_eq!(drop_path_schedule(1, 0.2), vec![0.0]);

        let schedule = drop_path_schedule(5, 0.2);
        assert_that!(schedule.len(), is(equal_to(5)));
        assert_eq!(schedule[0], 0.0);
        assert_that!(schedule[2], is(close_to(0.1, 1e-12)));
        assert_that!(schedule[4], is(close_to(0.2, 1e-12)));
    }
}
