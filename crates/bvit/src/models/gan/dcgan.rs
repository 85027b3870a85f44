//! # DCGAN
//! See: [Unsupervised Representation Learning with Deep Convolutional GANs](https://arxiv.org/abs/1511.06434)
//!
//! [`Generator`] maps ``[batch, latent_dim]`` noise to ``[batch, out_channels, size, size]``
//! images in ``[-1, 1]``; [`Discriminator`] maps images to ``[batch, 1]`` logits.
//!
//! Both networks are built from ``log2(image_size / 4)`` stride-2 stages around a
//! ``4x4`` bottleneck; the default ``image_size = 64`` gives the classic layout.

use crate::layers::activation::{Activation, ActivationConfig};
use bimm_contracts::unpack_shape_contract;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, LeakyReluConfig, PaddingConfig2d};
use burn::prelude::{Backend, Int, Tensor};

/// Kernel size of every DCGAN convolution.
pub const KERNEL: usize = 4;

/// Spatial size of the bottleneck feature map.
pub const BOTTLENECK: usize = 4;

/// Normal(0, 0.02) weight init.
pub fn dcgan_initializer() -> Initializer {
    Initializer::Normal {
        mean: 0.0,
        std: 0.02,
    }
}

/// Number of stride-2 stages for an image size.
///
/// # Panics
///
/// If `image_size` is not a power of two ``>= 8``.
pub fn num_upsamples(image_size: usize) -> usize {
    assert!(
        image_size >= 2 * BOTTLENECK && image_size.is_power_of_two(),
        "image_size ({image_size}) must be a power of two >= {}",
        2 * BOTTLENECK
    );
    (image_size / BOTTLENECK).trailing_zeros() as usize
}

/// [`Generator`] Config.
#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Size of the latent noise vector.
    #[config(default = 100)]
    pub latent_dim: usize,

    /// Feature maps of the last hidden stage.
    #[config(default = 64)]
    pub feature_maps: usize,

    /// Output image channels.
    #[config(default = 3)]
    pub out_channels: usize,

    /// Output image edge length.
    #[config(default = 64)]
    pub image_size: usize,
}

impl GeneratorConfig {
    /// Channel counts from the bottleneck to the output image.
    ///
    /// For the default config: ``[512, 256, 128, 64, 3]``.
    pub fn channel_plan(&self) -> Vec<usize> {
        let stages = num_upsamples(self.image_size);
        let mut channels: Vec<usize> = (0..stages)
            .rev()
            .map(|i| self.feature_maps << i)
            .collect();
        channels.push(self.out_channels);
        channels
    }

    /// Initialize a [`Generator`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Generator<B> {
        let plan = self.channel_plan();

        let mut stages = Vec::with_capacity(plan.len());
        // 1x1 -> 4x4
        stages.push(
            UpStageConfig::new(self.latent_dim, plan[0])
                .with_stride(1)
                .with_padding(0)
                .init(device),
        );
        let last = plan.len() - 2;
        for (i, pair) in plan.windows(2).enumerate() {
            let config = UpStageConfig::new(pair[0], pair[1]);
            stages.push(if i == last {
                config
                    .with_batch_norm(false)
                    .with_activation(ActivationConfig::Tanh)
                    .init(device)
            } else {
                config.init(device)
            });
        }

        Generator {
            latent_dim: self.latent_dim,
            stages,
        }
    }
}

/// A ``ConvTranspose2d -> BatchNorm? -> Activation`` stage.
#[derive(Config, Debug)]
pub struct UpStageConfig {
    /// Input channels.
    pub in_channels: usize,

    /// Output channels.
    pub out_channels: usize,

    /// Upsampling stride.
    #[config(default = 2)]
    pub stride: usize,

    /// Padding.
    #[config(default = 1)]
    pub padding: usize,

    /// Apply batch norm.
    #[config(default = true)]
    pub batch_norm: bool,

    /// Output activation.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl UpStageConfig {
    /// Initialize an [`UpStage`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> UpStage<B> {
        UpStage {
            conv: ConvTranspose2dConfig::new(
                [self.in_channels, self.out_channels],
                [KERNEL, KERNEL],
            )
            .with_stride([self.stride, self.stride])
            .with_padding([self.padding, self.padding])
            .with_bias(false)
            .with_initializer(dcgan_initializer())
            .init(device),
            norm: self
                .batch_norm
                .then(|| BatchNormConfig::new(self.out_channels).init(device)),
            act: self.activation.init(device),
        }
    }
}

/// Generator stage.
#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    /// Transposed convolution.
    pub conv: ConvTranspose2d<B>,

    /// Optional batch norm.
    pub norm: Option<BatchNorm<B, 2>>,

    /// Activation.
    pub act: Activation<B>,
}

impl<B: Backend> UpStage<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        self.act.forward(x)
    }
}

/// DCGAN generator.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    /// Size of the latent noise vector.
    pub latent_dim: usize,

    /// Stages, bottleneck first.
    pub stages: Vec<UpStage<B>>,
}

impl<B: Backend> Generator<B> {
    /// Output image edge length.
    pub fn image_size(&self) -> usize {
        BOTTLENECK << (self.stages.len() - 1)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `latent`: ``[batch, latent_dim]`` noise.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, image_size, image_size]`` in ``[-1, 1]``.
    pub fn forward(
        &self,
        latent: Tensor<B, 2>,
    ) -> Tensor<B, 4> {
        let [batch] = unpack_shape_contract!(
            ["batch", "latent_dim"],
            &latent,
            &["batch"],
            &[("latent_dim", self.latent_dim)],
        );

        let x = latent.reshape([batch, self.latent_dim, 1, 1]);
        self.stages.iter().fold(x, |x, stage| stage.forward(x))
    }
}

/// [`Discriminator`] Config.
#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Feature maps of the first stage.
    #[config(default = 64)]
    pub feature_maps: usize,

    /// Input image edge length.
    #[config(default = 64)]
    pub image_size: usize,

    /// LeakyReLU negative slope.
    #[config(default = 0.2)]
    pub negative_slope: f64,
}

impl DiscriminatorConfig {
    /// Channel counts from the input image to the bottleneck.
    ///
    /// For the default config: ``[3, 64, 128, 256, 512]``.
    pub fn channel_plan(&self) -> Vec<usize> {
        let stages = num_upsamples(self.image_size);
        let mut channels = vec![self.in_channels];
        channels.extend((0..stages).map(|i| self.feature_maps << i));
        channels
    }

    /// Initialize a [`Discriminator`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Discriminator<B> {
        let plan = self.channel_plan();
        let act = ActivationConfig::LeakyRelu(
            LeakyReluConfig::new().with_negative_slope(self.negative_slope),
        );

        let stages = plan
            .windows(2)
            .enumerate()
            .map(|(i, pair)| DownStage {
                conv: Conv2dConfig::new([pair[0], pair[1]], [KERNEL, KERNEL])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false)
                    .with_initializer(dcgan_initializer())
                    .init(device),
                norm: (i > 0).then(|| BatchNormConfig::new(pair[1]).init(device)),
                act: act.init(device),
            })
            .collect();

        let last = plan[plan.len() - 1];
        Discriminator {
            in_channels: self.in_channels,
            image_size: self.image_size,
            stages,
            classifier: Conv2dConfig::new([last, 1], [BOTTLENECK, BOTTLENECK])
                .with_bias(false)
                .with_initializer(dcgan_initializer())
                .init(device),
        }
    }
}

/// A ``Conv2d -> BatchNorm? -> LeakyReLU`` stage.
#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    /// Strided convolution.
    pub conv: Conv2d<B>,

    /// Optional batch norm; absent on the first stage.
    pub norm: Option<BatchNorm<B, 2>>,

    /// Activation.
    pub act: Activation<B>,
}

impl<B: Backend> DownStage<B> {
    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        self.act.forward(x)
    }
}

/// DCGAN discriminator.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    /// Input image channels.
    pub in_channels: usize,

    /// Input image edge length.
    pub image_size: usize,

    /// Downsampling stages.
    pub stages: Vec<DownStage<B>>,

    /// ``4x4`` valid convolution to a single logit.
    pub classifier: Conv2d<B>,
}

impl<B: Backend> Discriminator<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `images`: ``[batch, in_channels, image_size, image_size]``.
    ///
    /// # Returns
    ///
    /// ``[batch, 1]`` real/fake logits.
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "size", "size"],
            &images,
            &["batch"],
            &[("in_channels", self.in_channels), ("size", self.image_size)],
        );

        let x = self.stages.iter().fold(images, |x, stage| stage.forward(x));
        self.classifier.forward(x).reshape([batch, 1])
    }
}

/// Adversarial losses for one batch.
#[derive(Debug, Clone)]
pub struct GanLosses<B: Backend> {
    /// ``BCE(real, 1) + BCE(fake, 0)``.
    pub discriminator: Tensor<B, 1>,

    /// Non-saturating ``BCE(fake, 1)``.
    pub generator: Tensor<B, 1>,
}

fn bce_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    target: i64,
) -> Tensor<B, 1> {
    let device = logits.device();
    let targets = Tensor::<B, 2, Int>::full(logits.dims(), target, &device);
    BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(&device)
        .forward(logits, targets)
}

/// Discriminator loss: real images labeled 1, generated labeled 0.
pub fn discriminator_loss<B: Backend>(
    real_logits: Tensor<B, 2>,
    fake_logits: Tensor<B, 2>,
) -> Tensor<B, 1> {
    bce_with_logits(real_logits, 1) + bce_with_logits(fake_logits, 0)
}

/// Non-saturating generator loss: generated images labeled 1.
pub fn generator_loss<B: Backend>(fake_logits: Tensor<B, 2>) -> Tensor<B, 1> {
    bce_with_logits(fake_logits, 1)
}

/// Both adversarial losses.
///
/// `fake_logits` is reused for both; detach it before the discriminator
/// step when the generator must not receive gradients.
pub fn gan_losses<B: Backend>(
    real_logits: Tensor<B, 2>,
    fake_logits: Tensor<B, 2>,
) -> GanLosses<B> {
    GanLosses {
        discriminator: discriminator_loss(real_logits, fake_logits.clone()),
        generator: generator_loss(fake_logits),
    }
}
