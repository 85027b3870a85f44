#![recursion_limit = "256"]

use anyhow::Context;
use burn::config::Config;
use burn::data::dataloader::{DataLoaderBuilder, Dataset};
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::{Backend, Tensor};
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, ElementConversion};
use bvit::models::gan::dcgan::{
    Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, discriminator_loss,
    generator_loss,
};
use bvit_data::batcher::{ImageBatch, ImageBatcher};
use bvit_data::dataset::ImageFolderDataset;
use bvit_data::loader::ImageLoaderConfig;
use clap::Parser;
use image::{Rgb, RgbImage};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "wgpu")]
type DemoBackend = burn::backend::Wgpu;

#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
type DemoBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
compile_error!("enable one of the `ndarray` or `wgpu` features");

// $ --training-root=/data/celeba --image-size=32 --num-epochs=10
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Random seed for reproducibility.
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Batch size for processing
    #[arg(short, long, default_value_t = 128)]
    batch_size: usize,

    /// Number of workers for data loading.
    #[arg(long, default_value = "4")]
    num_workers: Option<usize>,

    /// Number of epochs to train the model.
    #[arg(long, default_value = "5")]
    num_epochs: usize,

    /// Learning rate for both optimizers.
    #[arg(long, default_value = "2.0e-4")]
    learning_rate: f64,

    /// Adam beta 1.
    #[arg(long, default_value = "0.5")]
    beta_1: f32,

    /// Square image size; a power of two.
    #[arg(long, default_value = "32")]
    image_size: usize,

    /// Latent vector size.
    #[arg(long, default_value = "100")]
    latent_dim: usize,

    /// Base feature maps for both networks.
    #[arg(long, default_value = "64")]
    feature_maps: usize,

    /// Number of sample images rendered after each epoch.
    #[arg(long, default_value = "8")]
    num_samples: usize,

    /// Iterations between loss log lines.
    #[arg(long, default_value = "50")]
    log_every: usize,

    /// Directory to save the artifacts.
    #[arg(long, default_value = "/tmp/dcgan_tiny")]
    artifact_dir: String,

    /// Root directory of the training images; one subdirectory per class.
    #[arg(long)]
    training_root: String,
}

/// Everything needed to rebuild the trained networks.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Generator structure.
    pub generator: GeneratorConfig,

    /// Discriminator structure.
    pub discriminator: DiscriminatorConfig,

    /// Image loading; normalizes to ``[-1, 1]``.
    pub loader: ImageLoaderConfig,

    /// Random seed.
    pub seed: u64,

    /// Batch size.
    pub batch_size: usize,

    /// Learning rate.
    pub learning_rate: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    type B = burn::backend::Autodiff<DemoBackend>;

    backend_main::<B>(&args, Default::default())
}

/// Create the artifact directory for saving training artifacts.
fn create_artifact_dir(artifact_dir: &str) -> anyhow::Result<()> {
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(format!("{artifact_dir}/samples"))
        .with_context(|| format!("failed to create artifact dir {artifact_dir}"))
}

/// Train the GAN with a hand-written adversarial loop.
pub fn backend_main<B: AutodiffBackend>(
    args: &Args,
    device: B::Device,
) -> anyhow::Result<()> {
    B::seed(args.seed);

    let artifact_dir = args.artifact_dir.as_str();
    create_artifact_dir(artifact_dir)?;

    let config = TrainingConfig::new(
        GeneratorConfig::new()
            .with_latent_dim(args.latent_dim)
            .with_feature_maps(args.feature_maps)
            .with_image_size(args.image_size),
        DiscriminatorConfig::new()
            .with_feature_maps(args.feature_maps)
            .with_image_size(args.image_size),
        ImageLoaderConfig::new(args.image_size, args.image_size)
            .with_normalize_mean([0.5; 3])
            .with_normalize_std([0.5; 3]),
        args.seed,
        args.batch_size,
        args.learning_rate,
    );
    config
        .save(format!("{artifact_dir}/config.json"))
        .context("failed to save training config")?;

    let mut generator: Generator<B> = config.generator.init(&device);
    let mut discriminator: Discriminator<B> = config.discriminator.init(&device);

    let mut optim_g = AdamConfig::new().with_beta_1(args.beta_1).init();
    let mut optim_d = AdamConfig::new().with_beta_1(args.beta_1).init();

    let dataset = ImageFolderDataset::new(&args.training_root)?;
    tracing::info!(
        num_images = dataset.len(),
        image_size = args.image_size,
        "training dcgan"
    );

    let dataloader = {
        let mut builder = DataLoaderBuilder::<B, _, ImageBatch<B>>::new(ImageBatcher::new(
            config.loader.clone(),
        ))
        .shuffle(args.seed)
        .batch_size(args.batch_size);
        if let Some(num_workers) = args.num_workers {
            builder = builder.num_workers(num_workers);
        }
        builder.build(dataset)
    };

    let fixed_latents = Tensor::<B::InnerBackend, 2>::random(
        [args.num_samples, args.latent_dim],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    for epoch in 1..=args.num_epochs {
        for (iteration, batch) in dataloader.iter().enumerate() {
            let batch_size = batch.images.dims()[0];
            let latents = Tensor::<B, 2>::random(
                [batch_size, args.latent_dim],
                Distribution::Normal(0.0, 1.0),
                &device,
            );

            let fake = generator.forward(latents.clone()).detach();
            let d_loss = discriminator_loss(
                discriminator.forward(batch.images),
                discriminator.forward(fake),
            );
            let grads = GradientsParams::from_grads(d_loss.backward(), &discriminator);
            discriminator = optim_d.step(args.learning_rate, discriminator, grads);

            let g_loss = generator_loss(discriminator.forward(generator.forward(latents)));
            let grads = GradientsParams::from_grads(g_loss.backward(), &generator);
            generator = optim_g.step(args.learning_rate, generator, grads);

            if iteration % args.log_every.max(1) == 0 {
                tracing::info!(
                    epoch,
                    iteration,
                    d_loss = d_loss.into_scalar().elem::<f32>(),
                    g_loss = g_loss.into_scalar().elem::<f32>(),
                );
            }
        }

        let samples = generator.valid().forward(fixed_latents.clone());
        let path = format!("{artifact_dir}/samples/epoch_{epoch:03}.png");
        save_image_row(samples, &path)?;
        tracing::info!(epoch, %path, "wrote samples");
    }

    generator
        .save_file(format!("{artifact_dir}/generator"), &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save generator: {:?}", e))?;
    discriminator
        .save_file(format!("{artifact_dir}/discriminator"), &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save discriminator: {:?}", e))?;

    tracing::info!(artifact_dir, "saved trained networks");
    Ok(())
}

/// Write ``[n, 3, size, size]`` images in ``[-1, 1]`` as one horizontal strip.
fn save_image_row<B: Backend>(
    images: Tensor<B, 4>,
    path: &str,
) -> anyhow::Result<()> {
    let [n, channels, height, width] = images.dims();
    anyhow::ensure!(channels == 3, "expected RGB samples, got {channels} channels");

    // [n, c, h, w] -> [h, n, w, c]
    let pixels: Vec<f32> = ((images + 1.0) * 127.5)
        .clamp(0.0, 255.0)
        .permute([2, 0, 3, 1])
        .into_data()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read samples: {:?}", e))?;

    let strip = RgbImage::from_fn((n * width) as u32, height as u32, |x, y| {
        let offset = (y as usize * n * width + x as usize) * 3;
        Rgb([
            pixels[offset] as u8,
            pixels[offset + 1] as u8,
            pixels[offset + 2] as u8,
        ])
    });
    strip
        .save(path)
        .with_context(|| format!("failed to write {path}"))
}
