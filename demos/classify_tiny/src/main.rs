#![recursion_limit = "256"]

use anyhow::{Context, bail};
use burn::config::Config;
use burn::data::dataloader::{DataLoaderBuilder, Dataset};
use burn::data::dataset::transform::ShuffledDataset;
use burn::lr_scheduler::cosine::CosineAnnealingLrSchedulerConfig;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::AdamConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::prelude::{Backend, Int, Module, Tensor};
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::store::{Aggregate, Direction, Split};
use burn::train::metric::{AccuracyMetric, LearningRateMetric, LossMetric, TopKAccuracyMetric};
use burn::train::{
    ClassificationOutput, LearnerBuilder, MetricEarlyStoppingStrategy, StoppingCondition,
};
use burn::train::{TrainOutput, TrainStep, ValidStep};
use bvit::prefabs::classifier::{Classifier, ClassifierConfig, PREFAB_CLASSIFIER_MAP};
use bvit::utility::burn::record::record_summary_string;
use bvit_data::batcher::{ImageBatch, ImageBatcher};
use bvit_data::dataset::ImageFolderDataset;
use bvit_data::loader::ImageLoaderConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "wgpu")]
type DemoBackend = burn::backend::Wgpu;

#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
type DemoBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
compile_error!("enable one of the `ndarray` or `wgpu` features");

// $ --training-root=/data/cifar10/train --validation-root=/data/cifar10/test --prefab=swin_v2_tiny_32
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Random seed for reproducibility.
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Batch size for processing
    #[arg(short, long, default_value_t = 64)]
    batch_size: usize,

    /// Number of workers for data loading.
    #[arg(long, default_value = "4")]
    num_workers: Option<usize>,

    /// Number of epochs to train the model.
    #[arg(long, default_value = "50")]
    num_epochs: usize,

    /// Learning rate for the optimizer.
    #[arg(long, default_value = "5.0e-4")]
    learning_rate: f64,

    /// Epochs between cosine restarts.
    #[arg(long, default_value = "10")]
    epochs_per_restart: usize,

    /// Directory to save the artifacts.
    #[arg(long, default_value = "/tmp/classify_tiny")]
    artifact_dir: String,

    /// Root directory of the training dataset.
    #[arg(long)]
    training_root: String,

    /// Root directory of the validation dataset.
    #[arg(long)]
    validation_root: String,

    /// Classifier prefab name.
    #[arg(long, default_value = "swin_tiny_32")]
    prefab: String,

    /// Square input size; defaults to the prefab's resolution.
    #[arg(long)]
    image_size: Option<usize>,

    /// Drop Path Prob
    #[arg(long, default_value = "0.1")]
    drop_path_prob: f64,

    /// Early stopping patience
    #[arg(long, default_value = "6")]
    patience: usize,
}

/// Everything needed to rebuild the trained model.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Prefab the model was built from.
    pub prefab: String,

    /// Training class names, in label order.
    pub classes: Vec<String>,

    /// Image loading and normalization.
    pub loader: ImageLoaderConfig,

    /// Model structure.
    pub model: ClassifierConfig,

    /// Random seed.
    pub seed: u64,

    /// Batch size.
    pub batch_size: usize,

    /// Peak learning rate.
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

    let devices = vec![Default::default()];
    backend_main::<B>(&args, devices)
}

/// Create the artifact directory for saving training artifacts.
fn create_artifact_dir(artifact_dir: &str) -> anyhow::Result<()> {
    // Remove existing artifacts before to get an accurate learner summary
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir)
        .with_context(|| format!("failed to create artifact dir {artifact_dir}"))
}

/// Train the model with the given configuration and devices.
pub fn backend_main<B: AutodiffBackend>(
    args: &Args,
    devices: Vec<B::Device>,
) -> anyhow::Result<()> {
    B::seed(args.seed);
    let device = &devices[0];

    let train_ds = ImageFolderDataset::new(&args.training_root)?;
    let valid_ds = ImageFolderDataset::new(&args.validation_root)?;
    if train_ds.classes() != valid_ds.classes() {
        bail!(
            "training classes {:?} differ from validation classes {:?}",
            train_ds.classes(),
            valid_ds.classes()
        );
    }
    let num_classes = train_ds.num_classes();

    let Some(prefab) = PREFAB_CLASSIFIER_MAP.lookup_prefab(&args.prefab) else {
        bail!(
            "unknown prefab {:?}; available: {:?}",
            args.prefab,
            PREFAB_CLASSIFIER_MAP.names()
        );
    };
    let prefab = prefab.map_config(|config| {
        let input_resolution = match args.image_size {
            Some(size) => [size, size],
            None => config.input_resolution(),
        };
        config
            .with_image(input_resolution, 3, num_classes)
            .with_drop_path_rate(args.drop_path_prob)
    });
    let model_config = prefab.new_config();
    let input_resolution = model_config.input_resolution();
    if let Err(err) = model_config.check_geometry() {
        bail!(
            "prefab {:?} does not fit {:?} images: {err}",
            prefab.name,
            input_resolution
        );
    }

    tracing::info!(
        prefab = %prefab.name,
        family = model_config.family(),
        ?input_resolution,
        num_classes,
        "building classifier"
    );

    let model: Model<B> = Model {
        classifier: model_config.init(device),
    };

    let loader = ImageLoaderConfig::new(input_resolution[0], input_resolution[1]);

    let artifact_dir = args.artifact_dir.as_str();
    create_artifact_dir(artifact_dir)?;

    TrainingConfig::new(
        args.prefab.clone(),
        train_ds.classes().to_vec(),
        loader.clone(),
        model_config,
        args.seed,
        args.batch_size,
        args.learning_rate,
    )
    .save(format!("{artifact_dir}/config.json"))
    .context("failed to save training config")?;

    let train_size = train_ds.len();
    let train_dataloader = {
        let ds = ShuffledDataset::with_seed(train_ds, args.seed);

        let mut builder =
            DataLoaderBuilder::<B, _, ImageBatch<B>>::new(ImageBatcher::new(loader.clone()))
                .shuffle(args.seed)
                .batch_size(args.batch_size);
        if let Some(num_workers) = args.num_workers {
            builder = builder.num_workers(num_workers);
        }
        builder.build(ds)
    };

    let validation_dataloader = {
        // Use the InnerBackend for validation.
        let mut builder = DataLoaderBuilder::<B::InnerBackend, _, ImageBatch<B::InnerBackend>>::new(
            ImageBatcher::new(loader),
        )
        .batch_size(args.batch_size);
        if let Some(num_workers) = args.num_workers {
            builder = builder.num_workers(num_workers);
        }
        builder.build(valid_ds)
    };

    let batches_per_epoch = (train_size / args.batch_size).max(1);
    let iters_per_restart = batches_per_epoch * args.epochs_per_restart.max(1);
    let lr_scheduler = CosineAnnealingLrSchedulerConfig::new(args.learning_rate, iters_per_restart)
        .init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize learning rate scheduler: {}", e))?;

    let optim_config = AdamConfig::new().with_weight_decay(WeightDecayConfig::new(5e-2).into());

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(TopKAccuracyMetric::new(2))
        .metric_valid_numeric(TopKAccuracyMetric::new(2))
        .metric_train_numeric(LearningRateMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .early_stopping(MetricEarlyStoppingStrategy::new(
            &LossMetric::<B>::new(),
            Aggregate::Mean,
            Direction::Lowest,
            Split::Valid,
            StoppingCondition::NoImprovementSince {
                n_epochs: args.patience,
            },
        ))
        .devices(devices.clone())
        .num_epochs(args.num_epochs)
        .summary()
        .build(model, optim_config.init(), lr_scheduler);

    let model_trained = learner.fit(train_dataloader, validation_dataloader);

    let model_path = format!("{artifact_dir}/model");
    model_trained
        .save_file(model_path.clone(), &CompactRecorder::new())
        .map_err(|e| anyhow::anyhow!("Failed to save trained model: {:?}", e))?;

    let saved: ModelRecord<B::InnerBackend> =
        Recorder::<B::InnerBackend>::load(&CompactRecorder::new(), model_path.into(), device)
            .map_err(|e| anyhow::anyhow!("Failed to reload trained model: {:?}", e))?;
    tracing::info!(
        "saved parameters:\n{}",
        record_summary_string::<B::InnerBackend, _>(saved)?
    );

    tracing::info!(artifact_dir, "saved trained model");
    Ok(())
}

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    pub classifier: Classifier<B>,
}

impl<B: Backend> Model<B> {
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.classifier.forward(images);

        let loss = CrossEntropyLossConfig::new()
            .with_smoothing(Some(0.1))
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<ImageBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(
        &self,
        batch: ImageBatch<B>,
    ) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ImageBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(
        &self,
        batch: ImageBatch<B>,
    ) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}
