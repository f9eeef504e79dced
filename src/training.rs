use std::path::Path;

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

use crate::data::{PointCloudBatcher, PointCloudConfig, PointCloudDataset};
use crate::error::{CompletionError, Result};
use crate::model::{CompletionAutoEncoder, CompletionModelConfig, chamfer_mean};

/// Piecewise-constant weight of the fine Chamfer term over global steps.
#[derive(Config, Debug)]
pub struct AlphaScheduleConfig {
    /// Steps at which the next value takes over, ascending.
    #[config(default = "vec![10_000, 20_000, 50_000]")]
    pub boundaries: Vec<usize>,
    /// One more value than boundaries.
    #[config(default = "vec![0.01, 0.1, 0.5, 1.0]")]
    pub values: Vec<f32>,
}

impl AlphaScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.values.len() != self.boundaries.len() + 1 {
            return Err(CompletionError::invalid_config(format!(
                "alpha schedule needs {} values for {} boundaries, got {}",
                self.boundaries.len() + 1,
                self.boundaries.len(),
                self.values.len()
            )));
        }
        if self.boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CompletionError::invalid_config(
                "alpha schedule boundaries must be strictly ascending",
            ));
        }
        Ok(())
    }

    /// Alpha in effect at `step`.
    pub fn alpha(&self, step: usize) -> f32 {
        let segment = self.boundaries.partition_point(|&boundary| boundary <= step);
        self.values[segment.min(self.values.len() - 1)]
    }
}

#[derive(Config)]
pub struct TrainingConfig {
    pub model: CompletionModelConfig,
    pub optimizer: AdamConfig,
    #[config(default = "PointCloudConfig::new()")]
    pub data: PointCloudConfig,
    #[config(default = "AlphaScheduleConfig::new()")]
    pub alpha: AlphaScheduleConfig,
    #[config(default = 100)]
    pub num_epochs: usize,
    #[config(default = 8)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-4)]
    pub learning_rate: f64,
    /// Multiplies the learning rate every `lr_decay_epochs`.
    #[config(default = 0.7)]
    pub lr_decay: f64,
    #[config(default = 20)]
    pub lr_decay_epochs: usize,
    #[config(default = 1.0e-5)]
    pub min_learning_rate: f64,
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        self.model.validate(self.data.num_input_points)?;
        self.alpha.validate()?;
        if self.batch_size == 0 || self.num_epochs == 0 || self.lr_decay_epochs == 0 {
            return Err(CompletionError::invalid_config(
                "batch_size, num_epochs and lr_decay_epochs must be positive",
            ));
        }
        if self.data.num_input_points == 0 || self.data.num_gt_points == 0 {
            return Err(CompletionError::invalid_config("point counts must be positive"));
        }
        if !(0.0..1.0).contains(&self.data.occlusion_ratio) {
            return Err(CompletionError::invalid_config(format!(
                "occlusion ratio must be in [0, 1), got {}",
                self.data.occlusion_ratio
            )));
        }
        Ok(())
    }

    /// Step decay, floored at `min_learning_rate`. `epoch` counts from 0.
    // burn's lr schedulers have no floor, hence the hand-rolled decay.
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        let decays = (epoch / self.lr_decay_epochs) as i32;
        (self.learning_rate * self.lr_decay.powi(decays)).max(self.min_learning_rate)
    }
}

fn create_artifact_dir(artifact_dir: &Path) -> Result<()> {
    // Remove existing artifacts so checkpoints from another run are not mixed in
    if artifact_dir.exists() {
        std::fs::remove_dir_all(artifact_dir)?;
    }
    std::fs::create_dir_all(artifact_dir.join("checkpoint"))?;
    Ok(())
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

pub fn train<B: AutodiffBackend>(
    dataset_dir: &Path,
    artifact_dir: &Path,
    config: TrainingConfig,
    device: B::Device,
) -> Result<CompletionAutoEncoder<B>> {
    config.validate()?;
    create_artifact_dir(artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;

    B::seed(config.seed);

    let batcher = PointCloudBatcher::new(&config.data);
    let dataloader_train = DataLoaderBuilder::<B, _, _>::new(batcher.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(PointCloudDataset::from_dir(
            dataset_dir,
            "train",
            &config.data,
            config.seed,
        )?);

    let dataloader_valid = DataLoaderBuilder::<B::InnerBackend, _, _>::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(PointCloudDataset::from_dir(
            dataset_dir,
            "test",
            &config.data,
            config.seed.wrapping_add(1),
        )?);

    let mut model = config.model.init::<B>(&device);
    let mut optim = config
        .optimizer
        .init::<B, CompletionAutoEncoder<B>>();
    let recorder = CompactRecorder::new();
    let mut step = 0;

    for epoch in 1..=config.num_epochs {
        let lr = config.learning_rate_at(epoch - 1);
        let mut train_loss = 0.0;
        let mut train_batches = 0;

        for batch in dataloader_train.iter() {
            let alpha = config.alpha.alpha(step);
            let (_, loss) = model.forward_loss(batch, alpha);
            let loss_value = scalar(loss.clone());

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            if step % 100 == 0 {
                log::debug!("[Train - Step {step}] loss {loss_value:.6} alpha {alpha} lr {lr:.2e}");
            }
            train_loss += loss_value;
            train_batches += 1;
            step += 1;
        }

        let model_valid = model.valid();
        let alpha = config.alpha.alpha(step);
        let mut valid_loss = 0.0;
        let mut valid_fine_cd = 0.0;
        let mut valid_batches = 0;
        for batch in dataloader_valid.iter() {
            let complete = batch.complete.clone();
            let (output, loss) = model_valid.forward_loss(batch, alpha);
            valid_loss += scalar(loss);
            valid_fine_cd += scalar(chamfer_mean(&output.fine, &complete));
            valid_batches += 1;
        }

        log::info!(
            "Epoch {}/{}: train loss = {:.6}, valid loss = {:.6}, valid fine CD = {:.6}",
            epoch,
            config.num_epochs,
            train_loss / train_batches.max(1) as f32,
            valid_loss / valid_batches.max(1) as f32,
            valid_fine_cd / valid_batches.max(1) as f32,
        );

        model
            .clone()
            .save_file(artifact_dir.join(format!("checkpoint/model-{epoch}")), &recorder)?;
    }

    model
        .clone()
        .save_file(artifact_dir.join("model"), &recorder)?;
    log::info!("Model saved to {}", artifact_dir.join("model").display());

    Ok(model)
}
