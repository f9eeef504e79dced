#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::Context;
use burn::backend::{Autodiff, Wgpu};
use burn::optim::AdamConfig;
use burn_occo::model::CompletionModelConfig;
use burn_occo::training::TrainingConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory where the config and model artifacts are saved.
    #[arg(short, long, default_value = "artifacts")]
    artifact_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the completion model on STL meshes.
    Train {
        /// Directory holding `train/` and `test/` folders of STL files.
        #[arg(short, long, default_value = "dataset")]
        dataset: PathBuf,
        #[arg(long, default_value_t = 100)]
        epochs: usize,
        #[arg(long, default_value_t = 8)]
        batch_size: usize,
    },
    /// Complete a partial view of a mesh with a trained model
    Complete {
        /// STL mesh to sample the input cloud from.
        mesh: PathBuf,
        /// Feed the whole sampled cloud instead of an occluded view.
        #[arg(long)]
        no_occlude: bool,
    },
}

/// Trains on the WGPU device, or completes a single mesh with the saved model.
fn main() -> anyhow::Result<()> {
    type MyBackend = Wgpu<f32, i32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let device = burn::backend::wgpu::WgpuDevice::default();

    match cli.command {
        Commands::Train {
            dataset,
            epochs,
            batch_size,
        } => {
            let config = TrainingConfig::new(CompletionModelConfig::new(), AdamConfig::new())
                .with_num_epochs(epochs)
                .with_batch_size(batch_size);

            let start = std::time::Instant::now();
            burn_occo::training::train::<MyAutodiffBackend>(
                &dataset,
                &cli.artifact_dir,
                config,
                device,
            )
            .context("training failed")?;
            log::info!("Training time: {:?}", start.elapsed());
        }
        Commands::Complete { mesh, no_occlude } => {
            burn_occo::inference::complete::<MyBackend>(
                &cli.artifact_dir,
                &mesh,
                !no_occlude,
                device,
            )
            .with_context(|| format!("failed to complete {}", mesh.display()))?;
        }
    }

    Ok(())
}
