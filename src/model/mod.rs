mod decoder;
mod encoder;
mod graph;
mod loss;

use burn::config::Config;
use burn::module::Module;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

pub use decoder::{CoarseDecoder, FoldingDecoder, grid_points};
pub use encoder::{DgcnnEncoder, EdgeConvBlock};
pub use graph::{graph_feature, knn};
pub use loss::{chamfer_distance, chamfer_mean, completion_loss, pairwise_squared_distances};

use crate::data::PointCloudBatch;
use crate::error::{CompletionError, Result};

#[macro_export]
macro_rules! debug_assert_not_nan {
    ($tensor:expr) => {
        debug_assert!(
            burn::tensor::ElementConversion::elem::<i64>(
                $tensor.clone().is_nan().int().sum().into_scalar()
            ) == 0,
            "Tensor contains NaN"
        );
        debug_assert!(
            burn::tensor::ElementConversion::elem::<i64>(
                $tensor.clone().is_inf().int().sum().into_scalar()
            ) == 0,
            "Tensor contains inf"
        );
    };
}

#[derive(Config, Debug)]
pub struct CompletionModelConfig {
    /// Neighbours per point in the encoder graph.
    #[config(default = 20)]
    pub k: usize,
    /// Size of the global embedding.
    #[config(default = 1024)]
    pub emb_dims: usize,
    /// Points in the coarse output.
    #[config(default = 1024)]
    pub num_coarse: usize,
    /// Side of the folding grid; each coarse point grows `grid_size²` fine points.
    #[config(default = 4)]
    pub grid_size: usize,
    /// Half extent of the folding grid.
    #[config(default = 0.5)]
    pub grid_scale: f32,
}

impl CompletionModelConfig {
    pub fn num_fine(&self) -> usize {
        self.grid_size * self.grid_size * self.num_coarse
    }

    /// Checks sizes against the number of points the encoder will receive.
    pub fn validate(&self, num_input_points: usize) -> Result<()> {
        if self.k == 0 || self.emb_dims == 0 || self.num_coarse == 0 || self.grid_size == 0 {
            return Err(CompletionError::invalid_config(
                "k, emb_dims, num_coarse and grid_size must be positive",
            ));
        }
        if self.k > num_input_points {
            return Err(CompletionError::invalid_config(format!(
                "k = {} exceeds the {num_input_points} input points",
                self.k
            )));
        }
        if !(self.grid_scale.is_finite() && self.grid_scale > 0.0) {
            return Err(CompletionError::invalid_config(format!(
                "grid_scale must be positive, got {}",
                self.grid_scale
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CompletionAutoEncoder<B> {
        CompletionAutoEncoder {
            encoder: DgcnnEncoder::new(self.k, self.emb_dims, device),
            coarse: CoarseDecoder::new(self.emb_dims, self.num_coarse, device),
            folding: FoldingDecoder::new(self.emb_dims, self.grid_size, self.grid_scale, device),
        }
    }
}

/// Coarse and fine reconstructions of a batch.
#[derive(Clone, Debug)]
pub struct CompletionOutput<B: Backend> {
    /// [B, num_coarse, 3]
    pub coarse: Tensor<B, 3>,
    /// [B, num_fine, 3]
    pub fine: Tensor<B, 3>,
}

/// DGCNN encoder followed by the coarse-to-fine folding decoder.
#[derive(Module, Debug)]
pub struct CompletionAutoEncoder<B: Backend> {
    pub encoder: DgcnnEncoder<B>,
    pub coarse: CoarseDecoder<B>,
    pub folding: FoldingDecoder<B>,
}

impl<B: Backend> CompletionAutoEncoder<B> {
    /// partial: [B, N, 3] -> embedding: [B, E]
    pub fn encode(&self, partial: Tensor<B, 3>) -> Tensor<B, 2> {
        self.encoder.forward(partial)
    }

    /// partial: [B, N, 3] -> coarse [B, C, 3] and fine [B, C * G², 3]
    pub fn forward(&self, partial: Tensor<B, 3>) -> CompletionOutput<B> {
        let embedding = self.encode(partial);
        debug_assert_not_nan!(embedding);

        let coarse = self.coarse.forward(embedding.clone());
        let fine = self.folding.forward(embedding, coarse.clone());
        debug_assert_not_nan!(fine);

        CompletionOutput { coarse, fine }
    }

    /// Runs the model on the partial clouds and scores it against the complete ones.
    pub fn forward_loss(
        &self,
        batch: PointCloudBatch<B>,
        alpha: f32,
    ) -> (CompletionOutput<B>, Tensor<B, 1>) {
        let output = self.forward(batch.partial);
        let loss = completion_loss(&output.coarse, &output.fine, &batch.complete, alpha);
        (output, loss)
    }
}
