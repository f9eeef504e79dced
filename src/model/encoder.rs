use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig, Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, LeakyRelu, LeakyReluConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::graph::graph_feature;

const NEGATIVE_SLOPE: f64 = 0.2;

fn leaky_relu() -> LeakyRelu {
    LeakyReluConfig::new()
        .with_negative_slope(NEGATIVE_SLOPE)
        .init()
}

/// EdgeConv block: shared 1×1 conv over the edge features of the k-NN graph,
/// then max-pool over neighbours.
#[derive(Module, Debug)]
pub struct EdgeConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: LeakyRelu,
    k: usize,
}

impl<B: Backend> EdgeConvBlock<B> {
    /// in_dim: per-point channels of the block input (the edge feature has twice as many)
    pub fn new(k: usize, in_dim: usize, out_dim: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_dim * 2, out_dim], [1, 1])
            .with_bias(false)
            .init(device);
        let norm = BatchNormConfig::new(out_dim).init(device);

        Self {
            conv,
            norm,
            activation: leaky_relu(),
            k,
        }
    }

    /// x: [B, C, N] -> [B, out_dim, N]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let edge = graph_feature(x, self.k); // [B, 2C, N, k]
        let edge = self.conv.forward(edge); // [B, out, N, k]
        let edge = self.activation.forward(self.norm.forward(edge));

        edge.max_dim(3).squeeze::<3>(3)
    }
}

/// DGCNN encoder: point cloud -> global embedding
#[derive(Module, Debug)]
pub struct DgcnnEncoder<B: Backend> {
    blocks: Vec<EdgeConvBlock<B>>,
    conv: Conv1d<B>,
    norm: BatchNorm<B, 1>,
    activation: LeakyRelu,
}

impl<B: Backend> DgcnnEncoder<B> {
    /// Per-block output channels. Their sum is the width fed to the embedding conv.
    pub const BLOCK_DIMS: [usize; 4] = [64, 64, 128, 256];

    /// k: neighbours per point (20 is typical)
    /// emb_dims: size of the global embedding
    pub fn new(k: usize, emb_dims: usize, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(Self::BLOCK_DIMS.len());
        let mut in_dim = 3;
        for out_dim in Self::BLOCK_DIMS {
            blocks.push(EdgeConvBlock::new(k, in_dim, out_dim, device));
            in_dim = out_dim;
        }

        let concat_dim = Self::BLOCK_DIMS.iter().sum();
        let conv = Conv1dConfig::new(concat_dim, emb_dims, 1)
            .with_bias(false)
            .init(device);
        let norm = BatchNormConfig::new(emb_dims).init(device);

        Self {
            blocks,
            conv,
            norm,
            activation: leaky_relu(),
        }
    }

    /// points: [B, N, 3] -> embedding: [B, emb_dims]
    pub fn forward(&self, points: Tensor<B, 3>) -> Tensor<B, 2> {
        let [_, _, coords] = points.dims();
        assert_eq!(coords, 3, "expected [batch, points, 3] input, got {coords} coordinates");

        let mut x = points.swap_dims(1, 2); // [B, 3, N]
        let mut scales = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            x = block.forward(x);
            scales.push(x.clone());
        }

        let x = Tensor::cat(scales, 1); // [B, 512, N]
        let x = self.conv.forward(x);
        let x = self.activation.forward(self.norm.forward(x)); // [B, E, N]

        x.max_dim(2).squeeze::<2>(2)
    }
}
