use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

const HIDDEN_DIM: usize = 1024;
const FOLDING_DIM: usize = 512;

/// Fully connected decoder: embedding -> coarse point cloud
#[derive(Module, Debug)]
pub struct CoarseDecoder<B: Backend> {
    layers: Vec<Linear<B>>,
    norms: Vec<BatchNorm<B, 0>>,
    activation: Relu,
    num_coarse: usize,
}

impl<B: Backend> CoarseDecoder<B> {
    pub fn new(emb_dims: usize, num_coarse: usize, device: &B::Device) -> Self {
        let layers = vec![
            LinearConfig::new(emb_dims, HIDDEN_DIM).init(device),
            LinearConfig::new(HIDDEN_DIM, HIDDEN_DIM).init(device),
            LinearConfig::new(HIDDEN_DIM, num_coarse * 3).init(device), // Flattened [B, C*3]
        ];
        let norms = vec![
            BatchNormConfig::new(HIDDEN_DIM).init(device),
            BatchNormConfig::new(HIDDEN_DIM).init(device),
        ];

        Self {
            layers,
            norms,
            activation: Relu::new(),
            num_coarse,
        }
    }

    /// embedding: [B, E] -> coarse: [B, C, 3]
    pub fn forward(&self, embedding: Tensor<B, 2>) -> Tensor<B, 3> {
        let mut x = embedding;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if let Some(norm) = self.norms.get(i) {
                x = self.activation.forward(norm.forward(x));
            }
        }
        let [b, _] = x.dims();
        x.reshape([b, self.num_coarse, 3])
    }
}

/// `linspace(-scale, scale, size)` squared into a 2-D grid, first coordinate slowest.
///
/// Returns `size * size` rows of `[u, v]`.
pub fn grid_points(size: usize, scale: f32) -> Vec<[f32; 2]> {
    let steps: Vec<f32> = match size {
        0 => Vec::new(),
        1 => vec![-scale],
        _ => {
            let step = 2.0 * scale / (size - 1) as f32;
            (0..size).map(|i| -scale + step * i as f32).collect()
        }
    };

    steps
        .iter()
        .flat_map(|&u| steps.iter().map(move |&v| [u, v]))
        .collect()
}

/// Folding decoder: deforms a 2-D grid patch around every coarse point.
#[derive(Module, Debug)]
pub struct FoldingDecoder<B: Backend> {
    convs: Vec<Conv1d<B>>,
    norms: Vec<BatchNorm<B, 1>>,
    activation: Relu,
    grid_size: usize,
    grid_scale: f32,
}

impl<B: Backend> FoldingDecoder<B> {
    pub fn new(emb_dims: usize, grid_size: usize, grid_scale: f32, device: &B::Device) -> Self {
        // grid (2) + coarse centre (3) + global embedding
        let in_dim = 2 + 3 + emb_dims;
        let convs = vec![
            Conv1dConfig::new(in_dim, FOLDING_DIM, 1).init(device),
            Conv1dConfig::new(FOLDING_DIM, FOLDING_DIM, 1).init(device),
            Conv1dConfig::new(FOLDING_DIM, 3, 1).init(device),
        ];
        let norms = vec![
            BatchNormConfig::new(FOLDING_DIM).init(device),
            BatchNormConfig::new(FOLDING_DIM).init(device),
        ];

        Self {
            convs,
            norms,
            activation: Relu::new(),
            grid_size,
            grid_scale,
        }
    }

    /// Points generated per coarse point.
    pub fn patch_size(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// Grid cycled over the whole fine cloud: [B, C * G², 2]
    fn grid_features(&self, batch_size: usize, num_coarse: usize, device: &B::Device) -> Tensor<B, 3> {
        let grid: Vec<f32> = grid_points(self.grid_size, self.grid_scale)
            .into_iter()
            .flatten()
            .collect();
        let grid = Tensor::<B, 2>::from_data(TensorData::new(grid, [self.patch_size(), 2]), device);

        grid.unsqueeze::<3>().repeat(&[batch_size, num_coarse, 1])
    }

    /// Coarse centres and embedding spread over the fine cloud.
    ///
    /// Fine point `j` takes coarse point `j / G²`; every fine point gets the full embedding.
    /// Returns `(centers [B, C * G², 3], global [B, C * G², E])`.
    fn point_features(
        &self,
        embedding: Tensor<B, 2>,
        coarse: Tensor<B, 3>,
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let [batch_size, num_coarse, _] = coarse.dims();
        let num_fine = num_coarse * self.patch_size();

        let centers = coarse
            .unsqueeze_dim::<4>(2)
            .repeat_dim(2, self.patch_size())
            .reshape([batch_size, num_fine, 3]);
        let global = embedding.unsqueeze_dim::<3>(1).repeat_dim(1, num_fine);
        (centers, global)
    }

    /// embedding: [B, E], coarse: [B, C, 3] -> fine: [B, C * G², 3]
    pub fn forward(&self, embedding: Tensor<B, 2>, coarse: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, num_coarse, _] = coarse.dims();

        let grid = self.grid_features(batch_size, num_coarse, &coarse.device());
        let (centers, global) = self.point_features(embedding, coarse);

        let mut x = Tensor::cat(vec![grid, centers.clone(), global], 2).swap_dims(1, 2); // [B, 5+E, F]
        for (i, conv) in self.convs.iter().enumerate() {
            x = conv.forward(x);
            if let Some(norm) = self.norms.get(i) {
                x = self.activation.forward(norm.forward(x));
            }
        }

        x.swap_dims(1, 2) + centers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_grid_points_order() {
        let grid = grid_points(2, 0.5);
        assert_eq!(grid, vec![[-0.5, -0.5], [-0.5, 0.5], [0.5, -0.5], [0.5, 0.5]]);

        let grid = grid_points(4, 0.5);
        assert_eq!(grid.len(), 16);
        assert!((grid[1][1] - (-0.5 + 1.0 / 3.0)).abs() < 1e-6);
        assert!(grid[15].iter().all(|c| (c - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_grid_points_single_step() {
        assert_eq!(grid_points(1, 0.3), vec![[-0.3, -0.3]]);
    }

    #[test]
    fn test_coarse_decoder_shape() {
        let device = Default::default();
        let decoder = CoarseDecoder::<TestBackend>::new(32, 10, &device);

        let embedding = Tensor::random([2, 32], Distribution::Default, &device);
        assert_eq!(decoder.forward(embedding).dims(), [2, 10, 3]);
    }

    #[test]
    fn test_grid_features_cycle() {
        let device = Default::default();
        let decoder = FoldingDecoder::<TestBackend>::new(8, 2, 0.5, &device);

        let grid = decoder.grid_features(1, 3, &device);
        assert_eq!(grid.dims(), [1, 12, 2]);

        let values: Vec<f32> = grid.into_data().to_vec().unwrap();
        // Fine point 5 uses grid point 5 mod 4 = 1
        assert_eq!(&values[10..12], &[-0.5, 0.5]);
    }

    #[test]
    fn test_point_features_repeat_each_centre() {
        let device = Default::default();
        let decoder = FoldingDecoder::<TestBackend>::new(2, 2, 0.5, &device);

        let coarse = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], [1, 3, 3]),
            &device,
        );
        let embedding =
            Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![0.25f32, -0.5], [1, 2]), &device);

        let (centers, global) = decoder.point_features(embedding, coarse);
        assert_eq!(centers.dims(), [1, 12, 3]);
        assert_eq!(global.dims(), [1, 12, 2]);

        let centers: Vec<f32> = centers.into_data().to_vec().unwrap();
        for (j, row) in centers.chunks_exact(3).enumerate() {
            let c = (j / 4) as f32;
            assert_eq!(row, &[3.0 * c + 1.0, 3.0 * c + 2.0, 3.0 * c + 3.0], "row {j}");
        }

        let global: Vec<f32> = global.into_data().to_vec().unwrap();
        assert!(global.chunks_exact(2).all(|row| row == [0.25, -0.5]));
    }

    #[test]
    fn test_folding_decoder_shape() {
        let device = Default::default();
        let decoder = FoldingDecoder::<TestBackend>::new(16, 3, 0.5, &device);

        let embedding = Tensor::random([2, 16], Distribution::Default, &device);
        let coarse = Tensor::random([2, 5, 3], Distribution::Default, &device);
        assert_eq!(decoder.forward(embedding, coarse).dims(), [2, 45, 3]);
    }
}
