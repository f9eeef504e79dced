use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// k-NN indices under squared L2, nearest first (each point is its own first neighbour).
///
/// points: [B, N, C] -> indices: [B, N, k]
pub fn knn<B: Backend>(points: Tensor<B, 3>, k: usize) -> Tensor<B, 3, Int> {
    // -|xi - xj|^2 = 2 xi.xj - |xi|^2 - |xj|^2
    let inner = points.clone().matmul(points.clone().swap_dims(1, 2)) * 2.0; // [B, N, N]
    let squared_norm = points.powi_scalar(2).sum_dim(2); // [B, N, 1]
    let neg_distances = inner - squared_norm.clone() - squared_norm.swap_dims(1, 2); // [B, N, N]

    let (_, indices) = neg_distances.topk_with_indices(k, 2);
    indices
}

/// Edge features of the k-NN graph built on `x`.
///
/// For point i and neighbour j the feature is `(x_j - x_i) || x_i`.
///
/// x: [B, C, N] -> features: [B, 2C, N, k]
pub fn graph_feature<B: Backend>(x: Tensor<B, 3>, k: usize) -> Tensor<B, 4> {
    let device = x.device();
    let [batch_size, channels, num_points] = x.dims();

    let points = x.swap_dims(1, 2); // [B, N, C]
    let idx = knn(points.clone(), k); // [B, N, k]

    // Offset every cloud into the flattened [B * N] row space
    let idx_base = Tensor::<B, 1, Int>::arange(0..batch_size as i64, &device)
        .mul_scalar(num_points as i64)
        .reshape([batch_size, 1, 1])
        .repeat(&[1, num_points, k]);
    let idx = (idx + idx_base).reshape([batch_size * num_points * k]);

    let neighbors = points
        .clone()
        .reshape([batch_size * num_points, channels])
        .select(0, idx)
        .reshape([batch_size, num_points, k, channels]); // [B, N, k, C]
    let centers = points.unsqueeze_dim::<4>(2).repeat_dim(2, k); // [B, N, k, C]

    Tensor::cat(vec![neighbors - centers.clone(), centers], 3) // [B, N, k, 2C]
        .permute([0, 3, 1, 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn line_points(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 3> {
        // Four points on the x axis at 0, 1, 3 and 7
        let data = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 3.0, 0.0, 0.0, 7.0, 0.0, 0.0,
        ];
        Tensor::from_data(TensorData::new(data, [1, 4, 3]), device)
    }

    #[test]
    fn test_knn_nearest_first() {
        let device = Default::default();
        let idx = knn(line_points(&device), 2);
        assert_eq!(idx.dims(), [1, 4, 2]);

        let idx: Vec<i64> = idx.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(idx, vec![0, 1, 1, 0, 2, 1, 3, 2]);
    }

    #[test]
    fn test_knn_batches_are_independent() {
        let device = Default::default();
        let first = line_points(&device);
        let second = line_points(&device).flip([1]);
        let idx = knn(Tensor::cat(vec![first, second], 0), 1);

        let idx: Vec<i64> = idx.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(idx, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_graph_feature_layout() {
        let device = Default::default();
        let x = line_points(&device).swap_dims(1, 2); // [1, 3, 4]
        let feature = graph_feature(x.clone(), 2);
        assert_eq!(feature.dims(), [1, 6, 4, 2]);

        // Second half repeats the centre point for every neighbour
        let centers = feature.clone().slice([0..1, 3..6, 0..4, 0..2]);
        let expected = x.unsqueeze_dim::<4>(3).repeat_dim(3, 2);
        let diff: f32 = (centers - expected).abs().max().into_scalar();
        assert!(diff < 1e-6);

        // First neighbour is the point itself, so its difference is zero
        let self_diff: f32 = feature
            .clone()
            .slice([0..1, 0..3, 0..4, 0..1])
            .abs()
            .max()
            .into_scalar();
        assert!(self_diff < 1e-6);

        // Point at x = 3 has x = 1 as second neighbour: 1 - 3 = -2
        let value: f32 = feature.slice([0..1, 0..1, 2..3, 1..2]).into_scalar();
        assert!((value + 2.0).abs() < 1e-6);
    }
}
