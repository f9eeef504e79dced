use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

/// Squared distances between every pair of points.
///
/// points1: [B, N, 3], points2: [B, M, 3] -> [B, N, M]
pub fn pairwise_squared_distances<B: Backend>(
    points1: &Tensor<B, 3>,
    points2: &Tensor<B, 3>,
) -> Tensor<B, 3> {
    // |a - b|^2 = |a|^2 + |b|^2 - 2 a.b, without materialising [B, N, M, 3]
    let norm1 = points1.clone().powi_scalar(2).sum_dim(2); // [B, N, 1]
    let norm2 = points2.clone().powi_scalar(2).sum_dim(2).swap_dims(1, 2); // [B, 1, M]
    let inner = points1.clone().matmul(points2.clone().swap_dims(1, 2)); // [B, N, M]

    (norm1 + norm2 - inner * 2.0).clamp_min(0.0)
}

/// Nearest-neighbour squared distances in both directions.
///
/// Returns `(dist1 [B, N], dist2 [B, M])`: for each point of `points1` the
/// distance to the closest point of `points2`, and the other way round.
pub fn chamfer_distance<B: Backend>(
    points1: &Tensor<B, 3>,
    points2: &Tensor<B, 3>,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let distances = pairwise_squared_distances(points1, points2);

    let dist1 = distances.clone().min_dim(2).squeeze::<2>(2);
    let dist2 = distances.min_dim(1).squeeze::<2>(1);
    (dist1, dist2)
}

/// Symmetric Chamfer distance averaged over points and batch.
pub fn chamfer_mean<B: Backend>(points1: &Tensor<B, 3>, points2: &Tensor<B, 3>) -> Tensor<B, 1> {
    let (dist1, dist2) = chamfer_distance(points1, points2);
    dist1.mean() + dist2.mean()
}

/// Coarse reconstruction term plus the fine term weighted by `alpha`.
///
/// coarse: [B, C, 3], fine: [B, F, 3], ground_truth: [B, M, 3]
pub fn completion_loss<B: Backend>(
    coarse: &Tensor<B, 3>,
    fine: &Tensor<B, 3>,
    ground_truth: &Tensor<B, 3>,
    alpha: f32,
) -> Tensor<B, 1> {
    chamfer_mean(coarse, ground_truth) + chamfer_mean(fine, ground_truth) * alpha
}
