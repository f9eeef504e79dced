use nalgebra::{Vector3, VectorView3};
use rand::Rng;
use rand::seq::index;
use rand_distr::{Distribution, UnitSphere};

use crate::error::{CompletionError, Result};

/// Distance of the virtual camera from the origin. Clouds live in the unit sphere.
const VIEW_DISTANCE: f32 = 2.0;

/// Simulates a partial scan of a normalized cloud.
///
/// A viewpoint is drawn on a sphere around the shape and the `ratio` share of
/// points closest to it is removed. The remaining points are resampled to
/// exactly `num_out`: a random subset when there are enough, otherwise all of
/// them padded with random repeats.
pub fn occlude<R: Rng>(points: &[f32], ratio: f32, num_out: usize, rng: &mut R) -> Result<Vec<f32>> {
    if !(0.0..1.0).contains(&ratio) {
        return Err(CompletionError::invalid_config(format!(
            "occlusion ratio must be in [0, 1), got {ratio}"
        )));
    }
    let n_points = points.len() / 3;
    if n_points == 0 {
        return Err(CompletionError::Sampling("cannot occlude an empty cloud".into()));
    }

    let direction: [f32; 3] = UnitSphere.sample(rng);
    let viewpoint = Vector3::from(direction) * VIEW_DISTANCE;

    let mut order: Vec<(usize, f32)> = points
        .chunks_exact(3)
        .map(|p| (VectorView3::from_slice(p) - viewpoint).norm_squared())
        .enumerate()
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    let n_removed = ((n_points as f32 * ratio) as usize).min(n_points - 1);
    let visible: Vec<usize> = order[n_removed..].iter().map(|&(i, _)| i).collect();

    let picked: Vec<usize> = if visible.len() >= num_out {
        index::sample(rng, visible.len(), num_out)
            .into_iter()
            .map(|i| visible[i])
            .collect()
    } else {
        let mut picked = visible.clone();
        picked.extend((visible.len()..num_out).map(|_| visible[rng.random_range(0..visible.len())]));
        picked
    };

    Ok(picked
        .into_iter()
        .flat_map(|i| points[i * 3..i * 3 + 3].iter().copied())
        .collect())
}
