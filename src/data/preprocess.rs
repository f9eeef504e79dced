use std::path::Path;

use nalgebra::VectorView3;
use rand::distr::Uniform;
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use stl_io::IndexedMesh;

use crate::error::{CompletionError, Result};

type Triangle<'a> = (
    VectorView3<'a, f32>,
    VectorView3<'a, f32>,
    VectorView3<'a, f32>,
);

fn triangle(mesh: &IndexedMesh, face: usize) -> Triangle<'_> {
    let face = &mesh.faces[face];
    (
        VectorView3::from_slice(&mesh.vertices[face.vertices[0]].0),
        VectorView3::from_slice(&mesh.vertices[face.vertices[1]].0),
        VectorView3::from_slice(&mesh.vertices[face.vertices[2]].0),
    )
}

/// Area-weighted uniform sampling of `n_points` on the mesh surface.
///
/// Returns the points flattened as `[n_points * 3]`.
pub fn sample_surface<R: Rng>(
    mesh: &IndexedMesh,
    n_points: usize,
    path: &Path,
    rng: &mut R,
) -> Result<Vec<f32>> {
    let areas: Vec<f32> = (0..mesh.faces.len())
        .map(|i| {
            let (v0, v1, v2) = triangle(mesh, i);
            (v1 - v0).cross(&(v2 - v0)).norm() * 0.5
        })
        .collect();
    if !areas.iter().any(|&a| a > 0.0) {
        return Err(CompletionError::DegenerateMesh {
            path: path.to_path_buf(),
        });
    }
    let dist = WeightedIndex::new(&areas).map_err(|e| CompletionError::Sampling(e.to_string()))?;
    let uniform =
        Uniform::new(0.0f32, 1.0).map_err(|e| CompletionError::Sampling(e.to_string()))?;

    let mut points = Vec::with_capacity(n_points * 3);
    for _ in 0..n_points {
        let (v0, v1, v2) = triangle(mesh, dist.sample(rng));

        let r1 = uniform.sample(rng);
        let r2 = uniform.sample(rng);
        // Reflect into the triangle half of the unit square
        let (r1, r2) = if r1 + r2 > 1.0 {
            (1.0 - r1, 1.0 - r2)
        } else {
            (r1, r2)
        };
        let p = v0 + (v1 - v0) * r1 + (v2 - v0) * r2;
        points.extend_from_slice(p.data.as_slice());
    }

    Ok(points)
}

/// Center on the centroid and scale into the unit sphere.
pub fn normalize(points: Vec<f32>) -> Result<Vec<f32>> {
    let n_points = points.len() / 3;
    let mut cloud = ndarray::Array2::from_shape_vec((n_points, 3), points)
        .map_err(|e| CompletionError::Sampling(e.to_string()))?;
    let Some(centroid) = cloud.mean_axis(ndarray::Axis(0)) else {
        return Ok(Vec::new());
    };
    cloud -= &centroid;
    let max_norm = cloud
        .rows()
        .into_iter()
        .map(|r| (r[0].powi(2) + r[1].powi(2) + r[2].powi(2)).sqrt())
        .fold(0.0f32, f32::max);
    if max_norm > 0.0 {
        cloud /= max_norm;
    }

    Ok(cloud.into_raw_vec_and_offset().0)
}

/// Sample a mesh and bring it into the unit sphere.
pub fn preprocess_mesh<R: Rng>(
    mesh: &IndexedMesh,
    n_points: usize,
    path: &Path,
    rng: &mut R,
) -> Result<Vec<f32>> {
    normalize(sample_surface(mesh, n_points, path, rng)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use stl_io::{IndexedTriangle, Vector};

    /// Unit square in the z = 0 plane, split into two triangles.
    fn square_mesh() -> IndexedMesh {
        IndexedMesh {
            vertices: vec![
                Vector::new([0.0, 0.0, 0.0]),
                Vector::new([1.0, 0.0, 0.0]),
                Vector::new([0.0, 1.0, 0.0]),
                Vector::new([1.0, 1.0, 0.0]),
            ],
            faces: vec![
                IndexedTriangle {
                    normal: Vector::new([0.0, 0.0, 1.0]),
                    vertices: [0, 1, 2],
                },
                IndexedTriangle {
                    normal: Vector::new([0.0, 0.0, 1.0]),
                    vertices: [1, 3, 2],
                },
            ],
        }
    }

    #[test]
    fn test_samples_lie_on_surface() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = sample_surface(&square_mesh(), 200, Path::new("square.stl"), &mut rng).unwrap();

        assert_eq!(points.len(), 600);
        for p in points.chunks_exact(3) {
            assert!((0.0..=1.0).contains(&p[0]));
            assert!((0.0..=1.0).contains(&p[1]));
            assert_eq!(p[2], 0.0);
        }
    }

    #[test]
    fn test_degenerate_mesh_is_rejected() {
        let mut mesh = square_mesh();
        for v in mesh.vertices.iter_mut() {
            v.0[1] = 0.0;
        }
        let mut rng = StdRng::seed_from_u64(7);
        let result = sample_surface(&mesh, 10, Path::new("flat.stl"), &mut rng);
        assert!(matches!(result, Err(CompletionError::DegenerateMesh { .. })));
    }

    #[test]
    fn test_normalize_unit_sphere() {
        let points = vec![2.0, 0.0, 0.0, 4.0, 0.0, 0.0, 3.0, 1.0, 0.0, 3.0, -1.0, 0.0];
        let normalized = normalize(points).unwrap();

        let centroid: Vec<f32> = (0..3)
            .map(|axis| normalized.iter().skip(axis).step_by(3).sum::<f32>() / 4.0)
            .collect();
        assert!(centroid.iter().all(|c| c.abs() < 1e-6));

        let max_norm = normalized
            .chunks_exact(3)
            .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
            .fold(0.0f32, f32::max);
        assert!((max_norm - 1.0).abs() < 1e-6);
    }
}
