mod occlusion;
mod preprocess;

use std::fs::{self, File};
use std::path::Path;

use burn::config::Config;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub use occlusion::occlude;
pub use preprocess::{normalize, preprocess_mesh, sample_surface};

use crate::error::{CompletionError, Result};

/// How training pairs are produced from meshes.
#[derive(Config, Debug)]
pub struct PointCloudConfig {
    /// Points in every partial (input) cloud.
    #[config(default = 1024)]
    pub num_input_points: usize,
    /// Points in every complete (ground truth) cloud.
    #[config(default = 4096)]
    pub num_gt_points: usize,
    /// Share of the complete cloud hidden from the partial view.
    #[config(default = 0.25)]
    pub occlusion_ratio: f32,
}

/// A partial view and the complete cloud it was cut from
#[derive(Clone, Debug)]
pub struct PointCloudItem {
    pub partial: Vec<f32>,  // [num_input_points * 3] flattened
    pub complete: Vec<f32>, // [num_gt_points * 3] flattened
}

impl PointCloudItem {
    /// Sample, normalize and occlude one mesh file.
    pub fn from_stl<R: Rng>(path: &Path, config: &PointCloudConfig, rng: &mut R) -> Result<Self> {
        let mut file = File::open(path)?;
        let mesh = stl_io::read_stl(&mut file)?;

        let complete = preprocess_mesh(&mesh, config.num_gt_points, path, rng)?;
        let partial = occlude(
            &complete,
            config.occlusion_ratio,
            config.num_input_points,
            rng,
        )?;
        Ok(Self { partial, complete })
    }
}

/// Dataset that holds all preprocessed point clouds in memory
pub struct PointCloudDataset {
    pub items: Vec<PointCloudItem>,
}

impl Dataset<PointCloudItem> for PointCloudDataset {
    fn get(&self, index: usize) -> Option<PointCloudItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl PointCloudDataset {
    /// Load all STL files from `root/split`.
    ///
    /// Files are visited in name order so a given seed always yields the same views.
    pub fn from_dir<P: AsRef<Path>>(
        root: P,
        split: &str,
        config: &PointCloudConfig,
        seed: u64,
    ) -> Result<Self> {
        let dir = root.as_ref().join(split);
        log::info!("Loading STL files from: {}", dir.display());

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("stl") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            log::debug!("Processing: {}", path.display());
            match PointCloudItem::from_stl(&path, config, &mut rng) {
                Ok(item) => items.push(item),
                Err(e) => log::warn!("Failed to load {}: {}", path.display(), e),
            }
        }

        if items.is_empty() {
            return Err(CompletionError::EmptyDataset(dir));
        }
        log::info!("Loaded {} point clouds from {split}", items.len());
        Ok(Self { items })
    }
}

#[derive(Clone, Debug)]
pub struct PointCloudBatch<B: Backend> {
    pub partial: Tensor<B, 3>,  // shape: [batch_size, num_input_points, 3]
    pub complete: Tensor<B, 3>, // shape: [batch_size, num_gt_points, 3]
}

/// Batcher that converts PointCloudItems into batched tensors
#[derive(Clone)]
pub struct PointCloudBatcher {
    num_input_points: usize,
    num_gt_points: usize,
}

impl PointCloudBatcher {
    pub fn new(config: &PointCloudConfig) -> Self {
        Self {
            num_input_points: config.num_input_points,
            num_gt_points: config.num_gt_points,
        }
    }
}

impl<B: Backend> Batcher<B, PointCloudItem, PointCloudBatch<B>> for PointCloudBatcher {
    fn batch(&self, items: Vec<PointCloudItem>, device: &B::Device) -> PointCloudBatch<B> {
        let batch_size = items.len();

        let mut partial = Vec::with_capacity(batch_size * self.num_input_points * 3);
        let mut complete = Vec::with_capacity(batch_size * self.num_gt_points * 3);
        for item in items {
            partial.extend_from_slice(&item.partial);
            complete.extend_from_slice(&item.complete);
        }
        let partial = TensorData::new(partial, [batch_size, self.num_input_points, 3]);
        let complete = TensorData::new(complete, [batch_size, self.num_gt_points, 3]);

        PointCloudBatch {
            partial: Tensor::from_data(partial, device),
            complete: Tensor::from_data(complete, device),
        }
    }
}

/// Writes a unit square in the z = 0 plane as a two-triangle STL file.
#[cfg(test)]
pub(crate) fn write_square_stl(path: &Path) {
    use stl_io::{Normal, Triangle, Vertex};

    let triangle = |a: [f32; 3], b: [f32; 3], c: [f32; 3]| Triangle {
        normal: Normal::new([0.0, 0.0, 1.0]),
        vertices: [Vertex::new(a), Vertex::new(b), Vertex::new(c)],
    };
    let triangles = [
        triangle([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        triangle([1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let mut file = File::create(path).unwrap();
    stl_io::write_stl(&mut file, triangles.iter()).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> PointCloudConfig {
        PointCloudConfig::new()
            .with_num_input_points(32)
            .with_num_gt_points(64)
    }

    #[test]
    fn test_from_dir_loads_stl_only() {
        let root = tempfile::tempdir().unwrap();
        let train = root.path().join("train");
        fs::create_dir(&train).unwrap();
        write_square_stl(&train.join("a.stl"));
        write_square_stl(&train.join("b.stl"));
        fs::write(train.join("notes.txt"), "not a mesh").unwrap();

        let dataset = PointCloudDataset::from_dir(root.path(), "train", &small_config(), 1).unwrap();
        assert_eq!(dataset.len(), 2);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.partial.len(), 32 * 3);
        assert_eq!(item.complete.len(), 64 * 3);
    }

    #[test]
    fn test_from_dir_is_reproducible() {
        let root = tempfile::tempdir().unwrap();
        let train = root.path().join("train");
        fs::create_dir(&train).unwrap();
        write_square_stl(&train.join("a.stl"));

        let first = PointCloudDataset::from_dir(root.path(), "train", &small_config(), 9).unwrap();
        let second = PointCloudDataset::from_dir(root.path(), "train", &small_config(), 9).unwrap();
        assert_eq!(first.items[0].partial, second.items[0].partial);
    }

    #[test]
    fn test_from_dir_skips_broken_meshes() {
        let root = tempfile::tempdir().unwrap();
        let test = root.path().join("test");
        fs::create_dir(&test).unwrap();
        fs::write(test.join("broken.stl"), "solid nothing").unwrap();

        let result = PointCloudDataset::from_dir(root.path(), "test", &small_config(), 1);
        assert!(matches!(result, Err(CompletionError::EmptyDataset(_))));
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let config = small_config();
        let item = PointCloudItem {
            partial: vec![0.5; 32 * 3],
            complete: vec![0.25; 64 * 3],
        };

        let batch: PointCloudBatch<TestBackend> =
            PointCloudBatcher::new(&config).batch(vec![item.clone(), item], &device);
        assert_eq!(batch.partial.dims(), [2, 32, 3]);
        assert_eq!(batch.complete.dims(), [2, 64, 3]);
    }
}
