use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::data::{occlude, preprocess_mesh};
use crate::error::{CompletionError, Result};
use crate::model::CompletionOutput;
use crate::training::TrainingConfig;

/// Completes one mesh with a trained model and writes the clouds next to it.
///
/// Writes `partial.vtk`, `coarse.vtk` and `fine.vtk` into `artifact_dir`.
pub fn complete<B: Backend>(
    artifact_dir: &Path,
    mesh_path: &Path,
    occlusion: bool,
    device: B::Device,
) -> Result<CompletionOutput<B>> {
    let config = TrainingConfig::load(artifact_dir.join("config.json"))?;
    let record = CompactRecorder::new().load(artifact_dir.join("model"), &device)?;
    let model = config.model.init::<B>(&device).load_record(record);

    let mut file = File::open(mesh_path)?;
    let mesh = stl_io::read_stl(&mut file)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let data = &config.data;

    let complete = preprocess_mesh(&mesh, data.num_gt_points, mesh_path, &mut rng)?;
    let ratio = if occlusion { data.occlusion_ratio } else { 0.0 };
    let partial = occlude(&complete, ratio, data.num_input_points, &mut rng)?;

    let partial_points = to_points(&partial);
    let partial = Tensor::<B, 3>::from_data(
        TensorData::new(partial, [1, data.num_input_points, 3]),
        &device,
    );
    let output = model.forward(partial);

    write_vtk_legacy(&partial_points, &artifact_dir.join("partial.vtk"))?;
    write_vtk_legacy(
        &to_points(&tensor_values(output.coarse.clone())?),
        &artifact_dir.join("coarse.vtk"),
    )?;
    write_vtk_legacy(
        &to_points(&tensor_values(output.fine.clone())?),
        &artifact_dir.join("fine.vtk"),
    )?;
    log::info!(
        "Completed {} into {} fine points",
        mesh_path.display(),
        output.fine.dims()[1]
    );

    Ok(output)
}

fn tensor_values<B: Backend>(tensor: Tensor<B, 3>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .into_vec()
        .map_err(|e| CompletionError::TensorData(format!("{e:?}")))
}

fn to_points(flat: &[f32]) -> Vec<[f32; 3]> {
    flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

fn write_vtk_legacy(points: &[[f32; 3]], path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    // --- VTK header ---
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "burn-occo point cloud")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET UNSTRUCTURED_GRID")?;

    // --- Points ---
    writeln!(w, "POINTS {} float", points.len())?;
    for &[x, y, z] in points {
        writeln!(w, "{x} {y} {z}")?;
    }

    // --- Cells (one vertex per cell) ---
    writeln!(w, "CELLS {} {}", points.len(), points.len() * 2)?;
    for i in 0..points.len() {
        writeln!(w, "1 {i}")?;
    }

    // --- Cell types (all are VTK_VERTEX = 1) ---
    writeln!(w, "CELL_TYPES {}", points.len())?;
    for _ in 0..points.len() {
        writeln!(w, "1")?;
    }

    w.flush()
}
