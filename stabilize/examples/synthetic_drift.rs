//! Stabilises a synthetic drifting 2-D sequence and prints the recovered shifts.
//!
//! Run with `RUST_LOG=stabilize=debug` to see per-pair details.

use std::path::Path;

use ndarray::{Array3, ArrayD, Axis, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stabilize::prelude::*;

const LENGTH: usize = 16;
const SIZE: usize = 64;

fn blob_frame(centers: &[(f64, f64)], offset: (f64, f64), noise: &mut StdRng) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[SIZE, SIZE]), |index| {
        let (y, x) = (index[0] as f64, index[1] as f64);
        let signal: f64 = centers
            .iter()
            .map(|&(cy, cx)| {
                let dy = y - cy - offset.0;
                let dx = x - cx - offset.1;
                100.0 * (-(dy * dy + dx * dx) / 8.0).exp()
            })
            .sum();
        (signal + noise.random_range(0.0..2.0)) as f32
    })
}

fn main() -> Result<()> {
    if let Err(e) = common::setup_logging("info", Path::new("logs")) {
        eprintln!("logging disabled: {e}");
    }

    let mut rng = StdRng::seed_from_u64(1);
    let centers: Vec<(f64, f64)> = (0..10)
        .map(|_| (rng.random_range(16.0..48.0), rng.random_range(16.0..48.0)))
        .collect();
    let drift: Vec<(f64, f64)> = (0..LENGTH)
        .map(|i| {
            let t = i as f64;
            (0.6 * t, 3.0 * (0.4 * t).sin())
        })
        .collect();

    let mut volume = Array3::<f32>::zeros((LENGTH, SIZE, SIZE));
    for (i, &offset) in drift.iter().enumerate() {
        let frame = blob_frame(&centers, offset, &mut rng);
        volume
            .index_axis_mut(Axis(0), i)
            .assign(&frame.into_dimensionality::<ndarray::Ix2>()?);
    }
    let volume = volume.into_dyn();

    let stabilizer = Stabilizer::new(StabilizationConfig::default())?.with_devices(DevicePool::cpu(2));
    let result = stabilizer.stabilize_volume(volume.view(), Axis(0))?;

    println!("frame   true drift        recovered shift    confidence");
    for (i, model) in result.model.models.iter().enumerate() {
        println!(
            "{i:5}   ({:6.2}, {:6.2})   ({:6.2}, {:6.2})   {:.2}",
            drift[i].0 - drift[0].0,
            drift[i].1 - drift[0].1,
            model.shift_vector[0],
            model.shift_vector[1],
            model.confidence
        );
    }
    println!(
        "{} pairs, {} fallbacks, {} failures",
        result.report.total_pairs,
        result.report.fallback_pairs,
        result.report.failed_pairs()
    );

    let stable = result
        .model
        .apply_sequence(volume.view(), Axis(0), None, &LinearWarper)?;
    println!("stabilised volume shape: {:?}", stable.shape());
    println!("model:\n{}", result.model.to_json_string()?);
    Ok(())
}
