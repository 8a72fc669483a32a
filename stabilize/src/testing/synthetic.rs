//! Synthetic image sequences with known drift.

use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, Dimension, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::Device;
use crate::error::PrimitiveError;
use crate::frame::Frame;
use crate::primitives::{FrameWarper, LinearWarper, TranslationEstimate, TranslationRegistrar};

/// Gaussian blobs at random positions, kept `margin` voxels away from the border.
pub fn blob_field(shape: &[usize], count: usize, sigma: f64, margin: usize, seed: u64) -> Frame {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<(Vec<f64>, f32)> = (0..count)
        .map(|_| {
            let center = shape
                .iter()
                .map(|&n| rng.random_range(margin as f64..(n - margin) as f64))
                .collect();
            (center, rng.random_range(50.0f32..100.0))
        })
        .collect();

    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut image = ArrayD::<f32>::zeros(IxDyn(shape));
    for (index, value) in image.indexed_iter_mut() {
        let index = index.slice();
        *value = centers
            .iter()
            .map(|(center, amplitude)| {
                let dist_sq: f64 = center
                    .iter()
                    .zip(index)
                    .map(|(&c, &i)| (i as f64 - c).powi(2))
                    .sum();
                amplitude * (-dist_sq / two_sigma_sq).exp() as f32
            })
            .sum();
    }
    image
}

/// Circular shift: content at `i` moves to `(i + shift) mod n` on every axis.
pub fn roll(image: ArrayViewD<'_, f32>, shift: &[isize]) -> Frame {
    let shape = image.shape().to_vec();
    let mut out = ArrayD::<f32>::zeros(IxDyn(&shape));
    let mut target = vec![0usize; shape.len()];
    for (index, &value) in image.indexed_iter() {
        for (axis, &i) in index.slice().iter().enumerate() {
            let n = shape[axis] as isize;
            target[axis] = (i as isize + shift[axis]).rem_euclid(n) as usize;
        }
        out[target.as_slice()] = value;
    }
    out
}

/// Translates `image` by `shift` without padding, zero outside.
pub fn translated(image: ArrayViewD<'_, f32>, shift: &[f64]) -> Frame {
    let pad = vec![0; image.ndim()];
    LinearWarper.translate(image, shift, &pad)
}

/// Frame `i` is `reference` translated by `translations[i]`.
pub fn drift_sequence(reference: ArrayViewD<'_, f32>, translations: &[Vec<f64>]) -> Vec<Frame> {
    translations
        .iter()
        .map(|t| translated(reference.view(), t))
        .collect()
}

/// Registrar that knows the true translation of every frame.
///
/// Frames are recognised by the address of their data, so it only works with
/// borrowed frames of one in-memory sequence. Pairs touching a `bad` frame get
/// a garbage shift with `bad_confidence`; pairs touching a `failing` frame
/// return an error.
#[derive(Debug, Clone)]
pub struct ExactRegistrar {
    addresses: HashMap<usize, usize>,
    translations: Vec<Vec<f64>>,
    pub confidence: f64,
    pub bad_frames: Vec<usize>,
    pub bad_confidence: f64,
    pub failing_frames: Vec<usize>,
}

impl ExactRegistrar {
    pub fn new(frames: &[Frame], translations: &[Vec<f64>]) -> Self {
        assert_eq!(frames.len(), translations.len());
        let addresses = frames
            .iter()
            .enumerate()
            .map(|(index, frame)| (frame.as_ptr() as usize, index))
            .collect();
        Self {
            addresses,
            translations: translations.to_vec(),
            confidence: 0.9,
            bad_frames: Vec::new(),
            bad_confidence: 0.05,
            failing_frames: Vec::new(),
        }
    }

    fn index_of(&self, image: &ArrayViewD<'_, f32>) -> Result<usize, PrimitiveError> {
        self.addresses
            .get(&(image.as_ptr() as usize))
            .copied()
            .ok_or_else(|| PrimitiveError::new("unknown frame"))
    }
}

impl TranslationRegistrar for ExactRegistrar {
    fn register(
        &self,
        fixed: ArrayViewD<'_, f32>,
        moving: ArrayViewD<'_, f32>,
        _device: &Device,
    ) -> Result<TranslationEstimate, PrimitiveError> {
        let u = self.index_of(&fixed)?;
        let v = self.index_of(&moving)?;
        if self.failing_frames.contains(&u) || self.failing_frames.contains(&v) {
            return Err(PrimitiveError::new(format!("injected failure for ({u}, {v})")));
        }
        if self.bad_frames.contains(&u) || self.bad_frames.contains(&v) {
            return Ok(TranslationEstimate {
                shift: vec![37.0; self.translations[u].len()],
                confidence: self.bad_confidence,
            });
        }
        let shift = self.translations[u]
            .iter()
            .zip(&self.translations[v])
            .map(|(tu, tv)| tu - tv)
            .collect();
        Ok(TranslationEstimate {
            shift,
            confidence: self.confidence,
        })
    }
}
