//! Multi-scale enumeration of the frame pairs to register.
//!
//! Registering every pair is quadratic in the sequence length. Instead, pairs
//! are sampled at a small set of frame distances ("scales"): adjacent frames
//! give local constraints and distant frames stop drift from accumulating.


use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Golden ratio, the growth factor of the default scales.
pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// An ordered pair of frame indices to register, `u < v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FramePair {
    pub u: usize,
    pub v: usize,
}

impl FramePair {
    pub fn new(u: usize, v: usize) -> Self {
        Self { u, v }
    }

    /// Frame distance of the pair.
    #[inline]
    pub fn scale(&self) -> usize {
        self.v.abs_diff(self.u)
    }
}

/// Golden-ratio scales `round(φ^i)` for increasing `i` while the scale is
/// below `length`, without repeats.
///
/// For `length = 10` this gives `[1, 2, 3, 4, 7]`.
pub fn default_scales(length: usize) -> Vec<usize> {
    let mut scales = Vec::new();
    let mut power = 1.0f64;
    loop {
        let scale = power.round() as usize;
        if scale >= length {
            break;
        }
        if scales.last() != Some(&scale) {
            scales.push(scale);
        }
        power *= GOLDEN_RATIO;
    }
    scales
}

/// Enumerates the pairs `(u, u + s)` for every scale `s`, every offset in
/// `[0, s)` and every `u = offset + k * s` with `u + s < length`.
///
/// Pairs already produced by an earlier scale are not repeated. The order is
/// deterministic: scales as given, then offsets, then `u`.
pub fn schedule(length: usize, scales: &[usize]) -> Result<Vec<FramePair>> {
    if let Some(position) = scales.iter().position(|&s| s == 0) {
        return Err(Error::InvalidConfig(format!(
            "scale {position} is zero, scales must be positive"
        )));
    }

    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for &scale in scales {
        for offset in 0..scale {
            let mut u = offset;
            while u + scale < length {
                let pair = FramePair::new(u, u + scale);
                if seen.insert(pair) {
                    pairs.push(pair);
                }
                u += scale;
            }
        }
    }

    tracing::debug!(length, ?scales, pairs = pairs.len(), "scheduled frame pairs");
    Ok(pairs)
}

/// Pairs for the given scales, or the golden-ratio defaults when `None`.
pub fn schedule_with(length: usize, scales: Option<&[usize]>) -> Result<Vec<FramePair>> {
    match scales {
        Some(scales) => schedule(length, scales),
        None => schedule(length, &default_scales(length)),
    }
}

/// Frames in `0..length` that appear in no pair.
pub fn isolated_frames(length: usize, pairs: &[FramePair]) -> Vec<usize> {
    let mut covered = vec![false; length];
    for pair in pairs {
        for index in [pair.u, pair.v] {
            if let Some(slot) = covered.get_mut(index) {
                *slot = true;
            }
        }
    }
    if length == 1 {
        return Vec::new();
    }
    covered
        .iter()
        .enumerate()
        .filter(|&(_, &c)| !c)
        .map(|(i, _)| i)
        .collect()
}
