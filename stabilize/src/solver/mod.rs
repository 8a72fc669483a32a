//! Global solve: turns pairwise translations into one translation per frame.
//!
//! Each spatial dimension is an independent sparse system with one row per
//! pairwise model (`x[u] - x[v] = shift[d]`) and one anchor row
//! (`x[0] = 0`). The regulariser penalises differences between consecutive
//! frames after the dominant linear drift is removed, so exact measurements
//! are reproduced. The dimensions are solved in parallel.

mod linear;


use rayon::prelude::*;

use crate::config::{SolverConfig, UnconstrainedPolicy};
use crate::error::{Error, Result};
use crate::mode::RegistrationMode;
use crate::model::{SequenceRegistrationModel, TranslationRegistrationModel};
use crate::pairwise::PairwiseRegistrationModel;

use linear::{Constraint, DifferenceSystem, LpParams, solve_lp};

/// Lower bound on a constraint weight, so a zero-confidence pair still counts.
const MIN_ROW_WEIGHT: f64 = 1e-3;

/// Solves for the per-frame translations of a sequence of `length` frames.
///
/// The returned model maps every frame onto frame 0: frame 0 has exactly the
/// zero shift, and frame `i` carries the translation that moves it onto
/// frame 0. A frame's confidence is the mean confidence of the pairs it
/// appears in, or zero when it appears in none.
pub fn solve(
    models: &[PairwiseRegistrationModel],
    length: usize,
    ndim: usize,
    config: &SolverConfig,
) -> Result<SequenceRegistrationModel> {
    if length == 0 {
        return Err(Error::EmptySequence);
    }
    config.validate()?;
    validate_models(models, length, ndim)?;

    if length == 1 {
        return Ok(SequenceRegistrationModel::new(
            RegistrationMode::Translation,
            vec![TranslationRegistrationModel::zero(ndim)],
        ));
    }

    let confidences = aggregate_confidences(models, length);
    let unconstrained = unconstrained_frames(models, length);
    if !unconstrained.is_empty() {
        if unconstrained.len() * 2 > length - 1 || config.unconstrained == UnconstrainedPolicy::Fail {
            return Err(Error::UnderdeterminedSystem {
                unconstrained,
                length,
            });
        }
        tracing::warn!(
            frames = ?unconstrained,
            "frames without pairwise constraints get a zero shift"
        );
    }

    let detached = detached_frames(models, length, &unconstrained);
    if !detached.is_empty() {
        tracing::warn!(
            frames = ?detached,
            "frames not connected to frame 0, their offset is only fixed by smoothing"
        );
    }

    let params = LpParams {
        order_error: config.order_error,
        order_reg: config.order_reg,
        alpha: config.alpha_reg,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
    };

    let solutions: Vec<Vec<f64>> = (0..ndim)
        .into_par_iter()
        .map(|dimension| solve_dimension(models, length, dimension, config, &params))
        .collect::<Result<_>>()?;

    let frames = (0..length)
        .map(|frame| {
            let shift_vector = if frame == 0 || unconstrained.contains(&frame) {
                vec![0.0; ndim]
            } else {
                // Normalise -0.0 so serialised models stay clean.
                solutions.iter().map(|x| 0.0 - x[frame]).collect()
            };
            TranslationRegistrationModel {
                shift_vector,
                confidence: confidences[frame],
            }
        })
        .collect();

    tracing::info!(length, ndim, pairs = models.len(), "global solve finished");
    Ok(SequenceRegistrationModel::new(RegistrationMode::Translation, frames))
}

fn solve_dimension(
    models: &[PairwiseRegistrationModel],
    length: usize,
    dimension: usize,
    config: &SolverConfig,
    params: &LpParams,
) -> Result<Vec<f64>> {
    let weight = |m: &PairwiseRegistrationModel| {
        if config.confidence_weighting {
            m.confidence.max(MIN_ROW_WEIGHT)
        } else {
            1.0
        }
    };
    let trend = drift_rate(models, dimension, &weight);

    let constraints: Vec<Constraint> = models
        .iter()
        .map(|m| Constraint {
            u: m.u,
            v: m.v,
            target: m.shift_vector[dimension] + trend * (m.v as f64 - m.u as f64),
            weight: weight(m),
        })
        .collect();

    let system = DifferenceSystem::new(length, &constraints);
    let solution = solve_lp(&system, params).map_err(|failure| Error::SolverConvergence {
        dimension,
        iterations: failure.iterations,
        step: failure.step,
        tolerance: config.tolerance,
    })?;
    tracing::debug!(
        dimension,
        iterations = solution.iterations,
        objective = solution.objective,
        trend,
        "dimension solved"
    );

    let detrended: Vec<f64> = (0..length)
        .map(|i| solution.x[i] + trend * i as f64)
        .collect();
    let origin = detrended[0];
    Ok(detrended.into_iter().map(|x| x - origin).collect())
}

/// Per-frame drift along `dimension`: the weighted median of the slopes
/// `-shift[d] / (v - u)` over all models. Zero without models.
fn drift_rate(
    models: &[PairwiseRegistrationModel],
    dimension: usize,
    weight: impl Fn(&PairwiseRegistrationModel) -> f64,
) -> f64 {
    let mut slopes: Vec<(f64, f64)> = models
        .iter()
        .map(|m| (-m.shift_vector[dimension] / (m.v as f64 - m.u as f64), weight(m)))
        .collect();
    weighted_median(&mut slopes).unwrap_or(0.0)
}

/// Lower weighted median of `(value, weight)` samples.
fn weighted_median(samples: &mut [(f64, f64)]) -> Option<f64> {
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = samples.iter().map(|&(_, w)| w).sum::<f64>() / 2.0;
    let mut cumulative = 0.0;
    for &(value, w) in samples.iter() {
        cumulative += w;
        if cumulative >= half {
            return Some(value);
        }
    }
    samples.last().map(|&(value, _)| value)
}

fn validate_models(models: &[PairwiseRegistrationModel], length: usize, ndim: usize) -> Result<()> {
    for m in models {
        let invalid = |reason: String| Error::InvalidInput {
            u: m.u,
            v: m.v,
            reason,
        };
        if m.u == m.v {
            return Err(invalid("a frame cannot be paired with itself".to_string()));
        }
        if m.u >= length || m.v >= length {
            return Err(invalid(format!("frame index out of range for length {length}")));
        }
        if m.shift_vector.len() != ndim {
            return Err(invalid(format!(
                "shift has {} components, expected {ndim}",
                m.shift_vector.len()
            )));
        }
        if m.shift_vector.iter().any(|s| !s.is_finite()) {
            return Err(invalid(format!("non-finite shift {:?}", m.shift_vector)));
        }
        if !(0.0..=1.0).contains(&m.confidence) {
            return Err(invalid(format!("confidence {} outside [0, 1]", m.confidence)));
        }
    }
    Ok(())
}

/// Mean pairwise confidence per frame, zero for frames in no pair.
pub fn aggregate_confidences(models: &[PairwiseRegistrationModel], length: usize) -> Vec<f64> {
    let mut sums = vec![0.0f64; length];
    let mut counts = vec![0usize; length];
    for m in models {
        for frame in [m.u, m.v] {
            if frame < length {
                sums[frame] += m.confidence;
                counts[frame] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
        .collect()
}

/// Frames in `1..length` that appear in no pairwise model.
fn unconstrained_frames(models: &[PairwiseRegistrationModel], length: usize) -> Vec<usize> {
    let mut constrained = vec![false; length];
    for m in models {
        constrained[m.u] = true;
        constrained[m.v] = true;
    }
    (1..length).filter(|&i| !constrained[i]).collect()
}

/// Constrained frames whose pairs never reach frame 0.
fn detached_frames(models: &[PairwiseRegistrationModel], length: usize, unconstrained: &[usize]) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..length).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for m in models {
        let a = find(&mut parent, m.u);
        let b = find(&mut parent, m.v);
        if a != b {
            parent[a] = b;
        }
    }
    let root = find(&mut parent, 0);
    (1..length)
        .filter(|i| !unconstrained.contains(i))
        .filter(|&i| find(&mut parent, i) != root)
        .collect()
}
