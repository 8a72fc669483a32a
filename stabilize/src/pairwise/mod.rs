//! Registration of a single frame pair, with a center-of-mass fallback for
//! low-confidence estimates.

#[cfg(test)]
mod tests;

use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

use crate::config::PairwiseConfig;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::primitives::{TranslationRegistrar, center_of_mass};
use crate::scheduler::FramePair;

/// Translation between frames `u` and `v`.
///
/// `shift_vector` moves frame `v` onto frame `u`: if frame `i` is a common
/// reference translated by `t_i`, then `shift_vector = t_u - t_v`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseRegistrationModel {
    pub u: usize,
    pub v: usize,
    pub shift_vector: Vec<f64>,
    /// Always in [0, 1].
    pub confidence: f64,
    /// The shift comes from the center-of-mass fallback.
    #[serde(default)]
    pub fallback: bool,
}

impl PairwiseRegistrationModel {
    #[inline]
    pub fn pair(&self) -> FramePair {
        FramePair::new(self.u, self.v)
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shift_vector.len()
    }
}

/// Registers `image_v` against `image_u`.
///
/// Shape mismatches are rejected with `InvalidInput` before the registrar
/// runs. Registrar failures and malformed estimates become
/// `RegistrationFailure`. When the fallback is enabled and the estimate's
/// confidence is below `min_confidence`, the shift is replaced by the
/// difference of the background-suppressed centers of mass and the
/// confidence is set to `min_confidence`.
pub fn register_pair(
    u: usize,
    v: usize,
    image_u: ArrayViewD<'_, f32>,
    image_v: ArrayViewD<'_, f32>,
    registrar: &dyn TranslationRegistrar,
    config: &PairwiseConfig,
    device: &Device,
) -> Result<PairwiseRegistrationModel> {
    if image_u.shape() != image_v.shape() {
        return Err(Error::InvalidInput {
            u,
            v,
            reason: format!(
                "frame shapes differ: {:?} vs {:?}",
                image_u.shape(),
                image_v.shape()
            ),
        });
    }
    if image_u.ndim() == 0 || image_u.is_empty() {
        return Err(Error::InvalidInput {
            u,
            v,
            reason: format!("frames have no spatial extent: {:?}", image_u.shape()),
        });
    }

    let ndim = image_u.ndim();
    let estimate = registrar
        .register(image_u.view(), image_v.view(), device)
        .map_err(|e| Error::RegistrationFailure {
            u,
            v,
            reason: e.to_string(),
        })?;

    if estimate.shift.len() != ndim {
        return Err(Error::RegistrationFailure {
            u,
            v,
            reason: format!(
                "registrar returned a {}-dimensional shift for {ndim}-dimensional frames",
                estimate.shift.len()
            ),
        });
    }
    if estimate.shift.iter().any(|s| !s.is_finite()) {
        return Err(Error::RegistrationFailure {
            u,
            v,
            reason: format!("registrar returned a non-finite shift {:?}", estimate.shift),
        });
    }

    let confidence = if estimate.confidence.is_nan() {
        0.0
    } else {
        estimate.confidence.clamp(0.0, 1.0)
    };

    if config.enable_com_fallback && confidence < config.min_confidence {
        let com_u = center_of_mass(image_u.view(), config.quantile, config.bounding_box);
        let com_v = center_of_mass(image_v.view(), config.quantile, config.bounding_box);
        let shift_vector: Vec<f64> = com_u.iter().zip(&com_v).map(|(a, b)| a - b).collect();
        tracing::debug!(
            u,
            v,
            confidence,
            min_confidence = config.min_confidence,
            ?shift_vector,
            "low confidence, using center-of-mass shift"
        );
        return Ok(PairwiseRegistrationModel {
            u,
            v,
            shift_vector,
            confidence: config.min_confidence,
            fallback: true,
        });
    }

    Ok(PairwiseRegistrationModel {
        u,
        v,
        shift_vector: estimate.shift,
        confidence,
        fallback: false,
    })
}
