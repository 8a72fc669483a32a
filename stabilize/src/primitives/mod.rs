//! Default implementations of the per-image primitives the registration core
//! relies on: pairwise translation estimation, center of mass, and warping.
//!
//! The traits are the seams where GPU or otherwise accelerated versions plug in.

pub mod center_of_mass;
pub mod phase_correlation;
pub mod warp;

use ndarray::ArrayViewD;

use crate::device::Device;
use crate::error::PrimitiveError;
use crate::frame::Frame;

pub use center_of_mass::center_of_mass;
pub use phase_correlation::{PhaseCorrelationRegistrar, PhaseCorrelationResult, PhaseCorrelator};
pub use warp::LinearWarper;

/// Translation between two images as estimated by a registration primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationEstimate {
    /// Translation that moves the second image onto the first, one entry per axis.
    pub shift: Vec<f64>,
    /// Quality of the estimate, nominally in [0, 1].
    pub confidence: f64,
}

/// Estimates the translation between two images of identical shape.
pub trait TranslationRegistrar: Send + Sync {
    /// Returns the translation that moves `moving` onto `fixed`.
    ///
    /// `device` is held exclusively by the caller for the duration of the call.
    fn register(
        &self,
        fixed: ArrayViewD<'_, f32>,
        moving: ArrayViewD<'_, f32>,
        device: &Device,
    ) -> Result<TranslationEstimate, PrimitiveError>;
}

/// Resamples an image under a translation.
pub trait FrameWarper: Sync {
    /// Translates `image` by `shift` so content at `p` lands at `p + shift`.
    ///
    /// The output is enlarged by `pad_width[axis]` on both sides of every axis,
    /// and the input content is offset by the same amount.
    fn translate(&self, image: ArrayViewD<'_, f32>, shift: &[f64], pad_width: &[usize]) -> Frame;
}
