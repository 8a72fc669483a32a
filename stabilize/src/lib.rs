//! Stabilize - registration and stabilisation of image sequences.
//!
//! Given a sequence of N-dimensional frames that drift over time, this library
//! computes one translation per frame that maps it onto the first frame:
//! - Multi-scale scheduling of the frame pairs to register
//! - Parallel pairwise registration with a center-of-mass fallback
//! - A robust sparse least-squares solve over all pairwise constraints
//! - Application of the resulting model to frames and whole volumes
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stabilize::prelude::*;
//!
//! let stabilizer = Stabilizer::new(StabilizationConfig::default())?;
//! let result = stabilizer.stabilize_volume(volume.view(), Axis(0))?;
//!
//! let stable = result.model.apply_sequence(volume.view(), Axis(0), None, &LinearWarper)?;
//! ```

pub(crate) mod batch;
pub(crate) mod config;
pub(crate) mod device;
pub(crate) mod error;
pub(crate) mod frame;
pub(crate) mod mode;
pub(crate) mod model;
pub(crate) mod pairwise;
pub mod primitives;
pub(crate) mod scheduler;
pub(crate) mod sequence;
pub(crate) mod solver;

#[cfg(test)]
pub mod testing;

pub mod prelude;

// ============================================================================
// Errors and configuration
// ============================================================================

pub use config::{
    BatchConfig, FailurePolicy, PairwiseConfig, PhaseCorrelationConfig, SolverConfig,
    StabilizationConfig, SubpixelMethod, UnconstrainedPolicy,
};
pub use error::{Error, PrimitiveError, Result};

// ============================================================================
// Frames and devices
// ============================================================================

pub use device::{Device, DeviceGuard, DevicePool};
pub use frame::{AxisFrames, Frame, FrameRef, FrameSequence};

// ============================================================================
// Registration
// ============================================================================

pub use batch::{BatchOutcome, BatchReport, BatchRunner, PairFailure};
pub use mode::RegistrationMode;
pub use model::{SequenceRegistrationModel, TranslationRegistrationModel};
pub use pairwise::{PairwiseRegistrationModel, register_pair};
pub use primitives::{
    FrameWarper, LinearWarper, PhaseCorrelationRegistrar, TranslationEstimate, TranslationRegistrar,
    center_of_mass,
};
pub use scheduler::{FramePair, GOLDEN_RATIO, default_scales, isolated_frames, schedule, schedule_with};
pub use sequence::{StabilizationResult, Stabilizer};
pub use solver::{aggregate_confidences, solve};
