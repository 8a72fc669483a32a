//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use stabilize::prelude::*;
//! ```

pub use ndarray::Axis;

// Pipeline
pub use crate::{StabilizationConfig, StabilizationResult, Stabilizer};

// Models
pub use crate::{PairwiseRegistrationModel, RegistrationMode, SequenceRegistrationModel};

// Frames, devices and primitives
pub use crate::{
    DevicePool, Frame, FrameSequence, FrameWarper, LinearWarper, TranslationRegistrar,
};

pub use crate::{Error, Result};
