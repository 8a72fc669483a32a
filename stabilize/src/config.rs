//! Configuration types for sequence stabilisation.
//!
//! All configuration structs and related enums are consolidated here. Every
//! struct has documented defaults, a `validate` method, and loads from partial
//! JSON documents through serde defaults.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mode::RegistrationMode;

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidConfig(message()))
    }
}

// =============================================================================
// Phase correlation configuration
// =============================================================================

/// Sub-pixel refinement of the correlation peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubpixelMethod {
    /// Integer peak position only.
    None,
    /// Three-point parabolic fit per axis.
    #[default]
    Parabolic,
    /// Three-point fit on log values per axis.
    Gaussian,
}

/// Configuration for the default phase-correlation registrar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseCorrelationConfig {
    /// Apply a separable Hann window to suppress edge effects.
    pub use_windowing: bool,
    /// Sub-pixel interpolation method.
    pub subpixel_method: SubpixelMethod,
    /// Peak-to-secondary-peak ratio that maps to full confidence.
    pub confidence_ratio: f64,
}

impl Default for PhaseCorrelationConfig {
    fn default() -> Self {
        Self {
            use_windowing: true,
            subpixel_method: SubpixelMethod::Parabolic,
            confidence_ratio: 10.0,
        }
    }
}

impl PhaseCorrelationConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.confidence_ratio > 1.0, || {
            format!(
                "phase correlation confidence_ratio must be > 1, got {}",
                self.confidence_ratio
            )
        })
    }
}

// =============================================================================
// Pairwise registration configuration
// =============================================================================

/// Configuration for a single pairwise registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairwiseConfig {
    /// Minimal confidence to accept a registration without fallback.
    pub min_confidence: f64,
    /// Fall back to a center-of-mass estimate below `min_confidence`.
    pub enable_com_fallback: bool,
    /// Intensity quantile subtracted as background before the center of mass.
    pub quantile: f64,
    /// Use the center of the signal bounding box instead of the weighted centroid.
    pub bounding_box: bool,
}

impl Default for PairwiseConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            enable_com_fallback: true,
            quantile: 0.5,
            bounding_box: false,
        }
    }
}

impl PairwiseConfig {
    pub fn validate(&self) -> Result<()> {
        check((0.0..=1.0).contains(&self.min_confidence), || {
            format!("min_confidence must be in [0, 1], got {}", self.min_confidence)
        })?;
        check((0.0..=1.0).contains(&self.quantile), || {
            format!("quantile must be in [0, 1], got {}", self.quantile)
        })
    }
}

// =============================================================================
// Global solver configuration
// =============================================================================

/// What to do with frames that end up without any pairwise constraint.
///
/// Independently of the policy, the solve fails when more than half of the
/// frames are unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconstrainedPolicy {
    /// Give the frame a zero shift and zero confidence, and log a warning.
    #[default]
    ZeroDisplacement,
    /// Fail with `UnderdeterminedSystem`.
    Fail,
}

/// Configuration of the global least-squares solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Convergence tolerance on the iteration step and the objective.
    pub tolerance: f64,
    /// Exponent of the data term, in [1, 2]. 1 gives a robust L1 fit.
    pub order_error: f64,
    /// Exponent of the regularisation term, in [1, 2].
    pub order_reg: f64,
    /// Weight of the regularisation term.
    pub alpha_reg: f64,
    /// Iteration budget of the reweighting loop.
    pub max_iterations: usize,
    /// Weight each pairwise constraint by its confidence.
    pub confidence_weighting: bool,
    pub unconstrained: UnconstrainedPolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            order_error: 1.0,
            order_reg: 2.0,
            alpha_reg: 1e-1,
            max_iterations: 200,
            confidence_weighting: true,
            unconstrained: UnconstrainedPolicy::ZeroDisplacement,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.tolerance > 0.0 && self.tolerance.is_finite(), || {
            format!("tolerance must be positive, got {}", self.tolerance)
        })?;
        check((1.0..=2.0).contains(&self.order_error), || {
            format!("order_error must be in [1, 2], got {}", self.order_error)
        })?;
        check((1.0..=2.0).contains(&self.order_reg), || {
            format!("order_reg must be in [1, 2], got {}", self.order_reg)
        })?;
        check(self.alpha_reg >= 0.0 && self.alpha_reg.is_finite(), || {
            format!("alpha_reg must be non-negative, got {}", self.alpha_reg)
        })?;
        check(self.max_iterations > 0, || {
            "max_iterations must be positive".to_string()
        })
    }
}

// =============================================================================
// Batch configuration
// =============================================================================

/// How the batch runner reacts to a failed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the pair, record it in the report and continue.
    #[default]
    Skip,
    /// Abort the whole batch on the first failure.
    Abort,
}

/// Configuration of the pairwise registration batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads. Zero selects the number of available cores.
    pub workers: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            failure_policy: FailurePolicy::Skip,
        }
    }
}

// =============================================================================
// Top-level configuration
// =============================================================================

/// Full configuration of a sequence stabilisation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationConfig {
    pub mode: RegistrationMode,
    /// Frame distances to register. `None` derives golden-ratio scales from the length.
    pub scales: Option<Vec<usize>>,
    pub pairwise: PairwiseConfig,
    pub phase_correlation: PhaseCorrelationConfig,
    pub solver: SolverConfig,
    pub batch: BatchConfig,
}

impl StabilizationConfig {
    /// Loads a configuration from JSON. Missing fields keep their defaults,
    /// an unknown `mode` fails with `UnsupportedMode`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(mode) = value.get("mode") {
            match mode.as_str() {
                Some(name) => {
                    RegistrationMode::parse(name)?;
                }
                None => return Err(Error::UnsupportedMode(mode.to_string())),
            }
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(scales) = &self.scales {
            check(!scales.is_empty(), || "scales must not be empty".to_string())?;
            check(scales.iter().all(|&s| s > 0), || {
                format!("scales must be positive, got {scales:?}")
            })?;
        }
        self.pairwise.validate()?;
        self.phase_correlation.validate()?;
        self.solver.validate()
    }
}
