//! End-to-end stabilisation of a frame sequence.
//!
//! Schedules the frame pairs, registers them on the worker pool and solves for
//! one translation per frame.


use std::sync::Arc;

use ndarray::{Array2, ArrayViewD, Axis};

use crate::batch::{BatchReport, BatchRunner};
use crate::config::StabilizationConfig;
use crate::device::DevicePool;
use crate::error::{Error, Result};
use crate::frame::{AxisFrames, FrameSequence};
use crate::model::SequenceRegistrationModel;
use crate::pairwise::PairwiseRegistrationModel;
use crate::primitives::{PhaseCorrelationRegistrar, TranslationRegistrar};
use crate::scheduler::schedule_with;

/// Everything a stabilisation run produces.
#[derive(Debug)]
pub struct StabilizationResult {
    pub model: SequenceRegistrationModel,
    /// Pairwise models the solve was built from.
    pub pairwise: Vec<PairwiseRegistrationModel>,
    pub report: BatchReport,
}

impl StabilizationResult {
    /// `N x N` matrix holding the confidence of pair `(u, v)` at `[u, v]`,
    /// zero for pairs that were not registered.
    pub fn confidence_matrix(&self) -> Array2<f64> {
        let length = self.model.len();
        let mut matrix = Array2::zeros((length, length));
        for m in &self.pairwise {
            if m.u < length && m.v < length {
                matrix[[m.u, m.v]] = m.confidence;
            }
        }
        matrix
    }
}

/// Configured stabilisation pipeline.
pub struct Stabilizer {
    config: StabilizationConfig,
    registrar: Arc<dyn TranslationRegistrar>,
    devices: DevicePool,
}

impl std::fmt::Debug for Stabilizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stabilizer")
            .field("config", &self.config)
            .field("devices", &self.devices)
            .finish()
    }
}

impl Stabilizer {
    /// Validates `config` and sets up phase correlation with one CPU device
    /// per batch worker.
    pub fn new(config: StabilizationConfig) -> Result<Self> {
        config.validate()?;
        let registrar = Arc::new(PhaseCorrelationRegistrar::new(config.phase_correlation.clone()));
        let devices = match config.batch.workers {
            0 => DevicePool::default(),
            workers => DevicePool::cpu(workers),
        };
        Ok(Self {
            config,
            registrar,
            devices,
        })
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn TranslationRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn with_devices(mut self, devices: DevicePool) -> Self {
        self.devices = devices;
        self
    }

    pub fn config(&self) -> &StabilizationConfig {
        &self.config
    }

    /// Computes the registration model of `frames`.
    pub fn stabilize<F>(&self, frames: &F) -> Result<StabilizationResult>
    where
        F: FrameSequence + ?Sized,
    {
        let length = frames.len();
        if length == 0 {
            return Err(Error::EmptySequence);
        }
        let ndim = frames.frame(0)?.ndim();
        if ndim == 0 {
            return Err(Error::InvalidConfig(
                "frames must have at least one spatial axis".to_string(),
            ));
        }

        let pairs = schedule_with(length, self.config.scales.as_deref())?;
        tracing::info!(
            length,
            ndim,
            pairs = pairs.len(),
            mode = %self.config.mode,
            "stabilising sequence"
        );

        let outcome = BatchRunner::new(self.registrar.as_ref(), &self.devices)
            .with_mode(self.config.mode)
            .with_pairwise(self.config.pairwise.clone())
            .with_config(self.config.batch.clone())
            .run(frames, &pairs)?;

        let model = self
            .config
            .mode
            .solve(&outcome.models, length, ndim, &self.config.solver)?;

        Ok(StabilizationResult {
            model,
            pairwise: outcome.models,
            report: outcome.report,
        })
    }

    /// Stabilises a volume whose frames lie along `axis`.
    pub fn stabilize_volume(&self, volume: ArrayViewD<'_, f32>, axis: Axis) -> Result<StabilizationResult> {
        let frames = AxisFrames::new(volume, axis)?;
        self.stabilize(&frames)
    }
}
