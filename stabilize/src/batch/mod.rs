//! Runs the pairwise registration over every scheduled pair.
//!
//! Pairs are independent, so they fan out over a bounded worker pool. Each
//! task holds one device slot for its whole duration. Failures either drop
//! the pair and end up in the [`BatchReport`], or abort the batch.


use std::collections::BTreeSet;

use common::WorkerPool;

use crate::config::{BatchConfig, FailurePolicy, PairwiseConfig};
use crate::device::DevicePool;
use crate::error::{Error, Result};
use crate::frame::FrameSequence;
use crate::mode::RegistrationMode;
use crate::pairwise::PairwiseRegistrationModel;
use crate::primitives::TranslationRegistrar;
use crate::scheduler::FramePair;

/// A pair that could not be registered.
#[derive(Debug)]
pub struct PairFailure {
    pub pair: FramePair,
    pub error: Error,
}

/// Summary of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of scheduled pairs.
    pub total_pairs: usize,
    /// Successful pairs whose shift came from the center-of-mass fallback.
    pub fallback_pairs: usize,
    pub failures: Vec<PairFailure>,
    /// Frames touched by at least one failed pair, ascending.
    pub affected_frames: Vec<usize>,
}

impl BatchReport {
    #[inline]
    pub fn failed_pairs(&self) -> usize {
        self.failures.len()
    }

    #[inline]
    pub fn succeeded_pairs(&self) -> usize {
        self.total_pairs - self.failures.len()
    }
}

/// Registered pairs plus the report of what went wrong.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub models: Vec<PairwiseRegistrationModel>,
    pub report: BatchReport,
}

/// Registers a list of pairs with one registration mode.
pub struct BatchRunner<'a> {
    mode: RegistrationMode,
    registrar: &'a dyn TranslationRegistrar,
    devices: &'a DevicePool,
    pairwise: PairwiseConfig,
    config: BatchConfig,
}

impl std::fmt::Debug for BatchRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("mode", &self.mode)
            .field("devices", &self.devices.len())
            .field("pairwise", &self.pairwise)
            .field("config", &self.config)
            .finish()
    }
}

impl<'a> BatchRunner<'a> {
    pub fn new(registrar: &'a dyn TranslationRegistrar, devices: &'a DevicePool) -> Self {
        Self {
            mode: RegistrationMode::default(),
            registrar,
            devices,
            pairwise: PairwiseConfig::default(),
            config: BatchConfig::default(),
        }
    }

    pub fn with_mode(mut self, mode: RegistrationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_pairwise(mut self, pairwise: PairwiseConfig) -> Self {
        self.pairwise = pairwise;
        self
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers every pair of `pairs` on the frames of `frames`.
    ///
    /// With [`FailurePolicy::Abort`] the first failure is returned as the
    /// error. With [`FailurePolicy::Skip`] failed pairs are left out of
    /// `models` and listed in the report.
    pub fn run<F>(&self, frames: &F, pairs: &[FramePair]) -> Result<BatchOutcome>
    where
        F: FrameSequence + ?Sized,
    {
        let pool = WorkerPool::new(self.config.workers)?;
        tracing::info!(
            pairs = pairs.len(),
            workers = pool.workers(),
            devices = self.devices.len(),
            policy = ?self.config.failure_policy,
            "registering frame pairs"
        );

        let task = |index: usize, pair: &FramePair| self.register(frames, index, *pair);

        let (models, failures) = match self.config.failure_policy {
            FailurePolicy::Abort => (pool.try_map(pairs, task)?, Vec::new()),
            FailurePolicy::Skip => {
                let mut models = Vec::with_capacity(pairs.len());
                let mut failures = Vec::new();
                for (pair, result) in pairs.iter().zip(pool.map(pairs, task)) {
                    match result {
                        Ok(model) => models.push(model),
                        Err(error) => {
                            tracing::warn!(u = pair.u, v = pair.v, %error, "dropping frame pair");
                            failures.push(PairFailure { pair: *pair, error });
                        }
                    }
                }
                (models, failures)
            }
        };

        let affected_frames: BTreeSet<usize> = failures
            .iter()
            .flat_map(|f| [f.pair.u, f.pair.v])
            .collect();
        let report = BatchReport {
            total_pairs: pairs.len(),
            fallback_pairs: models.iter().filter(|m| m.fallback).count(),
            failures,
            affected_frames: affected_frames.into_iter().collect(),
        };

        tracing::info!(
            succeeded = report.succeeded_pairs(),
            failed = report.failed_pairs(),
            fallbacks = report.fallback_pairs,
            "pairwise registration finished"
        );
        Ok(BatchOutcome { models, report })
    }

    fn register<F>(&self, frames: &F, task_index: usize, pair: FramePair) -> Result<PairwiseRegistrationModel>
    where
        F: FrameSequence + ?Sized,
    {
        let image_u = frames.frame(pair.u)?;
        let image_v = frames.frame(pair.v)?;
        let device = self.devices.acquire(task_index);
        self.mode.register_pair(
            pair.u,
            pair.v,
            image_u.view(),
            image_v.view(),
            self.registrar,
            &self.pairwise,
            &device,
        )
    }
}
