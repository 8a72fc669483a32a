//! Registration modes.
//!
//! A mode decides how a frame pair is registered and how the pairwise
//! results are combined. Only pure translation is implemented; further
//! variants plug in here without changing the pipeline.

use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::{PairwiseConfig, SolverConfig};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::model::SequenceRegistrationModel;
use crate::pairwise::{PairwiseRegistrationModel, register_pair};
use crate::primitives::TranslationRegistrar;
use crate::solver;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationMode {
    /// Rigid translation per frame.
    #[default]
    Translation,
}

impl RegistrationMode {
    /// Parses a mode name, failing with `UnsupportedMode` for unknown names.
    pub fn parse(name: &str) -> Result<Self> {
        name.trim()
            .parse()
            .map_err(|_| Error::UnsupportedMode(name.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_pair(
        &self,
        u: usize,
        v: usize,
        image_u: ArrayViewD<'_, f32>,
        image_v: ArrayViewD<'_, f32>,
        registrar: &dyn TranslationRegistrar,
        config: &PairwiseConfig,
        device: &Device,
    ) -> Result<PairwiseRegistrationModel> {
        match self {
            RegistrationMode::Translation => {
                register_pair(u, v, image_u, image_v, registrar, config, device)
            }
        }
    }

    pub fn solve(
        &self,
        models: &[PairwiseRegistrationModel],
        length: usize,
        ndim: usize,
        config: &SolverConfig,
    ) -> Result<SequenceRegistrationModel> {
        match self {
            RegistrationMode::Translation => solver::solve(models, length, ndim, config),
        }
    }
}
