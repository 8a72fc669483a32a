//! Per-frame registration models and their application to images.


use ndarray::{ArrayViewD, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameSequence};
use crate::mode::RegistrationMode;
use crate::primitives::FrameWarper;

/// Translation of one frame onto the reference frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRegistrationModel {
    /// Translation that moves the frame onto frame 0, one entry per axis.
    pub shift_vector: Vec<f64>,
    /// Mean confidence of the pairs involving this frame, in [0, 1].
    pub confidence: f64,
}

impl TranslationRegistrationModel {
    pub fn zero(ndim: usize) -> Self {
        Self {
            shift_vector: vec![0.0; ndim],
            confidence: 0.0,
        }
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shift_vector.len()
    }

    /// Padding per axis that keeps all content of the shifted frame.
    pub fn integral_padding(&self) -> Vec<usize> {
        self.shift_vector
            .iter()
            .map(|s| s.abs().ceil() as usize)
            .collect()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.shift_vector.iter().all(|&s| s == 0.0)
    }
}

/// Result of stabilising a sequence: one model per frame, frame 0 first.
///
/// Frame 0 is the reference and always has the zero shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRegistrationModel {
    #[serde(default)]
    pub mode: RegistrationMode,
    pub models: Vec<TranslationRegistrationModel>,
}

impl SequenceRegistrationModel {
    pub fn new(mode: RegistrationMode, models: Vec<TranslationRegistrationModel>) -> Self {
        Self { mode, models }
    }

    /// Identity model for `length` frames of dimension `ndim`.
    pub fn identity(length: usize, ndim: usize) -> Self {
        Self::new(
            RegistrationMode::Translation,
            vec![TranslationRegistrationModel::zero(ndim); length],
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn ndim(&self) -> usize {
        self.models.first().map_or(0, TranslationRegistrationModel::ndim)
    }

    pub fn model(&self, index: usize) -> Result<&TranslationRegistrationModel> {
        self.models.get(index).ok_or(Error::FrameIndex {
            index,
            length: self.models.len(),
        })
    }

    pub fn shift_vectors(&self) -> Vec<Vec<f64>> {
        self.models.iter().map(|m| m.shift_vector.clone()).collect()
    }

    pub fn confidences(&self) -> Vec<f64> {
        self.models.iter().map(|m| m.confidence).collect()
    }

    /// Uniform padding for the whole sequence: the largest absolute shift per
    /// axis, rounded up.
    pub fn padding(&self) -> Vec<usize> {
        let mut padding = vec![0usize; self.ndim()];
        for model in &self.models {
            for (pad, p) in padding.iter_mut().zip(model.integral_padding()) {
                *pad = (*pad).max(p);
            }
        }
        padding
    }

    /// Aligns `target`, the frame at `index`, onto `reference`.
    ///
    /// Returns the reference and the shifted target. With `pad` both are
    /// enlarged by [`padding`](Self::padding) on every side, so nothing is
    /// cropped; otherwise they keep their shape and content shifted outside
    /// the frame is lost.
    pub fn apply(
        &self,
        reference: ArrayViewD<'_, f32>,
        target: ArrayViewD<'_, f32>,
        index: usize,
        pad: bool,
        warper: &dyn FrameWarper,
    ) -> Result<(Frame, Frame)> {
        if reference.shape() != target.shape() {
            return Err(Error::InvalidInput {
                u: 0,
                v: index,
                reason: format!(
                    "reference shape {:?} differs from target shape {:?}",
                    reference.shape(),
                    target.shape()
                ),
            });
        }
        let pad_width = if pad {
            self.padding()
        } else {
            vec![0; self.ndim()]
        };
        let reference = self.apply_frame(reference, 0, &pad_width, warper)?;
        let target = self.apply_frame(target, index, &pad_width, warper)?;
        Ok((reference, target))
    }

    /// Shifts a single frame by its model, padding every axis by `pad_width`.
    pub fn apply_frame(
        &self,
        image: ArrayViewD<'_, f32>,
        index: usize,
        pad_width: &[usize],
        warper: &dyn FrameWarper,
    ) -> Result<Frame> {
        let model = self.model(index)?;
        self.check_dimensions(image.ndim(), pad_width)?;
        Ok(warper.translate(image, &model.shift_vector, pad_width))
    }

    /// Stabilises a whole volume whose frames lie along `axis`.
    ///
    /// `pad_width` defaults to [`padding`](Self::padding). The result has the
    /// same layout as `volume`, enlarged by the padding.
    pub fn apply_sequence(
        &self,
        volume: ArrayViewD<'_, f32>,
        axis: Axis,
        pad_width: Option<&[usize]>,
        warper: &dyn FrameWarper,
    ) -> Result<Frame> {
        if axis.index() >= volume.ndim() {
            return Err(Error::InvalidConfig(format!(
                "sequence axis {} out of range for a {}-dimensional volume",
                axis.index(),
                volume.ndim()
            )));
        }
        let length = volume.len_of(axis);
        if length != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                actual: length,
            });
        }
        if length == 0 {
            return Err(Error::EmptySequence);
        }

        let pad_width = pad_width.map_or_else(|| self.padding(), <[usize]>::to_vec);
        tracing::debug!(length, ?pad_width, "applying registration to sequence");

        let frames: Vec<Frame> = (0..length)
            .into_par_iter()
            .map(|index| self.apply_frame(volume.index_axis(axis, index), index, &pad_width, warper))
            .collect::<Result<_>>()?;
        let views: Vec<ArrayViewD<'_, f32>> = frames.iter().map(|f| f.view()).collect();
        Ok(ndarray::stack(axis, &views)?)
    }

    /// Stabilises every frame of `frames` as a separate image.
    pub fn apply_frames<F>(&self, frames: &F, pad_width: Option<&[usize]>, warper: &dyn FrameWarper) -> Result<Vec<Frame>>
    where
        F: FrameSequence + ?Sized,
    {
        if frames.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                actual: frames.len(),
            });
        }
        let pad_width = pad_width.map_or_else(|| self.padding(), <[usize]>::to_vec);
        (0..frames.len())
            .into_par_iter()
            .map(|index| {
                let frame = frames.frame(index)?;
                self.apply_frame(frame.view(), index, &pad_width, warper)
            })
            .collect()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn check_dimensions(&self, ndim: usize, pad_width: &[usize]) -> Result<()> {
        if ndim != self.ndim() || pad_width.len() != ndim {
            return Err(Error::InvalidConfig(format!(
                "model is {}-dimensional, got a {ndim}-dimensional frame with {}-dimensional padding",
                self.ndim(),
                pad_width.len()
            )));
        }
        Ok(())
    }
}
