//! N-dimensional phase correlation for translation estimation.
//!
//! Phase correlation finds the translation between two images by:
//! 1. Zero-padding each axis to a power of two and applying a separable window
//! 2. Computing the N-D FFT of both images (one 1-D FFT pass per axis)
//! 3. Normalising the cross-power spectrum
//! 4. Locating the peak of its inverse FFT, with optional sub-pixel refinement


use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice, Zip};
use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

use crate::config::{PhaseCorrelationConfig, SubpixelMethod};
use crate::device::Device;
use crate::error::PrimitiveError;
use crate::primitives::{TranslationEstimate, TranslationRegistrar};

/// Result of phase correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseCorrelationResult {
    /// Translation that moves the target onto the reference, per axis.
    pub shift: Vec<f64>,
    /// Height of the correlation peak.
    pub peak_value: f64,
    /// Peak sharpness relative to the strongest secondary peak, in [0, 1].
    pub confidence: f64,
}

/// Phase correlator for images of one fixed shape.
pub struct PhaseCorrelator {
    config: PhaseCorrelationConfig,
    shape: Vec<usize>,
    padded_shape: Vec<usize>,
    forward: Vec<Arc<dyn Fft<f32>>>,
    inverse: Vec<Arc<dyn Fft<f32>>>,
    /// Per-axis window over the padded length.
    windows: Vec<Vec<f32>>,
}

impl std::fmt::Debug for PhaseCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseCorrelator")
            .field("config", &self.config)
            .field("shape", &self.shape)
            .field("padded_shape", &self.padded_shape)
            .finish()
    }
}

impl PhaseCorrelator {
    /// Creates a correlator for images of the given shape.
    pub fn new(shape: &[usize], config: PhaseCorrelationConfig) -> Self {
        let padded_shape: Vec<usize> = shape.iter().map(|&n| n.max(1).next_power_of_two()).collect();

        let mut planner = FftPlanner::new();
        let forward = padded_shape
            .iter()
            .map(|&n| planner.plan_fft_forward(n))
            .collect();
        let inverse = padded_shape
            .iter()
            .map(|&n| planner.plan_fft_inverse(n))
            .collect();

        // Windows taper the image itself, not the zero padding around it.
        let windows = shape
            .iter()
            .map(|&n| {
                if config.use_windowing {
                    hann_window(n)
                } else {
                    vec![1.0; n]
                }
            })
            .collect();

        Self {
            config,
            shape: shape.to_vec(),
            padded_shape,
            forward,
            inverse,
            windows,
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Estimates the translation that moves `target` onto `reference`.
    pub fn correlate(
        &self,
        reference: ArrayViewD<'_, f32>,
        target: ArrayViewD<'_, f32>,
    ) -> Result<PhaseCorrelationResult, PrimitiveError> {
        if reference.shape() != self.shape.as_slice() || target.shape() != self.shape.as_slice() {
            return Err(PrimitiveError::new(format!(
                "phase correlator expects shape {:?}, got {:?} and {:?}",
                self.shape,
                reference.shape(),
                target.shape()
            )));
        }

        let mut reference_spectrum = self.prepare(reference);
        let mut target_spectrum = self.prepare(target);
        fft_axes(&mut reference_spectrum, &self.forward);
        fft_axes(&mut target_spectrum, &self.forward);

        // Normalised cross-power spectrum: R * conj(T) / |R * conj(T)|, in place.
        Zip::from(&mut reference_spectrum)
            .and(&target_spectrum)
            .for_each(|r, &t| {
                let product = *r * t.conj();
                let magnitude = product.norm();
                *r = if magnitude > 1e-10 {
                    product / magnitude
                } else {
                    Complex::new(0.0, 0.0)
                };
            });

        fft_axes(&mut reference_spectrum, &self.inverse);
        let norm = 1.0 / reference_spectrum.len() as f32;
        let correlation = reference_spectrum.mapv(|c| c.re * norm);

        let (peak, peak_value) = find_peak(&correlation);
        if !peak_value.is_finite() {
            return Err(PrimitiveError::new("correlation surface is not finite"));
        }

        let shift = peak
            .iter()
            .enumerate()
            .map(|(axis, &p)| {
                let n = self.padded_shape[axis];
                let wrapped = if p > n / 2 {
                    p as f64 - n as f64
                } else {
                    p as f64
                };
                wrapped + self.subpixel_offset(&correlation, &peak, axis)
            })
            .collect();

        let confidence = self.compute_confidence(&correlation, &peak, peak_value);

        Ok(PhaseCorrelationResult {
            shift,
            peak_value,
            confidence,
        })
    }

    /// Windows the image and embeds it centered in the padded complex buffer.
    fn prepare(&self, image: ArrayViewD<'_, f32>) -> ArrayD<Complex<f32>> {
        let offsets: Vec<usize> = self
            .shape
            .iter()
            .zip(&self.padded_shape)
            .map(|(&n, &padded)| (padded - n) / 2)
            .collect();

        let mut windowed = image.to_owned();
        for (axis, window) in self.windows.iter().enumerate() {
            for (i, mut slab) in windowed.axis_iter_mut(Axis(axis)).enumerate() {
                let w = window[i];
                slab.mapv_inplace(|v| if v.is_finite() { v * w } else { 0.0 });
            }
        }

        let mut padded = ArrayD::<Complex<f32>>::zeros(IxDyn(&self.padded_shape));
        padded
            .slice_each_axis_mut(|desc| {
                let axis = desc.axis.index();
                Slice::from(offsets[axis]..offsets[axis] + self.shape[axis])
            })
            .zip_mut_with(&windowed, |dst, &src| *dst = Complex::new(src, 0.0));
        padded
    }

    fn subpixel_offset(&self, correlation: &ArrayD<f32>, peak: &[usize], axis: usize) -> f64 {
        let n = self.padded_shape[axis];
        if n < 3 {
            return 0.0;
        }

        let mut index = peak.to_vec();
        let c = correlation[index.as_slice()];
        index[axis] = (peak[axis] + n - 1) % n;
        let l = correlation[index.as_slice()];
        index[axis] = (peak[axis] + 1) % n;
        let r = correlation[index.as_slice()];

        let (l, c, r) = match self.config.subpixel_method {
            SubpixelMethod::None => return 0.0,
            // A Gaussian fit needs strictly positive samples.
            SubpixelMethod::Gaussian if l > 0.0 && c > 0.0 && r > 0.0 => {
                ((l as f64).ln(), (c as f64).ln(), (r as f64).ln())
            }
            SubpixelMethod::Parabolic | SubpixelMethod::Gaussian => (l as f64, c as f64, r as f64),
        };

        // Vertex of the parabola through (-1, l), (0, c), (1, r).
        let denom = 2.0 * (l + r - 2.0 * c);
        if denom.abs() > 1e-10 {
            ((l - r) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    }

    /// Ratio of the main peak to the strongest peak outside its neighbourhood.
    ///
    /// The neighbourhood spans 1/8 of the padded size along every axis.
    fn compute_confidence(&self, correlation: &ArrayD<f32>, peak: &[usize], peak_value: f64) -> f64 {
        if peak_value <= 0.0 {
            return 0.0;
        }

        let min_dist: Vec<usize> = self.padded_shape.iter().map(|&n| (n / 8).max(1)).collect();
        let mut second_peak = 0.0f32;
        for (index, &value) in correlation.indexed_iter() {
            let outside = index.slice().iter().enumerate().any(|(axis, &i)| {
                let n = self.padded_shape[axis];
                let d = i.abs_diff(peak[axis]);
                d.min(n - d) >= min_dist[axis]
            });
            if outside {
                second_peak = second_peak.max(value);
            }
        }

        let ratio = self.config.confidence_ratio;
        if second_peak > 1e-10 {
            (peak_value / second_peak as f64).min(ratio) / ratio
        } else {
            1.0
        }
    }
}

/// Default registrar backed by [`PhaseCorrelator`]. Runs on the CPU whatever
/// device it is handed.
#[derive(Debug, Clone, Default)]
pub struct PhaseCorrelationRegistrar {
    config: PhaseCorrelationConfig,
}

impl PhaseCorrelationRegistrar {
    pub fn new(config: PhaseCorrelationConfig) -> Self {
        Self { config }
    }
}

impl TranslationRegistrar for PhaseCorrelationRegistrar {
    fn register(
        &self,
        fixed: ArrayViewD<'_, f32>,
        moving: ArrayViewD<'_, f32>,
        _device: &Device,
    ) -> Result<TranslationEstimate, PrimitiveError> {
        if fixed.shape() != moving.shape() {
            return Err(PrimitiveError::new(format!(
                "shape mismatch: {:?} vs {:?}",
                fixed.shape(),
                moving.shape()
            )));
        }
        if fixed.is_empty() {
            return Err(PrimitiveError::new("cannot correlate empty images"));
        }

        let correlator = PhaseCorrelator::new(fixed.shape(), self.config.clone());
        let result = correlator.correlate(fixed, moving)?;
        Ok(TranslationEstimate {
            shift: result.shift,
            confidence: result.confidence,
        })
    }
}

/// In-place FFT along every axis, one plan per axis.
fn fft_axes(data: &mut ArrayD<Complex<f32>>, plans: &[Arc<dyn Fft<f32>>]) {
    for (axis, plan) in plans.iter().enumerate() {
        let len = data.len_of(Axis(axis));
        if len < 2 {
            continue;
        }
        let mut buffer = vec![Complex::new(0.0, 0.0); len];
        let mut scratch = vec![Complex::new(0.0, 0.0); plan.get_inplace_scratch_len()];
        for mut lane in data.lanes_mut(Axis(axis)) {
            for (dst, src) in buffer.iter_mut().zip(lane.iter()) {
                *dst = *src;
            }
            plan.process_with_scratch(&mut buffer, &mut scratch);
            for (dst, src) in lane.iter_mut().zip(buffer.iter()) {
                *dst = *src;
            }
        }
    }
}

fn find_peak(correlation: &ArrayD<f32>) -> (Vec<usize>, f64) {
    let mut max_val = f32::NEG_INFINITY;
    let mut max_index = vec![0; correlation.ndim()];
    for (index, &value) in correlation.indexed_iter() {
        if value > max_val {
            max_val = value;
            max_index.copy_from_slice(index.slice());
        }
    }
    (max_index, max_val as f64)
}

/// Hann window of length `size`, zero at both ends and one at the center.
pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let x = std::f32::consts::PI * 2.0 * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}
