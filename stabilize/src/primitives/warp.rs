//! Sub-pixel translation of N-dimensional images.
//!
//! Multilinear interpolation of a pure translation is separable, so the warp
//! runs one 1-D linear pass per axis over the lanes of that axis.

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};

use crate::frame::Frame;
use crate::primitives::FrameWarper;

/// Multilinear translation with zero fill outside the input.
///
/// Integer shifts copy samples exactly and the zero shift is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearWarper;

impl FrameWarper for LinearWarper {
    fn translate(&self, image: ArrayViewD<'_, f32>, shift: &[f64], pad_width: &[usize]) -> Frame {
        let mut current = image.to_owned();
        for axis in 0..image.ndim() {
            let s = shift.get(axis).copied().unwrap_or(0.0);
            let pad = pad_width.get(axis).copied().unwrap_or(0);
            if s == 0.0 && pad == 0 {
                continue;
            }
            current = translate_axis(current.view(), Axis(axis), s, pad);
        }
        current
    }
}

/// Input samples contributing to one output sample along an axis.
#[derive(Debug, Clone, Copy, Default)]
struct Taps {
    len: usize,
    index: [usize; 2],
    weight: [f32; 2],
}

impl Taps {
    fn push(&mut self, index: isize, weight: f64, n: usize) {
        if weight != 0.0 && index >= 0 && (index as usize) < n {
            self.index[self.len] = index as usize;
            self.weight[self.len] = weight as f32;
            self.len += 1;
        }
    }
}

fn translate_axis(input: ArrayViewD<'_, f32>, axis: Axis, shift: f64, pad: usize) -> ArrayD<f32> {
    let n_in = input.len_of(axis);
    let n_out = n_in + 2 * pad;

    // out[o] = in[o - pad - shift]
    let taps: Vec<Taps> = (0..n_out)
        .map(|o| {
            let src = o as f64 - pad as f64 - shift;
            let i0 = src.floor();
            let f = src - i0;
            let mut taps = Taps::default();
            taps.push(i0 as isize, 1.0 - f, n_in);
            taps.push(i0 as isize + 1, f, n_in);
            taps
        })
        .collect();

    let mut shape = input.shape().to_vec();
    shape[axis.index()] = n_out;
    let mut output = ArrayD::<f32>::zeros(IxDyn(&shape));

    Zip::from(output.lanes_mut(axis))
        .and(input.lanes(axis))
        .par_for_each(|mut out_lane, in_lane| {
            for (dst, taps) in out_lane.iter_mut().zip(&taps) {
                let mut sum = 0.0f32;
                for k in 0..taps.len {
                    sum += in_lane[taps.index[k]] * taps.weight[k];
                }
                *dst = sum;
            }
        });
    output
}
