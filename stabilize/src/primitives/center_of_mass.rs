//! Background-suppressed center of mass.

use ndarray::{ArrayViewD, Dimension};

/// Intensity-weighted centroid of `image` in index coordinates, one entry per axis.
///
/// The `quantile` intensity is subtracted as background and negative values are
/// clamped to zero. With `bounding_box` the center of the bounding box of the
/// remaining signal is returned instead. Images without signal yield the
/// geometric center.
pub fn center_of_mass(image: ArrayViewD<'_, f32>, quantile: f64, bounding_box: bool) -> Vec<f64> {
    let ndim = image.ndim();
    let geometric_center: Vec<f64> = image
        .shape()
        .iter()
        .map(|&len| len.saturating_sub(1) as f64 / 2.0)
        .collect();

    let Some(background) = quantile_value(image.view(), quantile) else {
        return geometric_center;
    };

    if bounding_box {
        let mut lower = vec![usize::MAX; ndim];
        let mut upper = vec![0usize; ndim];
        let mut found = false;
        for (index, &value) in image.indexed_iter() {
            if value.is_finite() && value > background {
                found = true;
                for (axis, &i) in index.slice().iter().enumerate() {
                    lower[axis] = lower[axis].min(i);
                    upper[axis] = upper[axis].max(i);
                }
            }
        }
        if !found {
            return geometric_center;
        }
        return lower
            .iter()
            .zip(&upper)
            .map(|(&lo, &hi)| (lo + hi) as f64 / 2.0)
            .collect();
    }

    let mut weighted = vec![0.0f64; ndim];
    let mut total = 0.0f64;
    for (index, &value) in image.indexed_iter() {
        if !value.is_finite() {
            continue;
        }
        let weight = (value - background).max(0.0) as f64;
        if weight == 0.0 {
            continue;
        }
        total += weight;
        for (sum, &i) in weighted.iter_mut().zip(index.slice()) {
            *sum += i as f64 * weight;
        }
    }

    if total <= f64::MIN_POSITIVE {
        return geometric_center;
    }
    weighted.iter().map(|sum| sum / total).collect()
}

/// Value at the given quantile of the finite samples, or `None` when there are none.
fn quantile_value(image: ArrayViewD<'_, f32>, quantile: f64) -> Option<f32> {
    let mut values: Vec<f32> = image.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    let rank = ((values.len() - 1) as f64 * quantile.clamp(0.0, 1.0)).round() as usize;
    let (_, value, _) = values.select_nth_unstable_by(rank, |a, b| a.total_cmp(b));
    Some(*value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn blob_2d(height: usize, width: usize, cy: f64, cx: f64) -> Array2<f32> {
        Array2::from_shape_fn((height, width), |(y, x)| {
            let dy = y as f64 - cy;
            let dx = x as f64 - cx;
            (100.0 * (-(dx * dx + dy * dy) / 8.0).exp()) as f32
        })
    }

    #[test]
    fn test_centroid_of_symmetric_blob() {
        let image = blob_2d(32, 40, 12.0, 25.0).into_dyn();
        let com = center_of_mass(image.view(), 0.5, false);
        assert!((com[0] - 12.0).abs() < 0.05, "y = {}", com[0]);
        assert!((com[1] - 25.0).abs() < 0.05, "x = {}", com[1]);
    }

    #[test]
    fn test_centroid_difference_tracks_shift() {
        let a = blob_2d(48, 48, 20.0, 20.0).into_dyn();
        let b = blob_2d(48, 48, 23.0, 16.0).into_dyn();
        let com_a = center_of_mass(a.view(), 0.5, false);
        let com_b = center_of_mass(b.view(), 0.5, false);
        assert!((com_b[0] - com_a[0] - 3.0).abs() < 0.05);
        assert!((com_b[1] - com_a[1] + 4.0).abs() < 0.05);
    }

    #[test]
    fn test_background_is_suppressed() {
        let mut image = Array2::<f32>::from_elem((20, 20), 10.0);
        image[[15, 5]] = 50.0;
        let com = center_of_mass(image.into_dyn().view(), 0.5, false);
        assert_eq!(com, vec![15.0, 5.0]);
    }

    #[test]
    fn test_bounding_box_center() {
        let mut image = Array2::<f32>::zeros((10, 10));
        image[[2, 3]] = 1.0;
        image[[6, 3]] = 5.0;
        image[[4, 9]] = 1.0;
        let com = center_of_mass(image.into_dyn().view(), 0.5, true);
        assert_eq!(com, vec![4.0, 6.0]);
    }

    #[test]
    fn test_flat_image_returns_geometric_center() {
        let image = Array3::<f32>::from_elem((5, 7, 9), 3.0);
        let com = center_of_mass(image.into_dyn().view(), 0.5, false);
        assert_eq!(com, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let mut image = Array2::<f32>::zeros((8, 8));
        image[[1, 1]] = f32::NAN;
        image[[5, 6]] = 2.0;
        let com = center_of_mass(image.into_dyn().view(), 0.5, false);
        assert_eq!(com, vec![5.0, 6.0]);
    }
}
