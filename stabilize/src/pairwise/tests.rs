use super::*;
use crate::error::PrimitiveError;
use crate::primitives::{PhaseCorrelationRegistrar, TranslationEstimate};
use crate::testing::{blob_field, translated};
use ndarray::{ArrayD, IxDyn};

/// Returns the same estimate for every pair.
struct FixedRegistrar(std::result::Result<TranslationEstimate, PrimitiveError>);

impl TranslationRegistrar for FixedRegistrar {
    fn register(
        &self,
        _fixed: ArrayViewD<'_, f32>,
        _moving: ArrayViewD<'_, f32>,
        _device: &Device,
    ) -> std::result::Result<TranslationEstimate, PrimitiveError> {
        self.0.clone()
    }
}

fn fixed(shift: Vec<f64>, confidence: f64) -> FixedRegistrar {
    FixedRegistrar(Ok(TranslationEstimate { shift, confidence }))
}

fn zeros(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(shape))
}

#[test]
fn test_confident_estimate_is_kept() {
    let image = zeros(&[8, 8]);
    let model = register_pair(
        2,
        5,
        image.view(),
        image.view(),
        &fixed(vec![1.5, -0.5], 0.8),
        &PairwiseConfig::default(),
        &Device::cpu(0),
    )
    .unwrap();

    assert_eq!((model.u, model.v), (2, 5));
    assert_eq!(model.shift_vector, vec![1.5, -0.5]);
    assert!((model.confidence - 0.8).abs() < 1e-12);
    assert!(!model.fallback);
}

#[test]
fn test_confidence_is_clamped() {
    let image = zeros(&[4, 4]);
    let config = PairwiseConfig::default();
    let high = register_pair(0, 1, image.view(), image.view(), &fixed(vec![0.0, 0.0], 3.0), &config, &Device::cpu(0)).unwrap();
    assert_eq!(high.confidence, 1.0);

    let config = PairwiseConfig {
        enable_com_fallback: false,
        ..Default::default()
    };
    let low = register_pair(0, 1, image.view(), image.view(), &fixed(vec![0.0, 0.0], -0.5), &config, &Device::cpu(0)).unwrap();
    assert_eq!(low.confidence, 0.0);
    let nan = register_pair(0, 1, image.view(), image.view(), &fixed(vec![0.0, 0.0], f64::NAN), &config, &Device::cpu(0)).unwrap();
    assert_eq!(nan.confidence, 0.0);
}

#[test]
fn test_low_confidence_falls_back_to_center_of_mass() {
    let reference = blob_field(&[32, 32], 1, 2.0, 10, 11);
    let moved = translated(reference.view(), &[3.0, -2.0]);
    let config = PairwiseConfig::default();

    let model = register_pair(
        0,
        1,
        reference.view(),
        moved.view(),
        &fixed(vec![9.0, 9.0], 0.1),
        &config,
        &Device::cpu(0),
    )
    .unwrap();

    assert!(model.fallback);
    assert_eq!(model.confidence, config.min_confidence);
    assert!((model.shift_vector[0] + 3.0).abs() < 1e-3, "{:?}", model.shift_vector);
    assert!((model.shift_vector[1] - 2.0).abs() < 1e-3, "{:?}", model.shift_vector);
}

#[test]
fn test_fallback_disabled_keeps_low_confidence_estimate() {
    let image = zeros(&[4, 4]);
    let config = PairwiseConfig {
        enable_com_fallback: false,
        ..Default::default()
    };
    let model = register_pair(0, 1, image.view(), image.view(), &fixed(vec![9.0, 9.0], 0.1), &config, &Device::cpu(0)).unwrap();
    assert!(!model.fallback);
    assert_eq!(model.shift_vector, vec![9.0, 9.0]);
    assert!((model.confidence - 0.1).abs() < 1e-12);
}

#[test]
fn test_confidence_at_threshold_is_not_a_fallback() {
    let image = zeros(&[4, 4]);
    let config = PairwiseConfig::default();
    let model = register_pair(0, 1, image.view(), image.view(), &fixed(vec![1.0, 1.0], config.min_confidence), &config, &Device::cpu(0)).unwrap();
    assert!(!model.fallback);
}

#[test]
fn test_shape_mismatch_is_invalid_input() {
    let a = zeros(&[4, 4]);
    let b = zeros(&[4, 5]);
    let err = register_pair(3, 4, a.view(), b.view(), &fixed(vec![0.0, 0.0], 1.0), &PairwiseConfig::default(), &Device::cpu(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidInput { u: 3, v: 4, .. }), "{err}");
}

#[test]
fn test_registrar_error_is_registration_failure() {
    let image = zeros(&[4, 4]);
    let registrar = FixedRegistrar(Err(PrimitiveError::new("diverged")));
    let err = register_pair(1, 2, image.view(), image.view(), &registrar, &PairwiseConfig::default(), &Device::cpu(0)).unwrap_err();
    match err {
        Error::RegistrationFailure { u, v, reason } => {
            assert_eq!((u, v), (1, 2));
            assert_eq!(reason, "diverged");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_malformed_estimates_are_rejected() {
    let image = zeros(&[4, 4]);
    let config = PairwiseConfig::default();
    let wrong_len = register_pair(0, 1, image.view(), image.view(), &fixed(vec![1.0], 1.0), &config, &Device::cpu(0));
    assert!(matches!(wrong_len, Err(Error::RegistrationFailure { .. })));

    let non_finite = register_pair(0, 1, image.view(), image.view(), &fixed(vec![f64::NAN, 0.0], 1.0), &config, &Device::cpu(0));
    assert!(matches!(non_finite, Err(Error::RegistrationFailure { .. })));
}

#[test]
fn test_phase_correlation_pair_sign_convention() {
    let reference = blob_field(&[32, 32], 6, 1.5, 8, 12);
    let moved = translated(reference.view(), &[2.0, 3.0]);
    let registrar = PhaseCorrelationRegistrar::default();

    let model = register_pair(0, 1, reference.view(), moved.view(), &registrar, &PairwiseConfig::default(), &Device::cpu(0)).unwrap();

    // Frame 1 is frame 0 moved by (2, 3), so the shift back is (-2, -3).
    assert!((model.shift_vector[0] + 2.0).abs() < 0.25, "{:?}", model.shift_vector);
    assert!((model.shift_vector[1] + 3.0).abs() < 0.25, "{:?}", model.shift_vector);
}

#[test]
fn test_model_serde_round_trip() {
    let model = PairwiseRegistrationModel {
        u: 1,
        v: 4,
        shift_vector: vec![0.25, -1.0, 3.0],
        confidence: 0.6,
        fallback: true,
    };
    let json = serde_json::to_string(&model).unwrap();
    let parsed: PairwiseRegistrationModel = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, model);
    assert_eq!(parsed.pair(), FramePair::new(1, 4));
    assert_eq!(parsed.ndim(), 3);
}
