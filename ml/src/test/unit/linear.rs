use std::sync::Arc;

use granat_device::Runtime;

use crate::error::Error;
use crate::linear::{LinearParams, LinearRegression};
use crate::test::stub::StubEngine;

#[test]
fn test_fit_then_predict() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let mut model = LinearRegression::new(&runtime, engine.clone(), LinearParams::default()).unwrap();

    let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
    model.fit(&data, 4, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(model.coef(), Some([2.0f32, 2.0].as_slice()));
    assert_eq!(model.intercept(), Some(0.5));

    let predictions = model.predict(&data, 4, 2).unwrap();
    assert_eq!(predictions, vec![1.5f32; 4]);
    assert_eq!(engine.calls(), vec!["linear_fit", "gemm_predict"]);
}

#[test]
fn test_predict_before_fit_is_rejected() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let model = LinearRegression::new(&runtime, engine, LinearParams::default()).unwrap();

    let err = model.predict(&[1.0, 2.0], 1, 2).unwrap_err();
    assert!(matches!(err, Error::NotFitted));
    assert!(model.coef().is_none());
    assert!(model.intercept().is_none());
}

#[test]
fn test_ridge_needs_a_positive_penalty() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let err = LinearRegression::ridge(&runtime, engine, 0.0).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
}

#[test]
fn test_ridge_carries_its_penalty() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let model = LinearRegression::ridge(&runtime, engine, 0.7).unwrap();
    assert_eq!(model.params().l2_penalty, Some(0.7));
    assert!(model.params().fit_intercept);
}

#[test]
fn test_targets_must_match_the_rows() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let mut model = LinearRegression::new(&runtime, engine, LinearParams::default()).unwrap();

    let err = model.fit(&[0.0; 8], 4, 2, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { rows: 4, cols: 1, expected: 4, actual: 2 }));
}

#[test]
fn test_prediction_features_must_match_the_fit() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let mut model = LinearRegression::new(&runtime, engine, LinearParams::default()).unwrap();
    model.fit(&[0.0; 8], 4, 2, &[1.0; 4]).unwrap();

    let err = model.predict(&[0.0; 12], 4, 3).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
}

#[test]
fn test_single_row_fits_are_rejected() {
    let runtime = Runtime::host();
    let engine = Arc::new(StubEngine::default());
    let mut model = LinearRegression::new(&runtime, engine, LinearParams::default()).unwrap();

    let err = model.fit(&[1.0, 2.0], 1, 2, &[1.0]).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
}
