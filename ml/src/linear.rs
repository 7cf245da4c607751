//! Ordinary least squares and ridge regression.

use std::sync::Arc;

use granat_device::{DeviceBuffer, ExecutionContext, Runtime};
use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::check_dims;
use crate::engine::ComputeEngine;
use crate::error::{DimensionMismatchSnafu, InvalidParameterSnafu, NotFittedSnafu, Result};

/// Decomposition used by the solver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SolverAlgo {
    Svd,
    #[default]
    Eig,
    Qr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParams {
    pub algo: SolverAlgo,
    pub fit_intercept: bool,
    pub normalize: bool,
    /// `Some(alpha)` turns the fit into ridge regression.
    pub l2_penalty: Option<f32>,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self { algo: SolverAlgo::default(), fit_intercept: true, normalize: false, l2_penalty: None }
    }
}

#[derive(Debug, Clone)]
struct FittedLinear {
    coef: Vec<f32>,
    intercept: f32,
}

/// Least-squares regression driven through a [`ComputeEngine`].
///
/// With `l2_penalty` set the engine solves the ridge problem instead; the
/// estimator surface is otherwise identical.
#[derive(Debug)]
pub struct LinearRegression {
    params: LinearParams,
    engine: Arc<dyn ComputeEngine>,
    ctx: ExecutionContext,
    fitted: Option<FittedLinear>,
}

impl LinearRegression {
    pub fn new(runtime: &Runtime, engine: Arc<dyn ComputeEngine>, params: LinearParams) -> Result<Self> {
        if let Some(alpha) = params.l2_penalty {
            ensure!(alpha > 0.0, InvalidParameterSnafu { reason: format!("l2 penalty must be positive, got {alpha}") });
        }
        let ctx = runtime.create_context()?;
        Ok(Self { params, engine, ctx, fitted: None })
    }

    /// Ridge regression with penalty `alpha`.
    pub fn ridge(runtime: &Runtime, engine: Arc<dyn ComputeEngine>, alpha: f32) -> Result<Self> {
        Self::new(runtime, engine, LinearParams { l2_penalty: Some(alpha), ..LinearParams::default() })
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    /// Coefficients of the fitted model, one per feature.
    pub fn coef(&self) -> Option<&[f32]> {
        self.fitted.as_ref().map(|fitted| fitted.coef.as_slice())
    }

    pub fn intercept(&self) -> Option<f32> {
        self.fitted.as_ref().map(|fitted| fitted.intercept)
    }

    /// Fit on a row-major `rows x cols` matrix against one target per row.
    pub fn fit(&mut self, data: &[f32], rows: usize, cols: usize, targets: &[f32]) -> Result<()> {
        check_dims(data.len(), rows, cols)?;
        ensure!(rows >= 2, InvalidParameterSnafu { reason: format!("at least two rows are required, got {rows}") });
        ensure!(
            targets.len() == rows,
            DimensionMismatchSnafu { rows, cols: 1usize, expected: rows, actual: targets.len() }
        );

        let device_data = DeviceBuffer::from_slice(&self.ctx, data)?;
        let device_targets = DeviceBuffer::from_slice(&self.ctx, targets)?;
        let mut coef = DeviceBuffer::zeroed::<f32>(&self.ctx, cols)?;

        let intercept =
            self.engine.linear_fit(&self.ctx, &device_data, rows, cols, &device_targets, &self.params, &mut coef)?;
        debug!(rows, cols, intercept, ridge = self.params.l2_penalty.is_some(), "linear fit finished");

        self.fitted = Some(FittedLinear { coef: coef.to_vec()?, intercept });
        Ok(())
    }

    /// Predict one value per row of a row-major `rows x cols` matrix.
    pub fn predict(&self, data: &[f32], rows: usize, cols: usize) -> Result<Vec<f32>> {
        check_dims(data.len(), rows, cols)?;
        let fitted = self.fitted.as_ref().context(NotFittedSnafu)?;
        ensure!(
            cols == fitted.coef.len(),
            InvalidParameterSnafu {
                reason: format!("model was fitted on {} features, input has {cols}", fitted.coef.len())
            }
        );

        let device_data = DeviceBuffer::from_slice(&self.ctx, data)?;
        let device_coef = DeviceBuffer::from_slice(&self.ctx, &fitted.coef)?;
        let mut predictions = DeviceBuffer::zeroed::<f32>(&self.ctx, rows)?;

        self.engine.gemm_predict(
            &self.ctx,
            &device_data,
            rows,
            cols,
            &device_coef,
            fitted.intercept,
            &mut predictions,
        )?;

        Ok(predictions.to_vec()?)
    }
}
