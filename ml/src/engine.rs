//! The seam between estimators and whatever actually runs the math.
//!
//! Estimators own the data movement: they upload inputs, allocate outputs
//! and download results. A [`ComputeEngine`] only ever sees device buffers
//! plus plain parameters, so a kernel-backed engine and the in-process stub
//! used by the tests are interchangeable.

use std::fmt;

use granat_device::{DeviceBuffer, ExecutionContext};

use crate::clustering::{AgglomerativeParams, DbscanParams, KmeansParams};
use crate::error::Result;
use crate::forest::ForestSpec;
use crate::linear::LinearParams;

/// What a k-means fit reports back besides the buffers it filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmeansFitInfo {
    /// Sum of squared distances to the closest centroid.
    pub inertia: f32,
    /// Iterations actually run.
    pub n_iter: i32,
}

/// A loaded forest ready for repeated inference.
pub trait ForestModel: Send + fmt::Debug {
    fn num_classes(&self) -> usize;

    /// Run inference over `rows` samples already resident in `data`.
    ///
    /// The output buffer is allocated by the model under `ctx`: one value
    /// per row, or `num_classes` per row when `class_probabilities` is set.
    fn predict(
        &self,
        ctx: &ExecutionContext,
        data: &DeviceBuffer,
        rows: usize,
        class_probabilities: bool,
    ) -> Result<DeviceBuffer>;
}

/// Device-side implementations of the algorithms the estimators drive.
///
/// Inputs are row-major. Output buffers are allocated by the caller and
/// sized exactly; implementations fill them in place.
pub trait ComputeEngine: Send + Sync + fmt::Debug {
    fn kmeans_fit(
        &self,
        ctx: &ExecutionContext,
        data: &DeviceBuffer,
        rows: usize,
        cols: usize,
        params: &KmeansParams,
        labels: &mut DeviceBuffer,
        centroids: &mut DeviceBuffer,
    ) -> Result<KmeansFitInfo>;

    fn dbscan_fit(
        &self,
        ctx: &ExecutionContext,
        data: &DeviceBuffer,
        rows: usize,
        cols: usize,
        params: &DbscanParams,
        labels: &mut DeviceBuffer,
    ) -> Result<()>;

    /// Returns the number of clusters actually produced.
    fn agglomerative_fit(
        &self,
        ctx: &ExecutionContext,
        data: &DeviceBuffer,
        rows: usize,
        cols: usize,
        params: &AgglomerativeParams,
        labels: &mut DeviceBuffer,
        children: &mut DeviceBuffer,
    ) -> Result<i32>;

    /// Fit coefficients in place and return the intercept.
    fn linear_fit(
        &self,
        ctx: &ExecutionContext,
        data: &DeviceBuffer,
        rows: usize,
        cols: usize,
        targets: &DeviceBuffer,
        params: &LinearParams,
        coef: &mut DeviceBuffer,
    ) -> Result<f32>;

    /// `predictions = data * coef + intercept`, one value per row.
    fn gemm_predict(
        &self,
        ctx: &ExecutionContext,
        data: &DeviceBuffer,
        rows: usize,
        cols: usize,
        coef: &DeviceBuffer,
        intercept: f32,
        predictions: &mut DeviceBuffer,
    ) -> Result<()>;

    fn load_forest(&self, ctx: &ExecutionContext, spec: &ForestSpec) -> Result<Box<dyn ForestModel>>;
}
