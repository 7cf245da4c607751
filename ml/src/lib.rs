//! Estimator layer over [`granat_device`].
//!
//! Scikit-learn-shaped estimators (k-means, DBSCAN, agglomerative
//! clustering, linear and ridge regression, forest inference) that stage
//! host data through device buffers and hand the math to a pluggable
//! [`ComputeEngine`]. The estimators own the resource-boundary choreography;
//! the engine only ever sees device-resident inputs and outputs.

use snafu::ensure;

pub mod clustering;
pub mod engine;
pub mod error;
pub mod forest;
pub mod linear;
pub mod metric;


pub use clustering::{
    AgglomerativeClustering, AgglomerativeModel, AgglomerativeParams, Connectivity, Dbscan, DbscanParams, KMeans,
    KmeansInit, KmeansModel, KmeansParams,
};
pub use engine::{ComputeEngine, ForestModel, KmeansFitInfo};
pub use error::{Error, Result};
pub use forest::{ForestClassifier, ForestSpec, ModelFormat, SUPPORTED_CLASSES, StorageKind, TreeAlgo};
pub use granat_device::Runtime;
pub use linear::{LinearParams, LinearRegression, SolverAlgo};
pub use metric::{Metric, Verbosity};

/// Row-major shape check shared by every estimator entry point.
pub(crate) fn check_dims(len: usize, rows: usize, cols: usize) -> Result<()> {
    let expected = rows * cols;
    ensure!(len == expected, error::DimensionMismatchSnafu { rows, cols, expected, actual: len });
    Ok(())
}
