//! Clustering estimators: k-means, DBSCAN, agglomerative.

use std::sync::Arc;

use granat_device::{DeviceBuffer, ExecutionContext, Runtime};
use snafu::ensure;
use tracing::debug;

use crate::check_dims;
use crate::engine::ComputeEngine;
use crate::error::{InvalidParameterSnafu, Result};
use crate::metric::{Metric, Verbosity};

/// Centroid seeding strategy for k-means.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum KmeansInit {
    #[default]
    KmeansPlusPlus,
    Random,
    /// Caller-provided initial centroids.
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmeansParams {
    pub n_clusters: usize,
    pub max_iter: i32,
    pub tol: f32,
    pub init: KmeansInit,
    pub metric: Metric,
    pub seed: u64,
    pub verbosity: Verbosity,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            max_iter: 300,
            tol: 1e-4,
            init: KmeansInit::default(),
            metric: Metric::default(),
            seed: 0,
            verbosity: Verbosity::default(),
        }
    }
}

/// Everything a finished k-means fit hands back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansModel {
    /// Cluster index per input row.
    pub labels: Vec<i32>,
    /// Row-major `n_clusters x cols` centroid matrix.
    pub centroids: Vec<f32>,
    pub inertia: f32,
    pub n_iter: i32,
}

/// K-means driven through a [`ComputeEngine`].
///
/// The estimator owns an execution context for its lifetime; every fit
/// stages data through buffers allocated under that context and downloads
/// the results before returning, so nothing device-side outlives the call.
#[derive(Debug)]
pub struct KMeans {
    params: KmeansParams,
    engine: Arc<dyn ComputeEngine>,
    ctx: ExecutionContext,
}

impl KMeans {
    pub fn new(runtime: &Runtime, engine: Arc<dyn ComputeEngine>, params: KmeansParams) -> Result<Self> {
        ensure!(params.n_clusters > 0, InvalidParameterSnafu { reason: "n_clusters must be positive" });
        let ctx = runtime.create_context()?;
        Ok(Self { params, engine, ctx })
    }

    pub fn params(&self) -> &KmeansParams {
        &self.params
    }

    /// Fit on a row-major `rows x cols` matrix.
    pub fn fit(&mut self, data: &[f32], rows: usize, cols: usize) -> Result<KmeansModel> {
        check_dims(data.len(), rows, cols)?;
        ensure!(
            self.params.n_clusters <= rows,
            InvalidParameterSnafu {
                reason: format!("n_clusters {} exceeds the {rows} input rows", self.params.n_clusters)
            }
        );

        let device_data = DeviceBuffer::from_slice(&self.ctx, data)?;
        let mut labels = DeviceBuffer::zeroed::<i32>(&self.ctx, rows)?;
        let mut centroids = DeviceBuffer::zeroed::<f32>(&self.ctx, self.params.n_clusters * cols)?;

        let info = self.engine.kmeans_fit(
            &self.ctx,
            &device_data,
            rows,
            cols,
            &self.params,
            &mut labels,
            &mut centroids,
        )?;
        debug!(rows, cols, inertia = info.inertia, n_iter = info.n_iter, "kmeans fit finished");

        Ok(KmeansModel {
            labels: labels.to_vec()?,
            centroids: centroids.to_vec()?,
            inertia: info.inertia,
            n_iter: info.n_iter,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanParams {
    pub eps: f32,
    pub min_samples: usize,
    pub metric: Metric,
    /// Cap on the adjacency workspace; `None` lets the engine pick.
    pub max_bytes_per_batch: Option<usize>,
    pub verbosity: Verbosity,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
            metric: Metric::default(),
            max_bytes_per_batch: None,
            verbosity: Verbosity::default(),
        }
    }
}

/// DBSCAN driven through a [`ComputeEngine`]. Noise rows get label `-1`.
#[derive(Debug)]
pub struct Dbscan {
    params: DbscanParams,
    engine: Arc<dyn ComputeEngine>,
    ctx: ExecutionContext,
}

impl Dbscan {
    pub fn new(runtime: &Runtime, engine: Arc<dyn ComputeEngine>, params: DbscanParams) -> Result<Self> {
        ensure!(params.eps > 0.0, InvalidParameterSnafu { reason: "eps must be positive" });
        let ctx = runtime.create_context()?;
        Ok(Self { params, engine, ctx })
    }

    pub fn params(&self) -> &DbscanParams {
        &self.params
    }

    /// Fit on a row-major `rows x cols` matrix; returns one label per row.
    pub fn fit(&mut self, data: &[f32], rows: usize, cols: usize) -> Result<Vec<i32>> {
        check_dims(data.len(), rows, cols)?;

        let device_data = DeviceBuffer::from_slice(&self.ctx, data)?;
        let mut labels = DeviceBuffer::zeroed::<i32>(&self.ctx, rows)?;

        self.engine.dbscan_fit(&self.ctx, &device_data, rows, cols, &self.params, &mut labels)?;
        debug!(rows, cols, eps = self.params.eps, "dbscan fit finished");

        Ok(labels.to_vec()?)
    }
}

/// How agglomerative clustering builds its connectivity graph.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Full pairwise distances.
    #[default]
    Pairwise,
    /// K-nearest-neighbors graph.
    Knn { n_neighbors: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgglomerativeParams {
    pub n_clusters: usize,
    pub metric: Metric,
    pub connectivity: Connectivity,
}

impl Default for AgglomerativeParams {
    fn default() -> Self {
        Self { n_clusters: 2, metric: Metric::default(), connectivity: Connectivity::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgglomerativeModel {
    /// Clusters actually produced.
    pub n_clusters: i32,
    pub labels: Vec<i32>,
    /// Dendrogram merge pairs, `2 * (rows - 1)` entries.
    pub children: Vec<i32>,
}

#[derive(Debug)]
pub struct AgglomerativeClustering {
    params: AgglomerativeParams,
    engine: Arc<dyn ComputeEngine>,
    ctx: ExecutionContext,
}

impl AgglomerativeClustering {
    pub fn new(runtime: &Runtime, engine: Arc<dyn ComputeEngine>, params: AgglomerativeParams) -> Result<Self> {
        ensure!(params.n_clusters > 0, InvalidParameterSnafu { reason: "n_clusters must be positive" });
        let ctx = runtime.create_context()?;
        Ok(Self { params, engine, ctx })
    }

    pub fn params(&self) -> &AgglomerativeParams {
        &self.params
    }

    pub fn fit(&mut self, data: &[f32], rows: usize, cols: usize) -> Result<AgglomerativeModel> {
        check_dims(data.len(), rows, cols)?;
        ensure!(rows > 0, InvalidParameterSnafu { reason: "at least one input row is required" });

        let device_data = DeviceBuffer::from_slice(&self.ctx, data)?;
        let mut labels = DeviceBuffer::zeroed::<i32>(&self.ctx, rows)?;
        let mut children = DeviceBuffer::zeroed::<i32>(&self.ctx, 2 * (rows - 1))?;

        let n_clusters =
            self.engine.agglomerative_fit(&self.ctx, &device_data, rows, cols, &self.params, &mut labels, &mut children)?;
        debug!(rows, cols, n_clusters, "agglomerative fit finished");

        Ok(AgglomerativeModel { n_clusters, labels: labels.to_vec()?, children: children.to_vec()? })
    }
}
