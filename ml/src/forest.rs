//! Forest inference: load a trained model, predict on device data.

use std::path::PathBuf;

use granat_device::{DeviceBuffer, ExecutionContext, Runtime};
use snafu::ensure;
use tracing::debug;

use crate::check_dims;
use crate::engine::{ComputeEngine, ForestModel};
use crate::error::{InvalidParameterSnafu, Result};

/// Serialized model formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    XgboostBinary,
    XgboostJson,
    LightGbm,
}

/// Inference traversal strategy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TreeAlgo {
    #[default]
    Auto,
    Naive,
    TreeReorg,
    BatchTreeReorg,
}

/// Node storage layout on the device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    #[default]
    Auto,
    Dense,
    Sparse,
    Sparse8,
}

/// Class-probability output is limited to binary classifiers.
pub const SUPPORTED_CLASSES: usize = 2;

/// Everything the engine needs to load a serialized forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestSpec {
    pub path: PathBuf,
    pub format: ModelFormat,
    pub algo: TreeAlgo,
    pub storage: StorageKind,
    /// Treat the forest as a classifier and threshold its scores.
    pub classification: bool,
    pub threshold: f32,
    /// `0` lets the engine pick.
    pub blocks_per_sm: i32,
    pub threads_per_tree: i32,
    /// Items processed per thread, `0` for the engine default.
    pub n_items: i32,
}

impl ForestSpec {
    pub fn new(path: impl Into<PathBuf>, format: ModelFormat) -> Self {
        Self {
            path: path.into(),
            format,
            algo: TreeAlgo::default(),
            storage: StorageKind::default(),
            classification: false,
            threshold: 0.5,
            blocks_per_sm: 0,
            threads_per_tree: 1,
            n_items: 0,
        }
    }
}

/// A forest loaded onto the device, ready for batched prediction.
#[derive(Debug)]
pub struct ForestClassifier {
    model: Box<dyn ForestModel>,
    ctx: ExecutionContext,
}

impl ForestClassifier {
    pub fn load(runtime: &Runtime, engine: &dyn ComputeEngine, spec: &ForestSpec) -> Result<Self> {
        let ctx = runtime.create_context()?;
        let model = engine.load_forest(&ctx, spec)?;
        debug!(path = %spec.path.display(), classes = model.num_classes(), "loaded forest");
        Ok(Self { model, ctx })
    }

    pub fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    /// Predict over a row-major `rows x cols` matrix.
    ///
    /// Plain predictions give one value per row. With `class_probabilities`
    /// the output is `SUPPORTED_CLASSES` values per row, and the loaded
    /// model must be a binary classifier.
    pub fn predict(&self, data: &[f32], rows: usize, cols: usize, class_probabilities: bool) -> Result<Vec<f32>> {
        check_dims(data.len(), rows, cols)?;
        if class_probabilities {
            ensure!(
                self.model.num_classes() == SUPPORTED_CLASSES,
                InvalidParameterSnafu {
                    reason: format!(
                        "class probabilities need a binary classifier, model has {} class(es)",
                        self.model.num_classes()
                    )
                }
            );
        }

        let device_data = DeviceBuffer::from_slice(&self.ctx, data)?;
        let predictions = self.model.predict(&self.ctx, &device_data, rows, class_probabilities)?;
        Ok(predictions.to_vec()?)
    }
}
