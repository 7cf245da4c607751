use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Anything that went wrong below the estimator: allocation, transfer,
    /// context or stream handling.
    #[snafu(context(false))]
    #[snafu(display("device layer error: {source}"))]
    Device { source: granat_device::Error },

    /// `predict` before a successful `fit`.
    #[snafu(display("model has not been fitted"))]
    NotFitted,

    /// Host array shape does not match the stated rows and columns.
    #[snafu(display("dimension mismatch for a {rows}x{cols} input: expected {expected} values, got {actual}"))]
    DimensionMismatch { rows: usize, cols: usize, expected: usize, actual: usize },

    #[snafu(display("invalid parameter: {reason}"))]
    InvalidParameter { reason: String },

    /// The compute engine rejected or failed the operation.
    #[snafu(display("compute engine error: {reason}"))]
    Engine { reason: String },
}
