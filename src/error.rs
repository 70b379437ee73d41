//! Error categories for the processing core and its collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrismError {
    /// Stem-separation backend missing or failed to initialize. Narrows mode
    /// selection for the rest of the run.
    #[error("stem backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Output device capability query failed during channel negotiation.
    #[error("device query failed: {0}")]
    DeviceQuery(String),

    /// Unrecoverable device I/O error while streaming.
    #[error("stream failure: {0}")]
    Stream(String),

    /// The panic marker could not be checked.
    #[error("panic marker check failed: {0}")]
    MarkerRead(#[from] std::io::Error),

    /// A single stem-separation call failed.
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("config error: {0}")]
    Config(&'static str),
}
