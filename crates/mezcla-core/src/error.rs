//! Error types shared across the mezcla crates.

use thiserror::Error;

/// Errors that can occur in the mezcla audio engine.
///
/// All crates in the workspace signal failures through this one type so that
/// callers can match on a single taxonomy regardless of which layer failed.
#[derive(Debug, Error)]
pub enum Error {
    /// A backend could not open or claim a device, or format negotiation
    /// with the device failed.
    #[error("device error: {0}")]
    Device(String),

    /// An audio spec conversion is unsupported (e.g. an unknown sample
    /// format was requested).
    #[error("unsupported format: {0}")]
    Format(String),

    /// A decoder could not parse its input; the stream is not a recognised
    /// format.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// A partial decode failure inside an otherwise recognised stream
    /// (e.g. a corrupt compressed block).
    #[error("codec error: {0}")]
    Codec(String),

    /// A byte-stream read or seek failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Allocation or system-resource exhaustion.
    #[error("resource error: {0}")]
    Resource(String),

    /// An operation was attempted in the wrong lifecycle state
    /// (e.g. decoding before `open`).
    #[error("invalid state: {0}")]
    State(String),
}

/// Convenience result type used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
