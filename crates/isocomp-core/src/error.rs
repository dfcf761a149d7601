//! Error types for isocomp-rs.

use thiserror::Error;

/// The main error type for isocomp-rs operations.
#[derive(Error, Debug)]
pub enum IsocompError {
    /// No contour variable was configured.
    #[error("no active variable to contour")]
    NoActiveVariable,

    /// The named variable does not exist on the mesh.
    #[error("variable '{0}' not found on the input mesh")]
    VariableNotFound(String),

    /// Log scaling was requested with a non-positive bound.
    #[error("invalid limits for log scaling: min {min}, max {max}")]
    InvalidLimits { min: f64, max: f64 },

    /// Redistribution was requested without a camera.
    #[error("no camera bound to the render context")]
    NoCamera,

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A cell references a point that does not exist.
    #[error("cell {cell} references point {point}, but the mesh has {num_points} points")]
    PointOutOfRange {
        cell: usize,
        point: u32,
        num_points: usize,
    },

    /// An operation was invoked in the wrong extractor state.
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A serialized geometry buffer could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A collective exchange could not complete.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl IsocompError {
    /// Returns true for errors caused by a misconfigured request.
    ///
    /// These are fatal for the current execution and must not be retried as-is.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoActiveVariable | Self::VariableNotFound(_) | Self::InvalidLimits { .. }
        )
    }
}

/// A specialized Result type for isocomp-rs operations.
pub type Result<T> = std::result::Result<T, IsocompError>;
