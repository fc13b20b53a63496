//! DFU error types for the Secure DFU driver.
//!
//! Protocol-level anomalies (bad responses, device failures, CRC mismatches)
//! are never errors: they become events and states. `DfuError` only covers
//! failures around the protocol: I/O, packages, settings and the transport.

use thiserror::Error;

use super::protocol::DfuState;

/// Result type alias for DFU operations.
pub type DfuResult<T> = Result<T, DfuError>;

/// Errors that can occur during DFU operations.
#[derive(Debug, Error)]
pub enum DfuError {
    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON parsing error for manifest.json or the settings file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The BLE transport rejected a write or subscription.
    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    /// No response arrived within the configured response timeout.
    #[error("Timeout waiting for response in state {state:?}")]
    Timeout { state: DfuState },

    /// Required file missing from the DFU package.
    #[error("Missing file in DFU package: {filename}")]
    MissingFile { filename: String },

    /// Invalid or malformed manifest.json.
    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    /// The manifest has no entry for the requested image.
    #[error("DFU package contains no {image} image")]
    MissingImage { image: String },

    /// A payload handed to the session is empty.
    #[error("The {name} payload is empty")]
    EmptyPayload { name: &'static str },

    /// A payload does not fit the protocol's 32-bit size fields.
    #[error("The {name} payload is too large ({size} bytes)")]
    PayloadTooLarge { name: &'static str, size: usize },

    /// Settings values the protocol cannot work with.
    #[error("Invalid DFU settings: {reason}")]
    InvalidSettings { reason: String },

    /// The background task driving the session did not complete.
    #[error("DFU task failed: {reason}")]
    TaskFailed { reason: String },
}

impl DfuError {
    /// Build a transport error from any displayable cause.
    pub fn transport(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DfuError::Transport {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is retriable (transient errors that may succeed on a new session).
    pub fn is_retriable(&self) -> bool {
        matches!(self, DfuError::Timeout { .. } | DfuError::Transport { .. })
    }

    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            DfuError::Io(_) => "DFU-002",
            DfuError::Zip(_) => "DFU-003",
            DfuError::Json(_) => "DFU-004",
            DfuError::Transport { .. } => "DFU-010",
            DfuError::Timeout { .. } => "DFU-021",
            DfuError::MissingFile { .. } => "DFU-040",
            DfuError::InvalidManifest { .. } => "DFU-041",
            DfuError::MissingImage { .. } => "DFU-042",
            DfuError::EmptyPayload { .. } => "DFU-043",
            DfuError::PayloadTooLarge { .. } => "DFU-044",
            DfuError::InvalidSettings { .. } => "DFU-080",
            DfuError::TaskFailed { .. } => "DFU-098",
        }
    }
}
