//! Error types for the telemetry link.
//!
//! Nothing in the link is fatal to the process. Every error path either
//! retries (transport), drops (protocol) or resolves a single pending
//! request with a failure (timeout, cancellation).
//!
//! ## Error Categories
//!
//! - **Transport Errors**: connection refused, reset or closed. These drive the
//!   reconnect cycle and are surfaced to consumers through the `disconnected`
//!   event, never thrown past the link.
//! - **Protocol Errors**: malformed or unrecognized frames. Logged and dropped,
//!   the session stays up.
//! - **Request Errors**: a query timed out, was cancelled by a session restart,
//!   or could not be sent because no session was open.
//! - **Configuration Errors**: invalid values in a [`LinkConfig`](crate::LinkConfig)
//!   or in a command built by the caller.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use fieldlink::LinkError;
//!
//! let error = LinkError::transport_failed("connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::QueryKind;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("{kind} request timed out after {duration:?}")]
    Timeout { kind: QueryKind, duration: Duration },

    #[error("Request cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("No open session to {endpoint}")]
    NotConnected { endpoint: String },

    #[error("Invalid value for {field}: {details}")]
    InvalidValue { field: String, details: String },

    #[error("Invalid configuration for {field}: {details}")]
    Config { field: String, details: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Telemetry link has shut down")]
    Shutdown,
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Transport { .. } => true,
            LinkError::Timeout { .. } => true,
            LinkError::Cancelled { .. } => true,
            LinkError::NotConnected { .. } => true,
            LinkError::Protocol { .. } => false,
            LinkError::InvalidValue { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::ConfigFile { .. } => false,
            LinkError::Shutdown => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Transport { .. } => vec![
                "Check that the robot is powered and its access point is up",
                "Verify the configured host and port",
                "Wait for the automatic reconnect",
            ],
            LinkError::Protocol { .. } => vec![
                "Check that the onboard software matches this dashboard version",
                "Inspect the dropped frame in the debug log",
            ],
            LinkError::Timeout { .. } => vec![
                "Increase the request timeout",
                "Check link quality to the robot",
                "Retry the request",
            ],
            LinkError::Cancelled { .. } => vec![
                "Retry the request once the link reconnects",
                "Avoid changing the endpoint while requests are in flight",
            ],
            LinkError::NotConnected { .. } => vec![
                "Wait for the socketConnected event before issuing requests",
                "Call connect with a reachable endpoint",
            ],
            LinkError::InvalidValue { .. } => vec![
                "Keep color correction values within -100..=100",
                "Use finite numbers for offsets",
            ],
            LinkError::Config { .. } => vec![
                "Use non-zero intervals and timeouts",
                "Compare against link.example.yaml",
            ],
            LinkError::ConfigFile { .. } => vec![
                "Check the file exists and is readable",
                "Check file permissions",
            ],
            LinkError::Shutdown => vec!["Construct a new TelemetryLink"],
        }
    }

    /// Helper constructor for transport failures.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for cancelled requests.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        LinkError::Cancelled { reason: reason.into() }
    }

    /// Helper constructor for invalid caller-supplied values.
    pub fn invalid_value(field: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::InvalidValue { field: field.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for configuration file errors with path context.
    pub fn config_file(path: PathBuf, source: std::io::Error) -> Self {
        LinkError::ConfigFile { path, source }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
