//! Link configuration.
//!
//! Every key is optional; missing keys take the defaults below. Durations
//! are whole milliseconds.
//!
//! ```yaml
//! host: 10.42.0.1
//! port: 3030
//! poll_interval_ms: 60
//! request_timeout_ms: 2000
//! reconnect_backoff_ms: 1000
//! connect_timeout_ms: 3000
//! max_frame_length: 65536
//! refresh_settings_on_connect: true
//! log_telemetry: false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::transport::SessionOptions;
use crate::types::Endpoint;
use crate::{LinkError, Result};

/// Configuration for a [`TelemetryLink`](crate::TelemetryLink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Telemetry poll cadence
    pub poll_interval_ms: u64,
    /// Default deadline for correlated queries
    pub request_timeout_ms: u64,
    /// Delay between a lost session and the next connect attempt
    pub reconnect_backoff_ms: u64,
    pub connect_timeout_ms: u64,
    /// Longest inbound line accepted, in bytes
    pub max_frame_length: usize,
    /// Query offsets and color correction whenever a session opens
    pub refresh_settings_on_connect: bool,
    /// Log every decoded snapshot at debug level
    pub log_telemetry: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let Endpoint { host, port } = Endpoint::default();
        Self {
            host,
            port,
            poll_interval_ms: 60,
            request_timeout_ms: 2000,
            reconnect_backoff_ms: 1000,
            connect_timeout_ms: 3000,
            max_frame_length: 64 * 1024,
            refresh_settings_on_connect: true,
            log_telemetry: false,
        }
    }
}

impl LinkConfig {
    /// Parse and validate YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LinkError::config("yaml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LinkError::config_file(path.to_path_buf(), e))?;
        let config = Self::from_yaml_str(&yaml)?;
        debug!(path = %path.display(), endpoint = %config.endpoint(), "Loaded link config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("reconnect_backoff_ms", self.reconnect_backoff_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("max_frame_length", self.max_frame_length as u64),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(LinkError::config(field, "must be greater than zero"));
            }
        }
        if self.host.trim().is_empty() {
            return Err(LinkError::config("host", "must not be empty"));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: self.connect_timeout(),
            max_frame_length: self.max_frame_length,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.host = endpoint.host;
        self.port = endpoint.port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_settings_refresh(mut self, enabled: bool) -> Self {
        self.refresh_settings_on_connect = enabled;
        self
    }
}
