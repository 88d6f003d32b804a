//! Device endpoint addressing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{LinkError, Result};

/// Default address of the onboard computer's access point.
pub const DEFAULT_HOST: &str = "10.42.0.1";

/// Default port of the onboard telemetry server.
pub const DEFAULT_PORT: u16 = 3030;

/// Host and port of the onboard device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| LinkError::invalid_value("endpoint", format!("missing port in '{s}'")))?;

        if host.is_empty() {
            return Err(LinkError::invalid_value("endpoint", format!("missing host in '{s}'")));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| LinkError::invalid_value("endpoint", format!("bad port '{port}': {e}")))?;

        Ok(Self::new(host, port))
    }
}
