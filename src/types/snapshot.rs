//! Telemetry snapshot types for the `data` reply

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::Detection;
use crate::Result;

/// Robot pose as reported by the onboard GPS fusion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Pose {
    /// Meters
    pub x: f64,
    /// Meters
    pub y: f64,
    /// Meters
    pub z: f64,
    /// Degrees
    pub azimuth: f64,
    /// Degrees
    pub elevation: f64,
    /// Degrees
    pub rotation: f64,
}

/// Onboard processing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub fps: f64,
    /// Seconds spent in model inference for the last frame
    pub invoke_time: f64,
    /// Seconds since the onboard loop started
    pub run_time: f64,
    /// Celsius
    pub cpu_temp: f64,
    pub video_width: u32,
    pub video_height: u32,
    pub gps_connected: bool,
}

/// One decoded `data` reply.
///
/// Snapshots are immutable once published; each one replaces the previous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub detections: Vec<Detection>,
    /// Robot pose
    pub position: Pose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Statistics>,
    /// Device clock, seconds, when the device sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Local wall clock when the link published this snapshot
    #[serde(skip)]
    #[cfg_attr(feature = "tauri", specta(skip))]
    pub received_at: Option<SystemTime>,
}

impl TelemetrySnapshot {
    /// Robot pose, only when the device reports a GPS lock.
    pub fn gps_fix(&self) -> Option<&Pose> {
        match self.stats {
            Some(stats) if stats.gps_connected => Some(&self.position),
            _ => None,
        }
    }

    /// Detections a renderer should draw.
    pub fn renderable_detections(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_renderable())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for detection in &self.detections {
            detection.map_location.validate()?;
        }
        Ok(())
    }
}
