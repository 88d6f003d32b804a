//! Camera and GPS mounting offsets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{LinkError, Result};

/// Unit tag carried by offset commands and replies.
///
/// The device only speaks meters today; the tag is still validated so a
/// firmware change shows up as a malformed frame rather than silently
/// misplaced sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    Meters,
}

impl LengthUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            LengthUnit::Meters => "meters",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthUnit {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "meters" => Ok(LengthUnit::Meters),
            other => Err(LinkError::invalid_value("unit", format!("unknown unit '{other}'"))),
        }
    }
}

/// Mounting offset of a sensor relative to the robot's center.
///
/// Camera and GPS offsets share this type. Only the camera carries an
/// elevation offset; for GPS offsets `elevation_offset` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Offset {
    /// Meters
    pub x: f64,
    /// Meters
    pub y: f64,
    /// Meters
    pub z: f64,
    pub unit: LengthUnit,
    /// Degrees
    pub heading_offset: f64,
    /// Degrees, camera only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_offset: Option<f64>,
}

impl Offset {
    /// Camera offset with heading and elevation in degrees.
    pub fn camera(x: f64, y: f64, z: f64, heading_offset: f64, elevation_offset: f64) -> Self {
        Self {
            x,
            y,
            z,
            unit: LengthUnit::Meters,
            heading_offset,
            elevation_offset: Some(elevation_offset),
        }
    }

    /// GPS offset with heading in degrees.
    pub fn gps(x: f64, y: f64, z: f64, heading_offset: f64) -> Self {
        Self { x, y, z, unit: LengthUnit::Meters, heading_offset, elevation_offset: None }
    }

    /// Reject NaN and infinite components before they reach the wire.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("x", Some(self.x)),
            ("y", Some(self.y)),
            ("z", Some(self.z)),
            ("headingOffset", Some(self.heading_offset)),
            ("elevationOffset", self.elevation_offset),
        ];

        for (name, value) in fields {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(LinkError::invalid_value(name, format!("{value} is not finite")));
                }
            }
        }
        Ok(())
    }
}

impl Default for Offset {
    fn default() -> Self {
        Self::gps(0.0, 0.0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_offsets_have_no_elevation() {
        assert_eq!(Offset::gps(0.1, 0.2, 0.3, 90.0).elevation_offset, None);
        assert_eq!(Offset::camera(0.1, 0.2, 0.3, 90.0, -5.0).elevation_offset, Some(-5.0));
    }

    #[test]
    fn validate_rejects_non_finite_components() {
        assert!(Offset::camera(0.0, 0.0, 0.0, 0.0, 0.0).validate().is_ok());
        assert!(Offset::gps(f64::NAN, 0.0, 0.0, 0.0).validate().is_err());

        let err = Offset::camera(0.0, 0.0, 0.0, 0.0, f64::INFINITY).validate().unwrap_err();
        assert!(err.to_string().contains("elevationOffset"));
    }

    #[test]
    fn unit_tag_parses_only_meters() {
        assert_eq!("meters".parse::<LengthUnit>().unwrap(), LengthUnit::Meters);
        assert!("feet".parse::<LengthUnit>().is_err());
    }

    #[test]
    fn serializes_like_the_dashboard_state() {
        let json = serde_json::to_value(Offset::gps(1.0, 2.0, 3.0, 45.0)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"x": 1.0, "y": 2.0, "z": 3.0, "unit": "meters", "headingOffset": 45.0})
        );
    }
}
