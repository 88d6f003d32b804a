//! Detected field elements

use serde::{Deserialize, Serialize};

use crate::{LinkError, Result};

/// Game element class reported by the onboard model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(try_from = "u8", into = "u8")]
pub enum DetectionClass {
    MobileGoal = 0,
    RedRing = 1,
    BlueRing = 2,
}

impl DetectionClass {
    /// Human readable label used on the field map.
    pub fn label(self) -> &'static str {
        match self {
            DetectionClass::MobileGoal => "Mobile Goal",
            DetectionClass::RedRing => "Red Ring",
            DetectionClass::BlueRing => "Blue Ring",
        }
    }
}

impl TryFrom<u8> for DetectionClass {
    type Error = LinkError;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0 => Ok(DetectionClass::MobileGoal),
            1 => Ok(DetectionClass::RedRing),
            2 => Ok(DetectionClass::BlueRing),
            other => Err(LinkError::protocol("detection class", format!("unknown class id {other}"))),
        }
    }
}

impl From<DetectionClass> for u8 {
    fn from(class: DetectionClass) -> u8 {
        class as u8
    }
}

/// Distance from the camera to a detection.
///
/// The device encodes "could not localize" as `-1`; that sentinel decodes to
/// [`Depth::NotLocalized`] and is never exposed as a number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(try_from = "f64", into = "f64")]
pub enum Depth {
    /// Meters from the camera
    Localized(f64),
    NotLocalized,
}

impl Depth {
    const SENTINEL: f64 = -1.0;

    pub fn is_localized(&self) -> bool {
        matches!(self, Depth::Localized(_))
    }

    pub fn meters(&self) -> Option<f64> {
        match self {
            Depth::Localized(m) => Some(*m),
            Depth::NotLocalized => None,
        }
    }
}

impl TryFrom<f64> for Depth {
    type Error = LinkError;

    fn try_from(raw: f64) -> Result<Self> {
        if raw == Self::SENTINEL {
            Ok(Depth::NotLocalized)
        } else if raw.is_finite() && raw >= 0.0 {
            Ok(Depth::Localized(raw))
        } else {
            Err(LinkError::protocol("detection depth", format!("invalid depth {raw}")))
        }
    }
}

impl From<Depth> for f64 {
    fn from(depth: Depth) -> f64 {
        depth.meters().unwrap_or(Depth::SENTINEL)
    }
}

/// Bounding box in camera pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ScreenLocation {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Field position hypotheses for a detection, in meters.
///
/// `x[i]` and `y[i]` form hypothesis `i`. `z` is optional and may be empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct MapLocation {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(default)]
    pub z: Vec<f64>,
}

impl MapLocation {
    /// All `(x, y)` hypotheses in device order.
    pub fn hypotheses(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }

    /// First hypothesis, which the field map draws.
    pub fn primary(&self) -> Option<(f64, f64)> {
        self.hypotheses().next()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.x.len() != self.y.len() {
            return Err(LinkError::protocol(
                "map location",
                format!("{} x values but {} y values", self.x.len(), self.y.len()),
            ));
        }
        if !self.z.is_empty() && self.z.len() != self.x.len() {
            return Err(LinkError::protocol(
                "map location",
                format!("{} z values for {} hypotheses", self.z.len(), self.x.len()),
            ));
        }
        if let Some(bad) = self.x.iter().chain(&self.y).chain(&self.z).find(|v| !v.is_finite()) {
            return Err(LinkError::protocol("map location", format!("non-finite coordinate {bad}")));
        }
        Ok(())
    }
}

/// A single detected game element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class: DetectionClass,
    /// Model confidence in `[0, 1]`
    #[serde(default)]
    pub prob: f64,
    pub depth: Depth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_location: Option<ScreenLocation>,
    pub map_location: MapLocation,
}

impl Detection {
    /// Whether a renderer may draw this detection.
    ///
    /// Unlocalized detections and detections without a map hypothesis are skipped.
    pub fn is_renderable(&self) -> bool {
        self.depth.is_localized() && self.map_location.primary().is_some()
    }

    /// Position the field map draws, if any.
    pub fn primary_location(&self) -> Option<(f64, f64)> {
        if self.is_renderable() { self.map_location.primary() } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_map_to_game_elements() {
        assert_eq!(DetectionClass::try_from(0).unwrap(), DetectionClass::MobileGoal);
        assert_eq!(DetectionClass::try_from(2).unwrap(), DetectionClass::BlueRing);
        assert!(DetectionClass::try_from(7).is_err());
        assert_eq!(u8::from(DetectionClass::RedRing), 1);
        assert_eq!(DetectionClass::MobileGoal.label(), "Mobile Goal");
    }

    #[test]
    fn depth_sentinel_is_not_a_distance() {
        assert_eq!(Depth::try_from(-1.0).unwrap(), Depth::NotLocalized);
        assert_eq!(Depth::try_from(0.0).unwrap(), Depth::Localized(0.0));
        assert_eq!(Depth::try_from(1.25).unwrap().meters(), Some(1.25));
        assert!(Depth::try_from(-2.0).is_err());
        assert!(Depth::try_from(f64::NAN).is_err());
        assert_eq!(f64::from(Depth::NotLocalized), -1.0);
    }

    #[test]
    fn unlocalized_detection_is_not_renderable() {
        let detection = Detection {
            class: DetectionClass::MobileGoal,
            prob: 0.9,
            depth: Depth::NotLocalized,
            screen_location: None,
            map_location: MapLocation { x: vec![0.5], y: vec![1.0], z: vec![] },
        };
        assert!(!detection.is_renderable());
        assert_eq!(detection.primary_location(), None);

        let localized = Detection { depth: Depth::Localized(0.8), ..detection };
        assert_eq!(localized.primary_location(), Some((0.5, 1.0)));
    }

    #[test]
    fn map_location_keeps_every_hypothesis() {
        let location = MapLocation { x: vec![0.1, 0.2], y: vec![1.1, 1.2], z: vec![] };
        assert!(location.validate().is_ok());
        assert_eq!(location.hypotheses().collect::<Vec<_>>(), vec![(0.1, 1.1), (0.2, 1.2)]);

        let ragged = MapLocation { x: vec![0.1, 0.2], y: vec![1.1], z: vec![] };
        assert!(ragged.validate().is_err());
    }
}
