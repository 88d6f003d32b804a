//! HSV color correction applied by the onboard camera pipeline

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::{LinkError, Result};

/// Hue, saturation and value adjustments, each within [`ColorCorrection::RANGE`].
///
/// Resetting is expressed by sending [`ColorCorrection::NEUTRAL`]; the device
/// has no dedicated reset command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(try_from = "RawColorCorrection")]
pub struct ColorCorrection {
    h: i16,
    s: i16,
    v: i16,
}

#[derive(Deserialize)]
struct RawColorCorrection {
    h: i16,
    s: i16,
    v: i16,
}

impl TryFrom<RawColorCorrection> for ColorCorrection {
    type Error = LinkError;

    fn try_from(raw: RawColorCorrection) -> Result<Self> {
        ColorCorrection::new(raw.h, raw.s, raw.v)
    }
}

impl ColorCorrection {
    /// Accepted range for every channel.
    pub const RANGE: RangeInclusive<i16> = -100..=100;

    /// No adjustment.
    pub const NEUTRAL: ColorCorrection = ColorCorrection { h: 0, s: 0, v: 0 };

    pub fn new(h: i16, s: i16, v: i16) -> Result<Self> {
        for (name, value) in [("h", h), ("s", s), ("v", v)] {
            if !Self::RANGE.contains(&value) {
                return Err(LinkError::invalid_value(
                    name,
                    format!("{value} is outside {}..={}", Self::RANGE.start(), Self::RANGE.end()),
                ));
            }
        }
        Ok(Self { h, s, v })
    }

    pub fn h(&self) -> i16 {
        self.h
    }

    pub fn s(&self) -> i16 {
        self.s
    }

    pub fn v(&self) -> i16 {
        self.v
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_full_slider_range() {
        let cc = ColorCorrection::new(-100, 0, 100).unwrap();
        assert_eq!((cc.h(), cc.s(), cc.v()), (-100, 0, 100));
    }

    #[test]
    fn rejects_out_of_range_channels() {
        let err = ColorCorrection::new(0, 101, 0).unwrap_err();
        assert!(matches!(err, LinkError::InvalidValue { ref field, .. } if field == "s"));
        assert!(ColorCorrection::new(-101, 0, 0).is_err());
    }

    #[test]
    fn neutral_is_the_reset_value() {
        assert!(ColorCorrection::default().is_neutral());
        assert!(ColorCorrection::new(0, 0, 0).unwrap().is_neutral());
    }

    #[test]
    fn deserialization_validates_range() {
        let ok: ColorCorrection = serde_json::from_str(r#"{"h": 50, "s": -20, "v": 0}"#).unwrap();
        assert_eq!(ok, ColorCorrection::new(50, -20, 0).unwrap());
        assert!(serde_json::from_str::<ColorCorrection>(r#"{"h": 500, "s": 0, "v": 0}"#).is_err());
    }
}
