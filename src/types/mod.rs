//! Core types for robot telemetry and device configuration.
//!
//! This module provides the data model shared by the codec, the link and
//! its consumers (the field renderer and the settings forms).
//!
//! ## Architecture
//!
//! - [`TelemetrySnapshot`] is the decoded `data` reply: detections, robot pose
//!   and onboard statistics. Each snapshot replaces the previous one whole.
//! - [`Detection`] carries a [`DetectionClass`], a [`Depth`] and a
//!   [`MapLocation`] with one or more position hypotheses.
//! - [`Offset`] and [`ColorCorrection`] are the calibration values the
//!   operator can query and set.
//! - [`Endpoint`] and [`ConnectionState`] describe the link itself.
//!
//! ## Depth sentinel
//!
//! The device reports `-1` for detections it could not localize. That value
//! never reaches consumers as a number: it decodes to [`Depth::NotLocalized`].
//!
//! ```rust
//! use fieldlink::types::Depth;
//!
//! let depth = Depth::try_from(-1.0).unwrap();
//! assert!(!depth.is_localized());
//! assert_eq!(depth.meters(), None);
//! ```

mod color;
mod detection;
mod endpoint;
mod offset;
mod query;
mod snapshot;
mod state;

// Re-export all public types
pub use color::ColorCorrection;
pub use detection::{Depth, Detection, DetectionClass, MapLocation, ScreenLocation};
pub use endpoint::Endpoint;
pub use offset::{LengthUnit, Offset};
pub use query::{QueryKind, QueryResult};
pub use snapshot::{Pose, Statistics, TelemetrySnapshot};
pub use state::ConnectionState;
