//! Realtime telemetry link for the robot field dashboard.
//!
//! Fieldlink keeps a persistent connection to the robot's onboard computer,
//! polls it for telemetry at a fixed cadence, correlates configuration
//! queries with their replies and reconnects on its own when the connection
//! drops. Consumers get typed values: snapshots of detections and robot pose,
//! camera and GPS offsets, color correction and connection state.
//!
//! # Features
//!
//! - **Typed events**: subscribe per [`EventKind`]; event names match what the
//!   dashboard UI binds to (`socketConnected`, `message`, ...)
//! - **Streams**: latest-value-wins streams of snapshots and connection state
//! - **Correlated queries**: replies matched to requests per kind, oldest
//!   first, with per-request deadlines
//! - **Self-healing**: fixed-backoff reconnect, pending requests never hang
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fieldlink::{EventKind, LinkConfig, LinkEvent, TelemetryLink};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> fieldlink::Result<()> {
//!     let link = TelemetryLink::new(LinkConfig::default())?;
//!     link.subscribe(EventKind::Disconnected, |event| {
//!         if let LinkEvent::Disconnected { reason, .. } = event {
//!             eprintln!("link lost: {reason}");
//!         }
//!     });
//!     link.restart()?;
//!
//!     let mut telemetry = link.telemetry();
//!     while let Some(snapshot) = telemetry.next().await {
//!         for detection in snapshot.renderable_detections() {
//!             println!("{} at {:?}", detection.class.label(), detection.primary_location());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod types;

#[cfg(test)]
mod test_utils;

// Protocol and transport
pub mod codec;
pub mod correlator;
pub mod scheduler;
pub mod transport;

// Link
mod driver;
pub mod events;
mod link;
pub mod stream;

pub use config::LinkConfig;
pub use error::*;
pub use events::{EventKind, LinkEvent, SubscriptionId};
pub use link::TelemetryLink;
pub use stream::{StateStream, TelemetryStream};
pub use types::*;
