//! Typed event bus for link consumers.
//!
//! Handlers are registered per [`EventKind`] and invoked synchronously, in
//! registration order, from the link's event-processing task. A handler
//! should hand work off (e.g. to a channel) rather than block.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

use crate::types::{
    ColorCorrection, ConnectionState, Endpoint, Offset, QueryResult, TelemetrySnapshot,
};

/// Kinds of event a consumer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Telemetry,
    CameraOffset,
    GpsOffset,
    ColorCorrection,
    StateChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Telemetry,
        EventKind::CameraOffset,
        EventKind::GpsOffset,
        EventKind::ColorCorrection,
        EventKind::StateChanged,
    ];

    /// Name the dashboard UI binds to.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Connected => "socketConnected",
            EventKind::Disconnected => "socketConnectionClosed",
            EventKind::Telemetry => "message",
            EventKind::CameraOffset => "getCameraOffset",
            EventKind::GpsOffset => "getGpsOffset",
            EventKind::ColorCorrection => "getColorCorrection",
            EventKind::StateChanged => "stateChanged",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected { endpoint: Endpoint },
    Disconnected { endpoint: Endpoint, reason: String },
    Telemetry(Arc<TelemetrySnapshot>),
    CameraOffset(Offset),
    GpsOffset(Offset),
    ColorCorrection(ColorCorrection),
    StateChanged { from: ConnectionState, to: ConnectionState },
}

impl LinkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Connected { .. } => EventKind::Connected,
            LinkEvent::Disconnected { .. } => EventKind::Disconnected,
            LinkEvent::Telemetry(_) => EventKind::Telemetry,
            LinkEvent::CameraOffset(_) => EventKind::CameraOffset,
            LinkEvent::GpsOffset(_) => EventKind::GpsOffset,
            LinkEvent::ColorCorrection(_) => EventKind::ColorCorrection,
            LinkEvent::StateChanged { .. } => EventKind::StateChanged,
        }
    }
}

impl From<QueryResult> for LinkEvent {
    fn from(result: QueryResult) -> Self {
        match result {
            QueryResult::CameraOffset(offset) => LinkEvent::CameraOffset(offset),
            QueryResult::GpsOffset(offset) => LinkEvent::GpsOffset(offset),
            QueryResult::ColorCorrection(cc) => LinkEvent::ColorCorrection(cc),
        }
    }
}

/// Event callback.
pub type Handler = Box<dyn Fn(&LinkEvent) + Send + Sync + 'static>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Mapping from event kind to registered handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, id: SubscriptionId, kind: EventKind, handler: Handler) {
        self.handlers.entry(kind).or_default().push((id, handler));
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for handlers in self.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// A panicking handler is logged and skipped; the rest still run.
    pub fn emit(&self, event: &LinkEvent) -> usize {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return 0;
        };

        for (id, handler) in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(subscription = ?id, event = %event.kind(), "Event handler panicked");
            }
        }
        handlers.len()
    }
}
