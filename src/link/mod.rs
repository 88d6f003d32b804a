//! Telemetry link facade

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::Command;
use crate::config::LinkConfig;
use crate::driver::{Control, Driver};
use crate::events::{EventKind, LinkEvent, SubscriptionId};
use crate::stream::{StateStream, TelemetryStream};
use crate::transport::{Connector, TcpConnector};
use crate::types::{
    ColorCorrection, ConnectionState, Endpoint, Offset, QueryKind, QueryResult, TelemetrySnapshot,
};
use crate::{LinkError, Result};


/// Realtime link to the onboard device.
///
/// Owns one transport session at a time, polls telemetry while connected,
/// correlates configuration queries with their replies and reconnects after
/// a fixed backoff whenever the session drops. All of that runs on a single
/// background task; this handle only sends it requests and reads its
/// published state.
///
/// A new link is idle. Call [`connect`](Self::connect) with an endpoint or
/// [`restart`](Self::restart) to dial the configured one. Subscribe to
/// events first if you need to observe the initial transitions.
///
/// Must be created inside a tokio runtime. Dropping the link stops its task,
/// closes the session and cancels every pending query.
pub struct TelemetryLink {
    control: mpsc::UnboundedSender<Control>,
    telemetry: watch::Receiver<Option<Arc<TelemetrySnapshot>>>,
    state: watch::Receiver<ConnectionState>,
    endpoint: watch::Receiver<Endpoint>,
    next_subscription: AtomicU64,
    cancel: CancellationToken,
}

impl TelemetryLink {
    /// Create a link that dials over TCP.
    pub fn new(config: LinkConfig) -> Result<Self> {
        Self::with_connector(config, TcpConnector)
    }

    /// Create a link that opens its byte streams through `connector`.
    pub fn with_connector<C: Connector>(config: LinkConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let channels = Driver::spawn(config, Arc::new(connector));

        Ok(Self {
            control: channels.control,
            telemetry: channels.telemetry,
            state: channels.state,
            endpoint: channels.endpoint,
            next_subscription: AtomicU64::new(1),
            cancel: channels.cancel,
        })
    }

    /// Connect to `endpoint`.
    ///
    /// Any existing session is torn down first and its pending queries fail
    /// with [`LinkError::Cancelled`]. Returns once the request is queued; watch
    /// [`state_updates`](Self::state_updates) or subscribe to
    /// [`EventKind::Connected`] to learn when the session opens.
    pub fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.control(Control::Connect(endpoint))
    }

    /// Reconnect to the current endpoint.
    pub fn restart(&self) -> Result<()> {
        self.control(Control::Restart)
    }

    /// Close the session and stop reconnecting until the next `connect`.
    pub fn disconnect(&self) -> Result<()> {
        self.control(Control::Disconnect)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Most recent telemetry snapshot, if any has arrived.
    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.telemetry.borrow().clone()
    }

    /// Stream of telemetry snapshots, latest value wins.
    pub fn telemetry(&self) -> TelemetryStream {
        TelemetryStream::new(self.telemetry.clone())
    }

    /// Stream of connection states, starting with the current one.
    ///
    /// Rapid transitions may coalesce; subscribe to
    /// [`EventKind::StateChanged`] to see every one.
    pub fn state_updates(&self) -> StateStream {
        StateStream::new(self.state.clone())
    }

    /// Issue a correlated query and wait for its reply.
    ///
    /// `timeout` overrides the configured request timeout. Fails immediately
    /// with [`LinkError::NotConnected`] unless a session is open.
    pub async fn query(&self, kind: QueryKind, timeout: Option<Duration>) -> Result<QueryResult> {
        let (reply, rx) = oneshot::channel();
        self.control(Control::Query { kind, timeout, reply })?;
        rx.await.map_err(|_| LinkError::Shutdown)?
    }

    pub async fn get_camera_offset(&self) -> Result<Offset> {
        match self.query(QueryKind::CameraOffset, None).await? {
            QueryResult::CameraOffset(offset) => Ok(offset),
            other => Err(unexpected_reply(QueryKind::CameraOffset, &other)),
        }
    }

    pub async fn get_gps_offset(&self) -> Result<Offset> {
        match self.query(QueryKind::GpsOffset, None).await? {
            QueryResult::GpsOffset(offset) => Ok(offset),
            other => Err(unexpected_reply(QueryKind::GpsOffset, &other)),
        }
    }

    pub async fn get_color_correction(&self) -> Result<ColorCorrection> {
        match self.query(QueryKind::ColorCorrection, None).await? {
            QueryResult::ColorCorrection(cc) => Ok(cc),
            other => Err(unexpected_reply(QueryKind::ColorCorrection, &other)),
        }
    }

    /// Send a camera calibration. No reply is expected.
    ///
    /// Resolves once the frame is queued on the open session.
    pub async fn set_camera_offset(&self, offset: Offset) -> Result<()> {
        offset.validate()?;
        if offset.elevation_offset.is_none() {
            return Err(LinkError::invalid_value(
                "elevationOffset",
                "camera offsets must carry an elevation",
            ));
        }
        self.send(Command::SetCameraOffset(offset)).await
    }

    /// Send a GPS calibration. Any elevation offset is not transmitted.
    pub async fn set_gps_offset(&self, offset: Offset) -> Result<()> {
        offset.validate()?;
        self.send(Command::SetGpsOffset(offset)).await
    }

    /// Send a color correction; [`ColorCorrection::NEUTRAL`] resets it.
    pub async fn set_color_correction(&self, correction: ColorCorrection) -> Result<()> {
        self.send(Command::SetColorCorrection(correction)).await
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Handlers run on the link's task, in registration order, and must not
    /// block. Events produced after this call are delivered.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::from_raw(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        if self.control(Control::Subscribe { id, kind, handler: Box::new(handler) }).is_err() {
            debug!(event = %kind, "Subscribe after shutdown ignored");
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.control(Control::Unsubscribe(id));
    }

    async fn send(&self, command: Command) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.control(Control::Send { command, ack })?;
        rx.await.map_err(|_| LinkError::Shutdown)?
    }

    fn control(&self, command: Control) -> Result<()> {
        self.control.send(command).map_err(|_| LinkError::Shutdown)
    }
}

impl Drop for TelemetryLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn unexpected_reply(expected: QueryKind, got: &QueryResult) -> LinkError {
    LinkError::protocol(expected.keyword(), format!("reply of kind {} delivered", got.kind()))
}
