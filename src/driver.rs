//! Driver task owning all link state
//!
//! Session events, caller commands, request deadlines, poll ticks and the
//! reconnect timer all feed one `select!` loop. Each is handled to completion
//! before the next, so the pending-request table, connection state and
//! latest snapshot are never touched concurrently and need no locks.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Command, DecodedMessage, Frame};
use crate::config::LinkConfig;
use crate::correlator::{Correlator, QueryOutcome};
use crate::events::{EventBus, EventKind, Handler, LinkEvent, SubscriptionId};
use crate::scheduler::PollScheduler;
use crate::transport::{
    CloseReason, Connector, SessionEvent, SessionId, SessionMessage, SessionState, TransportSession,
};
use crate::types::{ConnectionState, Endpoint, QueryKind, TelemetrySnapshot};
use crate::{LinkError, Result};

/// Requests from the link handle to its driver.
pub(crate) enum Control {
    Connect(Endpoint),
    Restart,
    Disconnect,
    Query {
        kind: QueryKind,
        timeout: Option<Duration>,
        reply: oneshot::Sender<QueryOutcome>,
    },
    Send {
        command: Command,
        ack: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        id: SubscriptionId,
        kind: EventKind,
        handler: Handler,
    },
    Unsubscribe(SubscriptionId),
}

/// Result of spawning the driver
pub(crate) struct DriverChannels {
    pub control: mpsc::UnboundedSender<Control>,
    pub telemetry: watch::Receiver<Option<Arc<TelemetrySnapshot>>>,
    pub state: watch::Receiver<ConnectionState>,
    pub endpoint: watch::Receiver<Endpoint>,
    /// Cancelling stops the driver and closes its session
    pub cancel: CancellationToken,
}

pub(crate) struct Driver {
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    state: ConnectionState,
    session: Option<TransportSession>,
    last_session: SessionId,
    session_events: mpsc::UnboundedSender<SessionMessage>,
    correlator: Correlator,
    scheduler: PollScheduler,
    bus: EventBus,
    reconnect_at: Option<Instant>,
    /// Set by an explicit disconnect; suppresses reconnects
    stopped: bool,
    snapshots: u64,
    telemetry_tx: watch::Sender<Option<Arc<TelemetrySnapshot>>>,
    state_tx: watch::Sender<ConnectionState>,
    endpoint_tx: watch::Sender<Endpoint>,
}

impl Driver {
    /// Spawn the driver task.
    ///
    /// The driver starts disconnected; nothing is dialled until a
    /// [`Control::Connect`] or [`Control::Restart`] arrives.
    pub(crate) fn spawn(config: LinkConfig, connector: Arc<dyn Connector>) -> DriverChannels {
        let endpoint = config.endpoint();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (telemetry_tx, telemetry_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (endpoint_tx, endpoint_rx) = watch::channel(endpoint.clone());
        let cancel = CancellationToken::new();

        let driver = Driver {
            correlator: Correlator::new(config.request_timeout()),
            scheduler: PollScheduler::new(config.poll_interval()),
            config,
            connector,
            endpoint,
            state: ConnectionState::Disconnected,
            session: None,
            last_session: SessionId::from_raw(0),
            session_events: session_tx,
            bus: EventBus::new(),
            reconnect_at: None,
            stopped: false,
            snapshots: 0,
            telemetry_tx,
            state_tx,
            endpoint_tx,
        };

        tokio::spawn(driver.run(control_rx, session_rx, cancel.clone()));

        DriverChannels {
            control: control_tx,
            telemetry: telemetry_rx,
            state: state_rx,
            endpoint: endpoint_rx,
            cancel,
        }
    }

    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut sessions: mpsc::UnboundedReceiver<SessionMessage>,
        cancel: CancellationToken,
    ) {
        info!(endpoint = %self.endpoint, "Link driver started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Link driver cancelled");
                    break;
                }
                Some(message) = sessions.recv() => self.on_session(message),
                command = control.recv() => match command {
                    Some(command) => self.on_control(command),
                    None => {
                        debug!("Link handle dropped");
                        break;
                    }
                },
                id = self.correlator.next_expired() => {
                    trace!(%id, "Deadline handled");
                }
                tick = self.scheduler.tick() => self.on_poll(tick),
                _ = reconnect_due(self.reconnect_at) => {
                    self.reconnect_at = None;
                    info!(endpoint = %self.endpoint, "Reconnecting");
                    self.open_session();
                }
            }
        }

        self.shutdown();
        info!(snapshots = self.snapshots, "Link driver ended");
    }

    fn on_control(&mut self, command: Control) {
        match command {
            Control::Connect(endpoint) => {
                self.stopped = false;
                self.teardown("endpoint changed");
                if endpoint != self.endpoint {
                    info!(from = %self.endpoint, to = %endpoint, "Endpoint changed");
                    self.endpoint = endpoint;
                    self.endpoint_tx.send_replace(self.endpoint.clone());
                }
                self.open_session();
            }
            Control::Restart => {
                self.stopped = false;
                self.teardown("link restarted");
                self.open_session();
            }
            Control::Disconnect => {
                self.stopped = true;
                self.reconnect_at = None;
                self.teardown("disconnected by caller");
                info!(endpoint = %self.endpoint, "Link stopped");
            }
            Control::Query { kind, timeout, reply } => {
                if !self.is_open() {
                    let _ = reply.send(Err(self.not_connected()));
                    return;
                }
                self.issue(kind, timeout, reply);
            }
            Control::Send { command, ack } => {
                let result = self.send_frame(&codec::encode(&command));
                match &result {
                    Ok(()) => debug!(command = command.keyword(), "Command sent"),
                    Err(e) => debug!(command = command.keyword(), "Command not sent: {}", e),
                }
                let _ = ack.send(result);
            }
            Control::Subscribe { id, kind, handler } => {
                self.bus.subscribe(id, kind, handler);
                debug!(subscription = ?id, event = %kind, "Subscribed");
            }
            Control::Unsubscribe(id) => {
                if !self.bus.unsubscribe(id) {
                    debug!(subscription = ?id, "Unknown subscription");
                }
            }
        }
    }

    fn on_session(&mut self, message: SessionMessage) {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == message.session) else {
            trace!(session = %message.session, "Event from stale session ignored");
            return;
        };
        session.apply(&message.event);

        match message.event {
            SessionEvent::Opened => self.on_opened(),
            SessionEvent::Data(line) => self.on_line(&line),
            SessionEvent::Closed(reason) => self.on_closed(reason),
        }
    }

    fn on_opened(&mut self) {
        self.set_state(ConnectionState::Connected);
        self.bus.emit(&LinkEvent::Connected { endpoint: self.endpoint.clone() });
        self.scheduler.start();

        if self.config.refresh_settings_on_connect {
            debug!("Refreshing device settings");
            for kind in QueryKind::ALL {
                // Replies reach subscribers as events; nobody awaits the outcome.
                let (reply, _) = oneshot::channel();
                self.issue(kind, None, reply);
            }
        }
    }

    fn on_line(&mut self, line: &str) {
        match codec::decode(line) {
            DecodedMessage::Telemetry(mut snapshot) => {
                snapshot.received_at = Some(SystemTime::now());
                self.snapshots += 1;
                if self.config.log_telemetry {
                    debug!(
                        n = self.snapshots,
                        detections = snapshot.detections.len(),
                        x = snapshot.position.x,
                        y = snapshot.position.y,
                        "Telemetry"
                    );
                }

                let snapshot = Arc::new(snapshot);
                self.telemetry_tx.send_replace(Some(Arc::clone(&snapshot)));
                self.bus.emit(&LinkEvent::Telemetry(snapshot));
            }
            DecodedMessage::QueryResult(result) => {
                let kind = result.kind();
                match self.correlator.resolve(result.clone()) {
                    Some(id) => debug!(%id, %kind, "Reply matched"),
                    None => debug!(%kind, "Unsolicited reply"),
                }
                self.bus.emit(&LinkEvent::from(result));
            }
            DecodedMessage::Unrecognized(tag) => {
                debug!(%tag, "Unrecognized frame dropped");
            }
            DecodedMessage::Malformed { tag, reason } => {
                warn!(%tag, "Malformed frame dropped: {}", reason);
            }
        }
    }

    fn on_closed(&mut self, reason: CloseReason) {
        self.session = None;
        self.scheduler.stop();
        self.correlator.cancel_all(&format!("session closed: {reason}"));
        self.set_state(ConnectionState::Disconnected);
        self.bus.emit(&LinkEvent::Disconnected {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        });

        if !self.stopped {
            let backoff = self.config.reconnect_backoff();
            self.reconnect_at = Some(Instant::now() + backoff);
            info!(endpoint = %self.endpoint, ?backoff, "Reconnect scheduled");
        }
    }

    fn on_poll(&mut self, tick: u64) {
        if !self.is_open() {
            return;
        }
        trace!(tick, "Poll");
        if let Err(e) = self.send_frame(&codec::encode(&Command::FetchTelemetry)) {
            debug!(tick, "Poll skipped: {}", e);
        }
    }

    /// Register a pending request and send its frame.
    fn issue(
        &mut self,
        kind: QueryKind,
        timeout: Option<Duration>,
        reply: oneshot::Sender<QueryOutcome>,
    ) {
        let id = self.correlator.register(kind, timeout, reply);
        if let Err(e) = self.send_frame(&codec::encode(&Command::Query(kind))) {
            self.correlator.fail(kind, id, e);
        }
    }

    fn open_session(&mut self) {
        self.reconnect_at = None;
        self.last_session = self.last_session.next();

        let mut session = TransportSession::new(
            self.last_session,
            self.endpoint.clone(),
            self.config.session_options(),
        );
        self.set_state(ConnectionState::Connecting);
        session.connect(Arc::clone(&self.connector), self.session_events.clone());
        self.session = Some(session);
    }

    /// Close the current session, cancelling everything tied to it.
    fn teardown(&mut self, reason: &str) {
        self.reconnect_at = None;
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.close();
        self.scheduler.stop();
        self.correlator.cancel_all(reason);
        self.set_state(ConnectionState::Disconnected);
        self.bus.emit(&LinkEvent::Disconnected {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        });
    }

    fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.scheduler.stop();
        self.correlator.cancel_all("link shut down");
        self.state = ConnectionState::Disconnected;
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    fn send_frame(&self, frame: &Frame) -> Result<()> {
        match &self.session {
            Some(session) if session.state() == SessionState::Open => session.send(frame),
            _ => Err(self.not_connected()),
        }
    }

    fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.state() == SessionState::Open)
    }

    fn not_connected(&self) -> LinkError {
        LinkError::NotConnected { endpoint: self.endpoint.to_string() }
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.state_tx.send_replace(to);
        info!(%from, %to, endpoint = %self.endpoint, "Connection state changed");
        self.bus.emit(&LinkEvent::StateChanged { from, to });
    }
}

async fn reconnect_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
