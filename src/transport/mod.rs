//! Transport sessions to the onboard device.
//!
//! A [`TransportSession`] owns exactly one connection. Its lifecycle is
//! `Idle -> Connecting -> Open -> Closed`, and `Closed` is terminal: every
//! reconnect builds a new session with a new [`SessionId`], so buffered data
//! never crosses a connection boundary.
//!
//! Sessions report back through [`SessionMessage`]s on a channel owned by the
//! link. Transport failures are reported as [`SessionEvent::Closed`], never
//! returned as errors past that boundary.

mod tcp;

pub use tcp::TcpConnector;

use futures::{SinkExt, StreamExt};
use line_codec::{DeviceLineCodec, InboundLine};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::Frame;
use crate::types::Endpoint;
use crate::{LinkError, Result};

/// Byte stream a [`Connector`] hands to a session.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Trait for establishing the underlying connection.
///
/// The link uses [`TcpConnector`] by default. Other implementations can
/// tunnel through a different transport or, in tests, hand out in-memory
/// streams.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a fresh byte stream to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<BoxedStream>;
}

/// Identifies one session; never reused within a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ConnectFailed(String),
    ConnectTimeout(Duration),
    PeerClosed,
    Io(String),
    /// Closed by its owner
    Local,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            CloseReason::ConnectTimeout(d) => write!(f, "connect timed out after {d:?}"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::Io(e) => write!(f, "i/o error: {e}"),
            CloseReason::Local => f.write_str("closed locally"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Data(String),
    Closed(CloseReason),
}

/// Session event tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub session: SessionId,
    pub event: SessionEvent,
}

/// Tunables for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub max_frame_length: usize,
}

/// One connection to the device.
pub struct TransportSession {
    id: SessionId,
    endpoint: Endpoint,
    options: SessionOptions,
    state: SessionState,
    outbound: mpsc::UnboundedSender<String>,
    outbound_rx: Option<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
}

impl TransportSession {
    pub fn new(id: SessionId, endpoint: Endpoint, options: SessionOptions) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self {
            id,
            endpoint,
            options,
            state: SessionState::Idle,
            outbound,
            outbound_rx: Some(outbound_rx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start connecting. Only valid from `Idle`.
    ///
    /// Spawns the session task; its events arrive on `events`.
    pub fn connect(
        &mut self,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<SessionMessage>,
    ) {
        let Some(outbound_rx) = self.outbound_rx.take() else {
            warn!(session = %self.id, state = ?self.state, "Session already started");
            return;
        };

        self.state = SessionState::Connecting;
        info!(session = %self.id, endpoint = %self.endpoint, "Connecting");

        let task = SessionTask {
            id: self.id,
            endpoint: self.endpoint.clone(),
            options: self.options,
            connector,
            outbound: outbound_rx,
            events,
            cancel: self.cancel.clone(),
        };
        tokio::spawn(task.run());
    }

    /// Queue a frame for sending.
    ///
    /// Frames queued while connecting are written once the stream opens.
    /// Anything still queued when the session closes is discarded.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        match self.state {
            SessionState::Connecting | SessionState::Open => self
                .outbound
                .send(frame.to_line())
                .map_err(|_| LinkError::transport_failed("session task has stopped")),
            SessionState::Idle | SessionState::Closed => {
                Err(LinkError::NotConnected { endpoint: self.endpoint.to_string() })
            }
        }
    }

    /// Close the session and discard queued frames.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            debug!(session = %self.id, "Closing session");
            self.state = SessionState::Closed;
            self.outbound_rx = None;
            self.cancel.cancel();
        }
    }

    /// Apply an event reported by this session's task.
    pub(crate) fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Opened if self.state == SessionState::Connecting => {
                self.state = SessionState::Open;
            }
            SessionEvent::Closed(_) => self.close(),
            _ => {}
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionTask {
    id: SessionId,
    endpoint: Endpoint,
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SessionMessage>,
    cancel: CancellationToken,
}

impl SessionTask {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(SessionMessage { session: self.id, event });
    }

    async fn run(self) {
        let connect = tokio::time::timeout(
            self.options.connect_timeout,
            self.connector.connect(&self.endpoint),
        );

        let stream = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(session = %self.id, endpoint = %self.endpoint, "Connect failed: {}", e);
                    self.emit(SessionEvent::Closed(CloseReason::ConnectFailed(e.to_string())));
                    return;
                }
                Err(_) => {
                    warn!(session = %self.id, endpoint = %self.endpoint, "Connect timed out");
                    let timeout = self.options.connect_timeout;
                    self.emit(SessionEvent::Closed(CloseReason::ConnectTimeout(timeout)));
                    return;
                }
            },
        };

        info!(session = %self.id, endpoint = %self.endpoint, "Session open");
        self.emit(SessionEvent::Opened);

        let SessionTask { id, options, mut outbound, events, cancel, .. } = self;
        let emit = |event| {
            let _ = events.send(SessionMessage { session: id, event });
        };

        let codec = DeviceLineCodec::new(options.max_frame_length);
        let (mut sink, mut lines) = Framed::new(stream, codec).split();

        // Reads keep flowing while a write waits on a slow peer.
        let writer = async {
            while let Some(line) = outbound.recv().await {
                trace!(session = %id, "-> {}", line);
                if let Err(e) = sink.send(line).await {
                    return CloseReason::Io(e.to_string());
                }
            }
            CloseReason::Local
        };
        let reader = async {
            loop {
                match lines.next().await {
                    Some(Ok(InboundLine::Text(line))) => emit(SessionEvent::Data(line)),
                    Some(Ok(InboundLine::Rejected(why))) => {
                        warn!(session = %id, "Dropped inbound frame: {}", why);
                    }
                    Some(Err(e)) => break CloseReason::Io(e.to_string()),
                    None => break CloseReason::PeerClosed,
                }
            }
        };

        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(session = %id, "Session task cancelled");
                return;
            }
            reason = writer => reason,
            reason = reader => reason,
        };

        info!(session = %id, "Session closed: {}", reason);
        emit(SessionEvent::Closed(reason));
    }
}

mod line_codec {
    use bytes::BytesMut;
    use std::io;
    use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

    /// What the line decoder produced.
    #[derive(Debug)]
    pub enum InboundLine {
        Text(String),
        /// Oversized or not UTF-8; already consumed from the buffer
        Rejected(String),
    }

    /// [`LinesCodec`] that reports bad lines as items instead of ending the stream.
    pub struct DeviceLineCodec {
        inner: LinesCodec,
    }

    impl DeviceLineCodec {
        pub fn new(max_length: usize) -> Self {
            Self { inner: LinesCodec::new_with_max_length(max_length) }
        }

        fn map(result: Result<Option<String>, LinesCodecError>) -> io::Result<Option<InboundLine>> {
            match result {
                Ok(line) => Ok(line.map(InboundLine::Text)),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    Ok(Some(InboundLine::Rejected("line exceeds maximum length".to_string())))
                }
                Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    Ok(Some(InboundLine::Rejected(e.to_string())))
                }
                Err(LinesCodecError::Io(e)) => Err(e),
            }
        }
    }

    impl Decoder for DeviceLineCodec {
        type Item = InboundLine;
        type Error = io::Error;

        fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<InboundLine>> {
            Self::map(self.inner.decode(src))
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<InboundLine>> {
            Self::map(self.inner.decode_eof(src))
        }
    }

    impl Encoder<String> for DeviceLineCodec {
        type Error = io::Error;

        fn encode(&mut self, line: String, dst: &mut BytesMut) -> io::Result<()> {
            self.inner.encode(line, dst).map_err(|e| match e {
                LinesCodecError::Io(e) => e,
                other => io::Error::other(other),
            })
        }
    }
}
