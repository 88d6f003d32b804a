//! Test utilities: an in-memory device behind the [`Connector`] seam.
//!
//! [`MemoryConnector`] hands the link one half of a `tokio::io::duplex` pipe
//! per connect and the test the other half, wrapped as a [`FakeDevice`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

use crate::codec::FETCH_KEYWORD;
use crate::transport::{BoxedStream, Connector};
use crate::types::Endpoint;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Connector producing in-memory streams.
///
/// Clones share their switches and device queue.
#[derive(Clone)]
pub struct MemoryConnector {
    devices: mpsc::UnboundedSender<DuplexStream>,
    refusing: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    capacity: usize,
}

impl MemoryConnector {
    /// The receiver yields the device end of every accepted connection.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        Self::with_capacity(PIPE_CAPACITY)
    }

    /// Like [`new`](Self::new), with `capacity` bytes buffered per direction.
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (devices, rx) = mpsc::unbounded_channel();
        let connector = Self {
            devices,
            refusing: Arc::new(AtomicBool::new(false)),
            stalled: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicUsize::new(0)),
            capacity,
        };
        (connector, rx)
    }

    /// Fail every connect with `ConnectionRefused`.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Never complete a connect.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Connect attempts so far, including refused ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _endpoint: &Endpoint) -> std::io::Result<BoxedStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(std::io::ErrorKind::ConnectionRefused.into());
        }
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let (client, device) = tokio::io::duplex(self.capacity);
        self.devices
            .send(device)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::ConnectionAborted))?;
        Ok(Box::new(client))
    }
}

/// Device end of an in-memory connection, speaking lines.
pub struct FakeDevice {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeDevice {
    pub fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self { lines: BufReader::new(read).lines(), writer }
    }

    /// Wait for the next device connection.
    pub async fn accept(devices: &mut mpsc::UnboundedReceiver<DuplexStream>) -> Self {
        let stream = tokio::time::timeout(Duration::from_secs(30), devices.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped");
        Self::new(stream)
    }

    /// Next line written by the link, or `None` once it hangs up.
    pub async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(30), self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("device read failed")
    }

    /// Next line that is not a telemetry poll.
    pub async fn next_request(&mut self) -> Option<String> {
        loop {
            match self.next_line().await {
                Some(line) if line == FETCH_KEYWORD => continue,
                other => return other,
            }
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.expect("device write failed");
        self.writer.write_all(b"\n").await.expect("device write failed");
    }
}

/// Minimal valid `data` frame.
pub fn data_line(detections: &str) -> String {
    format!(
        r#"data,{{"detections":[{detections}],"position":{{"x":1.0,"y":2.0,"z":0.0,"azimuth":90.0,"elevation":0.0,"rotation":0.0}},"stats":{{"fps":30.0,"invokeTime":5.0,"runTime":12.0,"cpuTemp":48.5,"videoWidth":640,"videoHeight":480,"gpsConnected":true}}}}"#
    )
}
