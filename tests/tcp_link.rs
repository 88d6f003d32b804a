//! Link behaviour over real TCP sockets against a scripted device.

use fieldlink::{
    ConnectionState, Depth, Endpoint, EventKind, LinkConfig, LinkError, LinkEvent, TelemetryLink,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

const DATA: &str = r#"data,{"detections":[{"class":1,"prob":0.8,"depth":1.5,"mapLocation":{"x":[0.5],"y":[-0.5]}},{"class":0,"prob":0.6,"depth":-1,"mapLocation":{"x":[],"y":[]}}],"position":{"x":0.25,"y":-1.0,"z":0.0,"azimuth":45.0,"elevation":0.0,"rotation":0.0},"stats":{"fps":30.0,"invokeTime":0.01,"runTime":3.0,"cpuTemp":51.0,"videoWidth":640,"videoHeight":480,"gpsConnected":false}}"#;

fn config(port: u16) -> LinkConfig {
    LinkConfig::default()
        .with_endpoint(Endpoint::new("127.0.0.1", port))
        .with_poll_interval(Duration::from_millis(20))
        .with_reconnect_backoff(Duration::from_millis(100))
        .with_settings_refresh(false)
}

/// Answer polls and queries until the link hangs up or `lines` requests were served.
async fn serve(stream: TcpStream, lines: usize) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read).lines();
    let mut served = 0;

    while served < lines {
        let Ok(Some(line)) = reader.next_line().await else {
            return;
        };
        let reply = match line.as_str() {
            "getData" => DATA.to_string(),
            "getCameraOffset" => "getCameraOffset,0.1,-0.05,0.3,meters,0,12.5".to_string(),
            "getGpsOffset" => "getGpsOffset,0,0.2,0,meters,90".to_string(),
            "getColorCorrection" => "getColorCorrection,50,-20,0".to_string(),
            _ => continue,
        };
        if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
            return;
        }
        served += 1;
    }
}

async fn wait_for(link: &TelemetryLink, state: ConnectionState) {
    let mut updates = link.state_updates();
    tokio::time::timeout(WAIT, async {
        while let Some(current) = updates.next().await {
            if current == state {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for state");
}

#[tokio::test]
async fn polls_telemetry_and_answers_queries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, usize::MAX).await;
    });

    let link = TelemetryLink::new(config(port)).unwrap();
    let mut telemetry = link.telemetry();
    link.restart().unwrap();

    let snapshot = tokio::time::timeout(WAIT, telemetry.next()).await.unwrap().unwrap();
    assert_eq!(snapshot.detections.len(), 2);
    assert_eq!(snapshot.detections[1].depth, Depth::NotLocalized);
    assert_eq!(snapshot.renderable_detections().count(), 1);
    assert!(snapshot.gps_fix().is_none());
    assert!(link.state().is_connected());

    let camera = link.get_camera_offset().await.unwrap();
    assert_eq!(camera.elevation_offset, Some(12.5));
    let gps = link.get_gps_offset().await.unwrap();
    assert_eq!(gps.elevation_offset, None);
    assert_eq!(gps.heading_offset, 90.0);
    let color = link.get_color_correction().await.unwrap();
    assert_eq!((color.h(), color.s(), color.v()), (50, -20, 0));
}

#[tokio::test]
async fn refused_connection_fires_one_disconnect_then_retries() {
    // Bind then release a port so nothing listens on it.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let link = TelemetryLink::new(config(port).with_reconnect_backoff(Duration::from_secs(2))).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    link.subscribe(EventKind::StateChanged, {
        let tx = tx.clone();
        move |event| {
            let _ = tx.send(event.clone());
        }
    });
    link.subscribe(EventKind::Disconnected, move |event| {
        let _ = tx.send(event.clone());
    });
    link.restart().unwrap();

    let mut events = Vec::new();
    while events.len() < 3 {
        events.push(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap());
    }
    assert_eq!(
        events[0],
        LinkEvent::StateChanged { from: ConnectionState::Disconnected, to: ConnectionState::Connecting }
    );
    assert_eq!(
        events[1],
        LinkEvent::StateChanged { from: ConnectionState::Connecting, to: ConnectionState::Disconnected }
    );
    assert!(matches!(events[2], LinkEvent::Disconnected { .. }));

    // Nothing more until the backoff elapses.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(link.state(), ConnectionState::Disconnected);

    assert!(matches!(
        link.get_camera_offset().await,
        Err(LinkError::NotConnected { .. })
    ));
}

#[tokio::test]
async fn reconnects_after_the_device_drops_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // First connection serves a single poll and hangs up.
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, 1).await;
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, usize::MAX).await;
    });

    let link = TelemetryLink::new(config(port)).unwrap();
    let (tx, mut closed) = mpsc::unbounded_channel();
    link.subscribe(EventKind::Disconnected, move |event| {
        let _ = tx.send(event.clone());
    });
    link.restart().unwrap();

    let event = tokio::time::timeout(WAIT, closed.recv()).await.unwrap().unwrap();
    assert!(matches!(event, LinkEvent::Disconnected { .. }));

    wait_for(&link, ConnectionState::Connected).await;
    let gps = tokio::time::timeout(WAIT, link.get_gps_offset()).await.unwrap().unwrap();
    assert_eq!(gps.y, 0.2);
    assert!(link.latest().is_some());
}
