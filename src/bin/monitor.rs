//! fieldlink-monitor: log what the robot reports until Ctrl-C.
//!
//! Usage: `fieldlink-monitor [config.yaml]`. Set `RUST_LOG=fieldlink=debug`
//! for per-frame detail.

use anyhow::Context;
use fieldlink::{EventKind, LinkConfig, LinkEvent, TelemetryLink};
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log one telemetry summary per this many snapshots.
const SUMMARY_EVERY: u64 = 50;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => LinkConfig::load(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?,
        None => LinkConfig::default(),
    };

    let link = TelemetryLink::new(config).context("starting link")?;
    link.subscribe(EventKind::StateChanged, |event| {
        if let LinkEvent::StateChanged { from, to } = event {
            info!(%from, %to, "Link state");
        }
    });
    link.subscribe(EventKind::Disconnected, |event| {
        if let LinkEvent::Disconnected { endpoint, reason } = event {
            info!(%endpoint, %reason, "Connection closed");
        }
    });
    for kind in [EventKind::CameraOffset, EventKind::GpsOffset] {
        link.subscribe(kind, move |event| {
            if let LinkEvent::CameraOffset(offset) | LinkEvent::GpsOffset(offset) = event {
                info!(
                    event = %kind,
                    x = offset.x,
                    y = offset.y,
                    z = offset.z,
                    heading = offset.heading_offset,
                    elevation = ?offset.elevation_offset,
                    "Offset"
                );
            }
        });
    }
    link.subscribe(EventKind::ColorCorrection, |event| {
        if let LinkEvent::ColorCorrection(cc) = event {
            info!(h = cc.h(), s = cc.s(), v = cc.v(), "Color correction");
        }
    });

    link.restart().context("connecting")?;
    info!(endpoint = %link.endpoint(), "Monitoring; Ctrl-C to stop");

    let mut telemetry = link.telemetry();
    let mut seen = 0u64;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            snapshot = telemetry.next() => {
                let Some(snapshot) = snapshot else { break };
                seen += 1;
                if seen % SUMMARY_EVERY == 1 {
                    let stats = snapshot.stats.unwrap_or_default();
                    info!(
                        n = seen,
                        detections = snapshot.detections.len(),
                        renderable = snapshot.renderable_detections().count(),
                        x = snapshot.position.x,
                        y = snapshot.position.y,
                        heading = snapshot.position.azimuth,
                        fps = stats.fps,
                        gps = snapshot.gps_fix().is_some(),
                        "Telemetry"
                    );
                }
            }
        }
    }

    let was_connected = link.state().is_connected();
    link.disconnect().ok();
    info!(snapshots = seen, was_connected, "Stopped");
    Ok(())
}
