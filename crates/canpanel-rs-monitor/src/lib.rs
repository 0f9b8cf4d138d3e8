// crates/canpanel-rs-monitor/src/lib.rs

//! Web diagnostic monitor for canpanel-rs panels.
//!
//! The panel runtime pushes [`PanelSnapshot`]s into a bounded crossbeam
//! channel without ever blocking; the monitor forwards them to every
//! connected browser over a WebSocket.

pub mod model;
mod server;

pub use model::{PanelSnapshot, PeerInfo};

#[cfg(feature = "in-process")]
use crossbeam_channel::Receiver;
#[cfg(feature = "in-process")]
use log::{debug, info};
#[cfg(feature = "in-process")]
use std::net::SocketAddr;
#[cfg(feature = "in-process")]
use tokio::sync::broadcast;

/// Snapshots buffered per WebSocket client before it starts skipping.
pub const CLIENT_BUFFER: usize = 16;

/// Starts the web monitor in "in-process" mode.
///
/// Runs until the web server fails. A blocking bridge task moves snapshots
/// from `receiver` into the broadcast channel the WebSocket clients
/// subscribe to; it ends when every sender is dropped.
///
/// * `receiver`: snapshots from the panel runtime.
/// * `addr`: address the HTTP server binds to.
#[cfg(feature = "in-process")]
pub async fn start_in_process_monitor(
    receiver: Receiver<PanelSnapshot>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (snapshot_tx, _) = broadcast::channel(CLIENT_BUFFER);

    let bridge_tx = snapshot_tx.clone();
    tokio::task::spawn_blocking(move || {
        while let Ok(snapshot) = receiver.recv() {
            // No subscribers is not an error; the snapshot is simply dropped.
            if bridge_tx.send(snapshot).is_err() {
                debug!("No monitor clients connected.");
            }
        }
        info!("Snapshot channel closed, monitor bridge stopped.");
    });

    server::start_web_server(addr, snapshot_tx).await?;
    Ok(())
}
