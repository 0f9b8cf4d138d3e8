//! Runs three panels on an in-memory CAN bus and walks them through a
//! scripted scenario: id claiming, arming, an intrusion with its countdown,
//! and a disarm.
//!
//! Panel 0 feeds the web monitor when `CANPANEL_MONITOR` is set to a socket
//! address, e.g. `CANPANEL_MONITOR=127.0.0.1:8080 cargo run --example virtual_bus_demo`.

use canpanel_rs::PanelConfig;
use canpanel_rs::emulation::VirtualBus;
use canpanel_rs_linux::{HostDevices, PanelHandle, start, virtual_station};
use canpanel_rs_monitor::start_in_process_monitor;
use log::{error, info};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;

const PANELS: usize = 3;

#[tokio::main]
async fn main() {
    env_logger::try_init().ok();

    let monitor_addr: Option<SocketAddr> = env::var("CANPANEL_MONITOR").ok().and_then(|addr| {
        addr.parse()
            .inspect_err(|e| error!("[Demo] Ignoring CANPANEL_MONITOR '{}': {}", addr, e))
            .ok()
    });

    // Heartbeats well inside the liveness timeout, so armed panels with live
    // peers stay quiet.
    let config = PanelConfig {
        heartbeat_period_ms: 2_000,
        ..PanelConfig::default()
    };

    let bus = VirtualBus::new();
    let mut panels: Vec<(PanelHandle, HostDevices)> = Vec::new();
    for index in 0..PANELS {
        let devices = HostDevices::new();
        let (peripheral, irq) = virtual_station(&bus);

        let snapshots = match (index, monitor_addr) {
            (0, Some(addr)) => {
                let (tx, rx) = crossbeam_channel::bounded(1);
                tokio::spawn(async move {
                    if let Err(e) = start_in_process_monitor(rx, addr).await {
                        error!("[Demo] Web monitor failed: {}", e);
                    }
                });
                Some(tx)
            }
            _ => None,
        };

        match start(config.clone(), peripheral, irq, devices.panel_devices(), snapshots) {
            Ok(handle) => panels.push((handle, devices)),
            Err(e) => {
                error!("[Demo] Panel {} failed to start: {}", index, e);
                return;
            }
        }
        // Staggered power-up gives every panel its own id.
        sleep(Duration::from_secs(6)).await;
    }

    for (index, (handle, _)) in panels.iter().enumerate() {
        info!("[Demo] Panel {} runs as node {:?}.", index, handle.state().self_id());
    }

    info!("[Demo] Arming from panel 0.");
    panels[0].1.keypad.type_code("B169");
    sleep(Duration::from_secs(2)).await;

    info!("[Demo] Intrusion at panel 2.");
    panels[2].1.inputs.set_intrusion(true);
    sleep(Duration::from_secs(10)).await;
    panels[2].1.inputs.set_intrusion(false);

    info!("[Demo] Disarming from panel 1 before the countdown expires.");
    panels[1].1.keypad.type_code("B169");
    sleep(Duration::from_secs(2)).await;

    for (index, (handle, devices)) in panels.iter().enumerate() {
        info!(
            "[Demo] Panel {}: locked={} alarm={} display={:?}",
            index,
            handle.state().is_locked(),
            handle.state().is_alarm_active(),
            devices.display.last()
        );
    }

    if monitor_addr.is_some() {
        info!("[Demo] Monitor running, press Ctrl-C to stop.");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[Demo] Failed to wait for Ctrl-C: {}", e);
        }
    }

    for (handle, _) in panels {
        handle.shutdown().await;
    }
}
