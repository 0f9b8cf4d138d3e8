//! This example runs one panel on a Linux SocketCAN interface, with the web
//! monitor in the same process.
//!
//! Environment:
//! - `CANPANEL_INTERFACE`: CAN interface name (default `vcan0`).
//! - `CANPANEL_CONFIG`: optional path to an XML panel configuration.
//! - `CANPANEL_MONITOR`: monitor address (default `127.0.0.1:8080`).
//!
//! A virtual interface for local testing:
//! `sudo ip link add dev vcan0 type vcan && sudo ip link set up vcan0`
//!
//! Standard input drives the local devices, one command per line:
//! a 4-character code is typed on the keypad, `i` pulses the intrusion
//! input and `c` presses the change-password button.

#[cfg(target_os = "linux")]
mod app {
    use canpanel_rs::PanelConfig;
    use canpanel_rs_linux::{HostDevices, InterruptLine, SocketCanPeripheral, start};
    use canpanel_rs_monitor::start_in_process_monitor;
    use log::{error, info, warn};
    use std::net::SocketAddr;
    use std::time::Duration;
    use std::{env, fs, process};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::time::sleep;

    fn load_config() -> Result<PanelConfig, String> {
        let Ok(path) = env::var("CANPANEL_CONFIG") else {
            info!("[Panel] CANPANEL_CONFIG not set, using defaults.");
            return Ok(PanelConfig::default());
        };
        let xml = fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
        canpanel_rs_config::load_config_from_str(&xml).map_err(|e| format!("Invalid config {}: {}", path, e))
    }

    /// Pulses an input long enough for the 20 ms input watcher to see it.
    async fn pulse(set: impl Fn(bool)) {
        set(true);
        sleep(Duration::from_millis(100)).await;
        set(false);
    }

    pub async fn main() {
        env_logger::try_init().ok();

        let interface_name = env::var("CANPANEL_INTERFACE").unwrap_or_else(|_| "vcan0".to_string());
        let monitor_addr: SocketAddr = match env::var("CANPANEL_MONITOR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
        {
            Ok(addr) => addr,
            Err(e) => {
                error!("[Panel] Invalid CANPANEL_MONITOR: {}", e);
                process::exit(1);
            }
        };
        let config = match load_config() {
            Ok(config) => config,
            Err(e) => {
                error!("[Panel] {}", e);
                process::exit(1);
            }
        };

        let irq = InterruptLine::new();
        let peripheral = match SocketCanPeripheral::open(&interface_name, irq.clone()) {
            Ok(peripheral) => peripheral,
            Err(e) => {
                error!("[Panel] {}", e);
                process::exit(1);
            }
        };

        // A capacity of 1 keeps the panel from ever waiting on the monitor.
        let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(1);
        tokio::spawn(async move {
            if let Err(e) = start_in_process_monitor(snapshot_rx, monitor_addr).await {
                error!("[Panel] Web monitor failed: {}", e);
            }
        });

        let devices = HostDevices::new();
        let panel = match start(config, peripheral, irq, devices.panel_devices(), Some(snapshot_tx)) {
            Ok(panel) => panel,
            Err(e) => {
                error!("[Panel] Failed to start: {}", e);
                process::exit(1);
            }
        };
        info!("[Panel] Running on {}. Type a code, 'i' or 'c'.", interface_name);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match line.trim() {
                        "i" => pulse(|level| devices.inputs.set_intrusion(level)).await,
                        "c" => pulse(|level| devices.inputs.set_change_password(level)).await,
                        code if code.len() == 4 => devices.keypad.type_code(code),
                        "" => {}
                        other => warn!("[Panel] Unknown command '{}'.", other),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!("[Panel] Failed to read stdin: {}", e);
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        panel.shutdown().await;
    }
}

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() {
    app::main().await;
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("SocketCAN is only available on Linux.");
}
