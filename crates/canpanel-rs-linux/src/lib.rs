// crates/canpanel-rs-linux/src/lib.rs

//! Runs canpanel-rs panels on a Linux host.
//!
//! [`runtime::start`] spawns the panel tasks on a tokio runtime. The CAN side
//! is any [`CanPeripheral`](canpanel_rs::CanPeripheral): a SocketCAN
//! interface through [`SocketCanPeripheral`], or a station on an in-memory
//! [`VirtualBus`] for demos and tests.

pub mod devices;
pub mod interrupt;
pub mod mailbox;
pub mod runtime;
#[cfg(target_os = "linux")]
mod socket;

pub use devices::{HostBoard, RecordingDisplay, RecordingIndicators, SharedInputs, SharedKeypad};
pub use interrupt::InterruptLine;
pub use runtime::{PanelDevices, PanelHandle, Store, start};
#[cfg(target_os = "linux")]
pub use socket::SocketCanPeripheral;

use canpanel_rs::emulation::{VirtualBus, VirtualPeripheral};

/// Attaches a new station to `bus`. The bus raises the returned line from
/// inside every delivery that fills a receive buffer.
pub fn virtual_station(bus: &VirtualBus) -> (VirtualPeripheral, InterruptLine) {
    let peripheral = bus.attach();
    let irq = InterruptLine::new();
    let line = irq.clone();
    bus.set_interrupt_hook(peripheral.station(), move || line.raise());
    (peripheral, irq)
}

/// Host devices for a panel together with the handles that drive and
/// observe them.
#[derive(Debug, Clone, Default)]
pub struct HostDevices {
    pub keypad: SharedKeypad,
    pub display: RecordingDisplay,
    pub indicators: RecordingIndicators,
    pub inputs: SharedInputs,
}

impl HostDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones every handle into the boxed set the runtime consumes.
    pub fn panel_devices(&self) -> PanelDevices {
        PanelDevices {
            board: Box::new(HostBoard),
            keypad: Box::new(self.keypad.clone()),
            display: Box::new(self.display.clone()),
            indicators: Box::new(self.indicators.clone()),
            inputs: Box::new(self.inputs.clone()),
        }
    }
}
