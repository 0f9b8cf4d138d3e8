// crates/canpanel-rs-linux/src/socket.rs
#![cfg(target_os = "linux")]

use crate::interrupt::InterruptLine;
use canpanel_rs::can::OperationMode;
use canpanel_rs::can::buffer::BufferWords;
use canpanel_rs::emulation::ControllerModel;
use canpanel_rs::{CanFrame, CanPeripheral};
use log::{debug, error, info, trace, warn};
use socketcan::{CANFrame, CANSocket};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// How often the reader thread wakes up to check whether it should stop.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Stops the reader thread when the last peripheral clone is dropped.
struct ReaderGuard {
    stop: Arc<AtomicBool>,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// A SocketCAN interface behind the controller register interface.
///
/// The register file is the software [`ControllerModel`]: the driver programs
/// modes, filters and buffers exactly as on hardware. A reader thread runs
/// every frame from the socket through the model's acceptance filters and
/// raises `irq` when a receive buffer fills, which services the interrupt on
/// the reader thread. A transmit request writes the
/// transmit buffer to the socket.
#[derive(Clone)]
pub struct SocketCanPeripheral {
    model: Arc<Mutex<ControllerModel>>,
    socket: Arc<CANSocket>,
    _reader: Arc<ReaderGuard>,
}

impl SocketCanPeripheral {
    /// Opens `interface_name` (e.g. `can0`, `vcan0`) and starts the reader.
    pub fn open(interface_name: &str, irq: InterruptLine) -> io::Result<Self> {
        let socket = CANSocket::open(interface_name).map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Failed to open CAN interface '{}': {:?}", interface_name, e),
            )
        })?;
        socket.set_read_timeout(READ_TIMEOUT)?;
        let socket = Arc::new(socket);
        let model = Arc::new(Mutex::new(ControllerModel::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let reader_socket = socket.clone();
        let reader_model = model.clone();
        let reader_stop = stop.clone();
        thread::Builder::new()
            .name(format!("canpanel-rx-{}", interface_name))
            .spawn(move || read_loop(&reader_socket, &reader_model, &irq, &reader_stop))?;

        info!("[SocketCAN] Opened interface {}.", interface_name);
        Ok(Self {
            model,
            socket,
            _reader: Arc::new(ReaderGuard { stop }),
        })
    }

    fn model(&self) -> MutexGuard<'_, ControllerModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_loop(socket: &CANSocket, model: &Mutex<ControllerModel>, irq: &InterruptLine, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        let raw = match socket.read_frame() {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
            Err(e) => {
                error!("[SocketCAN] Read failed, reader stopped: {}", e);
                return;
            }
        };
        // Panels only use standard data frames.
        if raw.is_extended() || raw.is_rtr() || raw.is_error() {
            trace!("[SocketCAN] Skipping non-data frame {:#x}.", raw.id());
            continue;
        }
        let frame = match u16::try_from(raw.id()).ok().and_then(|id| CanFrame::new(id, raw.data()).ok()) {
            Some(frame) => frame,
            None => continue,
        };
        let raise = {
            let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
            model.deliver(&frame) && model.interrupt_pending()
        };
        if raise {
            irq.raise();
        }
    }
    debug!("[SocketCAN] Reader stopped.");
}

impl CanPeripheral for SocketCanPeripheral {
    fn request_mode(&mut self, mode: OperationMode) {
        self.model().request_mode(mode);
    }

    fn current_mode(&self) -> OperationMode {
        self.model().current_mode()
    }

    fn abort_pending(&mut self) {
        self.model().abort_pending();
    }

    fn write_bit_timing(&mut self, cfg1: u16, cfg2: u16) {
        // The bitrate of a SocketCAN interface is set with `ip link`.
        self.model().write_bit_timing(cfg1, cfg2);
    }

    fn configure_buffer(&mut self, buffer: u8, transmit: bool) {
        self.model().configure_buffer(buffer, transmit);
    }

    fn configure_dma(&mut self, buffer_count: u8) {
        self.model().configure_dma(buffer_count);
    }

    fn set_filter_window(&mut self, filter_window: bool) {
        self.model().set_filter_window(filter_window);
    }

    fn write_buffer_pointer(&mut self, filter: u8, buffer: u8) {
        self.model().write_buffer_pointer(filter, buffer);
    }

    fn write_filter(&mut self, slot: u8, value: u16) {
        self.model().write_filter(slot, value);
    }

    fn filter_enable(&self) -> u16 {
        self.model().filter_enable()
    }

    fn write_filter_enable(&mut self, bits: u16) {
        self.model().write_filter_enable(bits);
    }

    fn write_mask(&mut self, slot: u8, value: u16) {
        self.model().write_mask(slot, value);
    }

    fn mask_select(&self, bank: u8) -> u16 {
        self.model().mask_select(bank)
    }

    fn write_mask_select(&mut self, bank: u8, value: u16) {
        self.model().write_mask_select(bank, value);
    }

    fn write_interrupt_enable(&mut self, bits: u16) {
        self.model().write_interrupt_enable(bits);
    }

    fn clear_interrupt_flags(&mut self) {
        self.model().clear_interrupt_flags();
    }

    fn rx_full(&self) -> u16 {
        self.model().rx_full()
    }

    fn clear_rx_full(&mut self, buffer: u8) {
        self.model().clear_rx_full(buffer);
    }

    fn read_buffer(&self, buffer: u8) -> BufferWords {
        self.model().read_buffer(buffer)
    }

    fn write_buffer(&mut self, buffer: u8, words: BufferWords) {
        self.model().write_buffer(buffer, words);
    }

    fn transmit_pending(&self, buffer: u8) -> bool {
        self.model().transmit_pending(buffer)
    }

    fn request_transmit(&mut self, buffer: u8, priority: u8) {
        let frame = {
            let mut model = self.model();
            model.request_transmit(buffer, priority);
            model.take_transmit()
        };
        let Some(frame) = frame else {
            return;
        };
        match CANFrame::new(frame.id().into(), frame.payload(), false, false) {
            Ok(raw) => {
                if let Err(e) = self.socket.write_frame(&raw) {
                    warn!("[SocketCAN] Write of {:?} failed: {}", frame, e);
                }
            }
            Err(e) => error!("[SocketCAN] Cannot build frame for {:?}: {:?}", frame, e),
        }
    }
}
