//! CAN transport driver for an ECAN-style controller with DMA message buffers.
//!
//! Buffers 0-6 receive and buffer 7 transmits. The receive interrupt copies
//! every full buffer out in index order and clears its flag. Frames leave the
//! interrupt through a lock-free SPSC queue (`RxQueue`) so the interrupt path
//! never touches the shared state store.

pub mod buffer;
pub mod filter;
pub mod frame;
pub mod mode;
pub mod timing;

pub use frame::{CanFrame, FrameError};
pub use mode::OperationMode;
pub use timing::{Baudrate, BitTiming};

use crate::config::FilterConfig;
use crate::hal::{CanPeripheral, PanelError};
use crate::log::{my_debug, my_error, my_info, my_trace};
use crate::types::MAX_STANDARD_ID;
use buffer::{DMA_BUFFERS, RX_BUFFERS, TX_BUFFER};
use heapless::spsc::{Consumer, Producer, Queue};

/// Slots in the interrupt to task queue (one slot is kept free by the queue).
pub const RX_QUEUE_CAPACITY: usize = 16;

pub type RxQueue = Queue<CanFrame, RX_QUEUE_CAPACITY>;
pub type RxProducer<'a> = Producer<'a, CanFrame, RX_QUEUE_CAPACITY>;
pub type RxConsumer<'a> = Consumer<'a, CanFrame, RX_QUEUE_CAPACITY>;

/// Receive buffer interrupt enable (RBIE).
pub const RBIE: u16 = 0x0002;

/// Transmit priority of buffer 7 (highest).
pub const TX_PRIORITY: u8 = 3;

/// Poll budget used when none is configured.
pub const DEFAULT_WAIT_POLLS: u32 = 100_000;

/// How long blocking driver operations poll the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeWait {
    /// Spin until the peripheral acknowledges. A stuck controller hangs the caller.
    Forever,
    /// Give up with a timeout error after this many status polls.
    Polls(u32),
}

impl Default for ModeWait {
    fn default() -> Self {
        ModeWait::Polls(DEFAULT_WAIT_POLLS)
    }
}

/// Outcome of one receive interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptReport {
    /// Frames handed to the sink.
    pub received: u8,
    /// Frames lost because the receive queue was full.
    pub dropped: u8,
    /// Buffers whose contents did not decode into a frame.
    pub malformed: u8,
}

pub struct CanDriver<P: CanPeripheral> {
    peripheral: P,
    wait: ModeWait,
}

impl<P: CanPeripheral> CanDriver<P> {
    pub const fn new(peripheral: P, wait: ModeWait) -> Self {
        Self { peripheral, wait }
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    /// Brings the controller up: bit timing, buffer layout, filter pointers,
    /// receive interrupt, DMA and finally the requested mode.
    ///
    /// All filters are left disabled; callers load their acceptance set with
    /// [`apply_filters`](Self::apply_filters) or the individual operations.
    pub fn initialize(&mut self, mode: OperationMode, baudrate: Baudrate) -> Result<(), PanelError> {
        self.set_operation_mode(OperationMode::Configuration)?;
        self.write_bit_timing(baudrate);

        let p = &mut self.peripheral;
        for buffer in 0..RX_BUFFERS {
            p.configure_buffer(buffer, false);
        }
        p.configure_buffer(TX_BUFFER, true);

        p.set_filter_window(true);
        for filter in 0..RX_BUFFERS {
            p.write_buffer_pointer(filter, filter);
        }
        p.write_filter_enable(0);
        p.write_mask_select(0, 0);
        p.write_mask_select(1, 0);
        p.set_filter_window(false);

        p.clear_interrupt_flags();
        p.write_interrupt_enable(RBIE);
        p.configure_dma(DMA_BUFFERS);

        self.set_operation_mode(mode)?;
        my_info!(
            "[CAN] Controller initialized at {} bit/s in {:?} mode.",
            baudrate.bits_per_second(),
            mode
        );
        Ok(())
    }

    /// Requests `mode` and blocks until the controller reports it.
    ///
    /// Pending transmissions are aborted first.
    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<(), PanelError> {
        self.peripheral.abort_pending();
        self.peripheral.request_mode(mode);
        self.wait_until(|p| p.current_mode() == mode, PanelError::ModeSwitchTimeout(mode))?;
        my_trace!("[CAN] Entered {:?} mode.", mode);
        Ok(())
    }

    pub fn operation_mode(&self) -> OperationMode {
        self.peripheral.current_mode()
    }

    pub fn set_baud_rate(&mut self, baudrate: Baudrate) -> Result<(), PanelError> {
        self.with_config_mode(|driver| {
            driver.write_bit_timing(baudrate);
        })
    }

    /// Loads `identifier` into filter `slot` and enables the filter.
    pub fn load_filter(&mut self, slot: u8, identifier: u16) -> Result<(), PanelError> {
        filter::check_filter_slot(slot)?;
        if identifier > MAX_STANDARD_ID {
            return Err(PanelError::InvalidIdentifier(identifier));
        }
        self.with_filter_window(|p| {
            p.write_filter(slot, filter::filter_register(identifier));
            let enabled = p.filter_enable();
            p.write_filter_enable(enabled | (1 << slot));
        })
    }

    pub fn load_mask(&mut self, slot: u8, mask: u16) -> Result<(), PanelError> {
        filter::check_mask_slot(slot)?;
        if mask > MAX_STANDARD_ID {
            return Err(PanelError::InvalidIdentifier(mask));
        }
        self.with_filter_window(|p| p.write_mask(slot, filter::mask_register(mask)))
    }

    /// Makes filter `filter_slot` compare through mask `mask_slot`.
    pub fn associate_mask_to_filter(&mut self, mask_slot: u8, filter_slot: u8) -> Result<(), PanelError> {
        filter::check_mask_slot(mask_slot)?;
        filter::check_filter_slot(filter_slot)?;
        let (bank, _) = filter::mask_select_position(filter_slot);
        self.with_filter_window(|p| {
            let current = p.mask_select(bank);
            p.write_mask_select(bank, filter::with_mask_selected(current, filter_slot, mask_slot));
        })
    }

    /// Loads a complete acceptance set.
    pub fn apply_filters(&mut self, filters: &[FilterConfig]) -> Result<(), PanelError> {
        for f in filters {
            self.load_mask(f.mask_slot, f.mask)?;
            self.load_filter(f.filter_slot, f.identifier)?;
            self.associate_mask_to_filter(f.mask_slot, f.filter_slot)?;
            my_debug!(
                "[CAN] Filter {} accepts {:#05x}/{:#05x} via mask {}.",
                f.filter_slot,
                f.identifier,
                f.mask,
                f.mask_slot
            );
        }
        Ok(())
    }

    /// Waits for the transmit buffer, fills it and requests transmission.
    pub fn send(&mut self, frame: &CanFrame) -> Result<(), PanelError> {
        self.wait_until(|p| !p.transmit_pending(TX_BUFFER), PanelError::TransmitTimeout)?;
        self.peripheral.write_buffer(TX_BUFFER, buffer::encode(frame));
        self.peripheral.request_transmit(TX_BUFFER, TX_PRIORITY);
        my_trace!("[CAN] Queued {:?} for transmission.", frame);
        Ok(())
    }

    /// Receive interrupt body: hands every full receive buffer to `sink` in
    /// buffer order and clears its flag.
    pub fn on_receive_interrupt(&mut self, mut sink: impl FnMut(CanFrame) -> bool) -> InterruptReport {
        let mut report = InterruptReport::default();
        let full = self.peripheral.rx_full();
        for index in 0..RX_BUFFERS {
            if full & (1 << index) == 0 {
                continue;
            }
            let words = self.peripheral.read_buffer(index);
            match buffer::decode(&words) {
                Ok(frame) => {
                    if sink(frame) {
                        report.received += 1;
                    } else {
                        report.dropped += 1;
                    }
                }
                Err(_) => report.malformed += 1,
            }
            self.peripheral.clear_rx_full(index);
        }
        self.peripheral.clear_interrupt_flags();
        report
    }

    /// Receive interrupt feeding the task-side queue.
    pub fn service_interrupt(&mut self, producer: &mut RxProducer<'_>) -> InterruptReport {
        self.on_receive_interrupt(|frame| producer.enqueue(frame).is_ok())
    }

    fn write_bit_timing(&mut self, baudrate: Baudrate) {
        let timing = BitTiming::for_baudrate(baudrate);
        self.peripheral.write_bit_timing(timing.cfg1(), timing.cfg2());
    }

    /// Runs `f` in configuration mode and restores the mode found on entry.
    fn with_config_mode<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R, PanelError> {
        let previous = self.peripheral.current_mode();
        if previous != OperationMode::Configuration {
            self.set_operation_mode(OperationMode::Configuration)?;
        }
        let result = f(self);
        if previous != OperationMode::Configuration {
            self.set_operation_mode(previous)?;
        }
        Ok(result)
    }

    fn with_filter_window<R>(&mut self, f: impl FnOnce(&mut P) -> R) -> Result<R, PanelError> {
        self.with_config_mode(|driver| {
            driver.peripheral.set_filter_window(true);
            let result = f(&mut driver.peripheral);
            driver.peripheral.set_filter_window(false);
            result
        })
    }

    fn wait_until(&self, mut done: impl FnMut(&P) -> bool, timeout: PanelError) -> Result<(), PanelError> {
        match self.wait {
            ModeWait::Forever => {
                while !done(&self.peripheral) {
                    core::hint::spin_loop();
                }
                Ok(())
            }
            ModeWait::Polls(budget) => {
                for _ in 0..=budget {
                    if done(&self.peripheral) {
                        return Ok(());
                    }
                    core::hint::spin_loop();
                }
                my_error!("[CAN] Peripheral unresponsive after {} polls: {}", budget, timeout);
                Err(timeout)
            }
        }
    }
}
