//! Software model of the CAN controller and an in-memory bus.
//!
//! [`ControllerModel`] behaves like the register file the driver programs:
//! filter registers are only writable in configuration mode with the filter
//! window open, accepted frames land in the buffer the matching filter points
//! at, and a full buffer overflows instead of being overwritten. It backs the
//! simulator tests and the Linux host adapter.

use crate::can::buffer::{self, BufferWords, DMA_BUFFERS, RX_BUFFERS, TX_BUFFER};
use crate::can::filter::{self, FILTER_SLOTS, MASK_SLOTS};
use crate::can::{CanFrame, OperationMode, RBIE};
use crate::hal::CanPeripheral;
use crate::log::{my_trace, my_warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::vec::Vec;

/// Receive buffer interrupt flag (RBIF).
pub const RBIF: u16 = 0x0002;

/// Register file of one emulated controller.
#[derive(Debug, Clone)]
pub struct ControllerModel {
    mode: OperationMode,
    requested: OperationMode,
    /// When false the controller ignores mode requests and never transmits.
    responsive: bool,
    bit_timing: (u16, u16),
    transmit_buffers: u8,
    dma_buffers: u8,
    filter_window: bool,
    pointers: [u8; FILTER_SLOTS as usize],
    filters: [u16; FILTER_SLOTS as usize],
    filter_enable: u16,
    masks: [u16; MASK_SLOTS as usize],
    mask_select: [u16; 2],
    interrupt_enable: u16,
    interrupt_flags: u16,
    rx_full: u16,
    overflow: u16,
    buffers: [BufferWords; DMA_BUFFERS as usize],
    tx_pending: u8,
    tx_priority: [u8; DMA_BUFFERS as usize],
    /// Register writes rejected because of the wrong mode or window.
    rejected_writes: u32,
}

impl Default for ControllerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerModel {
    /// Reset state: configuration mode, everything cleared.
    pub fn new() -> Self {
        Self {
            mode: OperationMode::Configuration,
            requested: OperationMode::Configuration,
            responsive: true,
            bit_timing: (0, 0),
            transmit_buffers: 0,
            dma_buffers: 0,
            filter_window: false,
            pointers: [0; FILTER_SLOTS as usize],
            filters: [0; FILTER_SLOTS as usize],
            filter_enable: 0,
            masks: [0; MASK_SLOTS as usize],
            mask_select: [0; 2],
            interrupt_enable: 0,
            interrupt_flags: 0,
            rx_full: 0,
            overflow: 0,
            buffers: [[0; 8]; DMA_BUFFERS as usize],
            tx_pending: 0,
            tx_priority: [0; DMA_BUFFERS as usize],
            rejected_writes: 0,
        }
    }

    /// Makes the controller stop acknowledging mode requests and transmissions.
    pub fn set_responsive(&mut self, responsive: bool) {
        self.responsive = responsive;
        if responsive {
            self.mode = self.requested;
        }
    }

    pub fn bit_timing(&self) -> (u16, u16) {
        self.bit_timing
    }

    pub fn is_transmit_buffer(&self, buffer: u8) -> bool {
        self.transmit_buffers & (1 << buffer) != 0
    }

    pub fn dma_buffers(&self) -> u8 {
        self.dma_buffers
    }

    pub fn buffer_pointer(&self, filter: u8) -> u8 {
        self.pointers[filter as usize]
    }

    pub fn filter(&self, slot: u8) -> u16 {
        self.filters[slot as usize]
    }

    pub fn mask(&self, slot: u8) -> u16 {
        self.masks[slot as usize]
    }

    pub fn interrupt_enable(&self) -> u16 {
        self.interrupt_enable
    }

    /// Receive buffers that overflowed since the last call.
    pub fn take_overflow(&mut self) -> u16 {
        core::mem::take(&mut self.overflow)
    }

    pub fn rejected_writes(&self) -> u32 {
        self.rejected_writes
    }

    /// True when an enabled interrupt is flagged.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_flags & self.interrupt_enable != 0
    }

    /// Runs a frame from the wire through acceptance filtering.
    ///
    /// Enabled filters are checked in ascending order; the first match wins.
    /// Returns false when the frame was not stored.
    pub fn deliver(&mut self, frame: &CanFrame) -> bool {
        if !self.mode.can_receive() {
            return false;
        }
        self.store(frame)
    }

    fn store(&mut self, frame: &CanFrame) -> bool {
        let hit = if self.mode == OperationMode::ListenAll {
            Some((0, 0))
        } else {
            self.matching_filter(frame.id())
        };
        let Some((slot, target)) = hit else {
            return false;
        };
        if target >= RX_BUFFERS || self.is_transmit_buffer(target) {
            return false;
        }
        if self.rx_full & (1 << target) != 0 {
            self.overflow |= 1 << target;
            my_warn!("[EMU] Receive buffer {} overflowed, {:?} lost.", target, frame);
            return false;
        }
        let mut words = buffer::encode(frame);
        buffer::set_filter_hit(&mut words, slot);
        self.buffers[target as usize] = words;
        self.rx_full |= 1 << target;
        self.interrupt_flags |= RBIF;
        true
    }

    /// Completes the pending transmission, if the mode allows one.
    ///
    /// In loopback mode the frame is received locally instead of being
    /// returned for the wire.
    pub fn take_transmit(&mut self) -> Option<CanFrame> {
        if !self.responsive || !self.mode.can_transmit() || self.tx_pending & (1 << TX_BUFFER) == 0 {
            return None;
        }
        self.tx_pending &= !(1 << TX_BUFFER);
        let frame = buffer::decode(&self.buffers[TX_BUFFER as usize]).ok()?;
        if self.mode == OperationMode::Loopback {
            self.store(&frame);
            return None;
        }
        Some(frame)
    }

    fn matching_filter(&self, id: u16) -> Option<(u8, u8)> {
        (0..FILTER_SLOTS)
            .filter(|&slot| self.filter_enable & (1 << slot) != 0)
            .find(|&slot| {
                let (bank, _) = filter::mask_select_position(slot);
                let mask_slot = filter::selected_mask(self.mask_select[bank as usize], slot);
                let mask = self.masks.get(mask_slot as usize).map_or(0, |m| filter::sid_of(*m));
                let expected = filter::sid_of(self.filters[slot as usize]);
                (id ^ expected) & mask == 0
            })
            .map(|slot| (slot, self.pointers[slot as usize]))
    }

    fn config_write(&mut self) -> bool {
        let allowed = self.mode == OperationMode::Configuration;
        if !allowed {
            self.rejected_writes += 1;
        }
        allowed
    }

    fn filter_write(&mut self) -> bool {
        let allowed = self.filter_window && self.mode == OperationMode::Configuration;
        if !allowed {
            self.rejected_writes += 1;
        }
        allowed
    }
}

impl CanPeripheral for ControllerModel {
    fn request_mode(&mut self, mode: OperationMode) {
        self.requested = mode;
        if self.responsive {
            self.mode = mode;
        }
    }

    fn current_mode(&self) -> OperationMode {
        self.mode
    }

    fn abort_pending(&mut self) {
        self.tx_pending = 0;
    }

    fn write_bit_timing(&mut self, cfg1: u16, cfg2: u16) {
        if self.config_write() {
            self.bit_timing = (cfg1, cfg2);
        }
    }

    fn configure_buffer(&mut self, buffer: u8, transmit: bool) {
        if transmit {
            self.transmit_buffers |= 1 << buffer;
        } else {
            self.transmit_buffers &= !(1 << buffer);
        }
    }

    fn configure_dma(&mut self, buffer_count: u8) {
        self.dma_buffers = buffer_count;
    }

    fn set_filter_window(&mut self, filter_window: bool) {
        self.filter_window = filter_window;
    }

    fn write_buffer_pointer(&mut self, filter: u8, buffer: u8) {
        if self.filter_write() {
            self.pointers[filter as usize] = buffer;
        }
    }

    fn write_filter(&mut self, slot: u8, value: u16) {
        if self.filter_write() {
            self.filters[slot as usize] = value;
        }
    }

    fn filter_enable(&self) -> u16 {
        self.filter_enable
    }

    fn write_filter_enable(&mut self, bits: u16) {
        if self.filter_write() {
            self.filter_enable = bits;
        }
    }

    fn write_mask(&mut self, slot: u8, value: u16) {
        if self.filter_write() {
            self.masks[slot as usize] = value;
        }
    }

    fn mask_select(&self, bank: u8) -> u16 {
        self.mask_select[bank as usize]
    }

    fn write_mask_select(&mut self, bank: u8, value: u16) {
        if self.filter_write() {
            self.mask_select[bank as usize] = value;
        }
    }

    fn write_interrupt_enable(&mut self, bits: u16) {
        self.interrupt_enable = bits & RBIE;
    }

    fn clear_interrupt_flags(&mut self) {
        self.interrupt_flags = 0;
    }

    fn rx_full(&self) -> u16 {
        self.rx_full
    }

    fn clear_rx_full(&mut self, buffer: u8) {
        self.rx_full &= !(1 << buffer);
    }

    fn read_buffer(&self, buffer: u8) -> BufferWords {
        self.buffers[buffer as usize]
    }

    fn write_buffer(&mut self, buffer: u8, words: BufferWords) {
        self.buffers[buffer as usize] = words;
    }

    fn transmit_pending(&self, buffer: u8) -> bool {
        self.tx_pending & (1 << buffer) != 0
    }

    fn request_transmit(&mut self, buffer: u8, priority: u8) {
        self.tx_priority[buffer as usize] = priority;
        self.tx_pending |= 1 << buffer;
    }
}

/// Called after a frame was stored in a controller with its interrupt enabled.
pub type InterruptHook = Arc<dyn Fn() + Send + Sync>;

/// A frame seen on the virtual bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusRecord {
    /// Index of the attached controller that sent it, `None` for injected frames.
    pub from: Option<usize>,
    pub frame: CanFrame,
}

struct Station {
    model: Arc<Mutex<ControllerModel>>,
    hook: Option<InterruptHook>,
}

#[derive(Default)]
struct BusInner {
    stations: Vec<Station>,
    history: Vec<BusRecord>,
}

/// An in-memory CAN bus connecting any number of controller models.
///
/// Every transmitted frame is offered to all other stations.
#[derive(Clone, Default)]
pub struct VirtualBus {
    inner: Arc<Mutex<BusInner>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs a fresh controller into the bus.
    pub fn attach(&self) -> VirtualPeripheral {
        let model = Arc::new(Mutex::new(ControllerModel::new()));
        let mut inner = self.lock();
        inner.stations.push(Station {
            model: model.clone(),
            hook: None,
        });
        VirtualPeripheral {
            index: inner.stations.len() - 1,
            model,
            bus: self.clone(),
        }
    }

    /// Registers the function that plays the receive interrupt of `station`.
    pub fn set_interrupt_hook(&self, station: usize, hook: impl Fn() + Send + Sync + 'static) {
        if let Some(s) = self.lock().stations.get_mut(station) {
            s.hook = Some(Arc::new(hook));
        }
    }

    /// Puts a frame on the bus from outside any attached station.
    pub fn inject(&self, frame: CanFrame) {
        self.broadcast(None, frame);
    }

    pub fn history(&self) -> Vec<BusRecord> {
        self.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    fn broadcast(&self, from: Option<usize>, frame: CanFrame) {
        let receivers: Vec<(Arc<Mutex<ControllerModel>>, Option<InterruptHook>)> = {
            let mut inner = self.lock();
            inner.history.push(BusRecord { from, frame });
            inner
                .stations
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != from)
                .map(|(_, s)| (s.model.clone(), s.hook.clone()))
                .collect()
        };
        my_trace!("[EMU] {:?} from {:?} on the bus.", frame, from);
        for (model, hook) in receivers {
            let raise = {
                let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
                model.deliver(&frame) && model.interrupt_pending()
            };
            if let Some(hook) = hook.filter(|_| raise) {
                hook();
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A controller model attached to a [`VirtualBus`].
///
/// Transmission requests complete immediately when the controller is in a
/// transmitting mode.
#[derive(Clone)]
pub struct VirtualPeripheral {
    index: usize,
    model: Arc<Mutex<ControllerModel>>,
    bus: VirtualBus,
}

impl VirtualPeripheral {
    pub fn station(&self) -> usize {
        self.index
    }

    /// Runs `f` with exclusive access to the register file.
    pub fn with_model<R>(&self, f: impl FnOnce(&mut ControllerModel) -> R) -> R {
        f(&mut self.model.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn interrupt_pending(&self) -> bool {
        self.with_model(|m| m.interrupt_pending())
    }

    fn flush_transmit(&self) {
        if let Some(frame) = self.with_model(ControllerModel::take_transmit) {
            self.bus.broadcast(Some(self.index), frame);
        }
    }
}

impl CanPeripheral for VirtualPeripheral {
    fn request_mode(&mut self, mode: OperationMode) {
        self.with_model(|m| m.request_mode(mode));
    }

    fn current_mode(&self) -> OperationMode {
        self.with_model(|m| m.current_mode())
    }

    fn abort_pending(&mut self) {
        self.with_model(|m| m.abort_pending());
    }

    fn write_bit_timing(&mut self, cfg1: u16, cfg2: u16) {
        self.with_model(|m| m.write_bit_timing(cfg1, cfg2));
    }

    fn configure_buffer(&mut self, buffer: u8, transmit: bool) {
        self.with_model(|m| m.configure_buffer(buffer, transmit));
    }

    fn configure_dma(&mut self, buffer_count: u8) {
        self.with_model(|m| m.configure_dma(buffer_count));
    }

    fn set_filter_window(&mut self, filter_window: bool) {
        self.with_model(|m| m.set_filter_window(filter_window));
    }

    fn write_buffer_pointer(&mut self, filter: u8, buffer: u8) {
        self.with_model(|m| m.write_buffer_pointer(filter, buffer));
    }

    fn write_filter(&mut self, slot: u8, value: u16) {
        self.with_model(|m| m.write_filter(slot, value));
    }

    fn filter_enable(&self) -> u16 {
        self.with_model(|m| m.filter_enable())
    }

    fn write_filter_enable(&mut self, bits: u16) {
        self.with_model(|m| m.write_filter_enable(bits));
    }

    fn write_mask(&mut self, slot: u8, value: u16) {
        self.with_model(|m| m.write_mask(slot, value));
    }

    fn mask_select(&self, bank: u8) -> u16 {
        self.with_model(|m| m.mask_select(bank))
    }

    fn write_mask_select(&mut self, bank: u8, value: u16) {
        self.with_model(|m| m.write_mask_select(bank, value));
    }

    fn write_interrupt_enable(&mut self, bits: u16) {
        self.with_model(|m| m.write_interrupt_enable(bits));
    }

    fn clear_interrupt_flags(&mut self) {
        self.with_model(|m| m.clear_interrupt_flags());
    }

    fn rx_full(&self) -> u16 {
        self.with_model(|m| m.rx_full())
    }

    fn clear_rx_full(&mut self, buffer: u8) {
        self.with_model(|m| m.clear_rx_full(buffer));
    }

    fn read_buffer(&self, buffer: u8) -> BufferWords {
        self.with_model(|m| m.read_buffer(buffer))
    }

    fn write_buffer(&mut self, buffer: u8, words: BufferWords) {
        self.with_model(|m| m.write_buffer(buffer, words));
    }

    fn transmit_pending(&self, buffer: u8) -> bool {
        self.with_model(|m| m.transmit_pending(buffer))
    }

    fn request_transmit(&mut self, buffer: u8, priority: u8) {
        self.with_model(|m| m.request_transmit(buffer, priority));
        self.flush_transmit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::{Baudrate, CanDriver, InterruptReport, ModeWait, RxQueue};
    use crate::config::PanelConfig;
    use crate::hal::PanelError;

    fn driver_on(bus: &VirtualBus) -> CanDriver<VirtualPeripheral> {
        let mut driver = CanDriver::new(bus.attach(), ModeWait::Polls(10));
        driver.initialize(OperationMode::Normal, Baudrate::Kbps500).unwrap();
        driver.apply_filters(&PanelConfig::default_filters(0x200)).unwrap();
        driver
    }

    #[test]
    fn initialization_programs_the_register_file() {
        let bus = VirtualBus::new();
        let driver = driver_on(&bus);
        driver.peripheral().with_model(|m| {
            assert_eq!(m.current_mode(), OperationMode::Normal);
            assert!(m.is_transmit_buffer(7));
            assert!(!m.is_transmit_buffer(0));
            assert_eq!(m.dma_buffers(), 8);
            assert_eq!(m.buffer_pointer(6), 6);
            assert_eq!(m.interrupt_enable(), RBIE);
            assert_eq!(m.filter_enable(), 0x003F);
            assert_eq!(m.rejected_writes(), 0);
        });
    }

    #[test]
    fn frames_flow_between_stations_through_the_filters() {
        let bus = VirtualBus::new();
        let mut sender = driver_on(&bus);
        let mut receiver = driver_on(&bus);

        sender.send(&CanFrame::new(0x202, &[3]).unwrap()).unwrap();
        sender.send(&CanFrame::new(0x099, &[1]).unwrap()).unwrap();
        assert_eq!(bus.history().len(), 2);
        assert!(receiver.peripheral().interrupt_pending());

        let mut queue = RxQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let report = receiver.service_interrupt(&mut producer);
        assert_eq!(report.received, 1);
        assert_eq!(consumer.dequeue().map(|f| f.id()), Some(0x202));
        assert_eq!(consumer.dequeue(), None);
        assert!(!receiver.peripheral().interrupt_pending());
    }

    #[test]
    fn full_buffer_overflows_instead_of_overwriting() {
        let bus = VirtualBus::new();
        let receiver = driver_on(&bus);
        bus.inject(CanFrame::new(0x200, &[1]).unwrap());
        bus.inject(CanFrame::new(0x200, &[2]).unwrap());
        receiver.peripheral().with_model(|m| {
            assert_eq!(m.take_overflow(), 0x0001);
            assert_eq!(buffer::decode(&m.read_buffer(0)).unwrap().payload(), &[1]);
        });
    }

    #[test]
    fn simultaneous_messages_of_different_types_are_all_kept() {
        let bus = VirtualBus::new();
        let mut receiver = driver_on(&bus);
        bus.inject(CanFrame::new(0x208, &[2]).unwrap());
        bus.inject(CanFrame::new(0x200, &[1]).unwrap());
        bus.inject(CanFrame::new(0x204, &[3]).unwrap());
        assert_eq!(receiver.peripheral().with_model(|m| m.take_overflow()), 0);

        let mut queue = RxQueue::new();
        let (mut producer, mut consumer) = queue.split();
        let report = receiver.service_interrupt(&mut producer);
        assert_eq!(report.received, 3);
        let ids: Vec<u16> = core::iter::from_fn(|| consumer.dequeue()).map(|f| f.id()).collect();
        assert_eq!(ids, [0x200, 0x204, 0x208]);
    }

    #[test]
    fn full_receive_queue_reports_dropped_frames() {
        let bus = VirtualBus::new();
        let mut receiver = driver_on(&bus);
        let mut queue = RxQueue::new();
        let (mut producer, _consumer) = queue.split();
        let filler = CanFrame::new(0x200, &[0]).unwrap();
        while producer.enqueue(filler).is_ok() {}

        bus.inject(CanFrame::new(0x202, &[1]).unwrap());
        let report = receiver.service_interrupt(&mut producer);
        assert_eq!(report, InterruptReport { received: 0, dropped: 1, malformed: 0 });
        assert!(!receiver.peripheral().interrupt_pending());
    }

    #[test]
    fn unresponsive_controller_times_out() {
        let bus = VirtualBus::new();
        let mut driver = driver_on(&bus);
        driver.peripheral().with_model(|m| m.set_responsive(false));
        assert_eq!(
            driver.set_operation_mode(OperationMode::ListenOnly),
            Err(PanelError::ModeSwitchTimeout(OperationMode::ListenOnly))
        );

        let frame = CanFrame::new(0x200, &[0]).unwrap();
        driver.send(&frame).unwrap();
        assert_eq!(driver.send(&frame), Err(PanelError::TransmitTimeout));
    }

    #[test]
    fn filter_changes_restore_the_running_mode() {
        let bus = VirtualBus::new();
        let mut driver = driver_on(&bus);
        driver.set_operation_mode(OperationMode::ListenOnly).unwrap();
        driver.load_mask(1, 0x7FF).unwrap();
        driver.load_filter(9, 0x123).unwrap();
        driver.associate_mask_to_filter(1, 9).unwrap();
        assert_eq!(driver.operation_mode(), OperationMode::ListenOnly);
        driver.peripheral().with_model(|m| {
            assert_eq!(m.filter(9), filter::filter_register(0x123));
            assert_eq!(m.mask(1), filter::mask_register(0x7FF));
            assert_eq!(filter::selected_mask(m.mask_select(1), 9), 1);
            assert_eq!(filter::selected_mask(m.mask_select(0), 3), 0);
            assert_eq!(m.filter_enable(), 0x023F);
        });
    }

    #[test]
    fn invalid_slots_are_rejected() {
        let bus = VirtualBus::new();
        let mut driver = driver_on(&bus);
        assert_eq!(driver.load_filter(16, 0x100), Err(PanelError::InvalidFilterSlot(16)));
        assert_eq!(driver.load_mask(3, 0x7FF), Err(PanelError::InvalidMaskSlot(3)));
        assert_eq!(driver.load_filter(0, 0x800), Err(PanelError::InvalidIdentifier(0x800)));
    }

    #[test]
    fn loopback_receives_its_own_frames() {
        let bus = VirtualBus::new();
        let mut driver = driver_on(&bus);
        driver.set_operation_mode(OperationMode::Loopback).unwrap();
        driver.send(&CanFrame::new(0x204, &[9]).unwrap()).unwrap();
        assert!(bus.history().is_empty());
        let mut frames = Vec::new();
        driver.on_receive_interrupt(|f| {
            frames.push(f);
            true
        });
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id(), 0x204);
    }
}
