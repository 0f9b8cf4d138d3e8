// crates/canpanel-rs/tests/simulator/mod.rs
#![allow(dead_code)]

use canpanel_rs::can::{RxConsumer, RxProducer, RxQueue};
use canpanel_rs::emulation::{VirtualBus, VirtualPeripheral};
use canpanel_rs::{
    CanDriver, Indicator, KeyEvent, KeypadCollector, Node, NodeAction, PanelConfig, PanelNode,
    SharedState,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type Store = SharedState<CriticalSectionRawMutex>;

/// A panel on the virtual bus with recorded outputs.
///
/// Each harness owns two drivers over the same controller: one plays the
/// application side, the other is called from the bus interrupt hook and
/// feeds the receive queue.
pub struct PanelHarness {
    pub config: PanelConfig,
    pub node: PanelNode<'static, CriticalSectionRawMutex>,
    pub driver: CanDriver<VirtualPeripheral>,
    rx: RxConsumer<'static>,
    collector: KeypadCollector,
    /// Every text shown on the display, oldest first.
    pub display: Vec<&'static str>,
    indicators: HashMap<Indicator, bool>,
    heartbeat_broadcasts: usize,
    countdown_deadline_ms: Option<u64>,
    next_heartbeat_ms: u64,
}

impl PanelHarness {
    fn new(bus: &VirtualBus, config: PanelConfig, now_ms: u64) -> Self {
        let state: &'static Store = Box::leak(Box::new(SharedState::new(config.default_password)));
        let queue: &'static mut RxQueue = Box::leak(Box::new(RxQueue::new()));
        let (producer, rx) = queue.split();

        let peripheral = bus.attach();
        let mut driver = CanDriver::new(peripheral.clone(), config.mode_wait);
        driver
            .initialize(config.mode, config.baudrate)
            .expect("controller initialization");
        driver.apply_filters(&config.filters).expect("filter setup");

        let isr: Arc<Mutex<(CanDriver<VirtualPeripheral>, RxProducer<'static>)>> =
            Arc::new(Mutex::new((CanDriver::new(peripheral.clone(), config.mode_wait), producer)));
        bus.set_interrupt_hook(peripheral.station(), move || {
            let mut guard = isr.lock().unwrap();
            let (driver, producer) = &mut *guard;
            driver.service_interrupt(producer);
        });

        Self {
            node: PanelNode::new(state, &config),
            next_heartbeat_ms: now_ms + config.heartbeat_period_ms as u64,
            config,
            driver,
            rx,
            collector: KeypadCollector::new(),
            display: Vec::new(),
            indicators: HashMap::new(),
            heartbeat_broadcasts: 0,
            countdown_deadline_ms: None,
        }
    }

    pub fn state(&self) -> &'static Store {
        self.node.state()
    }

    pub fn indicator(&self, indicator: Indicator) -> bool {
        self.indicators.get(&indicator).copied().unwrap_or(false)
    }

    pub fn last_display(&self) -> Option<&'static str> {
        self.display.last().copied()
    }

    pub fn countdown_running(&self) -> bool {
        self.countdown_deadline_ms.is_some()
    }

    pub fn heartbeat_broadcasts(&self) -> usize {
        self.heartbeat_broadcasts
    }

    /// Feeds key scans through the collector as a person would type them.
    pub fn type_code(&mut self, keys: &str) {
        for c in keys.chars() {
            let key = c.to_digit(16).expect("hex key") as u8;
            for scan in [Some(key), Some(key), None] {
                match self.collector.on_scan(scan) {
                    Some(KeyEvent::Complete(code)) => {
                        let actions = self.node.code_entered(code);
                        self.execute(actions, 0);
                    }
                    Some(KeyEvent::Partial { .. }) | None => {}
                }
            }
        }
    }

    pub fn press_change_password(&mut self) {
        let actions = self.node.change_password_requested();
        self.execute(actions, 0);
    }

    pub fn trigger_intrusion(&mut self, now_ms: u64) {
        let actions = self.node.intrusion_edge();
        self.execute(actions, now_ms);
    }

    /// One scheduler step: drain received frames, tick, then fire due timers.
    fn step(&mut self, now_ms: u64) {
        while let Some(frame) = self.rx.dequeue() {
            let actions = self.node.process_frame(&frame);
            self.execute(actions, now_ms);
        }

        let actions = self.node.tick();
        self.execute(actions, now_ms);

        if now_ms >= self.next_heartbeat_ms {
            self.next_heartbeat_ms += self.config.heartbeat_period_ms as u64;
            let actions = self.node.heartbeat_due();
            self.execute(actions, now_ms);
        }

        if self.countdown_deadline_ms.is_some_and(|deadline| now_ms >= deadline) {
            self.countdown_deadline_ms = None;
            let actions = self.node.countdown_expired();
            self.execute(actions, now_ms);
        }
    }

    fn execute(&mut self, actions: Vec<NodeAction>, now_ms: u64) {
        for action in actions {
            match action {
                NodeAction::Broadcast(message) => {
                    if matches!(message, canpanel_rs::PanelMessage::Heartbeat { .. }) {
                        self.heartbeat_broadcasts += 1;
                    }
                    let frame = self.node.codec().encode(&message).expect("encodable message");
                    self.driver.send(&frame).expect("transmit");
                }
                NodeAction::Show(text) => self.display.push(text),
                NodeAction::SetIndicator(indicator, on) => {
                    self.indicators.insert(indicator, on);
                }
                NodeAction::ToggleIndicator(indicator) => {
                    let on = self.indicator(indicator);
                    self.indicators.insert(indicator, !on);
                }
                NodeAction::StartCountdown(ms) => self.countdown_deadline_ms = Some(now_ms + ms as u64),
                NodeAction::StopCountdown => self.countdown_deadline_ms = None,
            }
        }
    }
}

/// A virtual CAN network stepping every attached panel at the tick rate.
pub struct VirtualNetwork {
    pub bus: VirtualBus,
    pub panels: Vec<PanelHarness>,
    current_time_ms: u64,
    tick_ms: u64,
}

impl VirtualNetwork {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            bus: VirtualBus::new(),
            panels: Vec::new(),
            current_time_ms: 0,
            tick_ms: canpanel_rs::types::TICK_PERIOD_MS as u64,
        }
    }

    /// Powers up a panel now and returns its index.
    pub fn add_panel(&mut self, config: PanelConfig) -> usize {
        let panel = PanelHarness::new(&self.bus, config, self.current_time_ms);
        self.panels.push(panel);
        self.panels.len() - 1
    }

    pub fn panel(&self, index: usize) -> &PanelHarness {
        &self.panels[index]
    }

    pub fn panel_mut(&mut self, index: usize) -> &mut PanelHarness {
        &mut self.panels[index]
    }

    pub fn current_time(&self) -> u64 {
        self.current_time_ms
    }

    /// Advances time by one tick and steps every panel in attach order.
    pub fn step(&mut self) {
        self.current_time_ms += self.tick_ms;
        let now = self.current_time_ms;
        for panel in &mut self.panels {
            panel.step(now);
        }
    }

    pub fn run_for(&mut self, duration_ms: u64) {
        let end = self.current_time_ms + duration_ms;
        while self.current_time_ms < end {
            self.step();
        }
    }

    /// Steps until `done` holds or `limit_ms` elapses. Returns whether it held.
    pub fn run_until(&mut self, limit_ms: u64, mut done: impl FnMut(&Self) -> bool) -> bool {
        let end = self.current_time_ms + limit_ms;
        while self.current_time_ms < end {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }
}
