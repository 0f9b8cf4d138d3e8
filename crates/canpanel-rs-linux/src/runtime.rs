//! Tokio task set running one panel.
//!
//! Each periodic or event-driven activity of the panel is its own task.
//! The core components stay sans-IO: every task feeds an event into a
//! component and hands the returned [`NodeAction`]s to a shared
//! [`Executor`]. Frames to send go to a transmit task, which runs the
//! blocking driver send on tokio's blocking pool.

use crate::interrupt::InterruptLine;
use crate::mailbox::{Mailbox, MailboxReceiver, Received, mailbox};
use canpanel_rs::can::{RxConsumer, RxProducer, RxQueue};
use canpanel_rs::{
    AlarmController, Board, CanDriver, CanFrame, CanPeripheral, Dispatcher, Display, Indicator,
    Indicators, KeyEvent, Keypad, KeypadCollector, LivenessTracker, MessageCodec, NodeAction,
    PanelConfig, PanelError, PanelInputs, PasswordManager, Password, SharedState,
};
use canpanel_rs_monitor::PanelSnapshot;
use crossbeam_channel::Sender;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::{JoinSet, spawn_blocking};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};

pub type Store = SharedState<CriticalSectionRawMutex>;

/// Keypad scan period.
pub const KEYPAD_SCAN_PERIOD: Duration = Duration::from_millis(20);

/// Sampling period of the intrusion and change-password inputs.
pub const INPUT_POLL_PERIOD: Duration = Duration::from_millis(20);

/// The panel's local devices, moved into the tasks that use them.
pub struct PanelDevices {
    pub board: Box<dyn Board + Send>,
    pub keypad: Box<dyn Keypad + Send>,
    pub display: Box<dyn Display + Send>,
    pub indicators: Box<dyn Indicators + Send>,
    pub inputs: Box<dyn PanelInputs + Send>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownCommand {
    Start(Duration),
    Stop,
}

/// Indicator outputs plus the levels needed to toggle them.
struct IndicatorBank {
    outputs: Box<dyn Indicators + Send>,
    levels: HashMap<Indicator, bool>,
}

impl IndicatorBank {
    fn set(&mut self, indicator: Indicator, on: bool) {
        self.levels.insert(indicator, on);
        self.outputs.set(indicator, on);
    }

    fn toggle(&mut self, indicator: Indicator) {
        let on = !self.levels.get(&indicator).copied().unwrap_or(false);
        self.set(indicator, on);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Performs node actions on behalf of every task.
struct Executor {
    transmit: mpsc::UnboundedSender<CanFrame>,
    codec: MessageCodec,
    indicators: Mutex<IndicatorBank>,
    display: Mailbox<String>,
    countdown: mpsc::UnboundedSender<CountdownCommand>,
}

impl Executor {
    fn run(&self, actions: Vec<NodeAction>) {
        for action in actions {
            match action {
                NodeAction::Broadcast(message) => match self.codec.encode(&message) {
                    Ok(frame) => {
                        if self.transmit.send(frame).is_err() {
                            warn!("[TX] Transmit task is gone, {:?} dropped.", message);
                        }
                    }
                    Err(e) => error!("[TX] Cannot encode {:?}: {}", message, e),
                },
                NodeAction::Show(text) => self.display.post(text.to_string()),
                NodeAction::SetIndicator(indicator, on) => lock(&self.indicators).set(indicator, on),
                NodeAction::ToggleIndicator(indicator) => lock(&self.indicators).toggle(indicator),
                NodeAction::StartCountdown(ms) => {
                    self.command_countdown(CountdownCommand::Start(Duration::from_millis(ms.into())))
                }
                NodeAction::StopCountdown => self.command_countdown(CountdownCommand::Stop),
            }
        }
    }

    fn command_countdown(&self, command: CountdownCommand) {
        if self.countdown.send(command).is_err() {
            warn!("[Countdown] Task is gone, {:?} dropped.", command);
        }
    }
}

/// A running panel. Dropping the handle aborts every task and detaches the
/// receive interrupt.
pub struct PanelHandle {
    state: Arc<Store>,
    tasks: JoinSet<()>,
    irq: InterruptLine,
}

impl PanelHandle {
    pub fn state(&self) -> &Store {
        &self.state
    }

    /// Aborts every task and waits for them to finish.
    pub async fn shutdown(mut self) {
        self.irq.detach();
        self.tasks.shutdown().await;
        info!("[Runtime] Panel stopped.");
    }
}

impl Drop for PanelHandle {
    fn drop(&mut self) {
        self.irq.detach();
    }
}

/// Brings up the controller and spawns the panel tasks on the current runtime.
///
/// The receive interrupt service is attached to `irq`, which the peripheral
/// must raise whenever a frame fills a receive buffer. Snapshots are offered to `snapshots` after every liveness tick
/// and dropped when the channel is full.
pub fn start<P>(
    config: PanelConfig,
    peripheral: P,
    irq: InterruptLine,
    mut devices: PanelDevices,
    snapshots: Option<Sender<PanelSnapshot>>,
) -> Result<PanelHandle, PanelError>
where
    P: CanPeripheral + Clone + Send + 'static,
{
    config.validate()?;
    devices.board.init()?;

    let mut driver = CanDriver::new(peripheral.clone(), config.mode_wait);
    driver.initialize(config.mode, config.baudrate)?;
    driver.apply_filters(&config.filters)?;
    let isr_driver = CanDriver::new(peripheral, config.mode_wait);

    let state = Arc::new(Store::new(config.default_password));
    let queue: &'static mut RxQueue = Box::leak(Box::new(RxQueue::new()));
    let (producer, consumer) = queue.split();

    let (display_tx, display_rx) = mailbox();
    let (code_tx, code_rx) = mailbox();
    let (change_tx, change_rx) = mailbox();
    let (countdown_tx, countdown_rx) = mpsc::unbounded_channel();
    let (transmit_tx, transmit_rx) = mpsc::unbounded_channel();

    let codec = MessageCodec::new(config.identifier_offset);
    let alarm = AlarmController::new(config.intrusion_countdown_ms);
    let executor = Arc::new(Executor {
        transmit: transmit_tx,
        codec,
        indicators: Mutex::new(IndicatorBank {
            outputs: devices.indicators,
            levels: HashMap::new(),
        }),
        display: display_tx,
        countdown: countdown_tx,
    });
    // Outputs start from the boot state: disarmed and quiet.
    executor.run(vec![
        NodeAction::SetIndicator(Indicator::LockStatus, false),
        NodeAction::SetIndicator(Indicator::TimerStatus, false),
        NodeAction::SetIndicator(Indicator::Buzzer, false),
    ]);

    let rx_ready = Arc::new(Notify::new());
    let tick_period = Duration::from_millis(config.tick_period_ms.into());
    let heartbeat_period = Duration::from_millis(config.heartbeat_period_ms.into());
    let password_timeout = Duration::from_millis(config.password_timeout_ms.into());
    let liveness = LivenessTracker::from_config(&config);

    let mut tasks = JoinSet::new();
    tasks.spawn(transmit_task(transmit_rx, driver));
    tasks.spawn(receive_task(
        consumer,
        rx_ready.clone(),
        Dispatcher::new(codec, alarm),
        state.clone(),
        executor.clone(),
    ));
    tasks.spawn(tick_task(
        tick_period,
        liveness.clone(),
        state.clone(),
        executor.clone(),
        snapshots,
    ));
    tasks.spawn(heartbeat_task(heartbeat_period, liveness, state.clone(), executor.clone()));
    tasks.spawn(countdown_task(countdown_rx, alarm, state.clone(), executor.clone()));
    tasks.spawn(keypad_task(devices.keypad, executor.display.clone(), code_tx));
    tasks.spawn(input_task(devices.inputs, alarm, change_tx, state.clone(), executor.clone()));
    tasks.spawn(password_task(
        code_rx,
        change_rx,
        password_timeout,
        PasswordManager::new(alarm),
        state.clone(),
        executor,
    ));
    tasks.spawn(display_task(display_rx, devices.display));

    irq.attach(receive_interrupt(isr_driver, producer, rx_ready));
    // Frames that arrived before the handler was attached are still waiting.
    irq.raise();

    info!(
        "[Runtime] Panel started on offset {:#05x} at {:?}.",
        config.identifier_offset, config.baudrate
    );
    Ok(PanelHandle { state, tasks, irq })
}

/// Receive interrupt service: empties every full receive buffer into the
/// queue and wakes the receive task.
fn receive_interrupt<P: CanPeripheral>(
    mut driver: CanDriver<P>,
    mut producer: RxProducer<'static>,
    rx_ready: Arc<Notify>,
) -> impl FnMut() + Send + 'static
where
    P: Send + 'static,
{
    move || {
        let report = driver.service_interrupt(&mut producer);
        if report.dropped > 0 {
            warn!("[ISR] Receive queue full, {} frame(s) dropped.", report.dropped);
        }
        if report.malformed > 0 {
            debug!("[ISR] {} malformed buffer(s) discarded.", report.malformed);
        }
        if report.received > 0 {
            rx_ready.notify_one();
        }
    }
}

/// Sends frames in order. The driver polls the transmit buffer, so every
/// send runs on the blocking pool and hands the driver back.
async fn transmit_task<P>(mut frames: mpsc::UnboundedReceiver<CanFrame>, mut driver: CanDriver<P>)
where
    P: CanPeripheral + Send + 'static,
{
    while let Some(frame) = frames.recv().await {
        let sent = spawn_blocking(move || {
            let result = driver.send(&frame);
            (driver, result)
        })
        .await;
        match sent {
            Ok((returned, result)) => {
                driver = returned;
                match result {
                    Ok(()) => trace!("[TX] Sent {:?}.", frame),
                    Err(e) => error!("[TX] Failed to send {:?}: {}", frame, e),
                }
            }
            Err(e) => {
                error!("[TX] Transmit worker failed, no more frames will be sent: {}", e);
                break;
            }
        }
    }
}

async fn receive_task(
    mut consumer: RxConsumer<'static>,
    rx_ready: Arc<Notify>,
    dispatcher: Dispatcher,
    state: Arc<Store>,
    executor: Arc<Executor>,
) {
    loop {
        rx_ready.notified().await;
        while let Some(frame) = consumer.dequeue() {
            executor.run(dispatcher.dispatch(&frame, &*state));
        }
    }
}

/// Periodic timer that starts one full period after the call.
fn periodic(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn tick_task(
    period: Duration,
    mut liveness: LivenessTracker,
    state: Arc<Store>,
    executor: Arc<Executor>,
    snapshots: Option<Sender<PanelSnapshot>>,
) {
    let mut timer = periodic(period);
    loop {
        timer.tick().await;
        executor.run(liveness.on_tick(&*state));
        if let Some(tx) = &snapshots {
            // The monitor is best effort; a full channel drops the snapshot.
            let _ = tx.try_send(PanelSnapshot::capture(&*state));
        }
    }
}

async fn heartbeat_task(
    period: Duration,
    liveness: LivenessTracker,
    state: Arc<Store>,
    executor: Arc<Executor>,
) {
    let mut timer = periodic(period);
    loop {
        timer.tick().await;
        executor.run(liveness.on_heartbeat_timer(&*state));
    }
}

/// One-shot intrusion countdown. A start re-arms it, a stop cancels it.
async fn countdown_task(
    mut commands: mpsc::UnboundedReceiver<CountdownCommand>,
    alarm: AlarmController,
    state: Arc<Store>,
    executor: Arc<Executor>,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(CountdownCommand::Start(duration)) => {
                    debug!("[Countdown] Started, {:?} to go.", duration);
                    deadline = Some(Instant::now() + duration);
                }
                Some(CountdownCommand::Stop) => {
                    if deadline.take().is_some() {
                        debug!("[Countdown] Stopped.");
                    }
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                executor.run(alarm.countdown_expired(&*state));
            }
        }
    }
}

async fn keypad_task(
    mut keypad: Box<dyn Keypad + Send>,
    display: Mailbox<String>,
    codes: Mailbox<Password>,
) {
    let mut collector = KeypadCollector::new();
    let mut timer = interval(KEYPAD_SCAN_PERIOD);
    loop {
        timer.tick().await;
        match collector.on_scan(keypad.scan()) {
            Some(KeyEvent::Partial { typed }) => display.post("*".repeat(typed)),
            Some(KeyEvent::Complete(code)) => codes.post(code),
            None => {}
        }
    }
}

/// Samples both inputs and reacts to rising edges.
async fn input_task(
    mut inputs: Box<dyn PanelInputs + Send>,
    alarm: AlarmController,
    change: Mailbox<()>,
    state: Arc<Store>,
    executor: Arc<Executor>,
) {
    let mut intrusion = inputs.intrusion();
    let mut change_button = inputs.change_password();
    let mut timer = interval(INPUT_POLL_PERIOD);
    loop {
        timer.tick().await;

        let level = inputs.intrusion();
        if level && !intrusion {
            executor.run(alarm.intrusion_edge(&*state));
        }
        intrusion = level;

        let level = inputs.change_password();
        if level && !change_button {
            change.post(());
        }
        change_button = level;
    }
}

async fn password_task(
    mut codes: MailboxReceiver<Password>,
    mut change: MailboxReceiver<()>,
    timeout: Duration,
    mut password: PasswordManager,
    state: Arc<Store>,
    executor: Arc<Executor>,
) {
    loop {
        tokio::select! {
            received = codes.recv_timeout(timeout) => match received {
                Received::Value(code) => executor.run(password.code_entered(&*state, code)),
                Received::TimedOut => password.timed_out(),
                Received::Closed => break,
            },
            Some(()) = change.recv() => {
                executor.run(password.change_requested(&*state));
            }
        }
    }
    debug!("[Password] Keypad gone, task stopped.");
}

async fn display_task(mut texts: MailboxReceiver<String>, mut display: Box<dyn Display + Send>) {
    while let Some(text) = texts.recv().await {
        display.show(&text);
    }
}
