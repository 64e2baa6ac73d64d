use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Unified event type consumed by the game loop.
///
/// Keyboard input, display ticks, and the one-shot window/recovery timers
/// all land in the same serialized queue, so events are handled strictly in
/// arrival order. When a tap and a deadline firing race, whichever was
/// enqueued first wins; that non-determinism is inherent to real-time input.
#[derive(Clone, Debug)]
pub enum TapEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    Deadline { epoch: u64 },
    Recovery { epoch: u64 },
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<TapEvent, RecvTimeoutError>;
}

/// Production event source: a reader thread over crossterm, plus a sender
/// handle so timer threads can feed the same queue.
pub struct CrosstermEventSource {
    tx: Sender<TapEvent>,
    rx: Receiver<TapEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        let key_tx = tx.clone();
        thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if key_tx.send(TapEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if key_tx.send(TapEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { tx, rx }
    }

    /// Sender side of the queue, for arming one-shot timers.
    pub fn sender(&self) -> Sender<TapEvent> {
        self.tx.clone()
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TapEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Arm a one-shot timer: after `delay`, the event is pushed onto the same
/// queue every other event uses. There is no cancellation here; stale
/// firings are dropped by the consumer via their epoch tag.
pub fn spawn_one_shot(tx: Sender<TapEvent>, delay: Duration, event: TapEvent) {
    thread::spawn(move || {
        thread::sleep(delay);
        let _ = tx.send(event);
    });
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit and headless integration tests
pub struct TestEventSource {
    rx: Receiver<TapEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<TapEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TapEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> TapEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => TapEvent::Tick,
        }
    }
}
