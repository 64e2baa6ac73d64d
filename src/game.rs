use std::time::Duration;

use crate::clock::Clock;
use crate::history::SessionDb;
use crate::stats::{self, Summary};
use crate::store::ScoreStore;

/// Length of the active play window.
pub const WINDOW: Duration = Duration::from_secs(5);
/// Cooldown after the window expires, during which input stays disabled.
pub const RECOVERY: Duration = Duration::from_secs(3);
/// Display refresh cadence (~120 Hz). Cosmetic only: correctness depends on
/// the one-shot deadline and recovery timers, never on ticks.
pub const TICK_RATE_MS: u64 = 8;

/// Lifecycle of one play cycle.
///
/// `TimedOut` covers the post-deadline bookkeeping until the next display
/// refresh; `Recovering` covers the rest of the cooldown. Both reject taps,
/// and the recovery timer is honored from either, so lost ticks cannot wedge
/// the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Idle,
    Running,
    TimedOut,
    Recovering,
}

/// Everything the session consumes, one event at a time, in arrival order.
///
/// Timer events carry the epoch of the window that armed them; a firing
/// whose epoch no longer matches is stale and must be a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Tap,
    Tick,
    DeadlineFired { epoch: u64 },
    RecoveryFired { epoch: u64 },
}

/// Timer work the runtime performs on the session's behalf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ArmDeadline { after: Duration, epoch: u64 },
    ArmRecovery { after: Duration, epoch: u64 },
}

/// The tapping state machine: one instance per program run.
///
/// Owns the current phase, the recorded inter-tap intervals, and the high
/// score seeded from the injected store. Never blocks; timers are requested
/// via [`Command`]s and come back as [`GameEvent`]s.
#[derive(Debug)]
pub struct GameSession<C: Clock, S: ScoreStore> {
    phase: Phase,
    clock: C,
    store: S,
    history: Option<SessionDb>,
    /// Bumped on every Idle -> Running transition; stale timer firings
    /// carry an older value and are dropped.
    epoch: u64,
    session_start: Duration,
    last_tap: Duration,
    intervals: Vec<Duration>,
    summary: Option<Summary>,
    high_score: u32,
}

impl<C: Clock, S: ScoreStore> GameSession<C, S> {
    pub fn new(clock: C, store: S) -> Self {
        let high_score = store.load();
        let now = clock.now();
        Self {
            phase: Phase::Idle,
            clock,
            store,
            history: None,
            epoch: 0,
            session_start: now,
            last_tap: now,
            intervals: Vec::new(),
            summary: None,
            high_score,
        }
    }

    /// Attach the session log; without one, finished windows simply are not
    /// recorded.
    pub fn attach_history(&mut self, db: SessionDb) {
        self.history = Some(db);
    }

    pub fn handle(&mut self, event: GameEvent) -> Vec<Command> {
        match event {
            GameEvent::Tap => self.on_tap(),
            GameEvent::Tick => {
                self.on_tick();
                Vec::new()
            }
            GameEvent::DeadlineFired { epoch } => self.on_deadline(epoch),
            GameEvent::RecoveryFired { epoch } => {
                self.on_recovery(epoch);
                Vec::new()
            }
        }
    }

    fn on_tap(&mut self) -> Vec<Command> {
        match self.phase {
            // A tap while idle starts the window instead of being counted.
            Phase::Idle => self.launch(),
            Phase::Running => {
                self.record_tap();
                Vec::new()
            }
            // Input is disabled for the rest of the cycle; late taps are
            // dropped without touching the recorded intervals.
            Phase::TimedOut | Phase::Recovering => Vec::new(),
        }
    }

    fn launch(&mut self) -> Vec<Command> {
        self.epoch += 1;
        self.intervals.clear();
        self.intervals.reserve(50);
        self.summary = None;
        self.session_start = self.clock.now();
        self.last_tap = self.session_start;
        self.phase = Phase::Running;
        vec![Command::ArmDeadline {
            after: WINDOW,
            epoch: self.epoch,
        }]
    }

    /// Taps are accepted with no lower bound on the interval; arbitrarily
    /// fast tapping is data, not an error.
    fn record_tap(&mut self) {
        let dt = self.clock.elapsed(self.last_tap);
        self.intervals.push(dt);
        self.last_tap = self.clock.now();
    }

    fn on_tick(&mut self) {
        // Ticks only refresh the displayed countdown. The sole state they
        // touch is the cosmetic TimedOut -> Recovering step.
        if self.phase == Phase::TimedOut {
            self.phase = Phase::Recovering;
        }
    }

    fn on_deadline(&mut self, epoch: u64) -> Vec<Command> {
        if self.phase != Phase::Running || epoch != self.epoch {
            // Stale or duplicate firing; the window it belonged to is gone.
            return Vec::new();
        }

        self.phase = Phase::TimedOut;

        let taps = self.taps();
        if taps > self.high_score {
            self.high_score = taps;
            // A failed write keeps the in-memory record and the game alive.
            let _ = self.store.save(taps);
        }

        // Diagnostic summary: shown and logged, never gates scoring.
        self.summary = stats::summarize(&self.intervals);
        if let Some(db) = &self.history {
            let _ = db.record(taps, self.summary.as_ref());
        }

        vec![Command::ArmRecovery {
            after: RECOVERY,
            epoch: self.epoch,
        }]
    }

    fn on_recovery(&mut self, epoch: u64) {
        if !matches!(self.phase, Phase::TimedOut | Phase::Recovering) || epoch != self.epoch {
            return;
        }
        // Count and intervals stay readable until the next launch.
        self.phase = Phase::Idle;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Accepted taps in the current or just-finished window.
    pub fn taps(&self) -> u32 {
        self.intervals.len() as u32
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    pub fn input_enabled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Running)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Fraction of the window still remaining, clamped to [0, 1].
    pub fn progress(&self) -> f64 {
        match self.phase {
            Phase::Running => {
                let used = self.clock.elapsed(self.session_start).as_secs_f64();
                ((WINDOW.as_secs_f64() - used) / WINDOW.as_secs_f64()).clamp(0.0, 1.0)
            }
            // Full bar, ready for the next round.
            Phase::Idle => 1.0,
            Phase::TimedOut | Phase::Recovering => 0.0,
        }
    }

    pub fn seconds_remaining(&self) -> f64 {
        WINDOW.as_secs_f64() * self.progress()
    }

    pub fn message(&self) -> String {
        match self.phase {
            Phase::Idle => format!(
                "How often can you tap in {:.1} seconds?\nThe countdown starts with your first tap.",
                WINDOW.as_secs_f64()
            ),
            Phase::Running => "Tap as fast as possible".to_string(),
            Phase::TimedOut | Phase::Recovering => "Recovering …".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{HighScore, MemoryScoreStore};
    use assert_matches::assert_matches;
    use chrono::Local;

    fn session() -> GameSession<ManualClock, MemoryScoreStore> {
        GameSession::new(ManualClock::new(), MemoryScoreStore::new())
    }

    /// Start a window and return the epoch its deadline timer carries.
    fn start(session: &mut GameSession<ManualClock, MemoryScoreStore>) -> u64 {
        let commands = session.handle(GameEvent::Tap);
        assert_matches!(
            commands.as_slice(),
            [Command::ArmDeadline { after, .. }] if *after == WINDOW
        );
        match commands[0] {
            Command::ArmDeadline { epoch, .. } => epoch,
            _ => unreachable!(),
        }
    }

    fn tap_after(session: &mut GameSession<ManualClock, MemoryScoreStore>, secs: f64) {
        session.clock().advance(Duration::from_secs_f64(secs));
        session.handle(GameEvent::Tap);
    }

    #[test]
    fn starts_idle_with_full_bar() {
        let session = session();

        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.taps(), 0);
        assert!(session.input_enabled());
        assert_eq!(session.progress(), 1.0);
        assert!(session.message().contains("5.0"));
    }

    #[test]
    fn tap_while_idle_starts_the_window() {
        let mut session = session();

        let epoch = start(&mut session);

        assert_eq!(epoch, 1);
        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(session.taps(), 0);
    }

    #[test]
    fn taps_record_non_negative_intervals() {
        let mut session = session();
        start(&mut session);

        tap_after(&mut session, 0.5);
        tap_after(&mut session, 0.25);
        session.handle(GameEvent::Tap); // same instant as the previous tap

        assert_eq!(session.taps(), 3);
        assert_eq!(
            session.intervals(),
            &[
                Duration::from_secs_f64(0.5),
                Duration::from_secs_f64(0.25),
                Duration::ZERO,
            ]
        );
    }

    #[test]
    fn deadline_freezes_the_count() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);
        tap_after(&mut session, 0.5);

        session.clock().advance(Duration::from_secs(4));
        let commands = session.handle(GameEvent::DeadlineFired { epoch });

        assert_eq!(session.phase(), Phase::TimedOut);
        assert!(!session.input_enabled());
        assert_eq!(session.taps(), 2);
        assert_matches!(
            commands.as_slice(),
            [Command::ArmRecovery { after, .. }] if *after == RECOVERY
        );
    }

    #[test]
    fn late_taps_are_silently_discarded() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);
        session.handle(GameEvent::DeadlineFired { epoch });

        session.handle(GameEvent::Tap);
        session.handle(GameEvent::Tick); // TimedOut -> Recovering
        session.handle(GameEvent::Tap);

        assert_eq!(session.taps(), 1);
        assert_eq!(session.intervals().len(), 1);
        assert_eq!(session.phase(), Phase::Recovering);
    }

    #[test]
    fn duplicate_deadline_is_a_noop() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);

        session.handle(GameEvent::DeadlineFired { epoch });
        let again = session.handle(GameEvent::DeadlineFired { epoch });

        assert!(again.is_empty());
        assert_eq!(session.phase(), Phase::TimedOut);
        assert_eq!(session.taps(), 1);
    }

    #[test]
    fn stale_epoch_deadline_is_a_noop() {
        let mut session = session();
        let epoch = start(&mut session);
        session.handle(GameEvent::DeadlineFired { epoch });
        session.handle(GameEvent::RecoveryFired { epoch });

        // Second window; the first window's timer must not end it.
        let second_epoch = start(&mut session);
        assert_ne!(second_epoch, epoch);

        let commands = session.handle(GameEvent::DeadlineFired { epoch });
        assert!(commands.is_empty());
        assert_eq!(session.phase(), Phase::Running);
    }

    #[test]
    fn recovery_returns_to_idle_and_reenables_input() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);
        session.handle(GameEvent::DeadlineFired { epoch });

        // A tap partway into recovery changes nothing.
        session.clock().advance(Duration::from_secs(1));
        session.handle(GameEvent::Tap);
        assert_eq!(session.taps(), 1);

        session.clock().advance(Duration::from_secs(2));
        session.handle(GameEvent::RecoveryFired { epoch });

        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.input_enabled());
        // Final count stays readable until the next launch.
        assert_eq!(session.taps(), 1);
    }

    #[test]
    fn recovery_fires_from_timed_out_even_without_ticks() {
        let mut session = session();
        let epoch = start(&mut session);
        session.handle(GameEvent::DeadlineFired { epoch });

        assert_eq!(session.phase(), Phase::TimedOut);
        session.handle(GameEvent::RecoveryFired { epoch });
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn recovery_while_idle_is_a_noop() {
        let mut session = session();
        session.handle(GameEvent::RecoveryFired { epoch: 0 });
        assert_eq!(session.phase(), Phase::Idle);

        let epoch = start(&mut session);
        session.handle(GameEvent::RecoveryFired { epoch });
        assert_eq!(session.phase(), Phase::Running);
    }

    #[test]
    fn tick_has_no_effect_on_the_count() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);

        for _ in 0..100 {
            session.handle(GameEvent::Tick);
        }

        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(session.taps(), 1);

        session.handle(GameEvent::DeadlineFired { epoch });
        assert_eq!(session.taps(), 1);
    }

    #[test]
    fn progress_counts_down_and_clamps() {
        let mut session = session();
        start(&mut session);

        assert_eq!(session.progress(), 1.0);

        session.clock().advance(Duration::from_millis(2500));
        assert!((session.progress() - 0.5).abs() < 1e-9);
        assert!((session.seconds_remaining() - 2.5).abs() < 1e-9);

        // The deadline event may lag the wall clock under load; the bar
        // must bottom out rather than go negative.
        session.clock().advance(Duration::from_secs(10));
        assert_eq!(session.progress(), 0.0);
    }

    #[test]
    fn new_record_is_persisted_once() {
        let mut session = session();
        let epoch = start(&mut session);
        for _ in 0..5 {
            tap_after(&mut session, 0.2);
        }
        session.handle(GameEvent::DeadlineFired { epoch });

        assert_eq!(session.high_score(), 5);
        assert_eq!(session.store.load(), 5);
        assert_eq!(session.store.saves, 1);
    }

    #[test]
    fn high_score_never_decreases() {
        let mut session =
            GameSession::new(ManualClock::new(), MemoryScoreStore::seeded(10));
        assert_eq!(session.high_score(), 10);

        let epoch = start(&mut session);
        for _ in 0..3 {
            tap_after(&mut session, 0.2);
        }
        session.handle(GameEvent::DeadlineFired { epoch });

        assert_eq!(session.high_score(), 10);
        assert_eq!(session.store.load(), 10);
        assert_eq!(session.store.saves, 0);
    }

    #[test]
    fn summary_absent_for_sparse_windows() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);
        tap_after(&mut session, 0.5);
        session.handle(GameEvent::DeadlineFired { epoch });

        assert_eq!(session.taps(), 2);
        assert_eq!(session.summary(), None);
    }

    #[test]
    fn summary_computed_at_timeout() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 1.0);
        tap_after(&mut session, 2.0);
        tap_after(&mut session, 3.0);
        session.handle(GameEvent::DeadlineFired { epoch });

        let summary = session.summary().unwrap();
        assert_eq!(summary.count, 3);
        assert!((summary.mean - 2.0).abs() < 1e-9);
        assert!((summary.variance - 1.0).abs() < 1e-9);
        assert!((summary.std_dev - 1.0).abs() < 1e-9);
    }

    #[test]
    fn launch_clears_previous_session_data() {
        let mut session = session();
        let epoch = start(&mut session);
        tap_after(&mut session, 0.5);
        session.handle(GameEvent::DeadlineFired { epoch });
        session.handle(GameEvent::RecoveryFired { epoch });

        assert_eq!(session.taps(), 1);
        assert_eq!(session.summary(), None);

        start(&mut session);
        assert_eq!(session.taps(), 0);
        assert_eq!(session.summary(), None);
        assert_eq!(session.intervals(), &[]);
    }

    #[test]
    fn store_failure_is_not_fatal() {
        struct FailingStore;

        impl ScoreStore for FailingStore {
            fn record(&self) -> Option<HighScore> {
                None
            }

            fn save(&mut self, _score: u32) -> std::io::Result<()> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            }
        }

        let mut session = GameSession::new(ManualClock::new(), FailingStore);
        let commands = session.handle(GameEvent::Tap);
        let epoch = match commands[0] {
            Command::ArmDeadline { epoch, .. } => epoch,
            _ => unreachable!(),
        };
        session.clock().advance(Duration::from_millis(200));
        session.handle(GameEvent::Tap);
        session.handle(GameEvent::DeadlineFired { epoch });

        // The in-memory record survives the failed write.
        assert_eq!(session.high_score(), 1);
        assert_eq!(session.phase(), Phase::TimedOut);
    }

    #[test]
    fn full_window_without_taps_scores_zero() {
        let mut session = session();
        let epoch = start(&mut session);

        session.clock().advance(WINDOW);
        session.handle(GameEvent::DeadlineFired { epoch });

        assert_eq!(session.taps(), 0);
        assert_eq!(session.summary(), None);
        assert_eq!(session.high_score(), 0);
        assert_eq!(session.store.saves, 0);
    }

    #[test]
    fn record_keeps_its_timestamp() {
        let mut store = MemoryScoreStore::new();
        store.save(4).unwrap();
        let set_at = store.record().unwrap().set_at;
        assert!(set_at <= Local::now());
    }
}
