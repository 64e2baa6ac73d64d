mod ui;

use chrono::{DateTime, Local};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};

use tapr::clock::SystemClock;
use tapr::game::{Command, GameEvent, GameSession, Phase, TICK_RATE_MS};
use tapr::history::SessionDb;
use tapr::runtime::{spawn_one_shot, CrosstermEventSource, FixedTicker, Runner, TapEvent};
use tapr::store::{FileScoreStore, ScoreStore};

/// reflex tapping game for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "How often can you tap before the window closes? Tap with space or enter; a fixed countdown runs from your first tap, then a short recovery keeps input disabled before the next round. The best count is persisted across runs."
)]
pub struct Cli {
    /// print recent sessions and exit
    #[clap(long)]
    history: bool,

    /// export the full session log as CSV to the given path and exit
    #[clap(long, value_name = "PATH")]
    export: Option<PathBuf>,
}

pub struct App {
    pub session: GameSession<SystemClock, FileScoreStore>,
    /// When the persisted record was set; refreshed when a new one lands.
    pub record_set_at: Option<DateTime<Local>>,
}

impl App {
    pub fn new() -> Self {
        let mut app = Self::with_store(FileScoreStore::new());
        if let Ok(db) = SessionDb::new() {
            app.session.attach_history(db);
        }
        app
    }

    pub fn with_store(store: FileScoreStore) -> Self {
        let record_set_at = store.record().map(|r| r.set_at);
        Self {
            session: GameSession::new(SystemClock::new(), store),
            record_set_at,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.history {
        return print_history();
    }

    if let Some(path) = cli.export {
        let db = SessionDb::new()?;
        db.export_csv(&path)?;
        println!("exported session log to {}", path.display());
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let res = run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let events = CrosstermEventSource::new();
    let timer_tx = events.sender();
    let runner = Runner::new(events, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));

    terminal.draw(|f| draw(app, f))?;

    loop {
        let mut dirty = true;

        let commands = match runner.step() {
            TapEvent::Tick => {
                // Idle screens are static; only a live countdown or the
                // recovery bar needs repainting.
                dirty = app.session.phase() != Phase::Idle;
                app.session.handle(GameEvent::Tick)
            }
            TapEvent::Resize => Vec::new(),
            TapEvent::Deadline { epoch } => {
                let previous_best = app.session.high_score();
                let commands = app.session.handle(GameEvent::DeadlineFired { epoch });
                if app.session.high_score() > previous_best {
                    app.record_set_at = Some(Local::now());
                }
                commands
            }
            TapEvent::Recovery { epoch } => app.session.handle(GameEvent::RecoveryFired { epoch }),
            TapEvent::Key(key) => match key.code {
                KeyCode::Esc => break,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char(' ') | KeyCode::Enter => app.session.handle(GameEvent::Tap),
                _ => {
                    dirty = false;
                    Vec::new()
                }
            },
        };

        for command in commands {
            match command {
                Command::ArmDeadline { after, epoch } => {
                    spawn_one_shot(timer_tx.clone(), after, TapEvent::Deadline { epoch })
                }
                Command::ArmRecovery { after, epoch } => {
                    spawn_one_shot(timer_tx.clone(), after, TapEvent::Recovery { epoch })
                }
            }
        }

        if dirty {
            terminal.draw(|f| draw(app, f))?;
        }
    }

    Ok(())
}

fn draw(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}

fn print_history() -> Result<(), Box<dyn Error>> {
    let db = SessionDb::new()?;
    let records = db.recent(20)?;

    if records.is_empty() {
        println!("no recorded sessions yet");
        return Ok(());
    }

    for record in &records {
        let stats = match (record.mean_secs, record.std_dev_secs) {
            (Some(mean), Some(sd)) => format!("mean {:.3}s, sd {:.3}s", mean, sd),
            _ => "insufficient data".to_string(),
        };
        println!(
            "{}  {:>3} taps  ({})",
            record.played_at.format("%Y-%m-%d %H:%M:%S"),
            record.taps,
            stats
        );
    }

    if let Some(best) = db.best()? {
        println!("best: {} taps", best);
    }

    Ok(())
}
