use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;

/// Persisted record for the best completed window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HighScore {
    pub score: u32,
    pub set_at: DateTime<Local>,
}

/// Single-value score persistence.
///
/// Reads never fail: a missing or unreadable record reads as "no record",
/// and the score defaults to zero. Writes may fail; the caller is expected
/// to keep playing with the in-memory value.
pub trait ScoreStore {
    /// Current record, if one has ever been persisted.
    fn record(&self) -> Option<HighScore>;

    /// Persist a new record, stamped with the current local time.
    fn save(&mut self, score: u32) -> io::Result<()>;

    /// Best score so far; zero when no record exists.
    fn load(&self) -> u32 {
        self.record().map_or(0, |r| r.score)
    }
}

#[derive(Debug, Clone)]
pub struct FileScoreStore {
    path: PathBuf,
}

impl FileScoreStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::score_path().unwrap_or_else(|| PathBuf::from("tapr_highscore.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStore for FileScoreStore {
    fn record(&self) -> Option<HighScore> {
        let bytes = fs::read(&self.path).ok()?;
        serde_json::from_slice::<HighScore>(&bytes).ok()
    }

    fn save(&mut self, score: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = HighScore {
            score,
            set_at: Local::now(),
        };
        let data = serde_json::to_vec_pretty(&record).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

/// In-memory store for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    record: Option<HighScore>,
    pub saves: usize,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(score: u32) -> Self {
        Self {
            record: Some(HighScore {
                score,
                set_at: Local::now(),
            }),
            saves: 0,
        }
    }
}

impl ScoreStore for MemoryScoreStore {
    fn record(&self) -> Option<HighScore> {
        self.record.clone()
    }

    fn save(&mut self, score: u32) -> io::Result<()> {
        self.record = Some(HighScore {
            score,
            set_at: Local::now(),
        });
        self.saves += 1;
        Ok(())
    }
}
