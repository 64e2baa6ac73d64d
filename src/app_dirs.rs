use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// State directory under `$HOME/.local/state/tapr`, falling back to the
    /// platform-specific local data directory.
    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("tapr"),
            )
        } else {
            ProjectDirs::from("", "", "tapr").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn score_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("highscore.json"))
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("sessions.db"))
    }
}
