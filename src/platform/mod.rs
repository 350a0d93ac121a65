pub mod command;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::token::Token;

/// A way of launching media for one system.
///
/// `command` and `system_command` are argv templates. `{path}` is replaced by
/// the media path and `{system}` by the system id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Launcher {
    pub id: String,
    pub system: String,
    /// Folder names (relative to a games root) holding this system's media.
    #[serde(default)]
    pub folders: Vec<String>,
    /// File extensions including the dot, e.g. `.nes`.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub system_command: Vec<String>,
}

impl Launcher {
    fn matches_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    fn matches_folder(&self, path: &Path) -> bool {
        path.components().any(|c| {
            let c = c.as_os_str().to_string_lossy();
            self.folders.iter().any(|f| f.eq_ignore_ascii_case(&c))
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("no launcher found for {0}")]
    NoLauncher(String),
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error("platform call did not complete: {0}")]
    Task(String),
    #[error("platform I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("platform encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Capabilities the script dispatcher needs from the host platform.
///
/// Every call may fail; a failure aborts the rest of the running script.
/// The dispatcher makes these calls from tokio's blocking pool, so an
/// implementation may wait on external processes.
pub trait Platform: Send + Sync {
    fn id(&self) -> &str;

    fn launchers(&self) -> &[Launcher];

    /// Press a single named key.
    fn keyboard_press(&self, key: &str) -> Result<(), PlatformError>;

    /// Send a raw keyboard code (legacy `input.key`, coin inserts).
    fn keyboard_input(&self, code: &str) -> Result<(), PlatformError> {
        self.keyboard_press(code)
    }

    fn gamepad_press(&self, button: &str) -> Result<(), PlatformError>;

    /// Start a system without media.
    fn launch_system(&self, system: &str) -> Result<(), PlatformError>;

    fn launch_media(&self, path: &Path) -> Result<(), PlatformError>;

    fn stop_active_launcher(&self) -> Result<(), PlatformError>;

    /// Called for every scanned token before it is dispatched.
    fn after_scan_hook(&self, token: &Token) -> Result<(), PlatformError>;

    /// Find the launcher for a media path: a launcher whose folder appears in
    /// the path and whose extension matches wins, then any extension match.
    fn path_to_launcher(&self, path: &Path) -> Option<&Launcher> {
        let launchers = self.launchers();
        launchers
            .iter()
            .find(|l| l.matches_folder(path) && (l.extensions.is_empty() || l.matches_extension(path)))
            .or_else(|| launchers.iter().find(|l| l.matches_extension(path)))
    }

    /// Launchers able to run `system`, in configured order.
    fn system_launchers(&self, system: &str) -> Vec<&Launcher> {
        self.launchers()
            .iter()
            .filter(|l| l.system.eq_ignore_ascii_case(system))
            .collect()
    }
}
