//! ZapScript: the `||`-separated command sequence carried by a token.

pub mod commands;
pub mod keys;
pub mod link;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::platform::{Platform, PlatformError};
use crate::playlist::{Playlist, PlaylistController, PlaylistError};

pub use commands::Command;
pub use keys::{parse_keys, KeySyntaxError};
pub use link::LinkError;

pub const SCRIPT_SEPARATOR: &str = "||";

/// Pause between consecutive key presses.
pub const INPUT_DELAY: Duration = Duration::from_millis(100);

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("no ZapScript to run")]
    EmptyScript,
    #[error("command {0} cannot be run from a remote source")]
    PermissionDenied(&'static str),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid key sequence: {0}")]
    Syntax(#[from] KeySyntaxError),
    #[error("invalid arguments for {command}: {reason}")]
    InvalidArgs {
        command: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("linked script failed: {0}")]
    Linked(Box<ScriptAbort>),
}

/// A script that stopped at a failing command. `effect` folds the commands
/// that completed before it.
#[derive(Debug, thiserror::Error)]
#[error("command {index} failed: {source}")]
pub struct ScriptAbort {
    /// 1-based position of the failing segment.
    pub index: usize,
    pub effect: ScriptEffect,
    #[source]
    pub source: ScriptError,
}

/// What running a command (or a whole script) changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptEffect {
    pub media_changed: bool,
    pub playlist_changed: bool,
    /// The playlist published by the last command that changed it.
    pub playlist: Option<Arc<Playlist>>,
}

impl ScriptEffect {
    pub fn media() -> Self {
        ScriptEffect {
            media_changed: true,
            ..Default::default()
        }
    }

    pub fn playlist(playlist: Option<Arc<Playlist>>) -> Self {
        ScriptEffect {
            playlist_changed: true,
            playlist,
            ..Default::default()
        }
    }

    /// Combine with the effect of a later command.
    pub fn fold(&mut self, next: ScriptEffect) {
        self.media_changed |= next.media_changed;
        if next.playlist_changed {
            self.playlist_changed = true;
            self.playlist = next.playlist;
        }
    }
}

/// Long-lived collaborators shared by every dispatch.
pub struct ScriptContext {
    pub platform: Arc<dyn Platform>,
    pub http: reqwest::Client,
    /// Relative media paths and downloaded media are resolved against this.
    pub games_root: PathBuf,
    pub temp_dir: PathBuf,
    pub media_safe_list: Vec<String>,
}

impl ScriptContext {
    pub fn new(platform: Arc<dyn Platform>, games_root: PathBuf, temp_dir: PathBuf) -> Self {
        ScriptContext {
            platform,
            http: reqwest::Client::new(),
            games_root,
            temp_dir,
            media_safe_list: link::MEDIA_SAFE_LIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Per-dispatch environment.
#[derive(Debug, Clone)]
pub struct ScriptEnv {
    /// Restricted commands refuse to run when set.
    pub unsafe_origin: bool,
    /// Set while running a script fetched from a link. Links inside it are
    /// refused.
    pub linked: bool,
    pub playlists: PlaylistController,
}

/// Split script text into its segments. Empty segments are kept.
pub fn split_script(text: &str) -> impl Iterator<Item = &str> {
    text.split(SCRIPT_SEPARATOR)
}

/// Run every segment of `text` in order, stopping at the first failure.
///
/// Each command sees the playlist published by the commands before it. The
/// returned effect folds the effects of all commands that ran; on failure
/// the fold of the completed commands travels with the error.
pub fn run_script<'a>(
    ctx: &'a ScriptContext,
    env: &'a ScriptEnv,
    text: &'a str,
) -> BoxFuture<'a, Result<ScriptEffect, ScriptAbort>> {
    Box::pin(async move {
        let mut effect = ScriptEffect::default();
        if text.trim().is_empty() {
            return Err(ScriptAbort {
                index: 0,
                effect,
                source: ScriptError::EmptyScript,
            });
        }

        let mut env = env.clone();
        for (n, segment) in split_script(text).enumerate() {
            if segment.trim().is_empty() {
                continue;
            }
            let step = match Command::parse(segment) {
                Ok(command) => {
                    tracing::debug!("running command {} ({}): {}", n + 1, command.name(), segment);
                    commands::execute(ctx, &env, command).await
                }
                Err(e) => Err(e),
            };
            match step {
                Ok(step) => {
                    if step.playlist_changed {
                        env.playlists.active = step.playlist.clone();
                    }
                    effect.fold(step);
                }
                Err(source) => {
                    if let ScriptError::Linked(inner) = &source {
                        effect.fold(inner.effect.clone());
                    }
                    return Err(ScriptAbort {
                        index: n + 1,
                        effect,
                        source,
                    });
                }
            }
        }
        Ok(effect)
    })
}
