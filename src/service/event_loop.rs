use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::task::TaskTracker;

use crate::history::{HistoryEntry, HistoryStore};
use crate::mapping::MappingStore;
use crate::playlist::{self, PlaylistController, PlaylistUpdate, Transition};
use crate::state::RuntimeState;
use crate::token::Token;
use crate::zapscript::{self, ScriptAbort, ScriptContext, ScriptEffect, ScriptEnv};

/// Everything a dispatch task needs, shared between the event loop and the
/// tasks it spawns.
pub struct Pipeline {
    pub state: Arc<RuntimeState>,
    pub mappings: Arc<MappingStore>,
    pub history: Arc<dyn HistoryStore>,
    pub scripts: Arc<ScriptContext>,
    pub playlist_queue: mpsc::Sender<PlaylistUpdate>,
    /// Latest token whose script changed the running media.
    pub last_launched: watch::Sender<Option<Token>>,
    /// In-flight dispatch tasks, drained at shutdown.
    pub tasks: TaskTracker,
}

impl Pipeline {
    /// Resolve `token` to script text and run it.
    ///
    /// On failure the effect of the commands that completed is still
    /// returned with the error.
    pub async fn launch_token(&self, token: &Token) -> (String, Result<ScriptEffect, ScriptAbort>) {
        let (script, mapped) = self.mappings.resolve(token);
        if mapped {
            tracing::info!("found mapping: {}", script);
        }
        tracing::info!("launching ZapScript: {}", script);

        let env = ScriptEnv {
            unsafe_origin: token.unsafe_origin,
            linked: false,
            playlists: PlaylistController::new(
                self.state.active_playlist(),
                self.playlist_queue.clone(),
            ),
        };
        let result = zapscript::run_script(&self.scripts, &env, &script).await;

        let effect = match &result {
            Ok(effect) => effect,
            Err(abort) => &abort.effect,
        };
        if effect.media_changed && !token.from_api {
            tracing::info!("current media launched set to: {}", token.uid);
            self.last_launched.send_replace(Some(token.clone()));
        }
        (script, result)
    }

    /// Dispatch `token` and record the outcome in history. The dispatch runs
    /// on its own task so a panic still leaves a failed record.
    async fn launch_and_record(self: Arc<Self>, token: Token) {
        let mut entry = HistoryEntry::pending(&token);
        let pipeline = Arc::clone(&self);
        let dispatch = tokio::spawn(async move { pipeline.launch_token(&token).await });
        match dispatch.await {
            Ok((script, result)) => {
                entry.script = Some(script);
                entry.success = match result {
                    Ok(_) => true,
                    Err(abort) => {
                        tracing::error!("error launching token: {}", abort);
                        false
                    }
                };
            }
            Err(e) => tracing::error!("dispatch task failed: {}", e),
        }
        self.record(entry);
    }

    fn record(&self, entry: HistoryEntry) {
        if let Err(e) = self.history.append(entry) {
            tracing::error!("error adding history: {}", e);
        }
    }

    fn spawn_launch(self: &Arc<Self>, token: Token) {
        self.tasks.spawn(Arc::clone(self).launch_and_record(token));
    }

    /// Apply a playlist update and launch the current entry when it calls
    /// for it.
    pub fn handle_playlist(self: &Arc<Self>, update: PlaylistUpdate) {
        let active = self.state.active_playlist();
        match playlist::transition(active.as_ref(), update) {
            Transition::Unchanged => {}
            Transition::Install { playlist, launch } => {
                self.state.set_active_playlist(playlist);
                if let Some(token) = launch {
                    self.spawn_launch(token);
                }
            }
        }
    }

    /// Process a token taken off the token queue.
    pub fn handle_token(self: &Arc<Self>, token: Token) {
        if token.is_removal() {
            return;
        }
        tracing::info!(
            "processing token: source={} uid={} text={}",
            token.source.as_str(),
            token.uid,
            token.text
        );

        if let Err(e) = self.scripts.platform.after_scan_hook(&token) {
            tracing::error!("error writing tmp scan result: {}", e);
        }

        if !self.state.run_zapscript_enabled() {
            tracing::debug!("ZapScript disabled, skipping run");
            self.record(HistoryEntry::pending(&token));
            return;
        }

        self.spawn_launch(token);
    }
}

/// Serialize token and playlist events until the service is cancelled.
///
/// When several sources are ready at once, cancellation wins, then playlist
/// updates, then tokens.
pub async fn run(
    pipeline: Arc<Pipeline>,
    mut tokens: mpsc::Receiver<Token>,
    mut playlists: mpsc::Receiver<PlaylistUpdate>,
) {
    let cancel = pipeline.state.cancellation();
    tracing::debug!("event loop started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("exiting event loop via cancellation");
                break;
            }

            Some(update) = playlists.recv() => pipeline.handle_playlist(update),

            Some(token) = tokens.recv() => pipeline.handle_token(token),

            else => {
                tracing::debug!("all event queues closed, exiting event loop");
                break;
            }
        }
    }
}

/// Mirror the last launched token into runtime state.
pub async fn observe_last_launched(
    state: Arc<RuntimeState>,
    mut last_launched: watch::Receiver<Option<Token>>,
) {
    let cancel = state.cancellation();
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            changed = last_launched.changed() => {
                if changed.is_err() {
                    break;
                }
                let token = last_launched.borrow_and_update().clone();
                state.set_software_token(token);
            }
        }
    }
}
