use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::playlist::Playlist;
use crate::readers::Reader;
use crate::token::{Token, TokenSource};

/// Capacity of the notification broadcast. Slow subscribers lag and skip
/// old notifications instead of blocking the state lock.
const NOTIFICATION_CAPACITY: usize = 64;

// ── Notifications ─────────────────────────────────────────────────────────────

/// Token details published with `tokens.added`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenResponse {
    #[serde(rename = "type")]
    pub source: TokenSource,
    pub uid: String,
    pub text: String,
    pub scan_time: Option<DateTime<Utc>>,
}

impl From<&Token> for TokenResponse {
    fn from(t: &Token) -> Self {
        TokenResponse {
            source: t.source,
            uid: t.uid.clone(),
            text: t.text.clone(),
            scan_time: t.scan_time,
        }
    }
}

/// Outbound events for the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum Notification {
    #[serde(rename = "tokens.added")]
    TokensAdded(TokenResponse),
    #[serde(rename = "tokens.removed")]
    TokensRemoved,
    #[serde(rename = "readers.added")]
    ReadersConnected(String),
    #[serde(rename = "readers.removed")]
    ReadersDisconnected(String),
}

// ── Runtime state ─────────────────────────────────────────────────────────────

struct Inner {
    run_zapscript: bool,
    active_token: Token,
    last_scanned: Option<Token>,
    readers: HashMap<String, Box<dyn Reader>>,
    software_token: Option<Token>,
    wrote_token: Option<Token>,
    active_playlist: Option<Arc<Playlist>>,
    stopped: bool,
}

/// Service-wide runtime state shared by the event loop, readers and the API.
///
/// Every field lives behind one lock. Mutators take it exclusively, accessors
/// take it shared. Notifications are sent while the lock is held so their
/// order matches the order of mutations; sending on the broadcast channel
/// never blocks.
pub struct RuntimeState {
    inner: RwLock<Inner>,
    notifications: broadcast::Sender<Notification>,
    cancel: CancellationToken,
}

impl RuntimeState {
    pub fn new(run_zapscript: bool) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        RuntimeState {
            inner: RwLock::new(Inner {
                run_zapscript,
                active_token: Token::removed(),
                last_scanned: None,
                readers: HashMap::new(),
                software_token: None,
                wrote_token: None,
                active_playlist: None,
                stopped: false,
            }),
            notifications,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to outbound notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn notify(&self, n: Notification) {
        // No subscribers is not an error: nothing is listening yet.
        if self.notifications.send(n).is_err() {
            tracing::trace!("notification dropped, no subscribers");
        }
    }

    // ── Tokens ────────────────────────────────────────────────────────────────

    /// Replace the active token. Returns `false` (and does nothing) when the
    /// token is the same scan as the one already active.
    pub fn set_active_token(&self, token: Token) -> bool {
        let mut inner = self.inner.write();
        if inner.active_token.same_scan(&token) {
            return false;
        }

        if token.is_removal() {
            inner.active_token = token;
            self.notify(Notification::TokensRemoved);
        } else {
            let response = TokenResponse::from(&token);
            inner.last_scanned = Some(token.clone());
            inner.active_token = token;
            self.notify(Notification::TokensAdded(response));
        }
        true
    }

    pub fn active_token(&self) -> Token {
        self.inner.read().active_token.clone()
    }

    pub fn last_scanned(&self) -> Option<Token> {
        self.inner.read().last_scanned.clone()
    }

    pub fn set_software_token(&self, token: Option<Token>) {
        self.inner.write().software_token = token;
    }

    pub fn software_token(&self) -> Option<Token> {
        self.inner.read().software_token.clone()
    }

    pub fn set_wrote_token(&self, token: Option<Token>) {
        self.inner.write().wrote_token = token;
    }

    pub fn wrote_token(&self) -> Option<Token> {
        self.inner.read().wrote_token.clone()
    }

    // ── Run toggle ────────────────────────────────────────────────────────────

    pub fn set_run_zapscript(&self, run: bool) {
        self.inner.write().run_zapscript = run;
    }

    pub fn run_zapscript_enabled(&self) -> bool {
        self.inner.read().run_zapscript
    }

    // ── Readers ───────────────────────────────────────────────────────────────

    /// Register a reader under `device`, closing any reader it replaces.
    pub fn set_reader(&self, device: &str, reader: Box<dyn Reader>) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.readers.insert(device.to_string(), reader) {
            if let Err(e) = old.close() {
                tracing::warn!("error closing reader {}: {}", device, e);
            }
        }
        self.notify(Notification::ReadersConnected(device.to_string()));
    }

    /// Close and forget the reader under `device`.
    pub fn remove_reader(&self, device: &str) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.readers.remove(device) {
            if let Err(e) = old.close() {
                tracing::warn!("error closing reader {}: {}", device, e);
            }
        }
        self.notify(Notification::ReadersDisconnected(device.to_string()));
    }

    pub fn has_reader(&self, device: &str) -> bool {
        self.inner.read().readers.contains_key(device)
    }

    /// Connected reader devices, sorted.
    pub fn list_readers(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.inner.read().readers.keys().cloned().collect();
        devices.sort();
        devices
    }

    // ── Playlist ──────────────────────────────────────────────────────────────

    pub fn active_playlist(&self) -> Option<Arc<Playlist>> {
        self.inner.read().active_playlist.clone()
    }

    pub fn set_active_playlist(&self, playlist: Option<Arc<Playlist>>) {
        self.inner.write().active_playlist = playlist;
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// The service-wide cancellation signal. Never reset once cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal shutdown and close every reader.
    pub fn stop_service(&self) {
        let readers: Vec<(String, Box<dyn Reader>)> = {
            let mut inner = self.inner.write();
            inner.stopped = true;
            inner.readers.drain().collect()
        };
        // Readers first: their tokens are children of the service token.
        for (device, reader) in readers {
            if let Err(e) = reader.close() {
                tracing::warn!("error closing reader {}: {}", device, e);
            }
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.read().stopped
    }
}
