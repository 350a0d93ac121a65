use std::sync::Arc;

use tokio::sync::mpsc;

use crate::history::HistoryStore;
use crate::mapping::MappingStore;
use crate::state::RuntimeState;
use crate::token::Token;

/// Shared application state injected into all route handlers via axum::extract::State.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeState>,
    pub mappings: Arc<MappingStore>,
    pub history: Arc<dyn HistoryStore>,
    /// Tokens submitted over the API join the reader queue.
    pub tokens: mpsc::Sender<Token>,
}
