pub mod file;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::ReaderConfig;
use crate::state::RuntimeState;
use crate::token::Token;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("reader I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reader already closed: {0}")]
    Closed(String),
}

/// Handle to a connected token reader. Drivers push scans into the token
/// queue on their own task; the handle only identifies and closes them.
pub trait Reader: Send + Sync {
    /// Device key the reader is registered under.
    fn device(&self) -> &str;

    /// Stop the reader. Closing twice reports [`ReaderError::Closed`].
    fn close(&self) -> Result<(), ReaderError>;
}

/// Start every configured reader and register it in runtime state.
pub fn start_readers(
    configs: &[ReaderConfig],
    state: &Arc<RuntimeState>,
    queue: &mpsc::Sender<Token>,
) {
    for cfg in configs {
        match cfg {
            ReaderConfig::File { path } => {
                let reader = file::spawn(path.clone(), Arc::clone(state), queue.clone());
                tracing::info!("reader connected: {}", reader.device());
                let device = reader.device().to_string();
                state.set_reader(&device, Box::new(reader));
            }
        }
    }
}
