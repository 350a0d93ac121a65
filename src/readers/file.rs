use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::readers::{Reader, ReaderError};
use crate::state::RuntimeState;
use crate::token::Token;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A reader backed by a plain text file.
///
/// Writing text to the file is a scan of a token whose UID and payload are the
/// trimmed contents. Emptying or deleting the file removes the token.
pub struct FileReader {
    device: String,
    cancel: CancellationToken,
}

impl Reader for FileReader {
    fn device(&self) -> &str {
        &self.device
    }

    fn close(&self) -> Result<(), ReaderError> {
        if self.cancel.is_cancelled() {
            return Err(ReaderError::Closed(self.device.clone()));
        }
        self.cancel.cancel();
        Ok(())
    }
}

pub fn device_name(path: &Path) -> String {
    format!("file:{}", path.display())
}

/// Spawn the polling task for `path` and return its handle.
///
/// The task stops when the handle is closed or the service is cancelled.
pub fn spawn(path: PathBuf, state: Arc<RuntimeState>, queue: mpsc::Sender<Token>) -> FileReader {
    let cancel = state.cancellation().child_token();
    let reader = FileReader {
        device: device_name(&path),
        cancel: cancel.clone(),
    };
    tokio::spawn(poll(path, state, queue, cancel));
    reader
}

async fn read_contents(path: &Path) -> std::io::Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

async fn poll(
    path: PathBuf,
    state: Arc<RuntimeState>,
    queue: mpsc::Sender<Token>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last = String::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("file reader {} stopped", path.display());
                return;
            }

            _ = ticker.tick() => {
                let contents = match read_contents(&path).await {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::debug!("file reader {}: {}", path.display(), e);
                        continue;
                    }
                };
                if contents == last {
                    continue;
                }
                last = contents.clone();

                if contents.is_empty() {
                    state.set_active_token(Token::removed());
                    continue;
                }

                let token = Token::scanned(contents.clone(), contents);
                if state.set_active_token(token.clone()) && queue.send(token).await.is_err() {
                    tracing::debug!("token queue closed, file reader exiting");
                    return;
                }
            }
        }
    }
}
