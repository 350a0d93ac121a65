//! Service lifecycle: wires state, mappings, history, readers, the event loop
//! and the HTTP control surface together.

pub mod event_loop;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::api::{self, state::AppState};
use crate::config::Config;
use crate::history::{HistoryError, HistoryStore, JsonlHistory};
use crate::mapping::{MappingError, MappingStore};
use crate::platform::Platform;
use crate::playlist::PlaylistUpdate;
use crate::readers;
use crate::service::event_loop::Pipeline;
use crate::state::RuntimeState;
use crate::token::Token;
use crate::zapscript::ScriptContext;

const TOKEN_QUEUE_SIZE: usize = 32;
const PLAYLIST_QUEUE_SIZE: usize = 8;

/// How long `stop` waits for each group of tasks to finish.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// A running service.
pub struct Service {
    pipeline: Arc<Pipeline>,
    tokens: mpsc::Sender<Token>,
    event_loop: JoinHandle<()>,
    server: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl Service {
    /// Start with the JSON-lines history store under the data directory.
    pub async fn start(config: &Config, platform: Arc<dyn Platform>) -> Result<Self, ServiceError> {
        create_dir(&config.data_dir)?;
        let history = JsonlHistory::open(&config.history_path())?;
        tracing::info!("history: {}", history.path().display());
        Self::start_with_history(config, platform, Arc::new(history)).await
    }

    pub async fn start_with_history(
        config: &Config,
        platform: Arc<dyn Platform>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self, ServiceError> {
        tracing::info!("starting service (platform: {})", platform.id());
        for dir in [config.data_dir.clone(), config.temp_dir.clone(), config.mappings_dir()] {
            create_dir(&dir)?;
        }

        let mappings = Arc::new(MappingStore::load(
            config.mappings.clone(),
            Some(config.mappings_dir()),
        )?);
        let state = Arc::new(RuntimeState::new(config.run_zapscript));

        let (token_tx, token_rx) = mpsc::channel::<Token>(TOKEN_QUEUE_SIZE);
        let (playlist_tx, playlist_rx) = mpsc::channel::<PlaylistUpdate>(PLAYLIST_QUEUE_SIZE);
        let (last_launched_tx, last_launched_rx) = watch::channel(None);

        // Bind before spawning anything so a port clash fails cleanly.
        let host = if config.localhost { "127.0.0.1" } else { "0.0.0.0" };
        let addr = format!("{}:{}", host, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServiceError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServiceError::Bind { addr, source })?;

        let pipeline = Arc::new(Pipeline {
            state: Arc::clone(&state),
            mappings: Arc::clone(&mappings),
            history: Arc::clone(&history),
            scripts: Arc::new(ScriptContext::new(
                platform,
                config.games_root.clone(),
                config.temp_dir.clone(),
            )),
            playlist_queue: playlist_tx,
            last_launched: last_launched_tx,
            tasks: TaskTracker::new(),
        });

        pipeline.tasks.spawn(event_loop::observe_last_launched(
            Arc::clone(&state),
            last_launched_rx,
        ));
        readers::start_readers(&config.readers, &state, &token_tx);
        let event_loop = tokio::spawn(event_loop::run(
            Arc::clone(&pipeline),
            token_rx,
            playlist_rx,
        ));

        let app = api::build_router(AppState {
            runtime: Arc::clone(&state),
            mappings,
            history,
            tokens: token_tx.clone(),
        });
        let shutdown = state.cancellation();
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .unwrap_or_else(|e| tracing::error!("HTTP server error: {}", e));
        });

        tracing::info!("control API listening on http://{}", local_addr);
        Ok(Service {
            pipeline,
            tokens: token_tx,
            event_loop,
            server,
            local_addr,
        })
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.pipeline.state
    }

    pub fn mappings(&self) -> &Arc<MappingStore> {
        &self.pipeline.mappings
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender for the token queue, as used by readers.
    pub fn token_sender(&self) -> mpsc::Sender<Token> {
        self.tokens.clone()
    }

    /// Sender for the playlist queue.
    pub fn playlist_sender(&self) -> mpsc::Sender<PlaylistUpdate> {
        self.pipeline.playlist_queue.clone()
    }

    /// Cancel everything, close readers and wait (bounded) for the event
    /// loop, in-flight dispatches and the HTTP server to finish.
    pub async fn stop(self) {
        tracing::info!("stopping service");
        self.pipeline.state.stop_service();

        if tokio::time::timeout(SHUTDOWN_GRACE, self.event_loop).await.is_err() {
            tracing::warn!("event loop did not exit within {:?}", SHUTDOWN_GRACE);
        }

        let tasks = &self.pipeline.tasks;
        tasks.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, tasks.wait()).await.is_err() {
            tracing::warn!(
                "{} dispatch tasks still running after {:?}",
                tasks.len(),
                SHUTDOWN_GRACE
            );
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.server).await.is_err() {
            tracing::warn!("HTTP server did not shut down within {:?}", SHUTDOWN_GRACE);
        }
        tracing::info!("service stopped");
    }
}

fn create_dir(path: &std::path::Path) -> Result<(), ServiceError> {
    std::fs::create_dir_all(path).map_err(|source| ServiceError::CreateDir {
        path: path.to_owned(),
        source,
    })
}
