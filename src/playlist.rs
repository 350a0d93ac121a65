use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::token::Token;

/// A single playlist entry. `path` is handed to the dispatcher as the token
/// payload when the entry is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistItem {
    pub path: String,
    pub name: String,
}

/// An ordered, non-empty media sequence with a cursor and play state.
///
/// Playlists are published as `Arc<Playlist>` and never edited in place:
/// every transition returns a new value so holders of an older reference
/// always see a consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub items: Vec<PlaylistItem>,
    pub index: usize,
    pub playing: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("playlist has no items")]
    Empty,
    #[error("playlist index {index} out of range (1..={len})")]
    OutOfRange { index: usize, len: usize },
    #[error("no active playlist")]
    NoActive,
    #[error("playlist folder does not exist: {0}")]
    MissingFolder(PathBuf),
    #[error("playlist queue closed")]
    QueueClosed,
}

impl Playlist {
    pub fn new(name: impl Into<String>, items: Vec<PlaylistItem>) -> Result<Self, PlaylistError> {
        if items.is_empty() {
            return Err(PlaylistError::Empty);
        }
        Ok(Playlist {
            id: Uuid::new_v4(),
            name: name.into(),
            items,
            index: 0,
            playing: false,
        })
    }

    /// Build a playlist from every file below `folder`, sorted by path.
    pub fn from_folder(folder: &Path) -> Result<Self, PlaylistError> {
        if !folder.is_dir() {
            return Err(PlaylistError::MissingFolder(folder.to_owned()));
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(folder)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) if e.file_type().is_file() => Some(e.into_path()),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("Cannot access playlist entry: {}", e);
                    None
                }
            })
            .collect();
        paths.sort();

        let items = paths
            .into_iter()
            .map(|p| PlaylistItem {
                name: p
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string(),
                path: p.to_string_lossy().into_owned(),
            })
            .collect();
        let name = folder
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("playlist");
        Playlist::new(name, items)
    }

    /// The entry under the cursor.
    pub fn current(&self) -> &PlaylistItem {
        &self.items[self.index]
    }

    pub fn next(&self) -> Playlist {
        let mut p = self.clone();
        p.index = (self.index + 1) % self.items.len();
        p
    }

    pub fn previous(&self) -> Playlist {
        let mut p = self.clone();
        p.index = if self.index == 0 {
            self.items.len() - 1
        } else {
            self.index - 1
        };
        p
    }

    /// Move the cursor to a 1-based position.
    pub fn goto(&self, position: usize) -> Result<Playlist, PlaylistError> {
        if position == 0 || position > self.items.len() {
            return Err(PlaylistError::OutOfRange {
                index: position,
                len: self.items.len(),
            });
        }
        let mut p = self.clone();
        p.index = position - 1;
        Ok(p)
    }

    pub fn play(&self) -> Playlist {
        let mut p = self.clone();
        p.playing = true;
        p
    }

    pub fn pause(&self) -> Playlist {
        let mut p = self.clone();
        p.playing = false;
        p
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

/// A playlist update travelling to the event loop. `None` clears the playlist.
pub type PlaylistUpdate = Option<Arc<Playlist>>;

/// Outcome of applying an update to the active playlist.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Update was redundant; nothing changes.
    Unchanged,
    /// Active playlist becomes `playlist` (possibly `None`). When `launch` is
    /// set the current entry must be dispatched.
    Install {
        playlist: PlaylistUpdate,
        launch: Option<Token>,
    },
}

/// Decide what an incoming update does to the active playlist.
///
/// States are Empty (`active == None`), Loaded-Paused and Loaded-Playing.
/// An update with the same current entry and play flag as the active one is
/// suppressed so that re-publishing a playlist never relaunches media.
pub fn transition(active: Option<&Arc<Playlist>>, update: PlaylistUpdate) -> Transition {
    let Some(next) = update else {
        if active.is_some() {
            tracing::info!("clearing playlist");
        }
        return Transition::Install {
            playlist: None,
            launch: None,
        };
    };

    if let Some(active) = active {
        if next.current() == active.current() && next.playing == active.playing {
            tracing::debug!("playlist current entry unchanged, skipping");
            return Transition::Unchanged;
        }
    }

    let launch = next
        .playing
        .then(|| Token::from_playlist(next.current().path.clone()));
    match (&launch, active.is_some()) {
        (Some(_), false) => tracing::info!("setting new playlist {}, launching", next.name),
        (None, false) => tracing::info!("setting new playlist {}", next.name),
        (Some(_), true) => tracing::info!("updating playlist {}, launching", next.name),
        (None, true) => tracing::info!("updating playlist {}", next.name),
    }
    Transition::Install {
        playlist: Some(next),
        launch,
    }
}

/// The view of playlists handed to script commands: the snapshot active when
/// dispatch started and the queue used to publish replacements.
#[derive(Debug, Clone)]
pub struct PlaylistController {
    pub active: Option<Arc<Playlist>>,
    pub queue: mpsc::Sender<PlaylistUpdate>,
}

impl PlaylistController {
    pub fn new(active: Option<Arc<Playlist>>, queue: mpsc::Sender<PlaylistUpdate>) -> Self {
        PlaylistController { active, queue }
    }

    pub fn require_active(&self) -> Result<&Arc<Playlist>, PlaylistError> {
        self.active.as_ref().ok_or(PlaylistError::NoActive)
    }

    /// Send an update to the event loop.
    pub async fn publish(&self, update: PlaylistUpdate) -> Result<(), PlaylistError> {
        self.queue
            .send(update)
            .await
            .map_err(|_| PlaylistError::QueueClosed)
    }
}
