use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Reader,
    Playlist,
    Api,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Reader => "reader",
            TokenSource::Playlist => "playlist",
            TokenSource::Api => "api",
        }
    }
}

/// A single scan or launch event.
///
/// Tokens are never mutated after construction. Two tokens describe the same
/// scan when their UID, payload and source match (see [`Token::same_scan`]);
/// the scan time is deliberately excluded so a token left on a reader does not
/// re-trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub source: TokenSource,
    pub uid: String,
    /// Free-text payload read from the medium (or submitted over the API).
    pub text: String,
    /// `None` marks a removal event: the medium left the reader.
    pub scan_time: Option<DateTime<Utc>>,
    /// Submitted through the control API rather than scanned.
    pub from_api: bool,
    /// Set for non-local origins; restricted commands refuse to run.
    pub unsafe_origin: bool,
}

impl Token {
    /// A fresh scan from a physical reader, stamped with the current time.
    pub fn scanned(uid: impl Into<String>, text: impl Into<String>) -> Self {
        Token {
            source: TokenSource::Reader,
            uid: uid.into(),
            text: text.into(),
            scan_time: Some(Utc::now()),
            from_api: false,
            unsafe_origin: false,
        }
    }

    /// The synthetic token launched when a playlist advances.
    pub fn from_playlist(path: impl Into<String>) -> Self {
        Token {
            source: TokenSource::Playlist,
            uid: String::new(),
            text: path.into(),
            scan_time: Some(Utc::now()),
            from_api: false,
            unsafe_origin: false,
        }
    }

    /// A token submitted over the control API. `local` is true when the
    /// request came from the same machine.
    pub fn from_api(uid: impl Into<String>, text: impl Into<String>, local: bool) -> Self {
        Token {
            source: TokenSource::Api,
            uid: uid.into(),
            text: text.into(),
            scan_time: Some(Utc::now()),
            from_api: true,
            unsafe_origin: !local,
        }
    }

    /// A removal marker for the active token slot.
    pub fn removed() -> Self {
        Token {
            source: TokenSource::Reader,
            uid: String::new(),
            text: String::new(),
            scan_time: None,
            from_api: false,
            unsafe_origin: false,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.scan_time.is_none()
    }

    /// De-duplication rule: same UID, payload and source.
    pub fn same_scan(&self, other: &Token) -> bool {
        self.uid == other.uid && self.text == other.text && self.source == other.source
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.same_scan(other)
    }
}

impl Eq for Token {}
