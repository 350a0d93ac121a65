//! Online links: URLs on a token that point at a ZapLink document.

use std::path::{Path, PathBuf};

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::zapscript::ScriptContext;

pub const ZAPLINK_MIME: &str = "application/vnd.zaparoo.link";

/// URL prefixes media downloads are allowed from.
pub const MEDIA_SAFE_LIST: &[&str] = &["https://cdn.zaparoo.com", "https://secure.cdn.zaparoo.com"];

const LOADER_ARGS_FILE: &str = "loader.json";
const LOADER_COMPLETE_FILE: &str = ".loader-complete";

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("link returned status {0}")]
    Status(StatusCode),
    #[error("link response has no content type")]
    MissingContentType,
    #[error("link content type {0} is not supported")]
    ContentType(String),
    #[error("failed to read link body: {0}")]
    Body(reqwest::Error),
    #[error("malformed link body: {0}")]
    Malformed(serde_json::Error),
    #[error("link {0} found inside a linked script")]
    Nested(String),
    #[error("link has no actions")]
    NoActions,
    #[error("unknown link action: {0}")]
    UnknownAction(String),
    #[error("invalid params for {method} action: {source}")]
    Params {
        method: &'static str,
        source: serde_json::Error,
    },
    #[error("media download url is empty")]
    MissingUrl,
    #[error("media download not in safe list: {0}")]
    NotSafe(String),
    #[error("invalid media url: {0}")]
    InvalidUrl(String),
    #[error("no launchers for system {0}")]
    NoLauncher(String),
    #[error("launcher {0} has no folders")]
    NoFolder(String),
    #[error("media download returned status {0}")]
    DownloadStatus(StatusCode),
    #[error("media I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode loader args: {0}")]
    Loader(serde_json::Error),
}

/// The document served for a ZapLink URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZapLink {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub actions: Vec<ZapLinkAction>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZapLinkAction {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ZapScriptParams {
    zapscript: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaParams {
    pub name: String,
    pub system: String,
    pub url: Option<String>,
}

/// What a link asks the dispatcher to do.
#[derive(Debug, Clone)]
pub enum LinkAction {
    /// Run embedded script text as an untrusted script.
    ZapScript(String),
    /// Install (if needed) and launch a media file.
    Media(MediaParams),
}

pub fn is_link(segment: &str) -> bool {
    segment.starts_with("http://") || segment.starts_with("https://")
}

/// Fetch `url` and decode its first action. Later actions are ignored.
pub async fn fetch(ctx: &ScriptContext, url: &str) -> Result<LinkAction, LinkError> {
    tracing::info!("checking link: {}", url);

    let response = ctx.http.get(url).header(ACCEPT, ZAPLINK_MIME).send().await?;
    if response.status() != StatusCode::OK {
        return Err(LinkError::Status(response.status()));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if content_type.is_empty() {
        return Err(LinkError::MissingContentType);
    }
    if !content_type.contains(ZAPLINK_MIME) {
        return Err(LinkError::ContentType(content_type));
    }

    let body = response.bytes().await.map_err(LinkError::Body)?;
    let link: ZapLink = serde_json::from_slice(&body).map_err(LinkError::Malformed)?;
    let action = link.actions.into_iter().next().ok_or(LinkError::NoActions)?;

    match action.method.to_lowercase().as_str() {
        "zapscript" => {
            let params: ZapScriptParams = serde_json::from_value(action.params)
                .map_err(|source| LinkError::Params {
                    method: "zapscript",
                    source,
                })?;
            Ok(LinkAction::ZapScript(params.zapscript))
        }
        "media" => {
            let params: MediaParams =
                serde_json::from_value(action.params).map_err(|source| LinkError::Params {
                    method: "media",
                    source,
                })?;
            Ok(LinkAction::Media(params))
        }
        _ => Err(LinkError::UnknownAction(action.method)),
    }
}

#[derive(Serialize)]
struct LoaderArgs<'a> {
    text: String,
    complete: &'a Path,
}

/// `url` is `prefix` itself or lies below it at a path boundary, so
/// `https://cdn.example.com.evil/` does not pass for `https://cdn.example.com`.
fn is_under(url: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match url.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Make sure the media referenced by a link exists locally and return its
/// path. The file lands in the first folder of the first launcher for the
/// system, below the games root.
pub async fn install_media(ctx: &ScriptContext, params: &MediaParams) -> Result<PathBuf, LinkError> {
    let url = params.url.as_deref().ok_or(LinkError::MissingUrl)?;
    if !ctx.media_safe_list.iter().any(|safe| is_under(url, safe)) {
        return Err(LinkError::NotSafe(url.to_string()));
    }

    let launchers = ctx.platform.system_launchers(&params.system);
    let launcher = launchers
        .first()
        .ok_or_else(|| LinkError::NoLauncher(params.system.clone()))?;
    let folder = launcher
        .folders
        .first()
        .ok_or_else(|| LinkError::NoFolder(launcher.id.clone()))?;

    let file_name = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments()?.last().map(str::to_string))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| LinkError::InvalidUrl(url.to_string()))?;
    let path = ctx.games_root.join(folder).join(file_name);
    tracing::debug!("media path: {}", path.display());

    if tokio::fs::try_exists(&path).await? {
        return Ok(path);
    }

    tracing::info!("downloading media: {}", url);
    let loader = show_loader(&ctx.temp_dir, &params.name).await?;
    let result = download(ctx, url, &path).await;
    hide_loader(&loader).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&path).await;
    }
    result.map(|_| path)
}

async fn download(ctx: &ScriptContext, url: &str, path: &Path) -> Result<(), LinkError> {
    let response = ctx.http.get(url).send().await?;
    if response.status() != StatusCode::OK {
        return Err(LinkError::DownloadStatus(response.status()));
    }
    let bytes = response.bytes().await?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    tracing::info!("downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

struct Loader {
    args_path: PathBuf,
    complete_path: PathBuf,
}

/// Write the loader side file picked up by the UI while a download runs.
async fn show_loader(temp_dir: &Path, name: &str) -> Result<Loader, LinkError> {
    tokio::fs::create_dir_all(temp_dir).await?;
    let loader = Loader {
        args_path: temp_dir.join(LOADER_ARGS_FILE),
        complete_path: temp_dir.join(LOADER_COMPLETE_FILE),
    };
    let args = LoaderArgs {
        text: format!("Downloading {name}..."),
        complete: &loader.complete_path,
    };
    let json = serde_json::to_vec(&args).map_err(LinkError::Loader)?;
    tokio::fs::write(&loader.args_path, json).await?;
    Ok(loader)
}

async fn hide_loader(loader: &Loader) {
    if let Err(e) = tokio::fs::remove_file(&loader.args_path).await {
        tracing::warn!("error removing loader args: {}", e);
    }
    if let Err(e) = tokio::fs::write(&loader.complete_path, b"").await {
        tracing::warn!("error writing loader complete file: {}", e);
    }
}
