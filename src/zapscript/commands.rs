use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::platform::{Platform, PlatformError};
use crate::playlist::Playlist;
use crate::zapscript::link::{self, LinkAction, LinkError};
use crate::zapscript::{
    parse_keys, run_script, ScriptContext, ScriptEffect, ScriptEnv, ScriptError, INPUT_DELAY,
};

const COMMAND_PREFIX: &str = "**";

/// Most coins a single coin command may insert.
pub const MAX_COINS: usize = 99;

/// One parsed script segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Launch(&'a str),
    LaunchSystem(&'a str),
    Stop,
    Delay(&'a str),
    Keyboard(&'a str),
    Gamepad(&'a str),
    Key(&'a str),
    CoinP1(&'a str),
    CoinP2(&'a str),
    PlaylistPlay(&'a str),
    PlaylistLoad(&'a str),
    PlaylistNext,
    PlaylistPrevious,
    PlaylistGoto(&'a str),
    PlaylistPause,
    PlaylistStop,
    HttpGet(&'a str),
    HttpPost(&'a str),
    Link(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a segment. `**name:args` is a named command, a URL is an online
    /// link and anything else is a media path to launch.
    pub fn parse(segment: &'a str) -> Result<Self, ScriptError> {
        let segment = segment.trim();
        let Some(body) = segment.strip_prefix(COMMAND_PREFIX) else {
            return Ok(if link::is_link(segment) {
                Command::Link(segment)
            } else {
                Command::Launch(segment)
            });
        };

        let (name, args) = body.split_once(':').unwrap_or((body, ""));
        let command = match name.trim().to_ascii_lowercase().as_str() {
            "launch" => Command::Launch(args),
            "launch.system" => Command::LaunchSystem(args),
            "stop" => Command::Stop,
            "delay" => Command::Delay(args),
            "input.keyboard" => Command::Keyboard(args),
            "input.gamepad" => Command::Gamepad(args),
            "input.key" => Command::Key(args),
            "input.coinp1" => Command::CoinP1(args),
            "input.coinp2" => Command::CoinP2(args),
            "playlist.play" => Command::PlaylistPlay(args),
            "playlist.load" => Command::PlaylistLoad(args),
            "playlist.next" => Command::PlaylistNext,
            "playlist.previous" => Command::PlaylistPrevious,
            "playlist.goto" => Command::PlaylistGoto(args),
            "playlist.pause" => Command::PlaylistPause,
            "playlist.stop" => Command::PlaylistStop,
            "http.get" => Command::HttpGet(args),
            "http.post" => Command::HttpPost(args),
            _ => return Err(ScriptError::UnknownCommand(name.to_string())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Launch(_) => "launch",
            Command::LaunchSystem(_) => "launch.system",
            Command::Stop => "stop",
            Command::Delay(_) => "delay",
            Command::Keyboard(_) => "input.keyboard",
            Command::Gamepad(_) => "input.gamepad",
            Command::Key(_) => "input.key",
            Command::CoinP1(_) => "input.coinp1",
            Command::CoinP2(_) => "input.coinp2",
            Command::PlaylistPlay(_) => "playlist.play",
            Command::PlaylistLoad(_) => "playlist.load",
            Command::PlaylistNext => "playlist.next",
            Command::PlaylistPrevious => "playlist.previous",
            Command::PlaylistGoto(_) => "playlist.goto",
            Command::PlaylistPause => "playlist.pause",
            Command::PlaylistStop => "playlist.stop",
            Command::HttpGet(_) => "http.get",
            Command::HttpPost(_) => "http.post",
            Command::Link(_) => "link",
        }
    }

    /// Raw input commands only run for tokens scanned on this machine.
    pub fn is_restricted(&self) -> bool {
        matches!(
            self,
            Command::Keyboard(_)
                | Command::Gamepad(_)
                | Command::Key(_)
                | Command::CoinP1(_)
                | Command::CoinP2(_)
        )
    }
}

fn invalid(command: &Command<'_>, reason: impl Into<String>) -> ScriptError {
    ScriptError::InvalidArgs {
        command: command.name(),
        reason: reason.into(),
    }
}

fn media_path(ctx: &ScriptContext, arg: &str) -> PathBuf {
    let path = Path::new(arg.trim());
    if path.is_relative() {
        ctx.games_root.join(path)
    } else {
        path.to_owned()
    }
}

/// Run a platform call on the blocking pool. Platform actions may wait on
/// external processes.
async fn on_platform<T, F>(ctx: &ScriptContext, call: F) -> Result<T, ScriptError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Platform) -> Result<T, PlatformError> + Send + 'static,
{
    let platform = Arc::clone(&ctx.platform);
    let result = tokio::task::spawn_blocking(move || call(platform.as_ref()))
        .await
        .map_err(|e| PlatformError::Task(e.to_string()))?;
    Ok(result?)
}

type Press = fn(&dyn Platform, &str) -> Result<(), PlatformError>;

/// Press each key in turn with [`INPUT_DELAY`] between presses.
async fn press_sequence<I>(ctx: &ScriptContext, keys: I, press: Press) -> Result<(), ScriptError>
where
    I: IntoIterator<Item = String>,
{
    for (n, key) in keys.into_iter().enumerate() {
        if n > 0 {
            tokio::time::sleep(INPUT_DELAY).await;
        }
        on_platform(ctx, move |p| press(p, &key)).await?;
    }
    Ok(())
}

/// Run one command.
pub async fn execute(
    ctx: &ScriptContext,
    env: &ScriptEnv,
    command: Command<'_>,
) -> Result<ScriptEffect, ScriptError> {
    if command.is_restricted() && env.unsafe_origin {
        return Err(ScriptError::PermissionDenied(command.name()));
    }

    match command {
        Command::Launch(path) => {
            if path.trim().is_empty() {
                return Err(invalid(&command, "missing media path"));
            }
            let path = media_path(ctx, path);
            on_platform(ctx, move |p| p.launch_media(&path)).await?;
            Ok(ScriptEffect::media())
        }
        Command::LaunchSystem(system) => {
            let system = system.trim();
            if system.is_empty() {
                return Err(invalid(&command, "missing system id"));
            }
            let system = system.to_string();
            on_platform(ctx, move |p| p.launch_system(&system)).await?;
            Ok(ScriptEffect::media())
        }
        Command::Stop => {
            on_platform(ctx, |p| p.stop_active_launcher()).await?;
            Ok(ScriptEffect::default())
        }
        Command::Delay(ms) => {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|e| invalid(&command, format!("{ms:?}: {e}")))?;
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok(ScriptEffect::default())
        }
        Command::Keyboard(args) => {
            let keys = parse_keys(args)?;
            press_sequence(ctx, keys, |p, k| p.keyboard_press(k)).await?;
            Ok(ScriptEffect::default())
        }
        Command::Gamepad(args) => {
            let buttons = parse_keys(args)?;
            press_sequence(ctx, buttons, |p, b| p.gamepad_press(b)).await?;
            Ok(ScriptEffect::default())
        }
        Command::Key(code) => {
            let code = code.trim();
            if code.is_empty() {
                return Err(invalid(&command, "missing key code"));
            }
            let code = code.to_string();
            on_platform(ctx, move |p| p.keyboard_input(&code)).await?;
            Ok(ScriptEffect::default())
        }
        Command::CoinP1(count) | Command::CoinP2(count) => {
            let key = if matches!(command, Command::CoinP1(_)) { "6" } else { "7" };
            let count = match count.trim() {
                "" => 1,
                n => n
                    .parse::<usize>()
                    .map_err(|e| invalid(&command, format!("{n:?}: {e}")))?,
            };
            if count > MAX_COINS {
                return Err(invalid(&command, format!("at most {MAX_COINS} coins")));
            }
            tracing::info!("inserting {} coins with key {}", count, key);
            let keys = std::iter::repeat(key.to_string()).take(count);
            press_sequence(ctx, keys, |p, k| p.keyboard_input(k)).await?;
            Ok(ScriptEffect::default())
        }
        Command::PlaylistPlay(folder) => {
            let playlist = if folder.trim().is_empty() {
                env.playlists.require_active()?.play()
            } else {
                Playlist::from_folder(&media_path(ctx, folder))?.play()
            };
            publish(env, Some(Arc::new(playlist))).await
        }
        Command::PlaylistLoad(folder) => {
            if folder.trim().is_empty() {
                return Err(invalid(&command, "missing folder"));
            }
            let playlist = Playlist::from_folder(&media_path(ctx, folder))?;
            publish(env, Some(Arc::new(playlist))).await
        }
        Command::PlaylistNext => {
            let playlist = env.playlists.require_active()?.next();
            publish(env, Some(Arc::new(playlist))).await
        }
        Command::PlaylistPrevious => {
            let playlist = env.playlists.require_active()?.previous();
            publish(env, Some(Arc::new(playlist))).await
        }
        Command::PlaylistGoto(position) => {
            let position: usize = position
                .trim()
                .parse()
                .map_err(|e| invalid(&command, format!("{position:?}: {e}")))?;
            let playlist = env.playlists.require_active()?.goto(position)?;
            publish(env, Some(Arc::new(playlist))).await
        }
        Command::PlaylistPause => {
            let playlist = env.playlists.require_active()?.pause();
            publish(env, Some(Arc::new(playlist))).await
        }
        Command::PlaylistStop => publish(env, None).await,
        Command::HttpGet(url) => {
            let url = url.trim();
            tracing::info!("http get: {}", url);
            ctx.http.get(url).send().await?.error_for_status()?;
            Ok(ScriptEffect::default())
        }
        Command::HttpPost(args) => {
            let mut parts = args.splitn(3, '|');
            let url = parts.next().unwrap_or_default().trim();
            let content_type = parts.next().unwrap_or("application/json").trim();
            let body = parts.next().unwrap_or_default().to_string();
            tracing::info!("http post: {}", url);
            ctx.http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body)
                .send()
                .await?
                .error_for_status()?;
            Ok(ScriptEffect::default())
        }
        Command::Link(url) if env.linked => Err(LinkError::Nested(url.to_string()).into()),
        Command::Link(url) => match link::fetch(ctx, url).await? {
            LinkAction::ZapScript(script) => {
                // Linked scripts come from a remote document.
                let linked = ScriptEnv {
                    unsafe_origin: true,
                    linked: true,
                    playlists: env.playlists.clone(),
                };
                run_script(ctx, &linked, &script)
                    .await
                    .map_err(|abort| ScriptError::Linked(Box::new(abort)))
            }
            LinkAction::Media(params) => {
                let path = link::install_media(ctx, &params).await?;
                on_platform(ctx, move |p| p.launch_media(&path)).await?;
                Ok(ScriptEffect::media())
            }
        },
    }
}

async fn publish(
    env: &ScriptEnv,
    playlist: Option<Arc<Playlist>>,
) -> Result<ScriptEffect, ScriptError> {
    env.playlists.publish(playlist.clone()).await?;
    Ok(ScriptEffect::playlist(playlist))
}
