use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::mapping::MappingRule;
use crate::platform::Launcher;

pub const DEFAULT_PORT: u16 = 7497;

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zapd")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("zapd")
}

/// Command templates used by the command platform for raw input.
/// `{key}` is replaced by the key or button name.
#[derive(Deserialize, Default, Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub keyboard_command: Option<Vec<String>>,
    pub gamepad_command: Option<Vec<String>>,
}

/// A configured token reader.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum ReaderConfig {
    File { path: PathBuf },
}

#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub localhost: Option<bool>,
    pub data_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub games_root: Option<PathBuf>,
    pub run_zapscript: Option<bool>,
    pub debug_logging: Option<bool>,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub launchers: Vec<Launcher>,
    #[serde(default)]
    pub readers: Vec<ReaderConfig>,
    #[serde(default)]
    pub mappings: Vec<MappingRule>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub localhost: bool,
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Root folder for media downloaded by online links.
    pub games_root: PathBuf,
    pub run_zapscript: bool,
    pub debug_logging: bool,
    pub input: InputConfig,
    pub launchers: Vec<Launcher>,
    pub readers: Vec<ReaderConfig>,
    /// Mapping rules declared inline; they come before mapping files.
    pub mappings: Vec<MappingRule>,
}

impl Config {
    pub fn resolve(file: Option<FileConfig>, args: &crate::cli::Args) -> Self {
        let file = file.unwrap_or_default();
        let data_dir = args
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(default_data_dir);
        Config {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            localhost: args.localhost || file.localhost.unwrap_or(false),
            games_root: file.games_root.unwrap_or_else(|| data_dir.join("games")),
            data_dir,
            temp_dir: file.temp_dir.unwrap_or_else(default_temp_dir),
            run_zapscript: file.run_zapscript.unwrap_or(true),
            debug_logging: file.debug_logging.unwrap_or(false),
            input: file.input,
            launchers: file.launchers,
            readers: file.readers,
            mappings: file.mappings,
        }
    }

    /// Folder scanned for `*.toml` mapping files.
    pub fn mappings_dir(&self) -> PathBuf {
        self.data_dir.join("mappings")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.jsonl")
    }
}

/// Config locations in search order after an explicit `--config`.
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("zapd.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("zapd").join("config.toml"));
    }
    candidates
}

/// An explicit path is returned even if it does not exist so that loading it
/// reports the error. Otherwise the first existing candidate wins.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_owned()),
        None => config_candidates().into_iter().find(|p| p.exists()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}
