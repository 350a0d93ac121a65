use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use parking_lot::Mutex;

use crate::config::{Config, InputConfig};
use crate::platform::{Launcher, Platform, PlatformError};
use crate::state::TokenResponse;
use crate::token::Token;

/// Platform that drives everything through external commands configured in
/// the config file.
pub struct CommandPlatform {
    launchers: Vec<Launcher>,
    input: InputConfig,
    temp_dir: PathBuf,
    running: Mutex<Option<Child>>,
}

impl CommandPlatform {
    pub fn new(launchers: Vec<Launcher>, input: InputConfig, temp_dir: PathBuf) -> Self {
        CommandPlatform {
            launchers,
            input,
            temp_dir,
            running: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.launchers.clone(),
            config.input.clone(),
            config.temp_dir.clone(),
        )
    }

    /// Spawn a launcher command, replacing whatever was running before.
    /// The lock is never held while waiting on a process.
    fn spawn_tracked(&self, mut cmd: Command, command_line: String) -> Result<(), PlatformError> {
        let previous = self.running.lock().take();
        if let Some(mut old) = previous {
            kill_child(&mut old);
        }
        let child = cmd.spawn().map_err(|source| PlatformError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        tracing::info!("launched {} (pid {})", command_line, child.id());
        // A launch that raced this one loses.
        let raced = self.running.lock().replace(child);
        if let Some(mut other) = raced {
            kill_child(&mut other);
        }
        Ok(())
    }
}

fn kill_child(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => {
            if let Err(e) = child.kill() {
                tracing::warn!("failed to stop pid {}: {}", child.id(), e);
            }
            let _ = child.wait();
        }
    }
}

/// Build a command from an argv template, substituting `{placeholder}`.
/// Returns `None` for an empty template.
pub fn build_command(template: &[String], placeholder: &str, value: &str) -> Option<(Command, String)> {
    let (program, args) = template.split_first()?;
    let args: Vec<String> = args.iter().map(|a| a.replace(placeholder, value)).collect();
    let command_line = std::iter::once(program.clone())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    let mut cmd = Command::new(program);
    cmd.args(&args);
    Some((cmd, command_line))
}

fn run_to_completion(template: &[String], value: &str, what: &'static str) -> Result<(), PlatformError> {
    let Some((mut cmd, command_line)) = build_command(template, "{key}", value) else {
        return Err(PlatformError::Unsupported(what));
    };
    let status = cmd.status().map_err(|source| PlatformError::Spawn {
        command: command_line.clone(),
        source,
    })?;
    if !status.success() {
        return Err(PlatformError::CommandFailed {
            command: command_line,
            status,
        });
    }
    Ok(())
}

impl Platform for CommandPlatform {
    fn id(&self) -> &str {
        "command"
    }

    fn launchers(&self) -> &[Launcher] {
        &self.launchers
    }

    fn keyboard_press(&self, key: &str) -> Result<(), PlatformError> {
        let template = self.input.keyboard_command.as_deref().unwrap_or_default();
        run_to_completion(template, key, "keyboard input")
    }

    fn gamepad_press(&self, button: &str) -> Result<(), PlatformError> {
        let template = self.input.gamepad_command.as_deref().unwrap_or_default();
        run_to_completion(template, button, "gamepad input")
    }

    fn launch_system(&self, system: &str) -> Result<(), PlatformError> {
        let launcher = self
            .system_launchers(system)
            .into_iter()
            .find(|l| !l.system_command.is_empty())
            .ok_or_else(|| PlatformError::NoLauncher(format!("system {system}")))?;
        let (cmd, command_line) = build_command(&launcher.system_command, "{system}", system)
            .ok_or(PlatformError::Unsupported("system launch"))?;
        self.spawn_tracked(cmd, command_line)
    }

    fn launch_media(&self, path: &Path) -> Result<(), PlatformError> {
        let launcher = self
            .path_to_launcher(path)
            .ok_or_else(|| PlatformError::NoLauncher(path.display().to_string()))?;
        let (cmd, command_line) = build_command(&launcher.command, "{path}", &path.to_string_lossy())
            .ok_or(PlatformError::Unsupported("media launch"))?;
        self.spawn_tracked(cmd, command_line)
    }

    fn stop_active_launcher(&self) -> Result<(), PlatformError> {
        let running = self.running.lock().take();
        if let Some(mut child) = running {
            tracing::info!("stopping pid {}", child.id());
            kill_child(&mut child);
        }
        Ok(())
    }

    /// Record the scan in `<temp_dir>/last-scan.json` for external tools.
    fn after_scan_hook(&self, token: &Token) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let json = serde_json::to_vec_pretty(&TokenResponse::from(token))?;
        std::fs::write(self.temp_dir.join("last-scan.json"), json)?;
        Ok(())
    }
}
