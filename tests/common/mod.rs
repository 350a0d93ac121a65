#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use zapd::platform::{Launcher, Platform, PlatformError};
use zapd::playlist::{PlaylistController, PlaylistUpdate};
use zapd::token::Token;
use zapd::zapscript::{ScriptContext, ScriptEnv};

/// A platform call recorded by [`FakePlatform`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    KeyboardPress(String),
    KeyboardInput(String),
    GamepadPress(String),
    LaunchSystem(String),
    LaunchMedia(PathBuf),
    Stop,
    AfterScan(String),
}

/// Platform that records every call instead of touching the host.
#[derive(Default)]
pub struct FakePlatform {
    launchers: Vec<Launcher>,
    calls: Mutex<Vec<Call>>,
    failing_system: Mutex<Option<String>>,
    panicking_system: Mutex<Option<String>>,
    slow_system: Mutex<Option<(String, Duration)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::with_launchers(vec![nes_launcher()])
    }

    pub fn with_launchers(launchers: Vec<Launcher>) -> Self {
        FakePlatform {
            launchers,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Make `launch_system` fail for `system`.
    pub fn fail_system(&self, system: &str) {
        *self.failing_system.lock() = Some(system.to_string());
    }

    /// Make `launch_system` panic for `system`.
    pub fn panic_system(&self, system: &str) {
        *self.panicking_system.lock() = Some(system.to_string());
    }

    /// Make `launch_system` block the calling thread for `delay` before
    /// launching `system`.
    pub fn slow_system(&self, system: &str, delay: Duration) {
        *self.slow_system.lock() = Some((system.to_string(), delay));
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl Platform for FakePlatform {
    fn id(&self) -> &str {
        "fake"
    }

    fn launchers(&self) -> &[Launcher] {
        &self.launchers
    }

    fn keyboard_press(&self, key: &str) -> Result<(), PlatformError> {
        self.record(Call::KeyboardPress(key.to_string()));
        Ok(())
    }

    fn keyboard_input(&self, code: &str) -> Result<(), PlatformError> {
        self.record(Call::KeyboardInput(code.to_string()));
        Ok(())
    }

    fn gamepad_press(&self, button: &str) -> Result<(), PlatformError> {
        self.record(Call::GamepadPress(button.to_string()));
        Ok(())
    }

    fn launch_system(&self, system: &str) -> Result<(), PlatformError> {
        if self.failing_system.lock().as_deref() == Some(system) {
            return Err(PlatformError::NoLauncher(format!("system {system}")));
        }
        if self.panicking_system.lock().as_deref() == Some(system) {
            panic!("launcher for {system} crashed");
        }
        let slow = self.slow_system.lock().clone();
        if let Some((slow, delay)) = slow {
            if slow == system {
                std::thread::sleep(delay);
            }
        }
        self.record(Call::LaunchSystem(system.to_string()));
        Ok(())
    }

    fn launch_media(&self, path: &Path) -> Result<(), PlatformError> {
        self.record(Call::LaunchMedia(path.to_owned()));
        Ok(())
    }

    fn stop_active_launcher(&self) -> Result<(), PlatformError> {
        self.record(Call::Stop);
        Ok(())
    }

    fn after_scan_hook(&self, token: &Token) -> Result<(), PlatformError> {
        self.record(Call::AfterScan(token.text.clone()));
        Ok(())
    }
}

pub fn nes_launcher() -> Launcher {
    Launcher {
        id: "nes".to_string(),
        system: "nes".to_string(),
        folders: vec!["NES".to_string()],
        extensions: vec![".nes".to_string()],
        command: vec!["fceux".to_string(), "{path}".to_string()],
        system_command: vec!["fceux".to_string()],
    }
}

pub fn script_context(platform: Arc<FakePlatform>, root: &Path) -> ScriptContext {
    ScriptContext::new(platform, root.join("games"), root.join("tmp"))
}

/// A script environment with no active playlist, plus the receiving end of
/// its playlist queue.
pub fn script_env(unsafe_origin: bool) -> (ScriptEnv, mpsc::Receiver<PlaylistUpdate>) {
    let (tx, rx) = mpsc::channel(16);
    let env = ScriptEnv {
        unsafe_origin,
        linked: false,
        playlists: PlaylistController::new(None, tx),
    };
    (env, rx)
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
