//! Opening the session URL locally.
//!
//! A Chrome-family browser is preferred because app mode gives the editor a
//! window of its own; anything else goes through the platform opener.

use std::{path::Path, sync::Arc};

use log::{debug, error};

use crate::command::{CommandLine, CommandRunner};

const MAC_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";
const WSL_CHROME: &str = "/mnt/c/Program Files (x86)/Google/Chrome/Application/chrome.exe";

pub struct BrowserLauncher {
    runner: Arc<dyn CommandRunner>,
    command_override: Option<String>,
}

impl BrowserLauncher {
    pub fn new(runner: Arc<dyn CommandRunner>, command_override: Option<String>) -> Self {
        Self {
            runner,
            command_override,
        }
    }

    /// Starts the browser without waiting for it. Failures are logged only:
    /// the session is usable without a browser window.
    pub fn open(&self, url: &str) {
        let command = self.command_for(url);
        debug!("opening browser: {}", command);
        if let Err(err) = self.runner.spawn(&command) {
            error!("failed to open browser: {}", err);
        }
    }

    fn command_for(&self, url: &str) -> CommandLine {
        if let Some(program) = &self.command_override {
            return CommandLine::new(program.as_str()).arg(url);
        }
        match find_chrome_executable() {
            Some(chrome) => CommandLine::new(chrome).args(chrome_options(url)),
            None => system_opener(url),
        }
    }
}

fn find_chrome_executable() -> Option<String> {
    let commands = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ];
    if let Some(found) = commands
        .into_iter()
        .find(|candidate| which::which(candidate).is_ok())
    {
        return Some(found.to_string());
    }

    [MAC_CHROME, WSL_CHROME]
        .into_iter()
        .find(|path| Path::new(path).exists())
        .map(str::to_string)
}

fn chrome_options(url: &str) -> Vec<String> {
    vec![
        format!("--app={}", url),
        "--disable-extensions".to_string(),
        "--disable-plugins".to_string(),
        "--incognito".to_string(),
    ]
}

fn system_opener(url: &str) -> CommandLine {
    if cfg!(target_os = "macos") {
        CommandLine::new("open").arg(url)
    } else if cfg!(target_os = "windows") {
        CommandLine::new("cmd").args(["/C", "start", "", url])
    } else {
        CommandLine::new("xdg-open").arg(url)
    }
}
