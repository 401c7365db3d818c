use crate::{
    error::{Error, Result},
    utils::{ensure_parent_dir, path::expand_tilde},
};
use etcetera::{base_strategy::choose_base_strategy, BaseStrategy};
use log::debug;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

static CONFIG_FILE: once_cell::sync::OnceCell<PathBuf> = once_cell::sync::OnceCell::new();
static LOG_FILE: once_cell::sync::OnceCell<PathBuf> = once_cell::sync::OnceCell::new();

const APP_DIR: &str = "sshcode";

pub const DEFAULT_SERVER_PATH: &str = "~/.cache/sshcode/sshcode-server";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://codesrv-ci.cdr.sh/latest-linux";
pub const REMOTE_SETTINGS_DIR: &str = "~/.local/share/code-server/User/";
pub const REMOTE_EXTENSIONS_DIR: &str = "~/.local/share/code-server/extensions/";

/// User tunables, read from `config.toml`. Every field has a default so an
/// absent or partial file is fine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSettings,
    pub sync: SyncSettings,
    pub probe: ProbeSettings,
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Remote path of the code-server binary; the bootstrap script keeps it current.
    pub install_path: String,
    pub download_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            install_path: DEFAULT_SERVER_PATH.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub local_settings_dir: Option<PathBuf>,
    pub local_extensions_dir: Option<PathBuf>,
    pub remote_settings_dir: String,
    pub remote_extensions_dir: String,
    pub settings_excludes: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            local_settings_dir: None,
            local_extensions_dir: None,
            remote_settings_dir: REMOTE_SETTINGS_DIR.to_string(),
            remote_extensions_dir: REMOTE_EXTENSIONS_DIR.to_string(),
            settings_excludes: ["workspaceStorage", "logs", "CachedData"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SyncSettings {
    /// Local VS Code user settings directory.
    pub fn settings_dir(&self) -> Result<PathBuf> {
        match &self.local_settings_dir {
            Some(dir) => configured_dir("sync.local_settings_dir", dir),
            None => vscode_settings_dir(),
        }
    }

    /// Local VS Code extensions directory.
    pub fn extensions_dir(&self) -> Result<PathBuf> {
        match &self.local_extensions_dir {
            Some(dir) => configured_dir("sync.local_extensions_dir", dir),
            None => Ok(home_dir()?.join(".vscode").join("extensions")),
        }
    }
}

// An empty path would render as `/` for rsync.
fn configured_dir(key: &str, dir: &Path) -> Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        return Err(Error::Config {
            path: key.to_string(),
            reason: "directory must not be empty".to_string(),
        });
    }
    Ok(expand_tilde(dir).into_owned())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSettings {
    pub timeout_secs: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            attempt_timeout_secs: 3,
        }
    }
}

impl ProbeSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    /// Program used instead of the detected browser; receives the URL as its only argument.
    pub command: Option<String>,
}

impl Config {
    pub fn from_toml_str(path: &Path, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| Error::Config {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }
}

fn home_dir() -> Result<PathBuf> {
    etcetera::home_dir().map_err(|err| Error::Config {
        path: "~".to_string(),
        reason: err.to_string(),
    })
}

fn vscode_settings_dir() -> Result<PathBuf> {
    if cfg!(target_os = "macos") {
        return Ok(home_dir()?
            .join("Library")
            .join("Application Support")
            .join("Code")
            .join("User"));
    }

    let strategy = choose_base_strategy().map_err(|err| Error::Config {
        path: "~".to_string(),
        reason: err.to_string(),
    })?;
    Ok(strategy.config_dir().join("Code").join("User"))
}

pub fn initialize_config_file(specified_file: Option<PathBuf>) {
    if let Some(file) = specified_file.or_else(default_config_file) {
        CONFIG_FILE.set(file).ok();
    }
}

pub fn default_config_file() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join(APP_DIR).join("config.toml"))
}

pub fn default_log_file() -> PathBuf {
    match choose_base_strategy() {
        Ok(strategy) => strategy.cache_dir().join(APP_DIR).join("sshcode.log"),
        Err(_) => std::env::temp_dir().join(APP_DIR).join("sshcode.log"),
    }
}

pub fn initialize_log_file(specified_file: Option<PathBuf>) {
    let log_file = specified_file.unwrap_or_else(default_log_file);
    ensure_parent_dir(&log_file);
    LOG_FILE.set(log_file).ok();
}

pub fn log_file() -> PathBuf {
    LOG_FILE
        .get()
        .map(|path| path.to_path_buf())
        .unwrap_or_else(default_log_file)
}

/// Loads the user configuration, falling back to defaults when no file exists.
pub fn load_config() -> Result<Config> {
    let Some(path) = CONFIG_FILE.get() else {
        return Ok(Config::default());
    };
    if !path.is_file() {
        debug!("no config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)?;
    let config = Config::from_toml_str(path, &content)?;
    debug!("loaded config from {}: {config:?}", path.display());
    Ok(config)
}
