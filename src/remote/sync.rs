//! Settings and extensions synchronization over rsync.

use std::{path::PathBuf, sync::Arc, time::Instant};

use log::info;

use crate::command::{CommandLine, CommandRunner};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::utils::{ensure_dir, path::with_trailing_slash};

/// Which way an asset class flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// local -> remote
    Push,
    /// remote -> local
    Pull,
}

/// The two asset classes kept in step with the remote editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Settings,
    Extensions,
}

impl AssetClass {
    pub fn name(self) -> &'static str {
        match self {
            AssetClass::Settings => "settings",
            AssetClass::Extensions => "extensions",
        }
    }
}

/// One asset class: where it lives on each side and what to leave alone.
/// Reused for both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSpec {
    pub local_dir: PathBuf,
    pub remote_dir: String,
    pub exclusions: Vec<String>,
}

impl SyncSpec {
    pub fn settings(settings: &SyncSettings) -> Result<Self> {
        Ok(Self {
            local_dir: settings.settings_dir()?,
            remote_dir: settings.remote_settings_dir.clone(),
            exclusions: settings.settings_excludes.clone(),
        })
    }

    pub fn extensions(settings: &SyncSettings) -> Result<Self> {
        Ok(Self {
            local_dir: settings.extensions_dir()?,
            remote_dir: settings.remote_extensions_dir.clone(),
            exclusions: Vec::new(),
        })
    }
}

pub struct SyncCoordinator {
    runner: Arc<dyn CommandRunner>,
    host: String,
    ssh_flags: String,
    settings: SyncSpec,
    extensions: SyncSpec,
}

impl SyncCoordinator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        host: impl Into<String>,
        ssh_flags: impl Into<String>,
        settings: SyncSpec,
        extensions: SyncSpec,
    ) -> Self {
        Self {
            runner,
            host: host.into(),
            ssh_flags: ssh_flags.into(),
            settings,
            extensions,
        }
    }

    pub fn spec(&self, class: AssetClass) -> &SyncSpec {
        match class {
            AssetClass::Settings => &self.settings,
            AssetClass::Extensions => &self.extensions,
        }
    }

    pub async fn sync_class(&self, class: AssetClass, direction: Direction) -> Result<()> {
        let start = Instant::now();
        info!("syncing {} ({:?})", class.name(), direction);
        self.sync(self.spec(class), direction).await?;
        info!("synced {} in {:?}", class.name(), start.elapsed());
        Ok(())
    }

    /// Mirrors one `SyncSpec` in `direction`. Either fully succeeds or reports the
    /// transport failure; safe to retry.
    pub async fn sync(&self, spec: &SyncSpec, direction: Direction) -> Result<()> {
        let local = with_trailing_slash(&spec.local_dir);
        let remote = format!("{}:{}", self.host, spec.remote_dir);
        let (src, dest) = match direction {
            Direction::Push => (local, remote),
            Direction::Pull => (remote, local),
        };

        let sync_error = |reason: String| Error::Sync {
            src: src.clone(),
            dest: dest.clone(),
            reason,
        };

        ensure_dir(&spec.local_dir).map_err(|err| {
            sync_error(format!(
                "could not create {}: {}",
                spec.local_dir.display(),
                err
            ))
        })?;

        let command = rsync_command(&src, &dest, &self.ssh_flags, &spec.exclusions);
        let code = self
            .runner
            .run(&command, None)
            .await
            .map_err(|err| sync_error(format!("{}: {}", command, err)))?;
        if code != 0 {
            return Err(sync_error(format!("rsync exited with {}", code)));
        }
        Ok(())
    }
}

fn rsync_command(src: &str, dest: &str, ssh_flags: &str, exclusions: &[String]) -> CommandLine {
    CommandLine::new("rsync")
        .args(exclusions.iter().map(|path| format!("--exclude={}", path)))
        .arg("-azvr")
        .arg("-e")
        .arg(format!("ssh {}", ssh_flags).trim_end().to_string())
        // Only newer entries move, and times are kept so the next run is cheap.
        .args(["-u", "--times"])
        // Deletions propagate, so removing an extension on one side removes it on the other.
        .args(["--delete", "--copy-unsafe-links"])
        .arg(src)
        .arg(dest)
}
