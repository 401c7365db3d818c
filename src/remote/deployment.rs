//! code-server installation on the remote machine.
//!
//! The remote side is prepared by piping a shell script into `ssh host
//! /bin/bash`. The script is idempotent: re-running it on an up-to-date host
//! only restarts from a clean state.

use crate::config::ServerSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDeployment {
    install_path: String,
    download_url: String,
}

impl ServerDeployment {
    pub fn new(settings: &ServerSettings) -> Self {
        Self {
            install_path: settings.install_path.clone(),
            download_url: settings.download_url.clone(),
        }
    }

    /// Remote path of the server binary.
    pub fn install_path(&self) -> &str {
        &self.install_path
    }

    /// Parent directory of [`Self::install_path`], kept in remote (POSIX) syntax.
    pub fn install_dir(&self) -> &str {
        match self.install_path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((dir, _)) => dir,
            None => ".",
        }
    }

    fn download_name(&self) -> &str {
        self.download_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("code-server")
    }

    /// The bootstrap script sent over ssh stdin.
    pub fn script(&self) -> String {
        let server = &self.install_path;
        let dir = self.install_dir();
        let download = self.download_name();
        format!(
            r#"set -euxo pipefail || exit 1

pkill -f {server} || true
mkdir -p ~/.local/share/code-server {dir}
cd {dir}
wget -N {url}
[ -f {server} ] && rm {server}
ln {download} {server}
chmod +x {server}"#,
            url = self.download_url,
        )
    }
}
