use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::session::SessionOptions;

#[derive(Parser, Debug)]
#[command(name = "sshcode")]
#[command(about = "Run VS Code on a remote server over ssh")]
#[command(version)]
pub struct Args {
    /// Host to connect to: an ssh destination, or `gcp:<instance>`
    pub host: String,

    /// Directory to open on the remote host
    #[arg(default_value = "~")]
    pub dir: String,

    /// Don't sync local settings and extensions to the remote host
    #[arg(long = "skipsync")]
    pub skip_sync: bool,

    /// Sync extensions and settings back to the local machine when the session ends
    #[arg(short = 'b', long)]
    pub sync_back: bool,

    /// Don't open a browser window
    #[arg(long)]
    pub no_open: bool,

    /// Local address to bind the tunnel to (`host:port`, either part optional)
    #[arg(long, value_name = "ADDR", default_value = "")]
    pub bind: String,

    /// Port code-server listens on remotely (random when omitted)
    #[arg(long, value_name = "PORT")]
    pub remote_port: Option<u16>,

    /// Extra flags passed to every ssh invocation
    #[arg(long, value_name = "FLAGS", default_value = "", allow_hyphen_values = true)]
    pub ssh_flags: String,

    /// Configuration file
    #[arg(short, long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Log file
    #[arg(long = "log", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            host: self.host.clone(),
            remote_dir: self.dir.clone(),
            skip_sync: self.skip_sync,
            sync_back: self.sync_back,
            open_browser: !self.no_open,
            bind_address: self.bind.clone(),
            remote_port: self.remote_port,
            ssh_flags: self.ssh_flags.clone(),
        }
    }
}
