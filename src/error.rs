use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to resolve host '{host}': {reason}")]
    Resolution { host: String, reason: String },
    #[error("invalid bind address '{raw}': {reason}")]
    Parse { raw: String, reason: String },
    #[error("no free port found: max number of tries exceeded: {tries}")]
    NoFreePort { tries: usize },
    #[error("failed to update code-server: \n---ssh cmd---\n{command}\n---download script---\n{script}\n{reason}")]
    Bootstrap {
        command: String,
        script: String,
        reason: String,
    },
    #[error("failed to start code-server with '{command}': {source}")]
    Start {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("code-server at {url} didn't start in time ({}s)", .deadline.as_secs())]
    Timeout { url: String, deadline: Duration },
    #[error("failed to rsync '{src}' to '{dest}': {reason}")]
    Sync {
        src: String,
        dest: String,
        reason: String,
    },
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: String, reason: String },
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
