//! Remote bootstrap and the ssh tunnel carrying code-server.
//!
//! One ssh child both forwards the local bind address to the remote
//! loopback port and runs code-server on that port. The child is owned by a
//! supervisor task; the session only sees a one-shot exit notification and a
//! terminate request.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::oneshot;

use super::deployment::ServerDeployment;
use super::port::BindAddress;
use crate::command::{ChildProcess, CommandLine, CommandRunner};
use crate::error::{Error, Result};

pub struct TunnelOrchestrator {
    runner: Arc<dyn CommandRunner>,
    deployment: ServerDeployment,
}

impl TunnelOrchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, deployment: ServerDeployment) -> Self {
        Self { runner, deployment }
    }

    /// Installs or refreshes code-server on `host`. Blocks until the remote
    /// script finishes.
    pub async fn bootstrap(&self, host: &str, ssh_flags: &str) -> Result<()> {
        let ssh = join_words(["ssh", ssh_flags, host, "/bin/bash"]);
        let script = self.deployment.script();
        let bootstrap_error = |reason: String| Error::Bootstrap {
            command: ssh.clone(),
            script: script.clone(),
            reason,
        };

        let code = self
            .runner
            .run(&CommandLine::shell(ssh.clone()), Some(&script))
            .await
            .map_err(|err| bootstrap_error(err.to_string()))?;
        if code != 0 {
            return Err(bootstrap_error(format!("ssh exited with {}", code)));
        }
        Ok(())
    }

    /// Starts the tunnel without waiting for it. Only a failure to launch ssh
    /// is reported here; whatever happens remotely shows up as an exit.
    pub fn start_tunnel(
        &self,
        host: &str,
        ssh_flags: &str,
        bind: &BindAddress,
        remote_port: u16,
        remote_dir: &str,
    ) -> Result<TunnelHandle> {
        let remote = format!(
            "'cd {}; {} --host 127.0.0.1 --allow-http --no-auth --port={}'",
            remote_dir,
            self.deployment.install_path(),
            remote_port
        );
        let forward = format!("{}:127.0.0.1:{}", bind, remote_port);
        let ssh = join_words(["ssh -tt -q -L", &forward, ssh_flags, host, &remote]);

        info!("Tunneling remote port {} to {}", remote_port, bind);
        let child = self
            .runner
            .spawn(&CommandLine::shell(ssh.clone()))
            .map_err(|source| Error::Start {
                command: ssh.clone(),
                source,
            })?;

        Ok(TunnelHandle::supervise(child, ssh))
    }
}

/// Joins the non-empty words with single spaces.
fn join_words<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words
        .into_iter()
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The single ssh process of a session.
pub struct TunnelHandle {
    command: String,
    exit: Option<oneshot::Receiver<i32>>,
    kill: Option<oneshot::Sender<()>>,
}

impl TunnelHandle {
    fn supervise(mut child: Box<dyn ChildProcess>, command: String) -> Self {
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => Some(status),
                Ok(()) = kill_rx => None,
            };
            let status = match waited {
                Some(status) => status,
                None => {
                    debug!("terminating tunnel");
                    if let Err(err) = child.start_kill() {
                        warn!("failed to kill tunnel: {}", err);
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(code) => code,
                Err(err) => {
                    warn!("lost track of tunnel process: {}", err);
                    -1
                }
            };
            debug!("tunnel exited with {}", code);
            // Nobody listening is fine: the session already moved on.
            let _ = exit_tx.send(code);
        });

        Self {
            command,
            exit: Some(exit_rx),
            kill: Some(kill_tx),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Resolves once the tunnel process has terminated, with its exit code.
    /// Fires once: later calls return `None` immediately. Cancel safe, so it
    /// can sit in a `select!` and be awaited again afterwards.
    pub async fn wait_for_exit(&mut self) -> Option<i32> {
        let exit = self.exit.as_mut()?;
        let code = exit.await.unwrap_or(-1);
        self.exit = None;
        Some(code)
    }

    /// Kills the process and waits until it is reaped. Returns `None` if
    /// the exit was already delivered.
    pub async fn shutdown(&mut self) -> Option<i32> {
        self.terminate();
        self.wait_for_exit().await
    }

    /// Asks the supervisor to kill the process. A no-op once it has exited
    /// or after a previous call.
    pub fn terminate(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::{CallKind, FakeRunner};
    use crate::config::ServerSettings;

    fn orchestrator(fake: &Arc<FakeRunner>) -> TunnelOrchestrator {
        TunnelOrchestrator::new(
            fake.clone(),
            ServerDeployment::new(&ServerSettings::default()),
        )
    }

    fn bind() -> BindAddress {
        BindAddress {
            host: "127.0.0.1".into(),
            port: 8443,
        }
    }

    #[tokio::test]
    async fn bootstrap_pipes_script_into_remote_shell() {
        let fake = FakeRunner::new();
        orchestrator(&fake)
            .bootstrap("devbox", "-i key.pem")
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Run);
        assert_eq!(calls[0].command.args[1], "ssh -i key.pem devbox /bin/bash");
        let stdin = calls[0].stdin.as_deref().unwrap();
        assert!(stdin.starts_with("set -euxo pipefail"));
    }

    #[tokio::test]
    async fn bootstrap_failure_embeds_command_and_script() {
        let fake = FakeRunner::new();
        fake.exit_with("/bin/bash", 255);

        let err = orchestrator(&fake).bootstrap("devbox", "").await.unwrap_err();
        match &err {
            Error::Bootstrap { command, script, .. } => {
                assert_eq!(command, "ssh devbox /bin/bash");
                assert!(script.contains("chmod +x"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("---download script---"));
    }

    #[tokio::test]
    async fn tunnel_forwards_and_starts_server_in_one_session() {
        let fake = FakeRunner::new();
        let handle = orchestrator(&fake)
            .start_tunnel("devbox", "-i key.pem", &bind(), 40000, "~/src")
            .unwrap();

        assert_eq!(
            handle.command(),
            "ssh -tt -q -L 127.0.0.1:8443:127.0.0.1:40000 -i key.pem devbox \
             'cd ~/src; ~/.cache/sshcode/sshcode-server --host 127.0.0.1 --allow-http --no-auth --port=40000'"
        );
        assert_eq!(fake.calls()[0].kind, CallKind::Spawn);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_start_error() {
        let fake = FakeRunner::new();
        fake.fail_spawn("ssh -tt");

        let err = orchestrator(&fake)
            .start_tunnel("devbox", "", &bind(), 40000, "~")
            .err()
            .unwrap();
        assert!(matches!(err, Error::Start { .. }));
    }

    #[tokio::test]
    async fn exit_notification_fires_once() {
        let fake = FakeRunner::new();
        let mut handle = orchestrator(&fake)
            .start_tunnel("devbox", "", &bind(), 40000, "~")
            .unwrap();

        fake.exit_children(3);
        assert_eq!(handle.wait_for_exit().await, Some(3));
        assert_eq!(handle.wait_for_exit().await, None);
    }

    #[tokio::test]
    async fn terminate_kills_the_child() {
        let fake = FakeRunner::new();
        let mut handle = orchestrator(&fake)
            .start_tunnel("devbox", "", &bind(), 40000, "~")
            .unwrap();

        handle.terminate();
        handle.terminate();
        assert_eq!(handle.wait_for_exit().await, Some(-1));
        assert_eq!(fake.kills(), 1);
    }

    #[tokio::test]
    async fn cancelled_wait_keeps_the_exit_notification() {
        let fake = FakeRunner::new();
        let mut handle = orchestrator(&fake)
            .start_tunnel("devbox", "", &bind(), 40000, "~")
            .unwrap();

        let raced = tokio::select! {
            biased;
            code = handle.wait_for_exit() => code,
            _ = std::future::ready(()) => None,
        };
        assert_eq!(raced, None);

        fake.exit_children(0);
        assert_eq!(handle.wait_for_exit().await, Some(0));
    }

    #[tokio::test]
    async fn shutdown_waits_until_the_child_is_reaped() {
        let fake = FakeRunner::new();
        let mut handle = orchestrator(&fake)
            .start_tunnel("devbox", "", &bind(), 40000, "~")
            .unwrap();

        assert_eq!(handle.shutdown().await, Some(-1));
        assert_eq!(fake.kills(), 1);
        assert_eq!(handle.shutdown().await, None);
    }

    #[test]
    fn join_words_skips_empty_flags() {
        assert_eq!(join_words(["ssh", "", "host", "/bin/bash"]), "ssh host /bin/bash");
        assert_eq!(join_words(["ssh", " -p 2222 ", "host"]), "ssh -p 2222 host");
    }
}
