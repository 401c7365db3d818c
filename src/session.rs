//! The session state machine.
//!
//! ```text
//! Resolving -> Bootstrapping -> [SyncingIn] -> TunnelStarting -> Probing
//!           -> Running -> [SyncingBack] -> Done
//! ```
//! Any stage failure moves to `Failed` and ends the session; nothing is
//! retried at this level.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use log::{debug, error, info};

use crate::browser::BrowserLauncher;
use crate::command::CommandRunner;
use crate::config::Config;
use crate::error::Result;
use crate::remote::{
    deployment::ServerDeployment,
    host::HostResolver,
    port::PortAllocator,
    probe::ReadinessProbe,
    sync::{AssetClass, Direction, SyncCoordinator, SyncSpec},
    tunnel::TunnelOrchestrator,
};

/// Everything the user asked for, fixed before the session starts.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub remote_dir: String,
    pub skip_sync: bool,
    pub sync_back: bool,
    pub open_browser: bool,
    /// Raw `host:port`; either part may be empty.
    pub bind_address: String,
    pub remote_port: Option<u16>,
    pub ssh_flags: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            remote_dir: "~".to_string(),
            skip_sync: false,
            sync_back: false,
            open_browser: true,
            bind_address: String::new(),
            remote_port: None,
            ssh_flags: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    Bootstrapping,
    SyncingIn,
    TunnelStarting,
    Probing,
    Running,
    SyncingBack,
    Done,
    Failed,
}

/// What ended the `Running` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycleSignal {
    TunnelEnded,
    UserInterrupted,
}

/// One-shot interrupt notification raced against the tunnel's exit.
pub type Interrupt = BoxFuture<'static, ()>;

/// Interrupt backed by the process's Ctrl-C handler. The handler is only
/// installed once the future is first polled, i.e. when the session is running.
pub fn ctrl_c() -> Interrupt {
    Box::pin(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for interrupt signal: {}", err);
            std::future::pending::<()>().await;
        }
    })
}

pub struct SessionController {
    options: SessionOptions,
    config: Config,
    runner: Arc<dyn CommandRunner>,
    ports: PortAllocator,
    interrupt: Option<Interrupt>,
    history: Vec<SessionState>,
    signal: Option<SessionLifecycleSignal>,
}

impl SessionController {
    pub fn new(
        options: SessionOptions,
        config: Config,
        runner: Arc<dyn CommandRunner>,
        ports: PortAllocator,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            options,
            config,
            runner,
            ports,
            interrupt: Some(interrupt),
            history: Vec::new(),
            signal: None,
        }
    }

    /// States entered so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn state(&self) -> Option<SessionState> {
        self.history.last().copied()
    }

    pub fn signal(&self) -> Option<SessionLifecycleSignal> {
        self.signal
    }

    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_stages().await;
        if let Err(err) = &result {
            debug!("session failed in {:?}: {}", self.state(), err);
            self.enter(SessionState::Failed);
        }
        result
    }

    fn enter(&mut self, state: SessionState) {
        debug!("session state -> {:?}", state);
        self.history.push(state);
    }

    async fn run_stages(&mut self) -> Result<()> {
        self.enter(SessionState::Resolving);
        info!("ensuring code-server is updated...");
        let host = HostResolver::new(self.runner.clone())
            .resolve(&self.options.host)
            .await?;
        let ssh_flags = host.ssh_flags(&self.options.ssh_flags);
        let bind = self.ports.parse_bind_address(&self.options.bind_address)?;
        let remote_port = match self.options.remote_port {
            Some(port) => port,
            None => self.ports.allocate()?,
        };

        self.enter(SessionState::Bootstrapping);
        let tunnels = TunnelOrchestrator::new(
            self.runner.clone(),
            ServerDeployment::new(&self.config.server),
        );
        tunnels.bootstrap(&host.address, &ssh_flags).await?;

        let sync = if self.options.skip_sync {
            None
        } else {
            self.enter(SessionState::SyncingIn);
            let sync = SyncCoordinator::new(
                self.runner.clone(),
                host.address.as_str(),
                ssh_flags.as_str(),
                SyncSpec::settings(&self.config.sync)?,
                SyncSpec::extensions(&self.config.sync)?,
            );
            sync.sync_class(AssetClass::Settings, Direction::Push).await?;
            sync.sync_class(AssetClass::Extensions, Direction::Push).await?;
            Some(sync)
        };

        self.enter(SessionState::TunnelStarting);
        info!("starting code-server...");
        let mut tunnel = tunnels.start_tunnel(
            &host.address,
            &ssh_flags,
            &bind,
            remote_port,
            &self.options.remote_dir,
        )?;
        debug!("tunnel: {}", tunnel.command());

        self.enter(SessionState::Probing);
        let url = format!("http://{}", bind);
        let probe = ReadinessProbe::new(self.config.probe.attempt_timeout())?;
        if let Err(err) = probe
            .wait_until_ready(&url, self.config.probe.deadline())
            .await
        {
            tunnel.shutdown().await;
            return Err(err);
        }

        self.enter(SessionState::Running);
        if self.options.open_browser {
            BrowserLauncher::new(self.runner.clone(), self.config.browser.command.clone())
                .open(&url);
        }
        info!("code-server is available at {}", url);

        let interrupt = self
            .interrupt
            .take()
            .unwrap_or_else(|| Box::pin(std::future::pending()));
        let signal = tokio::select! {
            code = tunnel.wait_for_exit() => {
                debug!("tunnel ended with {:?}", code);
                SessionLifecycleSignal::TunnelEnded
            }
            _ = interrupt => SessionLifecycleSignal::UserInterrupted,
        };
        self.signal = Some(signal);
        if signal == SessionLifecycleSignal::UserInterrupted {
            if let Some(code) = tunnel.shutdown().await {
                debug!("tunnel stopped with {}", code);
            }
        }

        // Skipping sync overrides a sync-back request.
        let sync_back = sync.filter(|_| self.options.sync_back);
        let Some(sync) = sync_back else {
            info!("shutting down");
            self.enter(SessionState::Done);
            return Ok(());
        };

        self.enter(SessionState::SyncingBack);
        info!("synchronizing VS Code back to local");
        sync.sync_class(AssetClass::Extensions, Direction::Pull).await?;
        sync.sync_class(AssetClass::Settings, Direction::Pull).await?;

        self.enter(SessionState::Done);
        Ok(())
    }
}
