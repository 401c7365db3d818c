//! Host specifier resolution.
//!
//! A plain specifier (`myhost`, `user@10.0.0.2`, an ssh config alias) is used
//! as-is. A `gcp:<instance>` specifier is looked up with `gcloud`, which
//! knows the external IP and the identity flags needed to reach it.

use std::{net::IpAddr, sync::Arc};

use log::{debug, info};

use super::ResolvedHost;
use crate::command::{CommandLine, CommandRunner};
use crate::error::{Error, Result};

/// Cloud providers whose connection helper can resolve an instance name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    Gcp,
}

impl CloudProvider {
    const ALL: [CloudProvider; 1] = [CloudProvider::Gcp];

    fn prefix(self) -> &'static str {
        match self {
            CloudProvider::Gcp => "gcp:",
        }
    }

    /// Splits a recognized prefix off `specifier`.
    pub fn detect(specifier: &str) -> Option<(CloudProvider, &str)> {
        Self::ALL.into_iter().find_map(|provider| {
            specifier
                .strip_prefix(provider.prefix())
                .map(|instance| (provider, instance))
        })
    }

    /// The helper invocation that prints the ssh command line without running it.
    fn dry_run_command(self, instance: &str) -> CommandLine {
        match self {
            CloudProvider::Gcp => CommandLine::shell(format!(
                "gcloud compute ssh --dry-run {}",
                instance
            )),
        }
    }
}

pub struct HostResolver {
    runner: Arc<dyn CommandRunner>,
}

impl HostResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn resolve(&self, specifier: &str) -> Result<ResolvedHost> {
        let specifier = specifier.trim();
        match CloudProvider::detect(specifier) {
            Some((provider, instance)) => {
                info!("looking up {:?} instance {}", provider, instance);
                self.resolve_with_helper(provider, specifier, instance).await
            }
            None => Ok(ResolvedHost {
                address: specifier.to_string(),
                extra_flags: String::new(),
            }),
        }
    }

    async fn resolve_with_helper(
        &self,
        provider: CloudProvider,
        specifier: &str,
        instance: &str,
    ) -> Result<ResolvedHost> {
        let command = provider.dry_run_command(instance);
        let output = self
            .runner
            .output(&command)
            .await
            .map_err(|err| resolution_error(specifier, format!("{}: {}", command, err)))?;

        if !output.success() {
            return Err(resolution_error(
                specifier,
                format!(
                    "'{}' exited with {}: {}",
                    command,
                    output.exit_code,
                    output.combined().trim()
                ),
            ));
        }

        let resolved = parse_ssh_command(&output.stdout)
            .map_err(|reason| resolution_error(specifier, reason))?;
        debug!(
            "{} resolved to {} (flags: '{}')",
            specifier, resolved.address, resolved.extra_flags
        );
        Ok(resolved)
    }
}

fn resolution_error(host: &str, reason: String) -> Error {
    Error::Resolution {
        host: host.to_string(),
        reason,
    }
}

/// Parses the ssh command a connection helper rendered, e.g.
/// `/usr/bin/ssh -t -i ~/.ssh/google_compute_engine user@35.1.2.3`.
fn parse_ssh_command(rendered: &str) -> core::result::Result<ResolvedHost, String> {
    let tokens: Vec<&str> = rendered.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(format!("unexpected helper output '{}'", rendered.trim()));
    }

    // Everything between the ssh binary and the destination.
    let extra_flags = tokens[1..tokens.len() - 1].join(" ");

    let destination = tokens[tokens.len() - 1];
    let ip = match destination.rsplit_once('@') {
        Some((_, ip)) => ip,
        None => destination,
    };

    if ip.parse::<IpAddr>().is_err() {
        return Err(format!("parsed invalid ip address '{}'", ip));
    }

    Ok(ResolvedHost {
        address: ip.to_string(),
        extra_flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::{CallKind, FakeRunner};

    fn resolver(fake: &Arc<FakeRunner>) -> HostResolver {
        HostResolver::new(fake.clone())
    }

    #[tokio::test]
    async fn plain_host_passes_through() {
        let fake = FakeRunner::new();
        let resolved = resolver(&fake).resolve("myhost").await.unwrap();
        assert_eq!(resolved.address, "myhost");
        assert_eq!(resolved.extra_flags, "");
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn surrounding_whitespace_is_trimmed() {
        let fake = FakeRunner::new();
        let resolved = resolver(&fake).resolve("  dev@box \n").await.unwrap();
        assert_eq!(resolved.address, "dev@box");
    }

    #[tokio::test]
    async fn gcp_instance_resolves_through_dry_run() {
        let fake = FakeRunner::new();
        fake.respond("gcloud", "/usr/bin/ssh -i key.pem user@10.0.0.5\n", 0);

        let resolved = resolver(&fake).resolve("gcp:my-instance").await.unwrap();
        assert_eq!(resolved.address, "10.0.0.5");
        assert_eq!(resolved.extra_flags, "-i key.pem");

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Output);
        assert_eq!(
            calls[0].command.args[1],
            "gcloud compute ssh --dry-run my-instance"
        );
    }

    #[tokio::test]
    async fn gcp_destination_without_user_is_accepted() {
        let fake = FakeRunner::new();
        fake.respond("gcloud", "/usr/bin/ssh -t 2001:db8::1", 0);

        let resolved = resolver(&fake).resolve("gcp:v6").await.unwrap();
        assert_eq!(resolved.address, "2001:db8::1");
        assert_eq!(resolved.extra_flags, "-t");
    }

    #[tokio::test]
    async fn single_token_output_is_a_resolution_error() {
        let fake = FakeRunner::new();
        fake.respond("gcloud", "/usr/bin/ssh", 0);

        let err = resolver(&fake).resolve("gcp:broken").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { ref host, .. } if host == "gcp:broken"));
    }

    #[tokio::test]
    async fn helper_failure_is_a_resolution_error() {
        let fake = FakeRunner::new();
        fake.respond("gcloud", "ERROR: instance not found", 1);

        let err = resolver(&fake).resolve("gcp:gone").await.unwrap_err();
        match err {
            Error::Resolution { reason, .. } => assert!(reason.contains("instance not found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_ip_destination_is_rejected() {
        assert!(parse_ssh_command("/usr/bin/ssh user@not-an-ip").is_err());
        assert!(parse_ssh_command("/usr/bin/ssh user@10.0.0.256").is_err());
    }

    #[test]
    fn last_at_sign_wins() {
        let resolved = parse_ssh_command("ssh -p 22 odd@user@192.168.1.9").unwrap();
        assert_eq!(resolved.address, "192.168.1.9");
        assert_eq!(resolved.extra_flags, "-p 22");
    }
}
