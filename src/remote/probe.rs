//! Readiness detection for the tunneled code-server.
//!
//! code-server has no health endpoint, so "accepts a connection and answers
//! HTTP" is the only signal available. Any status code counts as ready.

use std::time::Duration;

use log::{debug, trace};
use tokio::time::{timeout_at, Instant};

use crate::error::{Error, Result};

pub struct ReadinessProbe {
    client: reqwest::Client,
}

impl ReadinessProbe {
    pub fn new(attempt_timeout: Duration) -> Result<Self> {
        // Loopback target: never routed through a proxy.
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(attempt_timeout)
            .build()
            .map_err(|err| std::io::Error::other(format!("Failed to create HTTP client: {}", err)))?;
        Ok(Self { client })
    }

    /// Polls `url` back to back until it answers or `deadline` elapses.
    pub async fn wait_until_ready(&self, url: &str, deadline: Duration) -> Result<()> {
        let expires = Instant::now() + deadline;
        let timeout_error = || Error::Timeout {
            url: url.to_string(),
            deadline,
        };

        let mut attempts = 0u32;
        loop {
            if Instant::now() >= expires {
                return Err(timeout_error());
            }
            attempts += 1;

            match timeout_at(expires, self.client.get(url).send()).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{} answered {} after {} attempt(s)",
                        url,
                        response.status(),
                        attempts
                    );
                    return Ok(());
                }
                Ok(Err(err)) => trace!("{} not ready: {}", url, err),
                Err(_) => return Err(timeout_error()),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> ReadinessProbe {
        ReadinessProbe::new(Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn any_http_answer_is_ready() {
        let addr = test_server::serve("503 Service Unavailable").await;
        probe()
            .wait_until_ready(&format!("http://{}", addr), Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn silent_port_times_out() {
        // Bound but never accepted: connections hang until the deadline.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let err = probe()
            .wait_until_ready(&url, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn refused_connections_are_retried_until_deadline() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let started = Instant::now();
        let err = probe()
            .wait_until_ready(&format!("http://127.0.0.1:{}", port), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn proxy_settings_are_ignored() {
        let proxy = test_server::serve("502 Bad Gateway").await;
        let proxy_url = format!("http://{}", proxy);
        for var in ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
            std::env::set_var(var, &proxy_url);
        }
        for var in ["NO_PROXY", "no_proxy"] {
            std::env::remove_var(var);
        }
        let probe = probe();

        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = probe
            .wait_until_ready(&format!("http://127.0.0.1:{}", port), Duration::from_millis(500))
            .await;

        for var in ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
            std::env::remove_var(var);
        }
        assert!(matches!(result, Err(Error::Timeout { .. })), "{result:?}");
    }

    #[tokio::test]
    async fn late_server_is_picked_up() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            if let Ok((mut stream, _)) = listener.accept().await {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                    .await;
            }
        });

        probe()
            .wait_until_ready(&format!("http://{}", addr), Duration::from_secs(5))
            .await
            .unwrap();
    }
}
