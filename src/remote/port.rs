//! Local port selection and bind address parsing.

use std::{fmt, net::TcpListener, ops::RangeInclusive};

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{Error, Result};

pub const MIN_PORT: u16 = 1024;
pub const MAX_PORT: u16 = 65535;
pub const MAX_TRIES: usize = 10;

const LOOPBACK: &str = "127.0.0.1";

/// A fully resolved `host:port` the tunnel listens on locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Picks random free ports. Availability is only certified at the instant
/// of checking: the listener is released before the port is returned, so the
/// caller has to claim it promptly.
pub struct PortAllocator {
    rng: StdRng,
    range: RangeInclusive<u16>,
    max_tries: usize,
}

impl PortAllocator {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            range: MIN_PORT..=MAX_PORT,
            max_tries: MAX_TRIES,
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    #[cfg(test)]
    fn with_range(rng: StdRng, range: RangeInclusive<u16>) -> Self {
        Self {
            rng,
            range,
            max_tries: MAX_TRIES,
        }
    }

    pub fn allocate(&mut self) -> Result<u16> {
        for _ in 0..self.max_tries {
            let port = self.rng.gen_range(self.range.clone());
            match TcpListener::bind(("0.0.0.0", port)) {
                Ok(listener) => {
                    drop(listener);
                    return Ok(port);
                }
                Err(err) => debug!("port taken: {} ({})", port, err),
            }
        }

        Err(Error::NoFreePort {
            tries: self.max_tries,
        })
    }

    /// Resolves a possibly partial `host:port`. An empty host becomes the
    /// loopback address and an empty port is allocated.
    pub fn parse_bind_address(&mut self, raw: &str) -> Result<BindAddress> {
        let raw = if raw.is_empty() { ":" } else { raw };
        let parse_error = |reason: &str| Error::Parse {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = split_host_port(raw).map_err(parse_error)?;
        let host = if host.is_empty() { LOOPBACK } else { host };
        let port = if port.is_empty() {
            self.allocate()?
        } else {
            port.parse::<u16>()
                .map_err(|_| parse_error("port is not a number between 0 and 65535"))?
        };

        Ok(BindAddress {
            host: host.to_string(),
            port,
        })
    }
}

fn split_host_port(raw: &str) -> core::result::Result<(&str, &str), &'static str> {
    if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or("missing ']' in address")?;
        let port = after.strip_prefix(':').ok_or("missing port in address")?;
        return Ok((host, port));
    }

    let (host, port) = raw.rsplit_once(':').ok_or("missing port in address")?;
    if host.contains(':') {
        return Err("too many colons in address");
    }
    Ok((host, port))
}
