//! Parser for the back-end configuration spec string:
//!
//!   zunkdb:<host>:<port>[,timeout=<positive-seconds>][,concurrency=<positive-integer>]
//!
//! `host` must be a dotted-quad IPv4 literal. A missing port, an
//! unrecognised option, or a zero numeric value is rejected.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

const PREFIX: &str = "zunkdb:";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("spec does not start with \"zunkdb:\": {0:?}")]
    WrongScheme(String),
    #[error("no address given in spec")]
    MissingAddress,
    #[error("no port given for host {0:?}")]
    MissingPort,
    #[error("invalid IPv4 host {0:?}")]
    BadHost(String),
    #[error("invalid port {0:?}")]
    BadPort(String),
    #[error("unknown option: {0:?}")]
    UnknownOption(String),
    #[error("timeout must be a positive number of seconds, got {0:?}")]
    BadTimeout(String),
    #[error("concurrency must be a positive integer, got {0:?}")]
    BadConcurrency(String),
}

/// Parsed, immutable back-end configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSpec {
    pub start_node: SocketAddrV4,
    pub timeout: Duration,
    /// `None` means unbounded fan-out (the default).
    pub max_concurrency: Option<usize>,
}

impl BackendSpec {
    pub fn parse(spec: &str) -> Result<Self, SpecError> {
        let rest = spec
            .strip_prefix(PREFIX)
            .ok_or_else(|| SpecError::WrongScheme(spec.to_string()))?;

        // The original C implementation sized its scratch copy with
        // `strlen(spec + 1)`, one byte short of the real spec length; we
        // just keep the whole string (see spec.md DESIGN NOTES).
        let mut opts = rest.split(',');

        let addr_part = opts.next().filter(|s| !s.is_empty()).ok_or(SpecError::MissingAddress)?;
        let (host, port) = addr_part
            .split_once(':')
            .ok_or(SpecError::MissingPort)?;

        let host: Ipv4Addr = host.parse().map_err(|_| SpecError::BadHost(host.to_string()))?;
        let port: u16 = port.parse().map_err(|_| SpecError::BadPort(port.to_string()))?;
        let start_node = SocketAddrV4::new(host, port);

        let mut timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let mut max_concurrency = None;

        for opt in opts {
            if let Some(value) = opt.strip_prefix("timeout=") {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| SpecError::BadTimeout(value.to_string()))?;
                if secs == 0 {
                    return Err(SpecError::BadTimeout(value.to_string()));
                }
                timeout = Duration::from_secs(secs);
            } else if let Some(value) = opt.strip_prefix("concurrency=") {
                let n: usize = value
                    .parse()
                    .map_err(|_| SpecError::BadConcurrency(value.to_string()))?;
                if n == 0 {
                    return Err(SpecError::BadConcurrency(value.to_string()));
                }
                max_concurrency = Some(n);
            } else {
                return Err(SpecError::UnknownOption(opt.to_string()));
            }
        }

        Ok(BackendSpec {
            start_node,
            timeout,
            max_concurrency,
        })
    }
}
