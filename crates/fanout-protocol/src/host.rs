//! Host specifications
//!
//! Format: `"host1 4, host2 -1"`, one `host cores` entry per host, where
//! `-1` stands for the host's core count.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub host: String,
    pub cores: i64,
}

impl HostSpec {
    pub fn new(host: impl Into<String>, cores: i64) -> Self {
        Self {
            host: host.into(),
            cores,
        }
    }

    /// Pools on these hosts are spawned directly instead of over a remote shell.
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "127.0.0.1" | "localhost")
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.host, self.cores)
    }
}

impl FromStr for HostSpec {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ProtocolError::InvalidHostSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split_whitespace().collect();
        let [host, cores] = parts.as_slice() else {
            return Err(invalid("expected '<host> <cores>'"));
        };
        // control urls are built as tcp://host:port
        if host.contains(':') {
            return Err(invalid("IPv6 literals are not supported, use a host name"));
        }
        let cores: i64 = cores.parse().map_err(|_| invalid("cores is not an integer"))?;
        if cores == 0 || cores < -1 {
            return Err(invalid("cores must be positive or -1"));
        }

        Ok(Self::new(*host, cores))
    }
}

/// Parse a comma-separated host list.
pub fn parse_hosts(s: &str) -> Result<Vec<HostSpec>, ProtocolError> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts() {
        let hosts = parse_hosts("127.0.0.1 -1, worker-02 16,").unwrap();
        assert_eq!(
            hosts,
            vec![HostSpec::new("127.0.0.1", -1), HostSpec::new("worker-02", 16)]
        );
        assert!(hosts[0].is_local());
        assert!(!hosts[1].is_local());
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!("worker-02".parse::<HostSpec>().is_err());
        assert!("worker-02 many".parse::<HostSpec>().is_err());
        assert!("worker-02 0".parse::<HostSpec>().is_err());
        assert!("worker-02 -4".parse::<HostSpec>().is_err());
        assert!(parse_hosts("127.0.0.1 2, broken").is_err());
    }

    #[test]
    fn test_rejects_ipv6_literals() {
        assert!("::1 2".parse::<HostSpec>().is_err());
        assert!(!HostSpec::new("::1", 2).is_local());
        assert!(HostSpec::new("localhost", 2).is_local());
    }
}
