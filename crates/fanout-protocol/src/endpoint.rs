//! Endpoint addresses
//!
//! `tcp://host:port` with `port` being a fixed port, `0` (the OS picks) or a
//! range `lo-hi` (the first free port in the range wins), and `ipc://path`.
//! The concrete address a socket ended up on is only known after binding.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Fixed(u16),
    Ephemeral,
    Range(u16, u16),
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(port) => write!(f, "{}", port),
            Self::Ephemeral => write!(f, "0"),
            Self::Range(lo, hi) => write!(f, "{}-{}", lo, hi),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: PortSpec },
    Ipc(PathBuf),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port: PortSpec::Fixed(port),
        }
    }

    /// True when the bound address is only known after binding.
    pub fn is_ephemeral(&self) -> bool {
        matches!(
            self,
            Self::Tcp {
                port: PortSpec::Ephemeral | PortSpec::Range(..),
                ..
            }
        )
    }

    /// Concrete addresses to try binding, in order.
    pub fn bind_candidates(&self) -> Vec<String> {
        match self {
            Self::Tcp { host, port } => match port {
                PortSpec::Fixed(port) => vec![format!("tcp://{}:{}", host, port)],
                PortSpec::Ephemeral => vec![format!("tcp://{}:0", host)],
                PortSpec::Range(lo, hi) => (*lo..=*hi)
                    .map(|port| format!("tcp://{}:{}", host, port))
                    .collect(),
            },
            Self::Ipc(path) => vec![format!("ipc://{}", path.display())],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ProtocolError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid("empty ipc path"));
            }
            return Ok(Self::Ipc(PathBuf::from(path)));
        }

        let rest = s
            .strip_prefix("tcp://")
            .ok_or_else(|| invalid("expected tcp:// or ipc:// scheme"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let parse_port = |p: &str| p.trim().parse::<u16>().map_err(|_| invalid("bad port"));
        let port = match port.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse_port(lo)?, parse_port(hi)?);
                if lo == 0 || lo > hi {
                    return Err(invalid("port range must be lo-hi with 0 < lo <= hi"));
                }
                PortSpec::Range(lo, hi)
            }
            None => match parse_port(port)? {
                0 => PortSpec::Ephemeral,
                p => PortSpec::Fixed(p),
            },
        };

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_and_ephemeral() {
        let fixed: Endpoint = "tcp://127.0.0.1:1909".parse().unwrap();
        assert_eq!(fixed, Endpoint::tcp("127.0.0.1", 1909));
        assert!(!fixed.is_ephemeral());
        assert_eq!(fixed.to_string(), "tcp://127.0.0.1:1909");

        let ephemeral: Endpoint = "tcp://127.0.0.1:0".parse().unwrap();
        assert!(ephemeral.is_ephemeral());
        assert_eq!(ephemeral.bind_candidates(), vec!["tcp://127.0.0.1:0"]);
    }

    #[test]
    fn test_port_range_candidates() {
        let endpoint: Endpoint = "tcp://192.168.2.10:1912-1914".parse().unwrap();
        assert!(endpoint.is_ephemeral());
        assert_eq!(
            endpoint.bind_candidates(),
            vec![
                "tcp://192.168.2.10:1912",
                "tcp://192.168.2.10:1913",
                "tcp://192.168.2.10:1914",
            ]
        );
        assert_eq!(endpoint.to_string(), "tcp://192.168.2.10:1912-1914");
    }

    #[test]
    fn test_ipc_endpoint() {
        let endpoint: Endpoint = "ipc:///tmp/fanout-tasks.ipc".parse().unwrap();
        assert_eq!(endpoint.bind_candidates(), vec!["ipc:///tmp/fanout-tasks.ipc"]);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "udp://127.0.0.1:1",
            "tcp://127.0.0.1",
            "tcp://:1909",
            "tcp://host:abc",
            "tcp://host:20-10",
            "tcp://host:0-10",
            "ipc://",
        ] {
            assert!(bad.parse::<Endpoint>().is_err(), "{} should not parse", bad);
        }
    }
}
