//! Listen endpoints for the control API.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the API listens: a TCP address or a Unix socket path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// Unix domain socket.
    Unix {
        /// Path to the socket file.
        path: PathBuf,
    },
    /// TCP socket.
    Tcp {
        /// Socket address (IP and port).
        addr: SocketAddr,
    },
}

impl Transport {
    /// Creates a Unix socket transport.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Creates a TCP transport.
    #[must_use]
    pub const fn tcp(addr: SocketAddr) -> Self {
        Self::Tcp { addr }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
            Self::Tcp { addr } => write!(f, "tcp://{addr}"),
        }
    }
}
