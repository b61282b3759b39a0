use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Represents the network protocol of a published port.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(ParseError::InvalidProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global uniqueness key of a binding: one host socket per protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    pub address: IpAddr,
    pub protocol: Protocol,
    pub port: u16,
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", SocketAddr::new(self.address, self.port), self.protocol)
    }
}

/// One realized host-port-to-container-port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub container_id: String,
    /// The port inside the container.
    pub container_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    pub host_address: IpAddr,
    /// The port on the host.
    pub host_port: u16,
}

impl Binding {
    pub fn host_key(&self) -> HostKey {
        HostKey {
            address: self.host_address,
            protocol: self.protocol,
            port: self.host_port,
        }
    }

    pub fn host_socket(&self) -> SocketAddr {
        SocketAddr::new(self.host_address, self.host_port)
    }

    /// Sort key for display: container port, protocol, host port, host address.
    pub fn display_order(&self) -> (u16, Protocol, u16, IpAddr) {
        (
            self.container_port,
            self.protocol,
            self.host_port,
            self.host_address,
        )
    }
}
