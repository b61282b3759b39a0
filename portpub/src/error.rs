use std::net::IpAddr;

use portpub_core::CoreError;
use thiserror::Error;

use crate::mapping::{Binding, HostKey, Protocol};
use crate::range::PortRange;

pub type Result<T> = std::result::Result<T, PortError>;

/// Rejections of user-supplied port specs. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid port range: '{0}'")]
    InvalidRange(String),

    #[error("Host range {host} and container range {container} differ in size")]
    RangeSizeMismatch { host: String, container: String },

    #[error("Invalid protocol: '{0}' (expected tcp or udp)")]
    InvalidProtocol(String),

    #[error("Invalid port spec: '{0}'")]
    InvalidFormat(String),

    #[error("Invalid host address: '{0}'")]
    InvalidHostAddress(String),
}

#[derive(Error, Debug)]
pub enum PortError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Bind for {address}:{port}/{protocol} failed: port is already allocated")]
    PortUnavailable {
        address: IpAddr,
        protocol: Protocol,
        port: u16,
    },

    #[error("No free block of {size} {protocol} port(s) on {address} within {range}")]
    ExhaustedRange {
        address: IpAddr,
        protocol: Protocol,
        size: usize,
        range: PortRange,
    },

    #[error("Binding {address}:{port}/{protocol} already exists for container {owner}")]
    DuplicateBinding {
        address: IpAddr,
        protocol: Protocol,
        port: u16,
        owner: String,
    },

    #[error("Inconsistent port state: {0}")]
    Inconsistent(String),

    /// Unpublish removed the bindings, but some of their ports were not in the pool.
    #[error(
        "Inconsistent port state: container {container_id} held ports missing from the pool: {}",
        .missing.iter().map(HostKey::to_string).collect::<Vec<_>>().join(", ")
    )]
    UntrackedRelease {
        container_id: String,
        missing: Vec<HostKey>,
        removed: Vec<Binding>,
    },

    #[error("Invalid container id: '{0}'")]
    InvalidContainerId(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PortError {
    /// True for errors caused by the caller's input rather than engine state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PortError::Parse(_)
                | PortError::PortUnavailable { .. }
                | PortError::ExhaustedRange { .. }
                | PortError::InvalidContainerId(_)
        )
    }
}
