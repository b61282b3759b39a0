//! Parsing of textual port-publish specs.
//!
//! Accepted forms:
//!
//! ```text
//! containerPortOrRange[/protocol]
//! hostPortOrRange:containerPortOrRange[/protocol]
//! hostIP:hostPortOrRange:containerPortOrRange[/protocol]
//! hostIP::containerPortOrRange[/protocol]
//! [ipv6]:hostPortOrRange:containerPortOrRange[/protocol]
//! ```
//!
//! Parsing never touches allocation state.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::allocator::HostPortRequest;
use crate::error::ParseError;
use crate::mapping::Protocol;
use crate::range::PortRange;

/// One user-declared publish intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// `None` means the engine's default (wildcard) address.
    pub host_address: Option<IpAddr>,
    /// `None` means "allocate automatically".
    pub host_range: Option<PortRange>,
    pub container_range: PortRange,
    pub protocol: Protocol,
}

impl PortSpec {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::InvalidFormat(raw.to_string()));
        }

        let (body, protocol) = split_protocol(raw)?;
        let (host_address, host_part, container_part) = split_sides(raw, body)?;

        let container_range = PortRange::parse(container_part)?;
        let host_range = match host_part {
            Some(part) => Some(PortRange::parse(part)?),
            None => None,
        };

        let spec = PortSpec {
            host_address,
            host_range,
            container_range,
            protocol,
        };
        spec.check_sizes()?;
        Ok(spec)
    }

    /// Parses a comma-separated list such as `9876:80,9877:81`.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, ParseError> {
        raw.split(',').map(Self::parse).collect()
    }

    /// A spec publishing `range` to automatically chosen host ports.
    pub fn container_only(range: PortRange, protocol: Protocol) -> Self {
        PortSpec {
            host_address: None,
            host_range: None,
            container_range: range,
            protocol,
        }
    }

    /// Publish-all: automatic specs for every exposed port that `explicit`
    /// does not already publish.
    ///
    /// Each exposed range is split around explicitly published ports, and a
    /// port exposed twice is only published once.
    pub fn publish_all(exposed: &[Exposure], explicit: &[PortSpec]) -> Vec<Self> {
        let mut claimed: BTreeSet<(u16, Protocol)> = BTreeSet::new();
        for spec in explicit {
            claimed.extend(spec.container_range.ports().map(|port| (port, spec.protocol)));
        }

        let mut specs = Vec::new();
        for exposure in exposed {
            let mut run: Option<PortRange> = None;
            for port in exposure.range.ports() {
                if !claimed.insert((port, exposure.protocol)) {
                    if let Some(range) = run.take() {
                        specs.push(Self::container_only(range, exposure.protocol));
                    }
                    continue;
                }
                run = Some(match run {
                    Some(range) => PortRange {
                        start: range.start,
                        end: port,
                    },
                    None => PortRange {
                        start: port,
                        end: port,
                    },
                });
            }
            if let Some(range) = run {
                specs.push(Self::container_only(range, exposure.protocol));
            }
        }
        specs
    }

    fn check_sizes(&self) -> Result<(), ParseError> {
        if let Some(host) = self.host_range {
            // A host range with a single container port picks one host port from it.
            let pairs_positionally = !self.container_range.is_single() || host.is_single();
            if pairs_positionally && host.len() != self.container_range.len() {
                return Err(ParseError::RangeSizeMismatch {
                    host: host.to_string(),
                    container: self.container_range.to_string(),
                });
            }
        }
        Ok(())
    }

    /// How the allocator should pick host ports for this spec.
    pub fn host_request(&self) -> HostPortRequest {
        match self.host_range {
            None => HostPortRequest::Ephemeral,
            Some(host) if host.len() == self.container_range.len() => HostPortRequest::Exact(host),
            Some(host) => HostPortRequest::Within(host),
        }
    }

    /// Number of host ports this spec needs.
    pub fn host_port_count(&self) -> usize {
        self.container_range.len()
    }

    /// Element-wise `(container_port, host_port)` pairs once `host_block` is allocated.
    pub fn pairs(&self, host_block: PortRange) -> Vec<(u16, u16)> {
        self.container_range
            .ports()
            .zip(host_block.ports())
            .collect()
    }
}

/// Ports declared by a container without being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Exposure {
    pub range: PortRange,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Exposure {
    /// Parses `containerPortOrRange[/protocol]`.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        let (body, protocol) = split_protocol(raw)?;
        if body.contains(':') {
            return Err(ParseError::InvalidFormat(raw.to_string()));
        }
        Ok(Exposure {
            range: PortRange::parse(body)?,
            protocol,
        })
    }
}

fn split_protocol(raw: &str) -> Result<(&str, Protocol), ParseError> {
    match raw.rsplit_once('/') {
        Some((body, proto)) => Ok((body, proto.parse()?)),
        None => Ok((raw, Protocol::default())),
    }
}

type Sides<'a> = (Option<IpAddr>, Option<&'a str>, &'a str);

fn split_sides<'a>(raw: &str, body: &'a str) -> Result<Sides<'a>, ParseError> {
    if let Some(rest) = body.strip_prefix('[') {
        let (addr, rest) = rest
            .split_once(']')
            .ok_or_else(|| ParseError::InvalidHostAddress(body.to_string()))?;
        let address = parse_address(addr)?;
        let rest = rest
            .strip_prefix(':')
            .ok_or_else(|| ParseError::InvalidFormat(raw.to_string()))?;
        let (host, container) = rest
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidFormat(raw.to_string()))?;
        return Ok((Some(address), optional(host), container));
    }

    let parts: Vec<&str> = body.split(':').collect();
    match parts.as_slice() {
        [container] => Ok((None, None, *container)),
        // An empty host side here is rejected as a range, like `-9090:80`.
        [host, container] => Ok((None, Some(*host), *container)),
        [addr, host, container] => Ok((Some(parse_address(addr)?), optional(host), *container)),
        _ => Err(ParseError::InvalidFormat(raw.to_string())),
    }
}

fn optional(part: &str) -> Option<&str> {
    if part.is_empty() {
        None
    } else {
        Some(part)
    }
}

fn parse_address(addr: &str) -> Result<IpAddr, ParseError> {
    addr.parse()
        .map_err(|_| ParseError::InvalidHostAddress(addr.to_string()))
}
