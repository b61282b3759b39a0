//! Host port occupancy and allocation.
//!
//! Occupancy is tracked as discrete ports per (host address, protocol)
//! bucket, never as interval objects, so partial release and partial reuse
//! need no merging logic.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use portpub_config::EngineConfig;
use tracing::debug;

use crate::error::{ParseError, PortError, Result};
use crate::mapping::Protocol;
use crate::range::PortRange;

/// How host ports for one spec should be chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPortRequest {
    /// Exactly these ports; all-or-nothing.
    Exact(PortRange),
    /// The first free block of the required size inside this range.
    Within(PortRange),
    /// The first free block in the configured ephemeral range.
    Ephemeral,
}

/// Set of occupied host ports, keyed by (host address, protocol).
///
/// The wildcard address is a bucket of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortPool {
    buckets: HashMap<(IpAddr, Protocol), BTreeSet<u16>>,
}

impl PortPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_occupied(&self, address: IpAddr, protocol: Protocol, port: u16) -> bool {
        self.buckets
            .get(&(address, protocol))
            .is_some_and(|ports| ports.contains(&port))
    }

    /// Occupied ports of one bucket in ascending order.
    pub fn occupied(&self, address: IpAddr, protocol: Protocol) -> Vec<u16> {
        self.buckets
            .get(&(address, protocol))
            .map(|ports| ports.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of occupied ports across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns false if the port was already occupied.
    pub(crate) fn mark(&mut self, address: IpAddr, protocol: Protocol, port: u16) -> bool {
        self.buckets
            .entry((address, protocol))
            .or_default()
            .insert(port)
    }

    /// Returns false if the port was not occupied.
    pub(crate) fn free(&mut self, address: IpAddr, protocol: Protocol, port: u16) -> bool {
        let key = (address, protocol);
        let Some(ports) = self.buckets.get_mut(&key) else {
            return false;
        };
        let removed = ports.remove(&port);
        if ports.is_empty() {
            self.buckets.remove(&key);
        }
        removed
    }

    fn first_occupied_in(
        &self,
        address: IpAddr,
        protocol: Protocol,
        range: PortRange,
    ) -> Option<u16> {
        self.buckets
            .get(&(address, protocol))
            .and_then(|ports| ports.range(range.start..=range.end).next().copied())
    }
}

/// Picks concrete host ports out of a [`PortPool`].
///
/// The allocator holds no occupancy itself; callers pass the pool they own
/// and are responsible for serialising access to it.
#[derive(Debug, Clone)]
pub struct RangeAllocator {
    ephemeral: PortRange,
}

impl RangeAllocator {
    pub fn new(ephemeral: PortRange) -> Self {
        Self { ephemeral }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let ephemeral = PortRange::new(config.ephemeral.start, config.ephemeral.end)?;
        Ok(Self::new(ephemeral))
    }

    /// Allocates `size` contiguous host ports according to `request`.
    ///
    /// On success every returned port is marked occupied; on failure the pool
    /// is untouched.
    pub fn allocate(
        &self,
        pool: &mut PortPool,
        address: IpAddr,
        protocol: Protocol,
        request: HostPortRequest,
        size: usize,
    ) -> Result<PortRange> {
        if size == 0 {
            return Err(PortError::Internal("zero-sized port allocation".to_string()));
        }

        let block = match request {
            HostPortRequest::Exact(range) => {
                if range.len() != size {
                    return Err(ParseError::RangeSizeMismatch {
                        host: range.to_string(),
                        container: format!("{} port(s)", size),
                    }
                    .into());
                }
                if let Some(port) = pool.first_occupied_in(address, protocol, range) {
                    return Err(PortError::PortUnavailable {
                        address,
                        protocol,
                        port,
                    });
                }
                range
            }
            HostPortRequest::Within(range) => {
                self.find_free_block(pool, address, protocol, range, size)?
            }
            HostPortRequest::Ephemeral => {
                self.find_free_block(pool, address, protocol, self.ephemeral, size)?
            }
        };

        for port in block.ports() {
            pool.mark(address, protocol, port);
        }
        debug!(%address, %protocol, block = %block, "allocated host ports");
        Ok(block)
    }

    /// Frees every port of `range`; already-free ports are skipped.
    ///
    /// Returns how many ports were actually freed.
    pub fn release(
        &self,
        pool: &mut PortPool,
        address: IpAddr,
        protocol: Protocol,
        range: PortRange,
    ) -> usize {
        let freed = range
            .ports()
            .filter(|port| pool.free(address, protocol, *port))
            .count();
        debug!(%address, %protocol, range = %range, freed, "released host ports");
        freed
    }

    fn find_free_block(
        &self,
        pool: &PortPool,
        address: IpAddr,
        protocol: Protocol,
        within: PortRange,
        size: usize,
    ) -> Result<PortRange> {
        let exhausted = || PortError::ExhaustedRange {
            address,
            protocol,
            size,
            range: within,
        };

        let mut start = within.start;
        loop {
            let candidate = PortRange::with_len(start, size)
                .filter(|candidate| within.contains(candidate.end))
                .ok_or_else(exhausted)?;

            match pool.first_occupied_in(address, protocol, candidate) {
                None => return Ok(candidate),
                // Any block containing `port` is taken; resume just past it.
                Some(port) => start = port.checked_add(1).ok_or_else(exhausted)?,
            }
        }
    }
}
