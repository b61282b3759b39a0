//! Transactional publish/unpublish over the port pool and binding table.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use portpub_config::EngineConfig;
use tracing::{debug, error, info, warn};

use crate::allocator::{HostPortRequest, PortPool, RangeAllocator};
use crate::error::{PortError, Result};
use crate::mapping::{Binding, HostKey, Protocol};
use crate::range::PortRange;
use crate::spec::PortSpec;
use crate::table::{sort_for_display, BindingTable};

/// Pool and table are only ever mutated together under one lock.
#[derive(Debug, Default)]
struct EngineState {
    pool: PortPool,
    table: BindingTable,
}

/// Publishes and unpublishes container ports.
///
/// A single mutex guards the pool and the table; `publish` holds it for the
/// whole call including rollback, so concurrent callers never observe a
/// half-published container.
#[derive(Debug)]
pub struct PortMapper {
    allocator: RangeAllocator,
    default_host: IpAddr,
    state: Mutex<EngineState>,
}

impl PortMapper {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            allocator: RangeAllocator::from_config(config)?,
            default_host: config.default_host_address,
            state: Mutex::new(EngineState::default()),
        })
    }

    /// Rebuilds engine state from a snapshot of live bindings.
    pub fn from_bindings<I>(config: &EngineConfig, bindings: I) -> Result<Self>
    where
        I: IntoIterator<Item = Binding>,
    {
        let mapper = Self::new(config)?;
        {
            let mut state = mapper.lock()?;
            for binding in bindings {
                if binding.host_port == 0 || binding.container_port == 0 {
                    return Err(PortError::Inconsistent(format!(
                        "binding of container {} uses port 0",
                        binding.container_id
                    )));
                }
                let key = binding.host_key();
                state.table.add(binding)?;
                state.pool.mark(key.address, key.protocol, key.port);
            }
            debug!(bindings = state.table.len(), "restored engine state");
        }
        Ok(mapper)
    }

    /// Parses raw spec strings, then publishes them.
    ///
    /// Parse errors are reported before any state is touched.
    pub fn publish_raw<S: AsRef<str>>(
        &self,
        container_id: &str,
        raw_specs: &[S],
    ) -> Result<Vec<Binding>> {
        let specs = raw_specs
            .iter()
            .map(|raw| PortSpec::parse(raw.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.publish(container_id, &specs)
    }

    /// Realizes every spec for `container_id`, or nothing at all.
    ///
    /// Returned bindings are in display order.
    pub fn publish(&self, container_id: &str, specs: &[PortSpec]) -> Result<Vec<Binding>> {
        validate_container_id(container_id)?;

        let mut state = self.lock()?;
        let mut txn = Transaction::new(&mut state, &self.allocator);

        for spec in self.allocation_order(specs) {
            let address = spec.host_address.unwrap_or(self.default_host);
            let block = txn.allocate(
                address,
                spec.protocol,
                spec.host_request(),
                spec.host_port_count(),
            );
            let block = match block {
                Ok(block) => block,
                Err(e) => return Err(txn.abort(container_id, e)),
            };

            for (container_port, host_port) in spec.pairs(block) {
                let binding = Binding {
                    container_id: container_id.to_string(),
                    container_port,
                    protocol: spec.protocol,
                    host_address: address,
                    host_port,
                };
                if let Err(e) = txn.insert(binding) {
                    return Err(txn.abort(container_id, e));
                }
            }
        }

        let mut bindings = txn.commit();
        sort_for_display(&mut bindings);
        info!(container_id, bindings = bindings.len(), "published ports");
        Ok(bindings)
    }

    /// Removes all bindings of `container_id` and frees their host ports.
    ///
    /// Safe to repeat and safe on containers that never published. A binding
    /// whose port was already missing from the pool is still removed, and the
    /// call then reports the inconsistency.
    pub fn unpublish(&self, container_id: &str) -> Result<Vec<Binding>> {
        let mut state = self.lock()?;
        let EngineState { pool, table } = &mut *state;

        let removed = table.remove_by_container(container_id);
        let mut missing = Vec::new();
        for binding in &removed {
            let port = PortRange::single(binding.host_port)?;
            if self.allocator.release(pool, binding.host_address, binding.protocol, port) == 0 {
                missing.push(binding.host_key());
            }
        }

        if !missing.is_empty() {
            let keys: Vec<String> = missing.iter().map(HostKey::to_string).collect();
            error!(container_id, missing = ?keys, "bound ports were not in the pool");
            return Err(PortError::UntrackedRelease {
                container_id: container_id.to_string(),
                missing,
                removed,
            });
        }

        if removed.is_empty() {
            debug!(container_id, "nothing to unpublish");
        } else {
            info!(container_id, bindings = removed.len(), "unpublished ports");
        }
        Ok(removed)
    }

    pub fn query_by_container(
        &self,
        container_id: &str,
        container_port: Option<u16>,
    ) -> Result<Vec<Binding>> {
        Ok(self
            .lock()?
            .table
            .query_by_container(container_id, container_port))
    }

    pub fn query_one(
        &self,
        container_id: &str,
        container_port: u16,
        protocol: Protocol,
    ) -> Result<Vec<Binding>> {
        Ok(self
            .lock()?
            .table
            .query_one(container_id, container_port, protocol))
    }

    pub fn containers(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.table.containers())
    }

    pub fn bindings(&self) -> Result<Vec<Binding>> {
        Ok(self.lock()?.table.all())
    }

    pub fn is_occupied(&self, address: IpAddr, protocol: Protocol, port: u16) -> Result<bool> {
        Ok(self.lock()?.pool.is_occupied(address, protocol, port))
    }

    /// Copy of the current pool, for inspection.
    pub fn pool_snapshot(&self) -> Result<PortPool> {
        Ok(self.lock()?.pool.clone())
    }

    /// Checks that the pool is exactly the set of ports held by live bindings.
    pub fn verify_consistency(&self) -> Result<()> {
        let state = self.lock()?;
        let mut expected = PortPool::new();
        for binding in state.table.all() {
            expected.mark(binding.host_address, binding.protocol, binding.host_port);
        }

        if expected != state.pool {
            error!(
                pool = state.pool.len(),
                bindings = state.table.len(),
                "port pool diverged from binding table"
            );
            return Err(PortError::Inconsistent(format!(
                "pool holds {} port(s) but bindings occupy {}",
                state.pool.len(),
                expected.len()
            )));
        }
        Ok(())
    }

    /// Explicit host ports are claimed before any search runs so that a
    /// search in the same call cannot take a port requested explicitly later.
    fn allocation_order<'a>(&self, specs: &'a [PortSpec]) -> Vec<&'a PortSpec> {
        let rank = |spec: &PortSpec| match spec.host_request() {
            HostPortRequest::Exact(_) => 0,
            HostPortRequest::Within(_) => 1,
            HostPortRequest::Ephemeral => 2,
        };
        let mut ordered: Vec<&PortSpec> = specs.iter().collect();
        ordered.sort_by_key(|spec| (spec.protocol, rank(spec)));
        ordered
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|e| PortError::Internal(format!("engine state lock poisoned: {}", e)))
    }
}

fn validate_container_id(container_id: &str) -> Result<()> {
    if container_id.trim().is_empty() || container_id.chars().any(char::is_whitespace) {
        return Err(PortError::InvalidContainerId(container_id.to_string()));
    }
    Ok(())
}

/// Records every side effect of one publish call so a single routine can
/// undo exactly that set.
///
/// Dropping an uncommitted transaction rolls it back.
struct Transaction<'a> {
    state: &'a mut EngineState,
    allocator: &'a RangeAllocator,
    allocated: Vec<(IpAddr, Protocol, PortRange)>,
    inserted: Vec<Binding>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    fn new(state: &'a mut EngineState, allocator: &'a RangeAllocator) -> Self {
        Self {
            state,
            allocator,
            allocated: Vec::new(),
            inserted: Vec::new(),
            committed: false,
        }
    }

    fn allocate(
        &mut self,
        address: IpAddr,
        protocol: Protocol,
        request: HostPortRequest,
        size: usize,
    ) -> Result<PortRange> {
        let block = self
            .allocator
            .allocate(&mut self.state.pool, address, protocol, request, size)?;
        self.allocated.push((address, protocol, block));
        Ok(block)
    }

    fn insert(&mut self, binding: Binding) -> Result<()> {
        self.state.table.add(binding.clone())?;
        self.inserted.push(binding);
        Ok(())
    }

    fn commit(mut self) -> Vec<Binding> {
        self.committed = true;
        std::mem::take(&mut self.inserted)
    }

    /// Rolls back and hands the original error back to the caller.
    fn abort(mut self, container_id: &str, err: PortError) -> PortError {
        warn!(
            container_id,
            error = %err,
            allocated = self.allocated.len(),
            inserted = self.inserted.len(),
            "publish failed, rolling back"
        );
        self.rollback();
        err
    }

    fn rollback(&mut self) {
        for binding in self.inserted.drain(..).rev() {
            self.state.table.remove(&binding.host_key());
        }
        for (address, protocol, block) in self.allocated.drain(..).rev() {
            self.allocator
                .release(&mut self.state.pool, address, protocol, block);
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}
