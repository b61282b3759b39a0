//! Authoritative record of live bindings.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::error;

use crate::error::{PortError, Result};
use crate::mapping::{Binding, HostKey, Protocol};

/// Bindings indexed by host socket (global uniqueness) and by owning container.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    by_host: HashMap<HostKey, Binding>,
    by_container: BTreeMap<String, BTreeSet<HostKey>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }

    pub fn add(&mut self, binding: Binding) -> Result<()> {
        let key = binding.host_key();
        if let Some(existing) = self.by_host.get(&key) {
            error!(
                binding = %key,
                owner = %existing.container_id,
                requested_by = %binding.container_id,
                "duplicate binding rejected"
            );
            return Err(PortError::DuplicateBinding {
                address: key.address,
                protocol: key.protocol,
                port: key.port,
                owner: existing.container_id.clone(),
            });
        }

        self.by_container
            .entry(binding.container_id.clone())
            .or_default()
            .insert(key);
        self.by_host.insert(key, binding);
        Ok(())
    }

    /// Removes one binding by host key.
    pub fn remove(&mut self, key: &HostKey) -> Option<Binding> {
        let binding = self.by_host.remove(key)?;
        if let Some(keys) = self.by_container.get_mut(&binding.container_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_container.remove(&binding.container_id);
            }
        }
        Some(binding)
    }

    /// Removes every binding owned by `container_id`, returned in display order.
    pub fn remove_by_container(&mut self, container_id: &str) -> Vec<Binding> {
        let keys = self.by_container.remove(container_id).unwrap_or_default();
        let mut removed: Vec<Binding> = keys
            .iter()
            .filter_map(|key| self.by_host.remove(key))
            .collect();
        sort_for_display(&mut removed);
        removed
    }

    /// Bindings of one container, optionally narrowed to one container port.
    ///
    /// Ordered by container port, protocol, then host port.
    pub fn query_by_container(
        &self,
        container_id: &str,
        container_port: Option<u16>,
    ) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self
            .owned(container_id)
            .filter(|b| container_port.map_or(true, |port| b.container_port == port))
            .cloned()
            .collect();
        sort_for_display(&mut bindings);
        bindings
    }

    /// All host bindings of one (container port, protocol); may be empty or many.
    pub fn query_one(
        &self,
        container_id: &str,
        container_port: u16,
        protocol: Protocol,
    ) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self
            .owned(container_id)
            .filter(|b| b.container_port == container_port && b.protocol == protocol)
            .cloned()
            .collect();
        sort_for_display(&mut bindings);
        bindings
    }

    /// Containers with at least one binding, sorted.
    pub fn containers(&self) -> Vec<String> {
        self.by_container.keys().cloned().collect()
    }

    /// Every binding, grouped by container and in display order within each.
    pub fn all(&self) -> Vec<Binding> {
        self.by_container
            .keys()
            .flat_map(|id| self.query_by_container(id, None))
            .collect()
    }

    fn owned<'a>(&'a self, container_id: &str) -> impl Iterator<Item = &'a Binding> + 'a {
        self.by_container
            .get(container_id)
            .into_iter()
            .flatten()
            .filter_map(|key| self.by_host.get(key))
    }
}

/// Stable display order: container port, protocol, host port, host address.
pub fn sort_for_display(bindings: &mut [Binding]) {
    bindings.sort_by_key(Binding::display_order);
}
