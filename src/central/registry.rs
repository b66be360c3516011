//! Visited-address registry
//!
//! Remembers which peripherals the run already connected to, so repeated
//! advertisements of one address lead to a single connection attempt.

use std::collections::HashSet;

use crate::gatt::Address;

/// Addresses visited during one run. Grows monotonically, never persisted.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    visited: HashSet<Address>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an address visited. Returns `false` if it already was.
    pub fn visit(&mut self, address: &Address) -> bool {
        self.visited.insert(address.clone())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.visited.contains(address)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
