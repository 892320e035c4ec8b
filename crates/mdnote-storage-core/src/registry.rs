//! Per-tenant adapter cache.
//!
//! Providers keep exactly one adapter per tenant for the life of the
//! process. Lookup and insertion happen under one mutex, so concurrent first
//! resolutions for a new tenant converge on a single retained instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct AdapterRegistry<A> {
    inner: Mutex<HashMap<String, Arc<A>>>,
}

impl<A> Default for AdapterRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AdapterRegistry<A> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Get the tenant's adapter, creating it with `create` on first use.
    /// Returns the adapter and whether this call created it.
    pub fn get_or_create<F>(&self, tenant_id: &str, create: F) -> (Arc<A>, bool)
    where
        F: FnOnce() -> A,
    {
        let mut map = self.inner.lock().expect("adapter registry poisoned");
        if let Some(existing) = map.get(tenant_id) {
            return (Arc::clone(existing), false);
        }
        let adapter = Arc::new(create());
        map.insert(tenant_id.to_string(), Arc::clone(&adapter));
        (adapter, true)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("adapter registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
