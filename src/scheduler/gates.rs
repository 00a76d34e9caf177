//! Per-host concurrency gates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};

/// Lazily created binary semaphores, one per probed host.
///
/// Gates are never evicted; the map grows with the set of distinct hosts ever
/// probed, an accepted trade-off for a single-node service.
pub struct HostGates {
    gates: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl HostGates {
    pub fn new() -> Self {
        Self {
            gates: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the gate for `host`, creating it on first use.
    pub async fn get(&self, host: &str) -> Arc<Semaphore> {
        {
            let gates = self.gates.read().await;
            if let Some(gate) = gates.get(host) {
                return gate.clone();
            }
        }

        let mut gates = self.gates.write().await;
        // Re-check: another worker may have inserted while we waited.
        if let Some(gate) = gates.get(host) {
            return gate.clone();
        }
        let gate = Arc::new(Semaphore::new(1));
        gates.insert(host.to_string(), gate.clone());
        gate
    }
}

impl Default for HostGates {
    fn default() -> Self {
        Self::new()
    }
}
