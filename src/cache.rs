use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// Invalidation contract for downstream cash-flow projections.
///
/// Every successful budget mutation calls `invalidate_owner` synchronously
/// before reporting success, so the next projection read recomputes from
/// current rows. Implementations must be idempotent, cheap, and best-effort:
/// their own failure never fails the mutation. The trait exists so the
/// in-process map below can be swapped for a shared invalidation channel in
/// a multi-instance deployment.
pub trait ProjectionCache: Send + Sync {
    fn invalidate_owner(&self, owner_id: i64);
}

/// Per-process projection cache keyed by owner.
#[derive(Default)]
pub struct InMemoryProjectionCache {
    entries: Mutex<HashMap<i64, Value>>,
}

impl InMemoryProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, owner_id: i64, projection: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(owner_id, projection);
        }
    }

    pub fn get(&self, owner_id: i64) -> Option<Value> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&owner_id).cloned())
    }
}

impl ProjectionCache for InMemoryProjectionCache {
    fn invalidate_owner(&self, owner_id: i64) {
        // Best-effort: a poisoned lock drops the whole cache's usefulness,
        // not the mutation that called us.
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&owner_id);
        }
    }
}
