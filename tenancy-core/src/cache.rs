use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tenancy_model::{Resource, ResourceKind, TenantId};
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::Result;

/// A tenant-scoped list request against the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub tenant_id: TenantId,
    pub kind: ResourceKind,
}

impl ListQuery {
    pub fn new(tenant_id: TenantId, kind: ResourceKind) -> Self {
        Self { tenant_id, kind }
    }

    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Memoises list responses by query hash. One instance lives for a single
/// initialization pass and is never invalidated.
#[derive(Clone, Default, Debug)]
pub struct ListCache {
    inner: Arc<Mutex<HashMap<u64, Vec<Resource>>>>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached response for `query`, calling `fetch` on a miss.
    /// Failed fetches are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, query: ListQuery, fetch: F) -> Result<Vec<Resource>>
    where
        F: FnOnce(ListQuery) -> Fut,
        Fut: Future<Output = Result<Vec<Resource>>>,
    {
        let key = query.cache_key();
        let mut guard = self.inner.lock().await;
        if let Some(hit) = guard.get(&key) {
            trace!(kind = %query.kind, tenant_id = %query.tenant_id, "list cache hit");
            return Ok(hit.clone());
        }

        let fetched = fetch(query).await?;
        guard.insert(key, fetched.clone());
        Ok(fetched)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
