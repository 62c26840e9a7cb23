//! Shared test fixtures

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vigil_store::{KeyValueStore, MemoryStore, StoreError, StoreResult};

/// Backend wrapper whose availability can be toggled to simulate an outage
pub struct FlakyBackend {
    inner: MemoryStore,
    available: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            available: AtomicBool::new(true),
        })
    }

    pub fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("simulated outage".into()))
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyBackend {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        self.inner.set_nx_ex(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn scan_prefix(&self, prefix: &str, limit: usize) -> StoreResult<Vec<String>> {
        self.check()?;
        self.inner.scan_prefix(prefix, limit).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()?;
        self.inner.ping().await
    }
}
