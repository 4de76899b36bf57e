//! Read-through TTL cache over a store gateway.
//!
//! Service metadata and recipient preferences change rarely compared to the
//! tick cadence, so `--cache` lets dispatches reuse recent lookups instead of
//! hitting MariaDB on every state edge. Observations and the interval list
//! are never cached; the engine depends on fresh windows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::models::{Observation, RecipientPreference, ServiceInfo};
use super::StoreGateway;
use crate::errors::Result;

struct CacheEntry<T> {
    fetched_at: Instant,
    value: T,
}

pub struct CachedStore {
    inner: Arc<dyn StoreGateway>,
    ttl: Duration,
    services: DashMap<i64, CacheEntry<Option<ServiceInfo>>>,
    recipients: DashMap<i64, CacheEntry<Vec<RecipientPreference>>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn StoreGateway>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            services: DashMap::new(),
            recipients: DashMap::new(),
        }
    }

    fn fresh<T>(&self, entry: &CacheEntry<T>) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }
}

#[async_trait]
impl StoreGateway for CachedStore {
    async fn intervals(&self) -> Result<Vec<u32>> {
        self.inner.intervals().await
    }

    async fn failing_observations(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval_secs: u32,
    ) -> Result<Vec<Observation>> {
        self.inner.failing_observations(from, to, interval_secs).await
    }

    async fn service_info(&self, service_id: i64) -> Result<Option<ServiceInfo>> {
        if let Some(entry) = self.services.get(&service_id) {
            if self.fresh(&entry) {
                return Ok(entry.value.clone());
            }
        }

        let value = self.inner.service_info(service_id).await?;
        self.services.insert(
            service_id,
            CacheEntry {
                fetched_at: Instant::now(),
                value: value.clone(),
            },
        );
        Ok(value)
    }

    async fn recipients_for(&self, service_id: i64) -> Result<Vec<RecipientPreference>> {
        if let Some(entry) = self.recipients.get(&service_id) {
            if self.fresh(&entry) {
                return Ok(entry.value.clone());
            }
        }

        let value = self.inner.recipients_for(service_id).await?;
        self.recipients.insert(
            service_id,
            CacheEntry {
                fetched_at: Instant::now(),
                value: value.clone(),
            },
        );
        Ok(value)
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{self, ScriptedStore};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_service_info_is_cached_within_ttl() {
        let inner = Arc::new(ScriptedStore::new());
        inner.insert_service(testing::service_info(2, "myWeb1"));

        let cached = CachedStore::new(inner.clone(), Duration::from_secs(60));

        let first = cached.service_info(2).await.unwrap();
        let second = cached.service_info(2).await.unwrap();
        assert_eq!(first.unwrap().host, "myWeb1");
        assert_eq!(second.unwrap().host, "myWeb1");

        assert_eq!(inner.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let inner = Arc::new(ScriptedStore::new());
        inner.insert_service(testing::service_info(2, "myWeb1"));

        let cached = CachedStore::new(inner.clone(), Duration::from_millis(10));

        cached.service_info(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cached.service_info(2).await.unwrap();

        assert_eq!(inner.info_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_absent_service_is_cached_too() {
        let inner = Arc::new(ScriptedStore::new());
        let cached = CachedStore::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.service_info(99).await.unwrap().is_none());
        assert!(cached.service_info(99).await.unwrap().is_none());
        assert_eq!(inner.info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observations_bypass_cache() {
        let inner = Arc::new(ScriptedStore::new());
        inner.push_batch(vec![testing::observation(2, 5, "down")]);
        inner.push_batch(vec![]);

        let cached = CachedStore::new(inner, Duration::from_secs(60));
        let now = Utc::now();

        let first = cached.failing_observations(now, now, 30).await.unwrap();
        let second = cached.failing_observations(now, now, 30).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
