//! Store gateway: read access to the monitoring system's data stores.
//!
//! The service never writes upstream. It needs exactly four reads: the
//! configured interval lengths, the failing observations of a time window,
//! service metadata, and per-recipient notification preferences. The
//! [`StoreGateway`] trait is the seam; drivers are selected by `--db-driver`.

pub mod cache;
pub mod dummy;
pub mod elastic_maria;
pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{StoreConfig, StoreDriver};
use crate::errors::Result;
use self::cache::CachedStore;
use self::dummy::DummyStore;
use self::elastic_maria::ElasticMariaStore;
use self::models::{Observation, RecipientPreference, ServiceInfo};

/// Read operations against the monitoring store.
///
/// Implementations must be safe for concurrent callers; every engine and
/// dispatch task shares one instance.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Configured interval lengths in seconds.
    async fn intervals(&self) -> Result<Vec<u32>>;

    /// All failing samples in the half-open window `[from, to)` for services
    /// whose check interval equals `interval_secs`.
    async fn failing_observations(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval_secs: u32,
    ) -> Result<Vec<Observation>>;

    /// Service metadata by id. `None` when the service is not configured.
    async fn service_info(&self, service_id: i64) -> Result<Option<ServiceInfo>>;

    /// Notification preferences of every recipient subscribed to the service.
    async fn recipients_for(&self, service_id: i64) -> Result<Vec<RecipientPreference>>;

    /// Release held connections. Called once during shutdown.
    async fn close(&self) {}
}

/// Build the store gateway selected by the configuration, wrapping it in the
/// read-through cache when `--cache` is set.
pub async fn connect(config: &StoreConfig, time_profiling: bool) -> Result<Arc<dyn StoreGateway>> {
    let store: Arc<dyn StoreGateway> = match config.driver {
        StoreDriver::Dummydb => Arc::new(DummyStore::new()),
        StoreDriver::Elasticmaria => Arc::new(ElasticMariaStore::connect(config, time_profiling).await?),
    };

    if config.cache.enabled {
        tracing::info!(ttl = ?config.cache.ttl, "store record caching enabled");
        Ok(Arc::new(CachedStore::new(store, config.cache.ttl)))
    } else {
        Ok(store)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scriptable store for engine and dispatcher tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::errors::Error;
    use super::models::{ContactChannel, ServiceType};

    #[derive(Default)]
    pub struct ScriptedStore {
        /// One entry per expected `failing_observations` call; `Err` simulates
        /// a transient store failure.
        pub observation_batches: Mutex<VecDeque<std::result::Result<Vec<Observation>, String>>>,
        pub services: Mutex<HashMap<i64, ServiceInfo>>,
        pub recipients: Mutex<HashMap<i64, Vec<RecipientPreference>>>,
        pub info_calls: AtomicUsize,
        pub recipient_calls: AtomicUsize,
    }

    impl ScriptedStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_batch(&self, batch: Vec<Observation>) {
            self.observation_batches.lock().unwrap().push_back(Ok(batch));
        }

        pub fn push_failure(&self, message: &str) {
            self.observation_batches
                .lock()
                .unwrap()
                .push_back(Err(message.to_string()));
        }

        pub fn insert_service(&self, info: ServiceInfo) {
            self.services.lock().unwrap().insert(info.id, info);
        }

        pub fn insert_recipients(&self, service_id: i64, recipients: Vec<RecipientPreference>) {
            self.recipients.lock().unwrap().insert(service_id, recipients);
        }
    }

    #[async_trait]
    impl StoreGateway for ScriptedStore {
        async fn intervals(&self) -> Result<Vec<u32>> {
            Ok(vec![30])
        }

        async fn failing_observations(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _interval_secs: u32,
        ) -> Result<Vec<Observation>> {
            match self.observation_batches.lock().unwrap().pop_front() {
                Some(Ok(batch)) => Ok(batch),
                Some(Err(message)) => Err(Error::Store {
                    operation: "failing_observations",
                    source: message.into(),
                }),
                None => Ok(Vec::new()),
            }
        }

        async fn service_info(&self, service_id: i64) -> Result<Option<ServiceInfo>> {
            self.info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.services.lock().unwrap().get(&service_id).cloned())
        }

        async fn recipients_for(&self, service_id: i64) -> Result<Vec<RecipientPreference>> {
            self.recipient_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .recipients
                .lock()
                .unwrap()
                .get(&service_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    pub fn observation(service_id: i64, fail_threshold: u32, message: &str) -> Observation {
        Observation {
            service_id,
            fail_threshold,
            message: message.to_string(),
            duration: std::time::Duration::from_secs(1),
            request_id: format!("req-{service_id}"),
            resend_every: None,
        }
    }

    pub fn service_info(id: i64, host: &str) -> ServiceInfo {
        ServiceInfo {
            id,
            host: host.to_string(),
            target: format!("{host}.example.com"),
            port: 443,
            service_type: ServiceType::Tcp,
            fail_threshold: 5,
            interval_seconds: 30,
            metadata: r#"{"check": {"port": 443, "timeout": 5}}"#.to_string(),
        }
    }

    pub fn recipient(id: i64, service_id: i64, channel: ContactChannel, resend_after_minutes: u32) -> RecipientPreference {
        let target = match &channel {
            ContactChannel::Email => format!("user{id}@example.com"),
            ContactChannel::Sms | ContactChannel::Phone => format!("+4200000000{id}"),
            ContactChannel::Other(_) => format!("target-{id}"),
        };
        RecipientPreference {
            id,
            service_id,
            channel,
            target,
            resend_after_minutes,
        }
    }
}
