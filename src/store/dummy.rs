//! Fixture-backed store driver.
//!
//! Serves a small fictional exmonitor installation so the binary runs without
//! any backing infrastructure: two interval buckets with failing services and
//! a mix of email and SMS recipients. This is the default `--db-driver`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{ContactChannel, Observation, RecipientPreference, ServiceInfo, ServiceType};
use super::StoreGateway;
use crate::errors::Result;

pub struct DummyStore;

impl DummyStore {
    pub fn new() -> Self {
        DummyStore
    }
}

impl Default for DummyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreGateway for DummyStore {
    async fn intervals(&self) -> Result<Vec<u32>> {
        Ok(vec![30, 60, 120])
    }

    async fn failing_observations(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        interval_secs: u32,
    ) -> Result<Vec<Observation>> {
        let observations = match interval_secs {
            30 => vec![Observation {
                service_id: 2,
                fail_threshold: 5,
                message: "check tcp: connection time out".to_string(),
                duration: Duration::from_secs(1),
                request_id: "req-2-tcp".to_string(),
                resend_every: Some(Duration::from_secs(10 * 60)),
            }],
            60 => vec![
                Observation {
                    service_id: 3,
                    fail_threshold: 3,
                    message: "check tcp: connection refused".to_string(),
                    duration: Duration::from_secs(1),
                    request_id: "req-3-tcp".to_string(),
                    resend_every: Some(Duration::from_secs(2 * 60)),
                },
                Observation {
                    service_id: 4,
                    fail_threshold: 5,
                    message: "check http: returned 503 status".to_string(),
                    duration: Duration::from_secs(1),
                    request_id: "req-4-http".to_string(),
                    resend_every: Some(Duration::from_secs(2 * 60)),
                },
            ],
            _ => Vec::new(),
        };

        Ok(observations)
    }

    async fn service_info(&self, service_id: i64) -> Result<Option<ServiceInfo>> {
        let info = match service_id {
            1 => Some(ServiceInfo {
                id: 1,
                host: "myServer1".to_string(),
                target: "web.myserver.com".to_string(),
                port: 80,
                service_type: ServiceType::Tcp,
                fail_threshold: 5,
                interval_seconds: 30,
                metadata: r#"{"check": {"port": 80, "timeout": 5}}"#.to_string(),
            }),
            2 => Some(ServiceInfo {
                id: 2,
                host: "myWeb1".to_string(),
                target: "webik.com".to_string(),
                port: 443,
                service_type: ServiceType::Tcp,
                fail_threshold: 5,
                interval_seconds: 30,
                metadata: r#"{"check": {"port": 443, "timeout": 5}}"#.to_string(),
            }),
            3 => Some(ServiceInfo {
                id: 3,
                host: "bigServer".to_string(),
                target: "seznam.com".to_string(),
                port: 8080,
                service_type: ServiceType::Tcp,
                fail_threshold: 3,
                interval_seconds: 60,
                metadata: r#"{"check": {"port": 8080, "timeout": 10}}"#.to_string(),
            }),
            4 => Some(ServiceInfo {
                id: 4,
                host: "myICMPTestServer".to_string(),
                target: "google.com".to_string(),
                port: 0,
                service_type: ServiceType::Icmp,
                fail_threshold: 5,
                interval_seconds: 60,
                metadata: r#"{"check": {"timeout": 3}}"#.to_string(),
            }),
            _ => None,
        };

        Ok(info)
    }

    async fn recipients_for(&self, service_id: i64) -> Result<Vec<RecipientPreference>> {
        let recipients = match service_id {
            1 => vec![RecipientPreference {
                id: 1,
                service_id: 1,
                channel: ContactChannel::Email,
                target: "jardaID1@seznam.cz".to_string(),
                resend_after_minutes: 60,
            }],
            2 => vec![
                RecipientPreference {
                    id: 2,
                    service_id: 2,
                    channel: ContactChannel::Email,
                    target: "jardaID2@seznam.cz".to_string(),
                    resend_after_minutes: 10,
                },
                RecipientPreference {
                    id: 3,
                    service_id: 2,
                    channel: ContactChannel::Sms,
                    target: "123456789ID2".to_string(),
                    resend_after_minutes: 10,
                },
            ],
            3 => vec![RecipientPreference {
                id: 4,
                service_id: 3,
                channel: ContactChannel::Email,
                target: "TomosID3@seznam.cz".to_string(),
                resend_after_minutes: 2,
            }],
            4 => vec![RecipientPreference {
                id: 5,
                service_id: 4,
                channel: ContactChannel::Sms,
                target: "456789854ID4".to_string(),
                resend_after_minutes: 2,
            }],
            _ => Vec::new(),
        };

        Ok(recipients)
    }
}
