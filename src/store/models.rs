//! Records read from the monitoring store.
//!
//! All of these are read-only snapshots fetched on demand; nothing here is
//! written back upstream.

use std::time::Duration;

/// A single failing sample for a service within a tick window.
#[derive(Debug, Clone)]
pub struct Observation {
    pub service_id: i64,
    pub fail_threshold: u32,
    pub message: String,
    /// How long the check itself took on the collector side.
    pub duration: Duration,
    pub request_id: String,
    /// Legacy per-service resend cadence. Per-recipient preferences take
    /// precedence, this survives only for old collector records.
    pub resend_every: Option<Duration>,
}

/// Kind of check the collector runs against a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Tcp,
    Icmp,
    Http,
    Unknown(i32),
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Tcp => "tcp",
            ServiceType::Icmp => "icmp",
            ServiceType::Http => "http",
            ServiceType::Unknown(_) => "unknown",
        }
    }
}

impl From<i32> for ServiceType {
    fn from(raw: i32) -> Self {
        match raw {
            1 => ServiceType::Tcp,
            2 => ServiceType::Icmp,
            3 => ServiceType::Http,
            other => ServiceType::Unknown(other),
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a monitored service. Immutable within a tick.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub id: i64,
    pub host: String,
    pub target: String,
    pub port: u16,
    pub service_type: ServiceType,
    pub fail_threshold: u32,
    pub interval_seconds: u32,
    /// Raw check configuration as stored by the collector, e.g.
    /// `{"check": {"port": 443, "timeout": 5}}`.
    pub metadata: String,
}

/// How a recipient wants to be contacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactChannel {
    Email,
    Sms,
    Phone,
    /// Anything else configured upstream. Logged and skipped at dispatch.
    Other(String),
}

impl ContactChannel {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "email" => ContactChannel::Email,
            "sms" => ContactChannel::Sms,
            "phone" => ContactChannel::Phone,
            other => ContactChannel::Other(other.to_string()),
        }
    }
}

/// `resend_after_minutes` value meaning "never resend within an episode".
pub const NEVER_RESEND_SENTINEL: u32 = 1;

/// A recipient's notification preference for one service.
#[derive(Debug, Clone)]
pub struct RecipientPreference {
    pub id: i64,
    pub service_id: i64,
    pub channel: ContactChannel,
    pub target: String,
    /// Minimum gap in minutes between successive CRITICAL deliveries.
    /// [`NEVER_RESEND_SENTINEL`] disables resending for the whole episode.
    pub resend_after_minutes: u32,
}

impl RecipientPreference {
    pub fn never_resend(&self) -> bool {
        self.resend_after_minutes == NEVER_RESEND_SENTINEL
    }

    pub fn resend_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.resend_after_minutes))
    }
}
