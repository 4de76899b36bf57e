//! Error taxonomy for the notification service.
//!
//! Construction errors ([`Error::InvalidConfig`]) propagate out of `run()` and
//! terminate the process. Every runtime error is handled by the component that
//! owns the failing operation: store failures skip the affected tick, delivery
//! failures are logged and dropped, and invariant violations are logged and
//! ignored. No error is used as control flow in steady state.

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or invalid construction parameters. Fatal at startup.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A store-gateway read failed. The caller skips the affected tick and
    /// retries with a wider window on the next one.
    #[error("store operation '{operation}' failed")]
    Store {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An SMTP, SMS or voice delivery failed after its own retry handling.
    #[error("delivery to {target} failed: {reason}")]
    Delivery { target: String, reason: String },

    /// A recipient carries a contact type outside {email, sms, phone}.
    #[error("unknown contact type {contact_type:?} for recipient {recipient_id}")]
    UnknownContactType { recipient_id: i64, contact_type: String },

    /// An internal invariant did not hold, e.g. a notification-sent update
    /// referenced a service that already recovered.
    #[error("internal invariant violated: {message}")]
    Invariant { message: String },
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig { message: message.into() }
    }

    pub fn store(operation: &'static str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Store {
            operation,
            source: Box::new(source),
        }
    }

    pub fn delivery(target: impl Into<String>, reason: impl ToString) -> Self {
        Error::Delivery {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
