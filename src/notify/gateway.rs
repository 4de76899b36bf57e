//! SMS and voice-call gateways.
//!
//! Both gateways are single-shot: one send per recipient, errors are logged
//! by the dispatcher and never retried at this layer. The HTTP
//! implementations POST to the provider endpoint configured under
//! `gateways.sms_url` / `gateways.voice_url`; without an endpoint the
//! log-only implementation keeps dev installs observable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::errors::{Error, Result};

#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Single-shot delivery of a short text to a phone number.
    async fn send(&self, target: &str, text: &str) -> Result<()>;
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Single-shot voice call reading the script to the target number.
    async fn call(&self, target: &str, script: &str) -> Result<()>;
}

pub struct HttpSmsGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSmsGateway {
    pub fn new(endpoint: String) -> Result<Self> {
        Ok(Self {
            client: gateway_client()?,
            endpoint,
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, target: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "to": target, "text": text }))
            .send()
            .await
            .map_err(|e| Error::delivery(target, e))?;

        if !response.status().is_success() {
            return Err(Error::delivery(
                target,
                format!("sms gateway returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

pub struct HttpVoiceGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVoiceGateway {
    pub fn new(endpoint: String) -> Result<Self> {
        Ok(Self {
            client: gateway_client()?,
            endpoint,
        })
    }
}

#[async_trait]
impl VoiceGateway for HttpVoiceGateway {
    async fn call(&self, target: &str, script: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "to": target, "script": script }))
            .send()
            .await
            .map_err(|e| Error::delivery(target, e))?;

        if !response.status().is_success() {
            return Err(Error::delivery(
                target,
                format!("voice gateway returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

/// Stands in when no gateway endpoint is configured.
pub struct LogOnlyGateway;

#[async_trait]
impl SmsGateway for LogOnlyGateway {
    async fn send(&self, target: &str, text: &str) -> Result<()> {
        tracing::info!(target, text, "sms gateway not configured, logging only");
        Ok(())
    }
}

#[async_trait]
impl VoiceGateway for LogOnlyGateway {
    async fn call(&self, target: &str, script: &str) -> Result<()> {
        tracing::info!(target, script, "voice gateway not configured, logging only");
        Ok(())
    }
}

fn gateway_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::invalid_config(format!("failed to build gateway HTTP client: {e}")))
}

pub fn sms_from_config(config: &GatewayConfig) -> Result<Arc<dyn SmsGateway>> {
    match &config.sms_url {
        Some(url) => Ok(Arc::new(HttpSmsGateway::new(url.clone())?)),
        None => Ok(Arc::new(LogOnlyGateway)),
    }
}

pub fn voice_from_config(config: &GatewayConfig) -> Result<Arc<dyn VoiceGateway>> {
    match &config.voice_url {
        Some(url) => Ok(Arc::new(HttpVoiceGateway::new(url.clone())?)),
        None => Ok(Arc::new(LogOnlyGateway)),
    }
}
