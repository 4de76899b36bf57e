//! Long-lived email delivery worker.
//!
//! ```text
//!             MSG (queue)                 IDLE (30 s)
//!   CLOSED ──────────────► OPEN ─────────────────────► CLOSED
//!     ▲    dial+auth with   │  SEND with backoff;
//!     │    backoff; give-up │  failures are logged,
//!     │    drops the email  │  the session stays open
//!     └─────────────────────┘
//!   queue closed: close the session if open, exit
//! ```
//!
//! One worker runs per process. Producers hand it [`OutgoingEmail`]s through
//! an unbounded queue and never block; the worker owns the single SMTP
//! session and all retry behaviour. A backoff give-up drops exactly the
//! failing message and leaves the worker serving the queue.

use tokio::sync::mpsc;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::backoff::RetryPolicy;
use super::render;
use crate::config::SmtpConfig;
use crate::errors::{Error, Result};

/// A rendered email waiting for delivery. Ownership moves to the worker on
/// enqueue.
#[derive(Debug)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

pub struct EmailWorker {
    config: SmtpConfig,
    queue: mpsc::UnboundedReceiver<OutgoingEmail>,
    policy: RetryPolicy,
}

impl EmailWorker {
    pub fn new(config: SmtpConfig, queue: mpsc::UnboundedReceiver<OutgoingEmail>) -> Result<Self> {
        if config.server.is_empty() {
            return Err(Error::invalid_config("smtp.server must not be empty"));
        }
        if config.port == 0 {
            return Err(Error::invalid_config("smtp.port must not be zero"));
        }
        if config.user.is_empty() {
            return Err(Error::invalid_config("smtp.user must not be empty"));
        }
        if config.password.is_empty() {
            return Err(Error::invalid_config("smtp.password must not be empty"));
        }
        if config.email_from.is_empty() {
            return Err(Error::invalid_config("smtp.email_from must not be empty"));
        }

        Ok(Self {
            config,
            queue,
            policy: RetryPolicy::email(),
        })
    }

    #[cfg(test)]
    fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drain the queue for the process lifetime.
    pub async fn run(mut self) {
        tracing::info!(server = %self.config.server, "email worker started");

        let mut session: Option<AsyncSmtpTransport<Tokio1Executor>> = None;

        loop {
            tokio::select! {
                maybe_email = self.queue.recv() => {
                    let Some(email) = maybe_email else {
                        if session.take().is_some() {
                            tracing::debug!("closing SMTP session");
                        }
                        tracing::info!("email queue closed, stopping email worker");
                        return;
                    };

                    if session.is_none() {
                        match self.open_session().await {
                            Ok(transport) => session = Some(transport),
                            Err(error) => {
                                tracing::error!(
                                    to = %email.to,
                                    error = %error,
                                    "could not open SMTP session, dropping email"
                                );
                                continue;
                            }
                        }
                    }
                    if let Some(transport) = &session {
                        self.send_with_retry(transport, &email).await;
                    }
                }
                // no email for a while: drop the session, reconnect on demand
                _ = tokio::time::sleep(self.config.idle_timeout), if session.is_some() => {
                    tracing::debug!(idle = ?self.config.idle_timeout, "closing idle SMTP session");
                    session = None;
                }
            }
        }
    }

    async fn open_session(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let transport = self.build_transport()?;
        let server = self.config.server.clone();

        let transport_ref = &transport;
        self.policy
            .retry("connect to SMTP server", move || {
                let server = server.clone();
                async move {
                    match transport_ref.test_connection().await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(Error::delivery(&server, "SMTP connection test failed")),
                        Err(error) => Err(Error::delivery(&server, error)),
                    }
                }
            })
            .await?;

        tracing::debug!(server = %self.config.server, "SMTP session opened");
        Ok(transport)
    }

    async fn send_with_retry(&self, transport: &AsyncSmtpTransport<Tokio1Executor>, email: &OutgoingEmail) {
        let message = match self.build_message(email) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(to = %email.to, error = %error, "could not build email message");
                return;
            }
        };

        let result = self
            .policy
            .retry("send email", move || {
                let message = message.clone();
                async move { transport.send(message).await }
            })
            .await;

        match result {
            Ok(_) => tracing::debug!(to = %email.to, "sent email"),
            Err(error) => tracing::error!(to = %email.to, error = %error, "failed to send email"),
        }
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let from: Mailbox = format!("{} <{}>", render::EMAIL_NAME, self.config.email_from)
            .parse()
            .map_err(|e| Error::delivery(&self.config.email_from, format!("invalid from address: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| Error::delivery(&email.to, format!("invalid recipient address: {e}")))?;

        // lettre derives the envelope from these mailboxes, so the MAIL FROM
        // (and with it the Return-Path at the receiver) is the bare from-address
        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| Error::delivery(&email.to, e))
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(self.config.server.as_str())
            .port(self.config.port)
            .credentials(Credentials::new(self.config.user.clone(), self.config.password.clone()))
            .pool_config(PoolConfig::new().max_size(1));

        if self.config.tls {
            let mut tls_builder = TlsParameters::builder(self.config.server.clone());
            if self.config.accept_invalid_certs {
                // accepting a self-signed postfix cert is a deployment decision
                tls_builder = tls_builder.dangerous_accept_invalid_certs(true);
            }
            let tls = tls_builder
                .build()
                .map_err(|e| Error::delivery(&self.config.server, e))?;
            builder = builder.tls(Tls::Required(tls));
        }

        Ok(builder.build())
    }
}
