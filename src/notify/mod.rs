//! Notification fan-out.
//!
//! One dispatch runs per `(service, outcome)` state edge, on its own task so
//! the engine's tick loop never waits on store reads or gateway I/O. The
//! dispatcher loads the service's recipients, applies per-recipient resend
//! suppression, renders the medium-specific payload, and routes it: email to
//! the worker queue, SMS and voice to their gateways. Sent CRITICALs are
//! reported back to the engine through the notification-sent channel.

pub mod backoff;
pub mod email;
pub mod gateway;
pub mod render;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::engine::{FailedServiceRecord, NotificationChange, Outcome, StateEdge};
use crate::errors::Error;
use crate::store::models::{ContactChannel, RecipientPreference, ServiceInfo};
use crate::store::StoreGateway;
pub use self::email::{EmailWorker, OutgoingEmail};
use self::gateway::{SmsGateway, VoiceGateway};

/// Where rendered emails go: the worker queue, or stdout when `--smtp false`
/// mocks delivery.
#[derive(Clone)]
pub enum EmailSink {
    Worker(mpsc::UnboundedSender<OutgoingEmail>),
    Stdout,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn StoreGateway>,
    email: EmailSink,
    sms: Arc<dyn SmsGateway>,
    voice: Arc<dyn VoiceGateway>,
    changes: mpsc::UnboundedSender<NotificationChange>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        email: EmailSink,
        sms: Arc<dyn SmsGateway>,
        voice: Arc<dyn VoiceGateway>,
        changes: mpsc::UnboundedSender<NotificationChange>,
    ) -> Self {
        Self {
            store,
            email,
            sms,
            voice,
            changes,
        }
    }

    /// Fan out one state edge on its own task.
    pub fn spawn_dispatch(&self, edge: StateEdge) {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(edge).await });
    }

    async fn dispatch(&self, edge: StateEdge) {
        let service_id = edge.record.id;

        let info = match self.store.service_info(service_id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                tracing::error!(service_id, "no service details found, aborting dispatch");
                return;
            }
            Err(error) => {
                tracing::error!(service_id, error = %error, "failed to fetch service details, aborting dispatch");
                return;
            }
        };

        let recipients = match self.store.recipients_for(service_id).await {
            Ok(recipients) => recipients,
            Err(error) => {
                tracing::error!(service_id, error = %error, "failed to fetch notification settings");
                Vec::new()
            }
        };

        for recipient in recipients {
            match edge.outcome {
                Outcome::Critical => {
                    if !should_send_critical(&edge.record, &recipient) {
                        continue;
                    }
                    // time of decision: the resend window opens now, before
                    // the transport gets a chance to be slow
                    let change = NotificationChange {
                        service_id,
                        recipient_id: recipient.id,
                        sent_at: Utc::now(),
                    };
                    if self.changes.send(change).is_err() {
                        tracing::warn!(service_id, "notification-sent channel closed");
                    }
                }
                Outcome::Resolved => {
                    // recovery is only news to recipients alerted in this episode
                    if !edge.record.notification_sent_at.contains_key(&recipient.id) {
                        tracing::debug!(
                            service_id,
                            recipient_id = recipient.id,
                            "recipient never saw the CRITICAL, skipping RESOLVED"
                        );
                        continue;
                    }
                }
            }

            self.deliver(&edge, &info, &recipient).await;
        }
    }

    async fn deliver(&self, edge: &StateEdge, info: &ServiceInfo, recipient: &RecipientPreference) {
        match &recipient.channel {
            ContactChannel::Email => {
                let email = OutgoingEmail {
                    to: recipient.target.clone(),
                    subject: render::subject(edge.outcome, &info.host),
                    html_body: render::email_body(edge.outcome, info, &edge.record.last_failed_msg),
                };
                match &self.email {
                    EmailSink::Worker(queue) => {
                        if queue.send(email).is_err() {
                            tracing::error!(service_id = info.id, "email queue closed, dropping email");
                        }
                    }
                    EmailSink::Stdout => {
                        println!(
                            "<< fake email sent to {}\nSubject: {}\n{}",
                            recipient.target, email.subject, email.html_body
                        );
                    }
                }
            }
            ContactChannel::Sms => {
                let text = render::sms_text(edge.outcome, info, &edge.record.last_failed_msg);
                if let Err(error) = self.sms.send(&recipient.target, &text).await {
                    tracing::error!(
                        service_id = info.id,
                        target = %recipient.target,
                        error = %error,
                        "failed to send SMS"
                    );
                }
            }
            ContactChannel::Phone => {
                let script = render::voice_script(edge.outcome, info, &edge.record.last_failed_msg);
                if let Err(error) = self.voice.call(&recipient.target, &script).await {
                    tracing::error!(
                        service_id = info.id,
                        target = %recipient.target,
                        error = %error,
                        "failed to place voice call"
                    );
                }
            }
            ContactChannel::Other(raw) => {
                let error = Error::UnknownContactType {
                    recipient_id: recipient.id,
                    contact_type: raw.clone(),
                };
                tracing::error!(service_id = info.id, error = %error, "skipping recipient");
            }
        }
    }
}

/// Per-recipient resend suppression for CRITICAL deliveries.
fn should_send_critical(record: &FailedServiceRecord, recipient: &RecipientPreference) -> bool {
    match record.notification_sent_at.get(&recipient.id) {
        // first CRITICAL of the episode for this recipient
        None => true,
        Some(_) if recipient.never_resend() => {
            tracing::debug!(
                service_id = record.id,
                recipient_id = recipient.id,
                "recipient opted out of resends for this episode"
            );
            false
        }
        Some(sent_at) => {
            let due = *sent_at + recipient.resend_gap();
            if Utc::now() < due {
                tracing::debug!(
                    service_id = record.id,
                    recipient_id = recipient.id,
                    due = %due,
                    "within resend window, suppressing CRITICAL"
                );
                false
            } else {
                true
            }
        }
    }
}
