//! In-memory registry of failing services for one interval bucket.
//!
//! The registry holds one [`FailedServiceRecord`] per service with a live fail
//! streak. Counters saturate at `fail_threshold` on the way up and at 0 on the
//! way down; a service must fail `fail_threshold` consecutive checks before a
//! CRITICAL edge fires, and pass as many before a RESOLVED does. That
//! asymmetry is what keeps flapping services from spamming recipients.
//!
//! Mutation happens from two places, the tick pass and the notification-sent
//! recorder, so every read-modify-write goes through the internal mutex.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::store::models::Observation;

/// Streak record for one failing service.
///
/// Exists iff `fail_counter > 0`. `notification_sent_at` holds the decision
/// time of the last CRITICAL delivered to each recipient in this episode and
/// dies with the record on recovery.
#[derive(Debug, Clone)]
pub struct FailedServiceRecord {
    pub id: i64,
    pub fail_counter: u32,
    pub fail_threshold: u32,
    pub last_failed_msg: String,
    pub notification_sent_at: HashMap<i64, DateTime<Utc>>,
}

/// Direction of a state edge emitted by a tick pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Critical,
    Resolved,
}

/// A state edge plus a whole-record snapshot taken at the moment it fired.
///
/// The dispatcher works off the snapshot only; it never reaches back into the
/// registry, which keeps the engine and the dispatcher free of cycles.
#[derive(Debug, Clone)]
pub struct StateEdge {
    pub outcome: Outcome,
    pub record: FailedServiceRecord,
}

pub struct FailureRegistry {
    records: Mutex<HashMap<i64, FailedServiceRecord>>,
}

impl FailureRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Advance every streak with one tick's batch of failing observations.
    ///
    /// Observations for known services increment their counter (one step per
    /// observation, so a widened window after a store failure catches up);
    /// unknown services are admitted with a counter of 1. Services absent from
    /// the batch are decremented and removed once they drain to zero.
    ///
    /// Returns the CRITICAL and RESOLVED edges this batch produced. A service
    /// sitting at its threshold emits a CRITICAL edge on every pass; resend
    /// suppression downstream decides whether anything is delivered.
    pub fn apply_batch(&self, observations: &[Observation]) -> Vec<StateEdge> {
        let mut records = self.records.lock().expect("registry lock poisoned");
        let mut edges = Vec::new();
        let mut seen = HashSet::with_capacity(observations.len());
        let mut critical_emitted = HashSet::new();

        for observation in observations {
            if observation.fail_threshold == 0 {
                tracing::warn!(
                    service_id = observation.service_id,
                    "rejecting observation with zero fail threshold"
                );
                continue;
            }
            seen.insert(observation.service_id);

            match records.get_mut(&observation.service_id) {
                Some(record) => {
                    // never count fails over the threshold
                    record.fail_counter = (record.fail_counter + 1).min(record.fail_threshold);
                    if record.fail_counter == record.fail_threshold
                        && critical_emitted.insert(record.id)
                    {
                        edges.push(StateEdge {
                            outcome: Outcome::Critical,
                            record: record.clone(),
                        });
                    }
                }
                None => {
                    records.insert(
                        observation.service_id,
                        FailedServiceRecord {
                            id: observation.service_id,
                            fail_counter: 1,
                            fail_threshold: observation.fail_threshold,
                            last_failed_msg: observation.message.clone(),
                            notification_sent_at: HashMap::new(),
                        },
                    );
                }
            }
        }

        // decrement streaks of services that produced no failing sample
        let recovered: Vec<i64> = records
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect();

        for id in recovered {
            let Some(mut record) = records.remove(&id) else {
                continue;
            };
            record.fail_counter = record.fail_counter.saturating_sub(1);

            if record.fail_counter == 0 {
                // recovery is only news to recipients who heard about the failure
                if !record.notification_sent_at.is_empty() {
                    edges.push(StateEdge {
                        outcome: Outcome::Resolved,
                        record,
                    });
                }
            } else {
                records.insert(id, record);
            }
        }

        edges
    }

    /// Record the decision time of a CRITICAL delivery to one recipient.
    ///
    /// Returns `false` when the service is no longer in the registry, i.e. it
    /// recovered between the dispatch decision and this update.
    pub fn record_notification_sent(
        &self,
        service_id: i64,
        recipient_id: i64,
        sent_at: DateTime<Utc>,
    ) -> bool {
        let mut records = self.records.lock().expect("registry lock poisoned");
        match records.get_mut(&service_id) {
            Some(record) => {
                record.notification_sent_at.insert(recipient_id, sent_at);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, service_id: i64) -> Option<FailedServiceRecord> {
        self.records
            .lock()
            .expect("registry lock poisoned")
            .get(&service_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FailureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::observation;

    fn critical_edges(edges: &[StateEdge]) -> usize {
        edges.iter().filter(|e| e.outcome == Outcome::Critical).count()
    }

    fn resolved_edges(edges: &[StateEdge]) -> usize {
        edges.iter().filter(|e| e.outcome == Outcome::Resolved).count()
    }

    #[test]
    fn test_counter_stays_within_bounds() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 3, "down")];

        for _ in 0..10 {
            registry.apply_batch(&batch);
            let record = registry.snapshot(2).unwrap();
            assert!(record.fail_counter >= 1);
            assert!(record.fail_counter <= record.fail_threshold);
        }
    }

    #[test]
    fn test_critical_fires_on_threshold_transition() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 5, "check tcp: connection time out")];

        for tick in 1..=4 {
            let edges = registry.apply_batch(&batch);
            assert_eq!(critical_edges(&edges), 0, "no CRITICAL below threshold at tick {tick}");
        }

        let edges = registry.apply_batch(&batch);
        assert_eq!(critical_edges(&edges), 1);
        assert_eq!(edges[0].record.fail_counter, 5);
        assert_eq!(edges[0].record.last_failed_msg, "check tcp: connection time out");
    }

    #[test]
    fn test_at_cap_every_pass_requests_dispatch() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 2, "down")];

        registry.apply_batch(&batch);
        let edges = registry.apply_batch(&batch);
        assert_eq!(critical_edges(&edges), 1);

        // still failing at the cap: dispatch is requested again, suppression
        // downstream decides whether anything goes out
        let edges = registry.apply_batch(&batch);
        assert_eq!(critical_edges(&edges), 1);
        assert_eq!(registry.snapshot(2).unwrap().fail_counter, 2);
    }

    #[test]
    fn test_widened_window_counts_each_observation_once() {
        let registry = FailureRegistry::new();
        let single = vec![observation(2, 5, "down")];
        // two missed windows fetched at once after a store failure
        let double = vec![observation(2, 5, "down"), observation(2, 5, "down")];

        registry.apply_batch(&single);
        registry.apply_batch(&single);
        registry.apply_batch(&double);
        assert_eq!(registry.snapshot(2).unwrap().fail_counter, 4);

        let edges = registry.apply_batch(&single);
        assert_eq!(critical_edges(&edges), 1);
    }

    #[test]
    fn test_threshold_crossing_with_double_batch_emits_one_critical() {
        let registry = FailureRegistry::new();
        let double = vec![observation(2, 2, "down"), observation(2, 2, "down")];

        let edges = registry.apply_batch(&double);
        // admitted at 1, incremented to 2 within the same pass
        assert_eq!(critical_edges(&edges), 1);
    }

    #[test]
    fn test_zero_threshold_rejected_at_admission() {
        let registry = FailureRegistry::new();
        let edges = registry.apply_batch(&[observation(9, 0, "broken config")]);

        assert!(edges.is_empty());
        assert!(registry.snapshot(9).is_none());
    }

    #[test]
    fn test_drain_removes_record_and_resolves_after_notification() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 3, "down")];

        for _ in 0..3 {
            registry.apply_batch(&batch);
        }
        assert!(registry.record_notification_sent(2, 7, Utc::now()));

        let mut resolved = 0;
        for _ in 0..3 {
            resolved += resolved_edges(&registry.apply_batch(&[]));
        }

        assert_eq!(resolved, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_no_resolved_without_a_delivered_critical() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 3, "down")];

        registry.apply_batch(&batch);
        registry.apply_batch(&batch);

        // recovers before the threshold was ever reached
        let mut edges = Vec::new();
        for _ in 0..3 {
            edges.extend(registry.apply_batch(&[]));
        }

        assert_eq!(resolved_edges(&edges), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolved_snapshot_carries_notified_recipients() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 1, "down")];

        registry.apply_batch(&batch);
        registry.apply_batch(&batch);
        registry.record_notification_sent(2, 7, Utc::now());
        registry.record_notification_sent(2, 8, Utc::now());

        let edges = registry.apply_batch(&[]);
        assert_eq!(resolved_edges(&edges), 1);
        let record = &edges[0].record;
        assert!(record.notification_sent_at.contains_key(&7));
        assert!(record.notification_sent_at.contains_key(&8));
    }

    #[test]
    fn test_flapping_service_never_resolves_and_never_breaches() {
        let registry = FailureRegistry::new();
        let batch = vec![observation(2, 2, "down")];

        let mut edges = Vec::new();
        for tick in 0..20 {
            if tick % 2 == 0 {
                edges.extend(registry.apply_batch(&batch));
            } else {
                edges.extend(registry.apply_batch(&[]));
            }
        }

        assert_eq!(critical_edges(&edges), 0);
        assert_eq!(resolved_edges(&edges), 0);
    }

    #[test]
    fn test_notification_update_for_recovered_service_is_dropped() {
        let registry = FailureRegistry::new();
        assert!(!registry.record_notification_sent(42, 7, Utc::now()));
    }
}
