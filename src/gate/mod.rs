//! Incident deduplication: cooldown, occurrence counting, and
//! escalation-triggered silencing.

use crate::classify::{Incident, IncidentKey};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Per-key temporal state. Owned exclusively by the gate; deleted by the
/// periodic sweep once stale.
#[derive(Debug, Clone)]
struct IncidentRecord {
    first_seen: Instant,
    last_seen: Instant,
    occurrence_count: u32,
    silenced: bool,
    silenced_until: Instant,
}

impl IncidentRecord {
    fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            occurrence_count: 0,
            silenced: false,
            silenced_until: now,
        }
    }
}

/// Decides whether a classified incident should propagate to dispatch.
///
/// Guarantees at most one `true` per incident key per cooldown window, even
/// under concurrent calls for the same key: the whole read-modify-write runs
/// inside one critical section. Repeated rapid recurrences past the
/// escalation threshold silence the key entirely for `silence_duration`.
pub struct DedupGate {
    records: Mutex<HashMap<IncidentKey, IncidentRecord>>,
    cooldown: Duration,
    escalation_enabled: bool,
    escalation_threshold: u32,
    silence_duration: Duration,
}

impl DedupGate {
    pub fn new(
        cooldown: Duration,
        escalation_enabled: bool,
        escalation_threshold: u32,
        silence_duration: Duration,
    ) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            cooldown,
            escalation_enabled,
            escalation_threshold,
            silence_duration,
        }
    }

    /// True when this occurrence should trigger a diagnostic dispatch.
    pub fn should_trigger(&self, incident: &Incident) -> bool {
        self.should_trigger_at(incident, Instant::now())
    }

    /// Clock-explicit variant of [`should_trigger`](Self::should_trigger).
    pub fn should_trigger_at(&self, incident: &Incident, now: Instant) -> bool {
        let key = incident.key();
        let mut records = self.lock_records();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| IncidentRecord::new(now));

        if record.silenced && now < record.silenced_until {
            debug!(
                %key,
                occurrences = record.occurrence_count,
                "incident silenced, suppressing"
            );
            return false;
        }

        // A fresh record (count 0) always triggers; otherwise a repeat
        // within the cooldown window is counted and suppressed.
        if record.occurrence_count > 0
            && now.saturating_duration_since(record.last_seen) < self.cooldown
        {
            record.occurrence_count += 1;
            record.last_seen = now;

            if self.escalation_enabled && record.occurrence_count >= self.escalation_threshold {
                record.silenced = true;
                record.silenced_until = now + self.silence_duration;
                warn!(
                    %key,
                    occurrences = record.occurrence_count,
                    silence_secs = self.silence_duration.as_secs(),
                    "incident escalated, silencing"
                );
            } else {
                debug!(
                    %key,
                    occurrences = record.occurrence_count,
                    "incident within cooldown, suppressing"
                );
            }
            return false;
        }

        record.last_seen = now;
        record.occurrence_count = 1;
        record.silenced = false;
        true
    }

    /// Delete stale records, returning how many were removed.
    ///
    /// A record goes when its cooldown activity is well past (2x cooldown),
    /// or -- if it was silenced -- once both the silence window and a full
    /// cooldown of inactivity have elapsed. A key deleted here simply starts
    /// over as a first occurrence if it recurs.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Clock-explicit variant of [`sweep`](Self::sweep).
    pub fn sweep_at(&self, now: Instant) -> usize {
        let cooldown = self.cooldown;
        let mut records = self.lock_records();
        let before = records.len();
        records.retain(|_, r| {
            let idle = now.saturating_duration_since(r.last_seen);
            if r.silenced {
                !(now >= r.silenced_until && idle > cooldown)
            } else {
                idle <= cooldown * 2
            }
        });
        before - records.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.lock_records().len()
    }

    /// Sweep on a fixed period until cancelled. Spawned alongside the gate
    /// and stopped with it, so tests can instead call `sweep_at` directly.
    pub async fn run_sweeper(self: std::sync::Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(SWEEP_PERIOD);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = self.tracked(), "swept stale incident records");
                    }
                }
            }
        }
        debug!("incident record sweeper stopped");
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<IncidentKey, IncidentRecord>> {
        // A poisoned lock only means another caller panicked mid-update;
        // the map itself is still usable.
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[cfg(test)]
    fn record(&self, key: &IncidentKey) -> Option<IncidentRecord> {
        self.lock_records().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::IncidentType;

    const MIN: Duration = Duration::from_secs(60);

    fn incident(pod: &str) -> Incident {
        Incident {
            pod_name: pod.into(),
            namespace: "prod".into(),
            container_name: "app".into(),
            incident_type: IncidentType::CrashLoop,
            reason: "CrashLoopBackOff".into(),
            message: "back-off restarting".into(),
        }
    }

    fn gate(cooldown: Duration, escalation: bool, threshold: u32, silence: Duration) -> DedupGate {
        DedupGate::new(cooldown, escalation, threshold, silence)
    }

    #[test]
    fn first_occurrence_triggers() {
        let g = gate(5 * MIN, true, 10, 60 * MIN);
        assert!(g.should_trigger_at(&incident("a"), Instant::now()));
    }

    #[test]
    fn repeat_within_cooldown_is_suppressed() {
        let g = gate(5 * MIN, false, 0, Duration::ZERO);
        let t0 = Instant::now();
        assert!(g.should_trigger_at(&incident("a"), t0));
        assert!(!g.should_trigger_at(&incident("a"), t0 + MIN));
        assert!(!g.should_trigger_at(&incident("a"), t0 + 2 * MIN));
    }

    #[test]
    fn triggers_are_spaced_at_least_one_cooldown_apart() {
        let g = gate(5 * MIN, false, 0, Duration::ZERO);
        let t0 = Instant::now();
        let mut last_true = None;
        for m in 0..30u32 {
            let now = t0 + m * MIN;
            if g.should_trigger_at(&incident("a"), now) {
                if let Some(prev) = last_true {
                    assert!(now.duration_since(prev) >= 5 * MIN);
                }
                last_true = Some(now);
            }
        }
        assert!(last_true.is_some());
    }

    #[test]
    fn distinct_keys_are_independent() {
        let g = gate(5 * MIN, false, 0, Duration::ZERO);
        let t0 = Instant::now();
        assert!(g.should_trigger_at(&incident("a"), t0));
        assert!(g.should_trigger_at(&incident("b"), t0));
        assert_eq!(g.tracked(), 2);
    }

    #[test]
    fn escalation_silences_after_threshold() {
        let g = gate(5 * MIN, true, 3, 60 * MIN);
        let t0 = Instant::now();
        let inc = incident("a");

        assert!(g.should_trigger_at(&inc, t0)); // count 1
        assert!(!g.should_trigger_at(&inc, t0 + MIN)); // count 2
        assert!(!g.should_trigger_at(&inc, t0 + 2 * MIN)); // count 3, silenced

        let record = g.record(&inc.key()).unwrap();
        assert!(record.silenced);
        assert_eq!(record.occurrence_count, 3);

        // Fully suppressed while silenced, even past the cooldown.
        assert!(!g.should_trigger_at(&inc, t0 + 30 * MIN));

        // Silence window (until t0+62m) has passed: triggers again, reset.
        assert!(g.should_trigger_at(&inc, t0 + 63 * MIN));
        let record = g.record(&inc.key()).unwrap();
        assert!(!record.silenced);
        assert_eq!(record.occurrence_count, 1);
    }

    #[test]
    fn escalation_disabled_never_silences() {
        let g = gate(5 * MIN, false, 2, 60 * MIN);
        let t0 = Instant::now();
        let inc = incident("a");
        assert!(g.should_trigger_at(&inc, t0));
        for m in 1..10u32 {
            assert!(!g.should_trigger_at(&inc, t0 + m * MIN));
        }
        assert!(!g.record(&inc.key()).unwrap().silenced);
        // Cooldown elapsed since last repeat: triggers again.
        assert!(g.should_trigger_at(&inc, t0 + 15 * MIN));
    }

    #[test]
    fn sweep_keeps_recently_seen_records() {
        let g = gate(5 * MIN, false, 0, Duration::ZERO);
        let t0 = Instant::now();
        g.should_trigger_at(&incident("a"), t0);

        // Within 2x cooldown: never deleted.
        assert_eq!(g.sweep_at(t0 + 9 * MIN), 0);
        assert_eq!(g.tracked(), 1);

        // Past 2x cooldown: gone.
        assert_eq!(g.sweep_at(t0 + 11 * MIN), 1);
        assert_eq!(g.tracked(), 0);
    }

    #[test]
    fn sweep_keeps_silenced_records_until_silence_elapses() {
        let g = gate(5 * MIN, true, 2, 60 * MIN);
        let t0 = Instant::now();
        let inc = incident("a");
        g.should_trigger_at(&inc, t0);
        g.should_trigger_at(&inc, t0 + MIN); // count 2, silenced until t0+61m

        // Silenced and window still open: kept even though idle > 2x cooldown.
        assert_eq!(g.sweep_at(t0 + 30 * MIN), 0);
        assert_eq!(g.tracked(), 1);

        // Window elapsed and idle past cooldown: deleted.
        assert_eq!(g.sweep_at(t0 + 62 * MIN), 1);
        assert_eq!(g.tracked(), 0);
    }

    #[test]
    fn deleted_key_restarts_as_first_occurrence() {
        let g = gate(5 * MIN, false, 0, Duration::ZERO);
        let t0 = Instant::now();
        let inc = incident("a");
        assert!(g.should_trigger_at(&inc, t0));
        g.sweep_at(t0 + 11 * MIN);
        assert!(g.should_trigger_at(&inc, t0 + 12 * MIN));
        assert_eq!(g.record(&inc.key()).unwrap().occurrence_count, 1);
    }

    #[test]
    fn first_seen_survives_repeats() {
        let g = gate(5 * MIN, false, 0, Duration::ZERO);
        let t0 = Instant::now();
        let inc = incident("a");
        g.should_trigger_at(&inc, t0);
        g.should_trigger_at(&inc, t0 + MIN);
        let record = g.record(&inc.key()).unwrap();
        assert_eq!(record.first_seen, t0);
        assert_eq!(record.last_seen, t0 + MIN);
    }

    #[test]
    fn concurrent_first_observations_trigger_exactly_once() {
        use std::sync::Arc;

        let g = Arc::new(gate(5 * MIN, false, 0, Duration::ZERO));
        let now = Instant::now();
        let barrier = Arc::new(std::sync::Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let g = Arc::clone(&g);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    g.should_trigger_at(&incident("a"), now)
                })
            })
            .collect();

        let triggered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&t| t)
            .count();
        assert_eq!(triggered, 1);
        assert_eq!(g.record(&incident("a").key()).unwrap().occurrence_count, 32);
    }

    // End-to-end timeline from the operational defaults:
    // cooldown 5m, escalation threshold 3, silence 60m.
    #[test]
    fn crash_loop_storm_timeline() {
        let g = gate(5 * MIN, true, 3, 60 * MIN);
        let t0 = Instant::now();
        let inc = incident("podA");

        assert!(g.should_trigger_at(&inc, t0));
        assert!(!g.should_trigger_at(&inc, t0 + MIN));
        assert!(!g.should_trigger_at(&inc, t0 + 2 * MIN)); // silenced until t0+62m
        assert!(!g.should_trigger_at(&inc, t0 + 30 * MIN));
        assert!(g.should_trigger_at(&inc, t0 + 63 * MIN));
        assert_eq!(g.record(&inc.key()).unwrap().occurrence_count, 1);
    }
}
