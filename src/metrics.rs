use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

/// Counter names emitted by the dispatch core. All counters are
/// monotonically increasing.
pub mod keys {
    pub const JOB_RECEIVED: &str = "jobs_received_total";
    pub const JOB_COMPLETED: &str = "jobs_completed_total";
    pub const JOB_FAILED: &str = "jobs_failed_total";
    pub const JOB_RETRIED: &str = "jobs_retried_total";
    pub const JOB_DEAD_LETTER: &str = "jobs_dead_letter_total";
    pub const SPOTIFY_PLAYLIST_SYNCED: &str = "spotify_playlist_synced_total";
    pub const LAVALINK_TRACK_RESOLVED: &str = "lavalink_track_resolved_total";
    pub const LAVALINK_PLAYER_DISPATCHED: &str = "lavalink_player_dispatched_total";
    pub const LAVALINK_VOICE_UPDATED: &str = "lavalink_voice_updated_total";
}

/// In-process metrics sink, passed explicitly to every component at
/// construction. Not global state.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<BTreeMap<&'static str, u64>>,
    gauges: Mutex<BTreeMap<&'static str, i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
}

impl Metrics {
    pub fn increment(&self, key: &'static str) {
        self.increment_by(key, 1);
    }

    pub fn increment_by(&self, key: &'static str, value: u64) {
        let mut counters = self.counters.lock();
        *counters.entry(key).or_insert(0) += value;
    }

    pub fn set_gauge(&self, key: &'static str, value: i64) {
        self.gauges.lock().insert(key, value);
    }

    /// Current value of a counter, zero when never incremented.
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .lock()
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            gauges: self
                .gauges
                .lock()
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::default();
        metrics.increment(keys::JOB_RECEIVED);
        metrics.increment(keys::JOB_RECEIVED);
        metrics.increment_by(keys::JOB_FAILED, 3);

        assert_eq!(metrics.counter(keys::JOB_RECEIVED), 2);
        assert_eq!(metrics.counter(keys::JOB_FAILED), 3);
        assert_eq!(metrics.counter(keys::JOB_COMPLETED), 0);
    }

    #[test]
    fn snapshot_includes_gauges() {
        let metrics = Metrics::default();
        metrics.increment(keys::JOB_COMPLETED);
        metrics.set_gauge("configured_clusters", 2);
        metrics.set_gauge("configured_clusters", 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters.get(keys::JOB_COMPLETED), Some(&1));
        assert_eq!(snapshot.gauges.get("configured_clusters"), Some(&3));
    }
}
