//! Per-guild playback coordination: a non-blocking advisory lock and a
//! merge-on-write state map. Both are process-local; when the shared
//! Redis queue fans work across processes, the lock only guards within
//! each process.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

/// Accumulated playback state for one guild. Every field is optional:
/// handlers merge in only the fields they produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuildPlayback {
    pub track_id: Option<String>,
    pub encoded: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub uri: Option<String>,
    pub length: Option<u64>,
    pub source_name: Option<String>,
    pub query: Option<String>,
    pub node_id: Option<String>,
    pub shard_id: Option<u32>,
    pub cluster_id: Option<String>,
    pub dispatched: Option<bool>,
    pub enqueued_at: Option<i64>,
    pub voice_session_id: Option<String>,
    pub voice_endpoint: Option<String>,
    pub voice_token: Option<String>,
    pub voice_updated_at: Option<i64>,
}

impl GuildPlayback {
    /// Shallow merge: `Some` fields of the patch overwrite, `None`
    /// fields leave the existing value alone.
    pub fn merge(&mut self, patch: GuildPlayback) {
        macro_rules! merge_field {
            ($($field:ident),+ $(,)?) => {
                $(if patch.$field.is_some() {
                    self.$field = patch.$field;
                })+
            };
        }
        merge_field!(
            track_id,
            encoded,
            title,
            author,
            uri,
            length,
            source_name,
            query,
            node_id,
            shard_id,
            cluster_id,
            dispatched,
            enqueued_at,
            voice_session_id,
            voice_endpoint,
            voice_token,
            voice_updated_at,
        );
    }
}

/// Non-blocking per-guild mutual exclusion plus guild state. A held key
/// means some worker is mid-flight on that guild; `acquire` never
/// waits, it reports contention and the caller fails the operation into
/// the retry path.
#[derive(Debug, Default)]
pub struct PlaybackCoordinator {
    locks: Mutex<HashSet<String>>,
    state: Mutex<HashMap<String, GuildPlayback>>,
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the guild lock. Returns false immediately when held.
    pub fn acquire(&self, guild_id: &str) -> bool {
        self.locks.lock().insert(guild_id.to_string())
    }

    /// Idempotent: releasing an unheld key is a no-op.
    pub fn release(&self, guild_id: &str) {
        self.locks.lock().remove(guild_id);
    }

    pub fn set_state(&self, guild_id: &str, state: GuildPlayback) {
        self.state.lock().insert(guild_id.to_string(), state);
    }

    pub fn merge_state(&self, guild_id: &str, patch: GuildPlayback) {
        self.state
            .lock()
            .entry(guild_id.to_string())
            .or_default()
            .merge(patch);
    }

    /// Callers receive a copy, never a reference into the map.
    pub fn get_state(&self, guild_id: &str) -> Option<GuildPlayback> {
        self.state.lock().get(guild_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_exclusive_until_released() {
        let coordinator = PlaybackCoordinator::new();
        assert!(coordinator.acquire("g1"));
        assert!(!coordinator.acquire("g1"));
        coordinator.release("g1");
        assert!(coordinator.acquire("g1"));
    }

    #[test]
    fn release_of_unheld_key_is_noop() {
        let coordinator = PlaybackCoordinator::new();
        coordinator.release("never-held");
        assert!(coordinator.acquire("never-held"));
    }

    #[test]
    fn locks_are_independent_per_guild() {
        let coordinator = PlaybackCoordinator::new();
        assert!(coordinator.acquire("g1"));
        assert!(coordinator.acquire("g2"));
    }

    #[test]
    fn merge_overwrites_some_and_keeps_none() {
        let coordinator = PlaybackCoordinator::new();
        coordinator.merge_state(
            "g1",
            GuildPlayback {
                track_id: Some("t1".to_string()),
                title: Some("First".to_string()),
                ..Default::default()
            },
        );
        coordinator.merge_state(
            "g1",
            GuildPlayback {
                title: Some("Second".to_string()),
                dispatched: Some(true),
                ..Default::default()
            },
        );

        let state = coordinator.get_state("g1").unwrap();
        assert_eq!(state.track_id.as_deref(), Some("t1"));
        assert_eq!(state.title.as_deref(), Some("Second"));
        assert_eq!(state.dispatched, Some(true));
    }

    #[test]
    fn get_state_returns_a_copy() {
        let coordinator = PlaybackCoordinator::new();
        coordinator.set_state(
            "g1",
            GuildPlayback {
                track_id: Some("t1".to_string()),
                ..Default::default()
            },
        );

        let mut copy = coordinator.get_state("g1").unwrap();
        copy.track_id = Some("mutated".to_string());

        let stored = coordinator.get_state("g1").unwrap();
        assert_eq!(stored.track_id.as_deref(), Some("t1"));
    }
}
