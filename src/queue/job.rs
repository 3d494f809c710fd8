use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Queue ordering weight: higher weight dequeues first.
    pub fn weight(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSyncPayload {
    pub user_id: String,
    pub playlist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tracks: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackEnqueuePayload {
    pub guild_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Set false to resolve and record state without touching a player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_to_lavalink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_replace: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpdatePayload {
    pub guild_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<u32>,
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

/// The closed set of work this system dispatches. Adding a variant
/// without a matching worker handler is a compile error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum JobPayload {
    #[serde(rename = "spotify.playlist.sync")]
    PlaylistSync(PlaylistSyncPayload),
    #[serde(rename = "playback.enqueue")]
    PlaybackEnqueue(PlaybackEnqueuePayload),
    #[serde(rename = "lavalink.voice.update")]
    VoiceUpdate(VoiceUpdatePayload),
}

impl JobPayload {
    /// Wire name of the job type, for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::PlaylistSync(_) => "spotify.playlist.sync",
            JobPayload::PlaybackEnqueue(_) => "playback.enqueue",
            JobPayload::VoiceUpdate(_) => "lavalink.voice.update",
        }
    }

    /// Payload-field validation performed by the request layer before a
    /// job is allowed into the queue.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SpindleError;

        match self {
            JobPayload::PlaylistSync(payload) => {
                if payload.user_id.is_empty() || payload.playlist_id.is_empty() {
                    return Err(SpindleError::Validation(
                        "spotify.playlist.sync requires userId and playlistId".to_string(),
                    ));
                }
            }
            JobPayload::PlaybackEnqueue(payload) => {
                if payload.guild_id.is_empty() {
                    return Err(SpindleError::Validation(
                        "playback.enqueue requires guildId".to_string(),
                    ));
                }
                if payload.track_id.is_none() && payload.query.is_none() {
                    return Err(SpindleError::Validation(
                        "playback.enqueue requires trackId or query".to_string(),
                    ));
                }
            }
            JobPayload::VoiceUpdate(payload) => {
                if payload.guild_id.is_empty()
                    || payload.session_id.is_empty()
                    || payload.token.is_empty()
                    || payload.endpoint.is_empty()
                {
                    return Err(SpindleError::Validation(
                        "lavalink.voice.update requires guildId, sessionId, token, and endpoint"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A queued unit of work. `attempts` and `inserted_at` are owned by the
/// queue: workers never mutate a job, they hand it back to `requeue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(flatten)]
    pub payload: JobPayload,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, rename = "insertedAt")]
    pub inserted_at: i64,
}

impl Job {
    pub fn new(payload: JobPayload, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            priority,
            attempts: 0,
            inserted_at: 0,
        }
    }
}
