//! Worker poll loops that drain the job queue.
//!
//! A worker is either idle or processing exactly one job; it moves to
//! processing only after a successful dequeue and returns to idle
//! whatever the handler outcome. Guild-scoped handlers run inside the
//! coordinator's non-blocking lock; contention is a processing failure
//! that rides the retry path, never a wait.

pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SpindleError};
use crate::lavalink::{LavalinkClient, NodeRouter, PlayTrack, VoiceUpdate};
use crate::metrics::{keys, Metrics};
use crate::playback::{GuildPlayback, PlaybackCoordinator};
use crate::queue::{
    epoch_millis, Job, JobPayload, JobQueue, PlaybackEnqueuePayload, PlaylistSyncPayload,
    VoiceUpdatePayload,
};
use crate::spotify::SpotifyService;

pub use pool::{WorkerPool, WorkerPoolOptions};

/// Shared handles every worker needs, identical across clusters.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<dyn JobQueue>,
    pub coordinator: Arc<PlaybackCoordinator>,
    pub spotify: Arc<SpotifyService>,
    pub lavalink: Arc<LavalinkClient>,
    pub metrics: Arc<Metrics>,
}

pub struct Worker {
    id: String,
    cluster_id: String,
    deps: WorkerDeps,
    router: Arc<NodeRouter>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: String,
        cluster_id: String,
        deps: WorkerDeps,
        router: Arc<NodeRouter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            cluster_id,
            deps,
            router,
            poll_interval,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Poll loop: an empty queue schedules the next attempt one poll
    /// interval later; a processed job loops immediately. Cancellation
    /// is observed between ticks, so an in-flight job always finishes.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::debug!(worker_id = %self.id, "worker loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let processed = self.tick().await;
            if !processed {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        tracing::debug!(worker_id = %self.id, "worker loop stopped");
    }

    /// One idle→processing→idle transition. Returns false when the
    /// queue had nothing for us.
    pub async fn tick(&self) -> bool {
        let job = match self.deps.queue.dequeue().await {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(error) => {
                tracing::error!(worker_id = %self.id, error = %error, "queue dequeue failed");
                return false;
            }
        };

        match self.process(&job).await {
            Ok(()) => {
                self.deps.metrics.increment(keys::JOB_COMPLETED);
            }
            Err(error) => {
                self.deps.metrics.increment(keys::JOB_FAILED);
                tracing::warn!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    job_type = job.payload.kind(),
                    error = %error,
                    "job execution failed"
                );
                if let Err(error) = self.deps.queue.requeue(job).await {
                    tracing::error!(worker_id = %self.id, error = %error, "requeue failed");
                }
            }
        }

        true
    }

    async fn process(&self, job: &Job) -> Result<()> {
        match &job.payload {
            JobPayload::PlaylistSync(payload) => self.handle_playlist_sync(payload).await,
            JobPayload::PlaybackEnqueue(payload) => self.handle_playback_enqueue(payload).await,
            JobPayload::VoiceUpdate(payload) => self.handle_voice_update(payload).await,
        }
    }

    /// Not guild-scoped, so no entity lock.
    async fn handle_playlist_sync(&self, payload: &PlaylistSyncPayload) -> Result<()> {
        let tracks = self
            .deps
            .spotify
            .fetch_playlist_tracks(
                &payload.user_id,
                &payload.playlist_id,
                payload.page_limit.unwrap_or(100),
                payload.max_tracks.unwrap_or(500),
            )
            .await?;

        self.deps.metrics.increment(keys::SPOTIFY_PLAYLIST_SYNCED);
        tracing::info!(
            worker_id = %self.id,
            user_id = %payload.user_id,
            playlist_id = %payload.playlist_id,
            track_count = tracks.len(),
            sample_track = tracks.first().map(|t| t.name.as_str()).unwrap_or("-"),
            "playlist sync executed"
        );
        Ok(())
    }

    async fn handle_playback_enqueue(&self, payload: &PlaybackEnqueuePayload) -> Result<()> {
        if !self.deps.coordinator.acquire(&payload.guild_id) {
            return Err(SpindleError::GuildBusy(payload.guild_id.clone()));
        }

        let result = self.playback_enqueue_locked(payload).await;
        self.deps.coordinator.release(&payload.guild_id);
        result
    }

    async fn playback_enqueue_locked(&self, payload: &PlaybackEnqueuePayload) -> Result<()> {
        let preferred = self
            .router
            .resolve_preferred_node_id(Some(&payload.guild_id), payload.shard_id);

        let mut state = GuildPlayback {
            track_id: payload.track_id.clone(),
            encoded: payload.encoded.clone(),
            shard_id: payload.shard_id,
            cluster_id: Some(self.cluster_id.clone()),
            ..Default::default()
        };

        if let Some(query) = &payload.query {
            if !self.deps.lavalink.is_configured() {
                return Err(SpindleError::Configuration(
                    "playback query provided but lavalink is not configured".to_string(),
                ));
            }

            let resolved = self
                .deps
                .lavalink
                .resolve_track(query, payload.source.as_deref(), preferred.as_deref())
                .await?;

            state = GuildPlayback {
                track_id: resolved.track.identifier.clone(),
                encoded: Some(resolved.track.encoded.clone()),
                title: Some(resolved.track.title),
                author: Some(resolved.track.author),
                uri: resolved.track.uri,
                length: Some(resolved.track.length),
                source_name: Some(resolved.track.source_name),
                query: Some(resolved.query),
                node_id: Some(resolved.node_id),
                shard_id: payload.shard_id,
                cluster_id: Some(self.cluster_id.clone()),
                ..Default::default()
            };
            self.deps.metrics.increment(keys::LAVALINK_TRACK_RESOLVED);
        }

        let dispatch_enabled = payload.dispatch_to_lavalink != Some(false);
        match state.encoded.clone() {
            Some(encoded_track) if dispatch_enabled && self.deps.lavalink.is_configured() => {
                let dispatched = self
                    .deps
                    .lavalink
                    .play_track(PlayTrack {
                        guild_id: payload.guild_id.clone(),
                        encoded_track,
                        preferred_node_id: state.node_id.clone().or(preferred),
                        no_replace: payload.no_replace,
                        pause: payload.pause,
                        volume: payload.volume,
                        position: payload.position,
                    })
                    .await?;

                state.node_id = Some(dispatched.node_id);
                state.dispatched = Some(true);
                self.deps
                    .metrics
                    .increment(keys::LAVALINK_PLAYER_DISPATCHED);
            }
            _ => {
                state.dispatched = Some(false);
            }
        }

        state.enqueued_at = Some(epoch_millis());
        self.deps.coordinator.merge_state(&payload.guild_id, state);
        Ok(())
    }

    async fn handle_voice_update(&self, payload: &VoiceUpdatePayload) -> Result<()> {
        if !self.deps.coordinator.acquire(&payload.guild_id) {
            return Err(SpindleError::GuildBusy(payload.guild_id.clone()));
        }

        let result = self.voice_update_locked(payload).await;
        self.deps.coordinator.release(&payload.guild_id);
        result
    }

    async fn voice_update_locked(&self, payload: &VoiceUpdatePayload) -> Result<()> {
        if !self.deps.lavalink.is_configured() {
            return Err(SpindleError::Configuration(
                "voice update requires a configured lavalink node".to_string(),
            ));
        }

        let preferred = self
            .router
            .resolve_preferred_node_id(Some(&payload.guild_id), payload.shard_id);

        let updated = self
            .deps
            .lavalink
            .update_voice_state(VoiceUpdate {
                guild_id: payload.guild_id.clone(),
                session_id: payload.session_id.clone(),
                token: payload.token.clone(),
                endpoint: payload.endpoint.clone(),
                preferred_node_id: preferred,
            })
            .await?;

        self.deps.coordinator.merge_state(
            &payload.guild_id,
            GuildPlayback {
                voice_session_id: Some(payload.session_id.clone()),
                voice_endpoint: Some(payload.endpoint.clone()),
                voice_token: Some(payload.token.clone()),
                node_id: Some(updated.node_id),
                shard_id: payload.shard_id,
                cluster_id: Some(self.cluster_id.clone()),
                voice_updated_at: Some(epoch_millis()),
                ..Default::default()
            },
        );

        self.deps.metrics.increment(keys::LAVALINK_VOICE_UPDATED);
        Ok(())
    }
}
