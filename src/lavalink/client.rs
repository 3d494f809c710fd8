use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::LavalinkConfig;
use crate::error::{Result, SpindleError};

const CLIENT_USER_AGENT: &str = concat!("spindle/", env!("CARGO_PKG_VERSION"));

/// A configured backend media node. Immutable after construction; a
/// node without a session id can resolve tracks but cannot serve
/// player dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct LavalinkNode {
    pub id: String,
    pub url: String,
    pub password: String,
    pub session_id: Option<String>,
}

/// Track metadata normalized from a node's load-tracks response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub encoded: String,
    pub identifier: Option<String>,
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    pub length: u64,
    pub source_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub node_id: String,
    pub query: String,
    pub track: TrackInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDispatch {
    pub node_id: String,
    pub guild_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlayTrack {
    pub guild_id: String,
    pub encoded_track: String,
    pub preferred_node_id: Option<String>,
    /// Defaults to true: do not interrupt an already-playing track.
    pub no_replace: Option<bool>,
    pub pause: Option<bool>,
    pub volume: Option<u16>,
    pub position: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceUpdate {
    pub guild_id: String,
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
    pub preferred_node_id: Option<String>,
}

/// Network seam for node REST calls, so tests can stand in for real
/// nodes. Both calls return an error for any transport failure or
/// non-success status; the client treats those as per-candidate skips.
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn load_tracks(&self, node: &LavalinkNode, identifier: &str) -> Result<Value>;

    async fn update_player(
        &self,
        node: &LavalinkNode,
        session_id: &str,
        guild_id: &str,
        no_replace: bool,
        body: &Value,
    ) -> Result<()>;
}

/// Production transport over the Lavalink v4 REST API.
pub struct HttpNodeApi {
    http: reqwest::Client,
}

impl HttpNodeApi {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpNodeApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn load_tracks(&self, node: &LavalinkNode, identifier: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/v4/loadtracks", node.url))
            .query(&[("identifier", identifier)])
            .header(AUTHORIZATION, &node.password)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpindleError::NodeStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn update_player(
        &self,
        node: &LavalinkNode,
        session_id: &str,
        guild_id: &str,
        no_replace: bool,
        body: &Value,
    ) -> Result<()> {
        let response = self
            .http
            .patch(format!(
                "{}/v4/sessions/{}/players/{}",
                node.url, session_id, guild_id
            ))
            .query(&[("noReplace", no_replace)])
            .header(AUTHORIZATION, &node.password)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SpindleError::NodeStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Client over the configured node pool. Candidate order is the
/// preferred node first, then every node starting from a cursor that
/// advances on each call, spreading unrouted load round-robin. The
/// cursor is atomic because one client is shared by all worker tasks.
pub struct LavalinkClient {
    nodes: Vec<LavalinkNode>,
    by_id: HashMap<String, usize>,
    default_source: String,
    cursor: AtomicUsize,
    api: Arc<dyn NodeApi>,
}

impl LavalinkClient {
    pub fn new(config: LavalinkConfig) -> Result<Self> {
        Self::with_api(config, Arc::new(HttpNodeApi::new()))
    }

    pub fn with_api(config: LavalinkConfig, api: Arc<dyn NodeApi>) -> Result<Self> {
        let mut nodes = Vec::with_capacity(config.nodes.len());
        for (index, endpoint) in config.nodes.iter().enumerate() {
            let (Some(url), Some(password)) = (&endpoint.url, &endpoint.password) else {
                return Err(SpindleError::Configuration(format!(
                    "invalid lavalink node at index {index}: url and password are required"
                )));
            };
            nodes.push(LavalinkNode {
                id: endpoint
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("node-{}", index + 1)),
                url: url.trim_end_matches('/').to_string(),
                password: password.clone(),
                session_id: endpoint.session_id.clone(),
            });
        }

        let by_id = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id.clone(), index))
            .collect();

        Ok(Self {
            nodes,
            by_id,
            default_source: config.default_source,
            cursor: AtomicUsize::new(0),
            api,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[LavalinkNode] {
        &self.nodes
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    /// Resolve a search query or identifier to a playable track,
    /// failing over across candidate nodes. A node that errors or
    /// returns no results is skipped, never aborting the loop.
    pub async fn resolve_track(
        &self,
        query: &str,
        source: Option<&str>,
        preferred_node_id: Option<&str>,
    ) -> Result<ResolvedTrack> {
        if !self.is_configured() {
            return Err(SpindleError::Configuration(
                "lavalink is not configured".to_string(),
            ));
        }
        if query.is_empty() {
            return Err(SpindleError::Validation(
                "query is required for track resolution".to_string(),
            ));
        }

        let identifier = with_search_prefix(query, source.unwrap_or(&self.default_source));

        for index in self.candidates(preferred_node_id) {
            let node = &self.nodes[index];
            let payload = match self.api.load_tracks(node, &identifier).await {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::debug!(node_id = %node.id, error = %error, "track lookup failed, trying next node");
                    continue;
                }
            };

            let Some(track) = pick_track(&payload) else {
                continue;
            };

            return Ok(ResolvedTrack {
                node_id: node.id.clone(),
                query: identifier,
                track,
            });
        }

        Err(SpindleError::ResolveExhausted)
    }

    /// Dispatch an encoded track to a guild player on the first
    /// candidate node with an active session.
    pub async fn play_track(&self, request: PlayTrack) -> Result<PlayerDispatch> {
        if request.guild_id.is_empty() || request.encoded_track.is_empty() {
            return Err(SpindleError::Validation(
                "guildId and encodedTrack are required for player dispatch".to_string(),
            ));
        }

        let mut body = json!({ "track": { "encoded": request.encoded_track } });
        if let Some(pause) = request.pause {
            body["paused"] = pause.into();
        }
        if let Some(volume) = request.volume {
            body["volume"] = volume.into();
        }
        if let Some(position) = request.position {
            body["position"] = position.into();
        }

        self.patch_player(
            &request.guild_id,
            request.preferred_node_id.as_deref(),
            request.no_replace.unwrap_or(true),
            body,
        )
        .await
    }

    /// Apply a voice-session update to a guild player. Voice state must
    /// always apply, so `noReplace` is forced off.
    pub async fn update_voice_state(&self, request: VoiceUpdate) -> Result<PlayerDispatch> {
        if request.guild_id.is_empty()
            || request.session_id.is_empty()
            || request.token.is_empty()
            || request.endpoint.is_empty()
        {
            return Err(SpindleError::Validation(
                "guildId, sessionId, token, and endpoint are required for voice update".to_string(),
            ));
        }

        let body = json!({
            "voice": {
                "sessionId": request.session_id,
                "token": request.token,
                "endpoint": request.endpoint,
            }
        });

        self.patch_player(
            &request.guild_id,
            request.preferred_node_id.as_deref(),
            false,
            body,
        )
        .await
    }

    async fn patch_player(
        &self,
        guild_id: &str,
        preferred_node_id: Option<&str>,
        no_replace: bool,
        body: Value,
    ) -> Result<PlayerDispatch> {
        if !self.is_configured() {
            return Err(SpindleError::Configuration(
                "lavalink is not configured".to_string(),
            ));
        }

        for index in self.candidates(preferred_node_id) {
            let node = &self.nodes[index];
            let Some(session_id) = &node.session_id else {
                continue;
            };

            match self
                .api
                .update_player(node, session_id, guild_id, no_replace, &body)
                .await
            {
                Ok(()) => {
                    return Ok(PlayerDispatch {
                        node_id: node.id.clone(),
                        guild_id: guild_id.to_string(),
                    })
                }
                Err(error) => {
                    tracing::debug!(node_id = %node.id, error = %error, "player update failed, trying next node");
                }
            }
        }

        Err(SpindleError::DispatchExhausted)
    }

    /// Candidate order: the preferred node first when it exists, then
    /// every configured node starting from the rotating cursor, without
    /// duplicates.
    fn candidates(&self, preferred_node_id: Option<&str>) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());

        if let Some(preferred) = preferred_node_id {
            if let Some(&index) = self.by_id.get(preferred) {
                order.push(index);
            }
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        for offset in 0..self.nodes.len() {
            let index = (start + offset) % self.nodes.len();
            if !order.contains(&index) {
                order.push(index);
            }
        }

        order
    }
}

/// Qualify a bare query with a search source. A query that already
/// contains a colon is treated as a URI or prefixed identifier.
fn with_search_prefix(query: &str, source: &str) -> String {
    if query.contains(':') {
        query.to_string()
    } else {
        format!("{source}:{query}")
    }
}

/// First track of a load-tracks response, or `None` when the node had
/// no results or an unexpected shape.
fn pick_track(payload: &Value) -> Option<TrackInfo> {
    let track = payload.get("data")?.as_array()?.first()?;
    let info = track.get("info");
    let field = |name: &str| {
        info.and_then(|i| i.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Some(TrackInfo {
        encoded: track.get("encoded")?.as_str()?.to_string(),
        identifier: field("identifier"),
        title: field("title").unwrap_or_else(|| "unknown".to_string()),
        author: field("author").unwrap_or_else(|| "unknown".to_string()),
        uri: field("uri"),
        length: info
            .and_then(|i| i.get("length"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        source_name: field("sourceName").unwrap_or_else(|| "unknown".to_string()),
    })
}
