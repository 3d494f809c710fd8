use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, SpindleError};

/// Queue backend selection. The remote provider fans work across
/// processes; the in-process provider is the default for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QueueProvider {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStoreProvider {
    Memory,
    File,
}

/// A Lavalink node as declared in configuration. `url` and `password`
/// are required; a missing `id` gets a positional default when the
/// client normalizes the list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEndpoint {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LavalinkConfig {
    pub nodes: Vec<NodeEndpoint>,
    pub default_source: String,
}

impl Default for LavalinkConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            default_source: "spsearch".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    /// Short-circuits all network calls with canned responses.
    pub mock_mode: bool,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3000/auth/spotify/callback".to_string(),
            scopes: "playlist-read-private playlist-read-collaborative".to_string(),
            mock_mode: true,
            max_retries: 3,
            retry_base_ms: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub provider: TokenStoreProvider,
    pub file: PathBuf,
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            provider: TokenStoreProvider::Memory,
            file: PathBuf::from("./.spindle-tokens.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cluster_count: u32,
    pub workers_per_cluster: u32,
    pub shard_count: u32,
    pub max_job_retries: u32,
    pub queue_provider: QueueProvider,
    pub redis_url: String,
    pub redis_key_prefix: String,
    pub worker_poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub admin_api_token: Option<String>,
    pub token_store: TokenStoreConfig,
    pub spotify: SpotifyConfig,
    pub lavalink: LavalinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            cluster_count: 2,
            workers_per_cluster: 2,
            shard_count: 8,
            max_job_retries: 3,
            queue_provider: QueueProvider::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            redis_key_prefix: "spindle".to_string(),
            worker_poll_interval_ms: 25,
            heartbeat_interval_ms: 5000,
            admin_api_token: None,
            token_store: TokenStoreConfig::default(),
            spotify: SpotifyConfig::default(),
            lavalink: LavalinkConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults. Malformed values are startup errors, not warnings.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            port: env_parse("PORT", defaults.port)?,
            cluster_count: env_count("CLUSTER_COUNT", defaults.cluster_count)?,
            workers_per_cluster: env_count("WORKERS_PER_CLUSTER", defaults.workers_per_cluster)?,
            shard_count: env_count("SHARD_COUNT", defaults.shard_count)?,
            max_job_retries: env_parse("MAX_JOB_RETRIES", defaults.max_job_retries)?,
            queue_provider: match env_opt("QUEUE_PROVIDER").as_deref() {
                None | Some("memory") => QueueProvider::Memory,
                Some("redis") => QueueProvider::Redis,
                Some(other) => {
                    return Err(SpindleError::Configuration(format!(
                        "unsupported QUEUE_PROVIDER: {other}"
                    )))
                }
            },
            redis_url: env_string("REDIS_URL", &defaults.redis_url),
            redis_key_prefix: env_string("REDIS_KEY_PREFIX", &defaults.redis_key_prefix),
            worker_poll_interval_ms: env_parse(
                "WORKER_POLL_INTERVAL_MS",
                defaults.worker_poll_interval_ms,
            )?,
            heartbeat_interval_ms: env_parse(
                "HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval_ms,
            )?,
            admin_api_token: env_opt("ADMIN_API_TOKEN").filter(|token| !token.is_empty()),
            token_store: TokenStoreConfig {
                provider: match env_opt("TOKEN_STORE_PROVIDER").as_deref() {
                    None | Some("memory") => TokenStoreProvider::Memory,
                    Some("file") => TokenStoreProvider::File,
                    Some(other) => {
                        return Err(SpindleError::Configuration(format!(
                            "unsupported TOKEN_STORE_PROVIDER: {other}"
                        )))
                    }
                },
                file: PathBuf::from(env_string(
                    "TOKEN_STORE_FILE",
                    &defaults.token_store.file.to_string_lossy(),
                )),
            },
            spotify: SpotifyConfig {
                client_id: env_string("SPOTIFY_CLIENT_ID", ""),
                client_secret: env_string("SPOTIFY_CLIENT_SECRET", ""),
                redirect_uri: env_string("SPOTIFY_REDIRECT_URI", &defaults.spotify.redirect_uri),
                scopes: env_string("SPOTIFY_SCOPES", &defaults.spotify.scopes),
                mock_mode: env_bool("SPOTIFY_MOCK_MODE", defaults.spotify.mock_mode),
                max_retries: env_parse("SPOTIFY_MAX_RETRIES", defaults.spotify.max_retries)?,
                retry_base_ms: env_parse("SPOTIFY_RETRY_BASE_MS", defaults.spotify.retry_base_ms)?,
            },
            lavalink: LavalinkConfig {
                nodes: parse_node_list(&env_string("LAVALINK_NODES", "[]"))?,
                default_source: env_string(
                    "LAVALINK_DEFAULT_SOURCE",
                    &defaults.lavalink.default_source,
                ),
            },
        })
    }
}

/// Parse the LAVALINK_NODES JSON array. Field-level validation (url,
/// password) happens when the client normalizes the list.
pub fn parse_node_list(raw: &str) -> Result<Vec<NodeEndpoint>> {
    serde_json::from_str::<Vec<NodeEndpoint>>(raw)
        .map_err(|e| SpindleError::Configuration(format!("invalid LAVALINK_NODES JSON: {e}")))
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_string(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env_opt(name) {
        Some(raw) => matches!(raw.to_lowercase().as_str(), "true" | "1"),
        None => default,
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| SpindleError::Configuration(format!("invalid {name}: {raw} ({e})"))),
        None => Ok(default),
    }
}

/// Like [`env_parse`] but rejects zero: cluster, worker, and shard
/// counts must be at least one.
fn env_count(name: &str, default: u32) -> Result<u32> {
    let value: u32 = env_parse(name, default)?;
    if value < 1 {
        return Err(SpindleError::Configuration(format!(
            "invalid {name}: must be at least 1"
        )));
    }
    Ok(value)
}
