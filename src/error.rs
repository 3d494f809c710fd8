use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpindleError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("guild {0} is already processing a playback operation")]
    GuildBusy(String),

    #[error("unable to resolve track from any lavalink node")]
    ResolveExhausted,

    #[error("unable to dispatch player update to any lavalink node")]
    DispatchExhausted,

    #[error("lavalink node responded with status {0}")]
    NodeStatus(u16),

    #[error("queue backend error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spotify error: {0}")]
    Spotify(String),
}

pub type Result<T> = std::result::Result<T, SpindleError>;
