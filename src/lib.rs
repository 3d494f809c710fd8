pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod lavalink;
pub mod metrics;
pub mod playback;
pub mod queue;
pub mod shutdown;
pub mod spotify;
pub mod worker;
