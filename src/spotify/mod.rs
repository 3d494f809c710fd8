//! Spotify integration: OAuth token lifecycle and paginated playlist
//! fetches with backoff. Mock mode short-circuits every network call so
//! the dispatch core can run without credentials.

pub mod service;
pub mod token_store;

pub use service::{AuthorizeUrl, PlaylistTrack, SpotifyService};
pub use token_store::{
    create_token_store, FileTokenStore, MemoryTokenStore, SpotifyToken, TokenStore,
};
