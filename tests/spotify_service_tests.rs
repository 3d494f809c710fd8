use std::sync::Arc;

use spindle::config::SpotifyConfig;
use spindle::error::SpindleError;
use spindle::spotify::{MemoryTokenStore, SpotifyService, TokenStore};

fn mock_service() -> (SpotifyService, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    let config = SpotifyConfig {
        client_id: "client-id".to_string(),
        ..SpotifyConfig::default()
    };
    (SpotifyService::new(config, store.clone()), store)
}

#[tokio::test]
async fn test_authorize_url_carries_oauth_params() {
    let (service, _store) = mock_service();

    let authorize = service
        .create_authorize_url("u1", Some("fixed-state"), None)
        .unwrap();

    assert!(authorize.url.starts_with("https://accounts.spotify.com/authorize?"));
    assert!(authorize.url.contains("response_type=code"));
    assert!(authorize.url.contains("client_id=client-id"));
    assert!(authorize.url.contains("state=fixed-state"));
    assert_eq!(authorize.state, "fixed-state");
}

#[tokio::test]
async fn test_authorize_url_generates_a_user_scoped_state() {
    let (service, _store) = mock_service();

    let authorize = service.create_authorize_url("u1", None, None).unwrap();
    assert!(authorize.state.starts_with("u1:"));

    let again = service.create_authorize_url("u1", None, None).unwrap();
    assert_ne!(authorize.state, again.state);
}

#[tokio::test]
async fn test_authorize_url_requires_a_user() {
    let (service, _store) = mock_service();
    assert!(matches!(
        service.create_authorize_url("", None, None).unwrap_err(),
        SpindleError::Validation(_)
    ));
}

#[tokio::test]
async fn test_mock_exchange_stores_a_token() {
    let (service, store) = mock_service();

    let token = service.exchange_code("u1", "code-1").await.unwrap();
    assert_eq!(token.access_token, "spotify_access_code-1");
    assert_eq!(token.refresh_token, "spotify_refresh_code-1");

    let stored = store.get("u1").await.unwrap().unwrap();
    assert_eq!(stored, token);

    let access = service.get_valid_access_token("u1").await.unwrap();
    assert_eq!(access, "spotify_access_code-1");
}

#[tokio::test]
async fn test_access_token_without_a_session_is_an_error() {
    let (service, _store) = mock_service();
    assert!(matches!(
        service.get_valid_access_token("stranger").await.unwrap_err(),
        SpindleError::Spotify(_)
    ));
}

#[tokio::test]
async fn test_mock_playlist_fetch_returns_canned_tracks() {
    let (service, _store) = mock_service();

    let tracks = service
        .fetch_playlist_tracks("u1", "p1", 100, 500)
        .await
        .unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id, "mock_track_1");
    assert_eq!(tracks[0].artists, vec!["Mock Artist".to_string()]);
}

#[tokio::test]
async fn test_playlist_fetch_requires_a_playlist_id() {
    let (service, _store) = mock_service();
    assert!(matches!(
        service.fetch_playlist_tracks("u1", "", 100, 500).await.unwrap_err(),
        SpindleError::Validation(_)
    ));
}
