use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SpotifyConfig;
use crate::error::{Result, SpindleError};
use crate::queue::epoch_millis;

use super::token_store::{SpotifyToken, TokenStore};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const PLAYLIST_URL: &str = "https://api.spotify.com/v1/playlists";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeUrl {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistTrack {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub artists: Vec<String>,
    pub album: String,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    #[serde(default)]
    track: Option<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    artists: Vec<RawArtist>,
    #[serde(default)]
    album: Option<RawAlbum>,
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    #[serde(default)]
    name: Option<String>,
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Server-provided retry hint in milliseconds, when present and sane.
fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(|seconds| seconds * 1000)
}

fn normalize_track(raw: RawTrack) -> Option<PlaylistTrack> {
    let id = raw.id?;
    Some(PlaylistTrack {
        id,
        name: raw.name.unwrap_or_else(|| "unknown".to_string()),
        duration_ms: raw.duration_ms.unwrap_or(0),
        artists: raw.artists.into_iter().filter_map(|a| a.name).collect(),
        album: raw
            .album
            .and_then(|a| a.name)
            .unwrap_or_else(|| "unknown".to_string()),
        uri: raw.uri,
    })
}

/// Client for the playlist-fetch integration. Rate-limited and 5xx
/// responses are retried with exponential backoff (base doubled per
/// attempt), honoring a Retry-After hint when the server sends one.
pub struct SpotifyService {
    config: SpotifyConfig,
    token_store: Arc<dyn TokenStore>,
    http: reqwest::Client,
}

impl SpotifyService {
    pub fn new(config: SpotifyConfig, token_store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            token_store,
            http: reqwest::Client::new(),
        }
    }

    pub fn create_authorize_url(
        &self,
        user_id: &str,
        state: Option<&str>,
        scope: Option<&str>,
    ) -> Result<AuthorizeUrl> {
        if user_id.is_empty() {
            return Err(SpindleError::Validation("userId is required".to_string()));
        }

        let auth_state = state
            .map(str::to_string)
            .unwrap_or_else(|| format!("{user_id}:{}", Uuid::new_v4()));

        let mut url = url::Url::parse(AUTHORIZE_URL)
            .map_err(|e| SpindleError::Spotify(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", scope.unwrap_or(&self.config.scopes))
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", &auth_state);

        Ok(AuthorizeUrl {
            url: url.to_string(),
            state: auth_state,
        })
    }

    pub async fn exchange_code(&self, user_id: &str, code: &str) -> Result<SpotifyToken> {
        if user_id.is_empty() || code.is_empty() {
            return Err(SpindleError::Validation(
                "userId and code are required".to_string(),
            ));
        }

        if self.config.mock_mode {
            let token = SpotifyToken {
                access_token: format!("spotify_access_{code}"),
                refresh_token: format!("spotify_refresh_{code}"),
                expires_at: epoch_millis() + 60 * 60 * 1000,
            };
            self.token_store.set(user_id, token.clone()).await?;
            return Ok(token);
        }

        self.assert_credentials()?;

        let request = self
            .http
            .post(TOKEN_URL)
            .header(AUTHORIZATION, self.basic_auth())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
            ]);
        let response = self.send_with_retry(request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SpindleError::Spotify(format!(
                "token exchange failed ({status}): {detail}"
            )));
        }

        let data: TokenResponse = response.json().await?;
        let token = SpotifyToken {
            access_token: data.access_token,
            refresh_token: data.refresh_token.unwrap_or_default(),
            expires_at: epoch_millis() + data.expires_in * 1000,
        };
        self.token_store.set(user_id, token.clone()).await?;
        Ok(token)
    }

    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String> {
        let token = self
            .token_store
            .get(user_id)
            .await?
            .ok_or_else(|| SpindleError::Spotify(format!("no spotify session for user {user_id}")))?;

        if token.expires_at <= epoch_millis() {
            self.refresh_token(user_id, &token.refresh_token).await?;
        }

        let updated = self
            .token_store
            .get(user_id)
            .await?
            .ok_or_else(|| SpindleError::Spotify(format!("no spotify session for user {user_id}")))?;
        Ok(updated.access_token)
    }

    /// Fetch a playlist's tracks, following pagination until the
    /// playlist is exhausted or `max_tracks` is reached.
    pub async fn fetch_playlist_tracks(
        &self,
        user_id: &str,
        playlist_id: &str,
        page_limit: u32,
        max_tracks: usize,
    ) -> Result<Vec<PlaylistTrack>> {
        if playlist_id.is_empty() {
            return Err(SpindleError::Validation(
                "playlistId is required".to_string(),
            ));
        }

        if self.config.mock_mode {
            return Ok(vec![PlaylistTrack {
                id: "mock_track_1".to_string(),
                name: "Mock Track".to_string(),
                duration_ms: 180_000,
                artists: vec!["Mock Artist".to_string()],
                album: "Mock Album".to_string(),
                uri: Some("spotify:track:mock_track_1".to_string()),
            }]);
        }

        let access_token = self.get_valid_access_token(user_id).await?;
        let page_limit = page_limit.clamp(1, 100);
        let mut next_url = Some(format!(
            "{PLAYLIST_URL}/{playlist_id}/tracks?limit={page_limit}&market=from_token"
        ));

        let mut tracks = Vec::new();
        while let Some(url) = next_url.take() {
            if tracks.len() >= max_tracks {
                break;
            }

            let request = self
                .http
                .get(&url)
                .header(AUTHORIZATION, format!("Bearer {access_token}"));
            let response = self.send_with_retry(request).await?;

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                return Err(SpindleError::Spotify(format!(
                    "playlist fetch failed ({status}): {detail}"
                )));
            }

            let page: PlaylistPage = response.json().await?;
            for item in page.items {
                if let Some(track) = item.track.and_then(normalize_track) {
                    tracks.push(track);
                }
                if tracks.len() >= max_tracks {
                    break;
                }
            }

            next_url = page.next;
        }

        Ok(tracks)
    }

    async fn refresh_token(&self, user_id: &str, refresh_token: &str) -> Result<()> {
        if self.config.mock_mode {
            if let Some(current) = self.token_store.get(user_id).await? {
                let updated = SpotifyToken {
                    access_token: format!("{}_refreshed", current.access_token),
                    expires_at: epoch_millis() + 60 * 60 * 1000,
                    ..current
                };
                self.token_store.set(user_id, updated).await?;
            }
            return Ok(());
        }

        self.assert_credentials()?;

        let request = self
            .http
            .post(TOKEN_URL)
            .header(AUTHORIZATION, self.basic_auth())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);
        let response = self.send_with_retry(request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SpindleError::Spotify(format!(
                "token refresh failed ({status}): {detail}"
            )));
        }

        let data: TokenResponse = response.json().await?;
        let current = self.token_store.get(user_id).await?;
        self.token_store
            .set(
                user_id,
                SpotifyToken {
                    access_token: data.access_token,
                    refresh_token: data
                        .refresh_token
                        .or(current.map(|t| t.refresh_token))
                        .unwrap_or_default(),
                    expires_at: epoch_millis() + data.expires_in * 1000,
                },
            )
            .await?;
        Ok(())
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let current = request
                .try_clone()
                .ok_or_else(|| SpindleError::Spotify("request is not retryable".to_string()))?;
            let response = current.send().await?;

            if response.status().is_success()
                || !is_retryable(response.status())
                || attempt == self.config.max_retries
            {
                return Ok(response);
            }

            let backoff = self.config.retry_base_ms * 2u64.pow(attempt);
            let wait_ms = retry_after_ms(&response).unwrap_or(backoff);
            tracing::debug!(
                status = %response.status(),
                attempt,
                wait_ms,
                "spotify request rate limited, backing off"
            );
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            attempt += 1;
        }
    }

    fn basic_auth(&self) -> String {
        let credentials = format!("{}:{}", self.config.client_id, self.config.client_secret);
        format!("Basic {}", BASE64.encode(credentials))
    }

    fn assert_credentials(&self) -> Result<()> {
        if self.config.client_id.is_empty()
            || self.config.client_secret.is_empty()
            || self.config.redirect_uri.is_empty()
        {
            return Err(SpindleError::Configuration(
                "spotify credentials are required when mock mode is off".to_string(),
            ));
        }
        Ok(())
    }
}
