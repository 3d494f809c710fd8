use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use spindle::config::{LavalinkConfig, NodeEndpoint};
use spindle::error::{Result, SpindleError};
use spindle::lavalink::{LavalinkClient, LavalinkNode, NodeApi, PlayTrack, VoiceUpdate};

/// Canned transport: nodes listed in `tracks` answer load requests,
/// nodes in `accept_player` accept player patches, everything else
/// fails like an unreachable node.
#[derive(Default)]
struct StubNodeApi {
    tracks: HashMap<String, Value>,
    accept_player: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StubNodeApi {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl NodeApi for StubNodeApi {
    async fn load_tracks(&self, node: &LavalinkNode, identifier: &str) -> Result<Value> {
        self.calls
            .lock()
            .push(format!("load:{}:{identifier}", node.id));
        match self.tracks.get(&node.id) {
            Some(payload) => Ok(payload.clone()),
            None => Err(SpindleError::NodeStatus(500)),
        }
    }

    async fn update_player(
        &self,
        node: &LavalinkNode,
        _session_id: &str,
        guild_id: &str,
        no_replace: bool,
        _body: &Value,
    ) -> Result<()> {
        self.calls
            .lock()
            .push(format!("player:{}:{guild_id}:{no_replace}", node.id));
        if self.accept_player.contains(&node.id) {
            Ok(())
        } else {
            Err(SpindleError::NodeStatus(500))
        }
    }
}

fn endpoint(id: &str, session_id: Option<&str>) -> NodeEndpoint {
    NodeEndpoint {
        id: Some(id.to_string()),
        url: Some(format!("http://{id}.local:2333")),
        password: Some("secret".to_string()),
        session_id: session_id.map(str::to_string),
    }
}

fn track_payload(encoded: &str, title: &str) -> Value {
    json!({
        "data": [{
            "encoded": encoded,
            "info": {
                "identifier": "id-1",
                "title": title,
                "author": "Artist",
                "uri": "https://tracks.example/id-1",
                "length": 180_000,
                "sourceName": "spotify",
            }
        }]
    })
}

fn client(nodes: Vec<NodeEndpoint>, api: Arc<StubNodeApi>) -> LavalinkClient {
    LavalinkClient::with_api(
        LavalinkConfig {
            nodes,
            default_source: "spsearch".to_string(),
        },
        api,
    )
    .unwrap()
}

#[tokio::test]
async fn test_resolve_fails_over_to_next_node() {
    // alpha is down (no canned response); beta has the track.
    let api = Arc::new(StubNodeApi {
        tracks: HashMap::from([("beta".to_string(), track_payload("enc-b", "Song A"))]),
        ..Default::default()
    });
    let client = client(
        vec![endpoint("alpha", None), endpoint("beta", None)],
        api.clone(),
    );

    let resolved = client.resolve_track("Song A", None, None).await.unwrap();
    assert_eq!(resolved.node_id, "beta");
    assert_eq!(resolved.query, "spsearch:Song A");
    assert_eq!(resolved.track.encoded, "enc-b");
    assert_eq!(resolved.track.title, "Song A");

    let calls = api.calls();
    assert_eq!(calls[0], "load:alpha:spsearch:Song A");
    assert_eq!(calls[1], "load:beta:spsearch:Song A");
}

#[tokio::test]
async fn test_resolve_skips_nodes_with_empty_results() {
    let api = Arc::new(StubNodeApi {
        tracks: HashMap::from([
            ("alpha".to_string(), json!({ "data": [] })),
            ("beta".to_string(), track_payload("enc-b", "Song A")),
        ]),
        ..Default::default()
    });
    let client = client(
        vec![endpoint("alpha", None), endpoint("beta", None)],
        api,
    );

    let resolved = client.resolve_track("Song A", None, None).await.unwrap();
    assert_eq!(resolved.node_id, "beta");
}

#[tokio::test]
async fn test_resolve_exhausting_all_nodes_is_an_error() {
    let api = Arc::new(StubNodeApi::default());
    let client = client(
        vec![endpoint("alpha", None), endpoint("beta", None)],
        api,
    );

    let error = client.resolve_track("Song A", None, None).await.unwrap_err();
    assert!(matches!(error, SpindleError::ResolveExhausted));
}

#[tokio::test]
async fn test_preferred_node_is_tried_first() {
    let api = Arc::new(StubNodeApi {
        tracks: HashMap::from([
            ("alpha".to_string(), track_payload("enc-a", "Song A")),
            ("beta".to_string(), track_payload("enc-b", "Song A")),
        ]),
        ..Default::default()
    });
    let client = client(
        vec![endpoint("alpha", None), endpoint("beta", None)],
        api.clone(),
    );

    let resolved = client
        .resolve_track("Song A", None, Some("beta"))
        .await
        .unwrap();
    assert_eq!(resolved.node_id, "beta");
    assert!(api.calls()[0].starts_with("load:beta:"));
}

#[tokio::test]
async fn test_unrouted_calls_rotate_across_nodes() {
    let api = Arc::new(StubNodeApi {
        tracks: HashMap::from([
            ("alpha".to_string(), track_payload("enc-a", "Song A")),
            ("beta".to_string(), track_payload("enc-b", "Song A")),
        ]),
        ..Default::default()
    });
    let client = client(
        vec![endpoint("alpha", None), endpoint("beta", None)],
        api,
    );

    let first = client.resolve_track("Song A", None, None).await.unwrap();
    let second = client.resolve_track("Song A", None, None).await.unwrap();
    assert_eq!(first.node_id, "alpha");
    assert_eq!(second.node_id, "beta");
}

#[tokio::test]
async fn test_query_with_colon_is_not_prefixed() {
    let api = Arc::new(StubNodeApi {
        tracks: HashMap::from([("alpha".to_string(), track_payload("enc-a", "Song A"))]),
        ..Default::default()
    });
    let client = client(vec![endpoint("alpha", None)], api);

    let resolved = client
        .resolve_track("https://tracks.example/id-1", None, None)
        .await
        .unwrap();
    assert_eq!(resolved.query, "https://tracks.example/id-1");
}

#[tokio::test]
async fn test_custom_source_prefixes_bare_queries() {
    let api = Arc::new(StubNodeApi {
        tracks: HashMap::from([("alpha".to_string(), track_payload("enc-a", "Song A"))]),
        ..Default::default()
    });
    let client = client(vec![endpoint("alpha", None)], api);

    let resolved = client
        .resolve_track("Song A", Some("ytsearch"), None)
        .await
        .unwrap();
    assert_eq!(resolved.query, "ytsearch:Song A");
}

#[tokio::test]
async fn test_player_dispatch_skips_nodes_without_a_session() {
    let api = Arc::new(StubNodeApi {
        accept_player: HashSet::from(["beta".to_string()]),
        ..Default::default()
    });
    let client = client(
        vec![endpoint("alpha", None), endpoint("beta", Some("sess-b"))],
        api.clone(),
    );

    let dispatch = client
        .play_track(PlayTrack {
            guild_id: "g1".to_string(),
            encoded_track: "enc".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(dispatch.node_id, "beta");
    // The sessionless node is skipped without a request.
    assert_eq!(api.calls(), vec!["player:beta:g1:true".to_string()]);
}

#[tokio::test]
async fn test_voice_update_forces_no_replace_off() {
    let api = Arc::new(StubNodeApi {
        accept_player: HashSet::from(["alpha".to_string()]),
        ..Default::default()
    });
    let client = client(vec![endpoint("alpha", Some("sess-a"))], api.clone());

    let dispatch = client
        .update_voice_state(VoiceUpdate {
            guild_id: "g1".to_string(),
            session_id: "voice-sess".to_string(),
            token: "tok".to_string(),
            endpoint: "voice.example".to_string(),
            preferred_node_id: None,
        })
        .await
        .unwrap();

    assert_eq!(dispatch.node_id, "alpha");
    assert_eq!(api.calls(), vec!["player:alpha:g1:false".to_string()]);
}

#[tokio::test]
async fn test_dispatch_exhausting_all_sessions_is_an_error() {
    let api = Arc::new(StubNodeApi::default());
    let client = client(
        vec![endpoint("alpha", Some("sess-a")), endpoint("beta", None)],
        api,
    );

    let error = client
        .play_track(PlayTrack {
            guild_id: "g1".to_string(),
            encoded_track: "enc".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(error, SpindleError::DispatchExhausted));
}

#[tokio::test]
async fn test_unconfigured_client_rejects_operations() {
    let api = Arc::new(StubNodeApi::default());
    let client = client(Vec::new(), api);

    assert!(matches!(
        client.resolve_track("Song A", None, None).await.unwrap_err(),
        SpindleError::Configuration(_)
    ));
    assert!(matches!(
        client
            .play_track(PlayTrack {
                guild_id: "g1".to_string(),
                encoded_track: "enc".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err(),
        SpindleError::Configuration(_)
    ));
}
