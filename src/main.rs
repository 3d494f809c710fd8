use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spindle::api::{self, ApiState};
use spindle::cluster::{ClusterManager, ClusterManagerOptions};
use spindle::config::{Config, QueueProvider};
use spindle::lavalink::LavalinkClient;
use spindle::metrics::Metrics;
use spindle::playback::PlaybackCoordinator;
use spindle::queue::create_queue;
use spindle::shutdown::install_shutdown_handler;
use spindle::spotify::{create_token_store, SpotifyService};
use spindle::worker::WorkerDeps;

#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(version)]
#[command(about = "Sharded dispatch service for playback, playlist sync, and voice-session jobs")]
struct Args {
    /// HTTP API port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Number of clusters to partition shards across (overrides CLUSTER_COUNT)
    #[arg(long)]
    cluster_count: Option<u32>,

    /// Workers per cluster (overrides WORKERS_PER_CLUSTER)
    #[arg(long)]
    workers_per_cluster: Option<u32>,

    /// Total shard count to partition (overrides SHARD_COUNT)
    #[arg(long)]
    shard_count: Option<u32>,

    /// Queue backend (overrides QUEUE_PROVIDER)
    #[arg(long, value_enum)]
    queue: Option<QueueProvider>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(cluster_count) = args.cluster_count {
        config.cluster_count = cluster_count;
    }
    if let Some(workers_per_cluster) = args.workers_per_cluster {
        config.workers_per_cluster = workers_per_cluster;
    }
    if let Some(shard_count) = args.shard_count {
        config.shard_count = shard_count;
    }
    if let Some(queue_provider) = args.queue {
        config.queue_provider = queue_provider;
    }

    let metrics = Arc::new(Metrics::default());
    let queue = create_queue(&config, metrics.clone());
    let token_store = create_token_store(&config.token_store);
    let spotify = Arc::new(SpotifyService::new(config.spotify.clone(), token_store));
    let lavalink = Arc::new(LavalinkClient::new(config.lavalink.clone())?);
    let coordinator = Arc::new(PlaybackCoordinator::new());

    let cluster_manager = Arc::new(ClusterManager::new(ClusterManagerOptions {
        cluster_count: config.cluster_count,
        workers_per_cluster: config.workers_per_cluster,
        shard_count: config.shard_count,
        worker_poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
        deps: WorkerDeps {
            queue: queue.clone(),
            coordinator,
            spotify: spotify.clone(),
            lavalink: lavalink.clone(),
            metrics: metrics.clone(),
        },
    }));
    cluster_manager.start().await;

    metrics.set_gauge("configured_clusters", config.cluster_count as i64);
    metrics.set_gauge("configured_shards", config.shard_count as i64);
    metrics.set_gauge(
        "configured_workers_per_cluster",
        config.workers_per_cluster as i64,
    );
    metrics.set_gauge(
        "queue_provider_redis",
        (config.queue_provider == QueueProvider::Redis) as i64,
    );
    metrics.set_gauge("lavalink_enabled", lavalink.is_configured() as i64);

    let cancel = install_shutdown_handler();

    // The heartbeat is an external periodic trigger, not something the
    // cluster manager schedules for itself.
    let heartbeat = {
        let cluster_manager = cluster_manager.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_millis(config.heartbeat_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => cluster_manager.heartbeat().await,
                }
            }
        })
    };

    tracing::info!(
        port = config.port,
        cluster_count = config.cluster_count,
        workers_per_cluster = config.workers_per_cluster,
        shard_count = config.shard_count,
        queue_provider = ?config.queue_provider,
        spotify_mock_mode = config.spotify.mock_mode,
        lavalink_nodes = lavalink.nodes().len(),
        "spindle bootstrap complete"
    );

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let state = ApiState {
        admin_api_token: config.admin_api_token.clone(),
        queue: queue.clone(),
        metrics,
        cluster_manager: cluster_manager.clone(),
        spotify,
    };
    api::serve(addr, state, cancel.clone()).await?;

    cluster_manager.stop().await;
    let _ = heartbeat.await;
    queue.close().await?;

    tracing::info!("shutdown complete");
    Ok(())
}
