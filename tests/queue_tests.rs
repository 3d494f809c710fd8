use std::collections::HashSet;
use std::sync::Arc;

use spindle::metrics::{keys, Metrics};
use spindle::queue::{
    Job, JobPayload, JobQueue, MemoryQueue, PlaybackEnqueuePayload, PlaylistSyncPayload, Priority,
};

fn playback_job(guild_id: &str, priority: Priority) -> Job {
    Job::new(
        JobPayload::PlaybackEnqueue(PlaybackEnqueuePayload {
            guild_id: guild_id.to_string(),
            track_id: Some("t1".to_string()),
            ..Default::default()
        }),
        priority,
    )
}

fn sync_job(user_id: &str) -> Job {
    Job::new(
        JobPayload::PlaylistSync(PlaylistSyncPayload {
            user_id: user_id.to_string(),
            playlist_id: "p1".to_string(),
            page_limit: None,
            max_tracks: None,
        }),
        Priority::Normal,
    )
}

#[tokio::test]
async fn test_dequeue_orders_by_priority_then_insertion() {
    let metrics = Arc::new(Metrics::default());
    let queue = MemoryQueue::new(metrics, 3);

    let low = queue.enqueue(playback_job("g-low", Priority::Low)).await.unwrap();
    let normal_a = queue.enqueue(playback_job("g-na", Priority::Normal)).await.unwrap();
    let high = queue.enqueue(playback_job("g-high", Priority::High)).await.unwrap();
    let normal_b = queue.enqueue(playback_job("g-nb", Priority::Normal)).await.unwrap();

    assert_eq!(queue.size().await.unwrap(), 4);

    let order: Vec<String> = [
        queue.dequeue().await.unwrap().unwrap(),
        queue.dequeue().await.unwrap().unwrap(),
        queue.dequeue().await.unwrap().unwrap(),
        queue.dequeue().await.unwrap().unwrap(),
    ]
    .into_iter()
    .map(|job| job.id)
    .collect();

    assert_eq!(order, vec![high.id, normal_a.id, normal_b.id, low.id]);
    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
async fn test_enqueue_stamps_attempts_and_counts_received() {
    let metrics = Arc::new(Metrics::default());
    let queue = MemoryQueue::new(metrics.clone(), 3);

    let stored = queue.enqueue(sync_job("u1")).await.unwrap();
    assert_eq!(stored.attempts, 0);
    assert!(stored.inserted_at > 0);
    assert_eq!(metrics.counter(keys::JOB_RECEIVED), 1);
}

#[tokio::test]
async fn test_requeue_moves_job_to_dead_letter_after_budget() {
    let metrics = Arc::new(Metrics::default());
    let max_retries = 2;
    let queue = MemoryQueue::new(metrics.clone(), max_retries);

    let job = queue.enqueue(sync_job("u1")).await.unwrap();

    // Attempts within the budget re-enter the main queue.
    let retry_one = queue.requeue(job).await.unwrap().unwrap();
    assert_eq!(retry_one.attempts, 1);
    let retry_two = queue.requeue(retry_one).await.unwrap().unwrap();
    assert_eq!(retry_two.attempts, 2);
    assert_eq!(queue.dead_letter_size().await.unwrap(), 0);

    // The attempt past the budget is terminal.
    let dead = queue.requeue(retry_two).await.unwrap();
    assert!(dead.is_none());
    assert_eq!(queue.dead_letter_size().await.unwrap(), 1);
    assert_eq!(queue.size().await.unwrap(), 2);

    assert_eq!(metrics.counter(keys::JOB_RETRIED), 2);
    assert_eq!(metrics.counter(keys::JOB_DEAD_LETTER), 1);
}

#[tokio::test]
async fn test_requeued_job_reenters_priority_order() {
    let metrics = Arc::new(Metrics::default());
    let queue = MemoryQueue::new(metrics, 3);

    let high = queue.enqueue(playback_job("g1", Priority::High)).await.unwrap();
    queue.enqueue(playback_job("g2", Priority::Low)).await.unwrap();

    let first = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(first.id, high.id);

    // A failed high-priority job still beats the waiting low one.
    let requeued = queue.requeue(first).await.unwrap().unwrap();
    let next = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(next.id, requeued.id);
    assert_eq!(next.attempts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_never_duplicates_a_job() {
    let metrics = Arc::new(Metrics::default());
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new(metrics, 3));

    let total = 50;
    for index in 0..total {
        queue
            .enqueue(playback_job(&format!("g{index}"), Priority::Normal))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(job) = queue.dequeue().await.unwrap() {
                seen.push(job.id);
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    let mut count = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            count += 1;
            assert!(all.insert(id), "job dequeued twice");
        }
    }

    assert_eq!(count, total);
    assert_eq!(queue.size().await.unwrap(), 0);
}
