//! Redis/Queue integration tests.

use std::time::Duration;

/// Test Redis connection and basic operations.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    dotenvy::dotenv().ok();

    let queue = adgen_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    // Test queue length (should not error)
    let len = queue.len().await.expect("Failed to get queue length");
    println!("Queue length: {}", len);
}

/// Test job enqueue and dequeue cycle.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_enqueue_dequeue() {
    use adgen_models::{JobId, QueueJob};

    dotenvy::dotenv().ok();

    let queue = adgen_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    // Create a test job
    let job = QueueJob::GenerateSong {
        job_id: JobId::new(),
        session_id: "song_20250101_120000".to_string(),
        prompt: "test track".to_string(),
        make_instrumental: false,
    };
    let job_id = job.job_id().clone();

    // Enqueue
    let entry_id = queue
        .enqueue(&job)
        .await
        .expect("Failed to enqueue")
        .expect("Job was unexpectedly deduplicated");
    println!("Enqueued job {} with entry ID {}", job_id, entry_id);

    // Consume
    let consumed = queue
        .dequeue("test-consumer")
        .await
        .expect("Failed to dequeue")
        .expect("No job delivered");

    let (consumed_entry_id, consumed_job) = consumed;
    assert_eq!(consumed_job.job_id(), &job_id);

    // Acknowledge
    queue.ack(&consumed_entry_id).await.expect("Failed to ack");
    println!("Job {} acknowledged", job_id);
}

/// Test enqueue dedup: resubmitting identical training work is dropped.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_dedup() {
    use adgen_models::{JobId, QueueJob};

    dotenvy::dotenv().ok();

    let queue = adgen_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let make = || QueueJob::TrainLora {
        job_id: JobId::new(),
        session_id: "train_20250101_120000".to_string(),
        archive_path: "train_20250101_120000/dedup_test.zip".to_string(),
        trigger_word: "DEDUPTEST".to_string(),
        steps: 1000,
    };

    let first = queue.enqueue(&make()).await.expect("Failed to enqueue");
    assert!(first.is_some());

    let second = queue.enqueue(&make()).await.expect("Failed to enqueue");
    assert!(second.is_none(), "duplicate submission was not dropped");

    // Clean up so reruns start fresh
    queue.clear_dedup(&make()).await.ok();
}

/// Test dead letter functionality.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dead_letter() {
    use adgen_models::{JobId, QueueJob};

    dotenvy::dotenv().ok();

    let queue = adgen_queue::JobQueue::from_env().expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");

    let job = QueueJob::GenerateSong {
        job_id: JobId::new(),
        session_id: "song_20250101_120000".to_string(),
        prompt: "dead letter test".to_string(),
        make_instrumental: false,
    };

    queue
        .enqueue(&job)
        .await
        .expect("Failed to enqueue")
        .expect("Job was unexpectedly deduplicated");

    let (entry_id, consumed) = queue
        .dequeue("test-dead-consumer")
        .await
        .expect("Failed to dequeue")
        .expect("No job delivered");

    queue
        .dead_letter(&entry_id, &consumed, "Test error")
        .await
        .expect("Failed to dead letter");

    let dead_len = queue.dead_len().await.expect("Failed to get dead length");
    assert!(dead_len > 0);
    println!("Dead letter length: {}", dead_len);
}

/// Test progress channel pub/sub.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_progress_channel() {
    use adgen_models::JobId;
    use futures_util::StreamExt;

    dotenvy::dotenv().ok();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let progress =
        adgen_queue::ProgressChannel::new(&redis_url).expect("Failed to create progress channel");

    let job_id = JobId::new();

    // Subscribe in a separate task
    let progress_clone = progress.clone();
    let job_id_clone = job_id.clone();
    let subscriber = tokio::spawn(async move {
        let mut stream = progress_clone
            .subscribe(&job_id_clone)
            .await
            .expect("Failed to subscribe");
        let mut messages = Vec::new();

        // Collect messages with timeout
        let timeout = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = stream.next().await {
                messages.push(event);
                if messages.len() >= 2 {
                    break;
                }
            }
        });

        let _ = timeout.await;
        messages
    });

    // Give subscriber time to connect
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Publish some events
    progress.log(&job_id, "Test message 1").await.ok();
    progress.progress(&job_id, 50).await.ok();

    // Wait for subscriber
    let messages = subscriber.await.expect("Subscriber task failed");
    println!("Received {} messages", messages.len());
}
