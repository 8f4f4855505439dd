//! End-to-end orchestration scenarios driven through the facade with
//! scripted mocks.

use std::sync::Arc;
use std::time::Duration;

use docbench_domain::{
    BatchStatus, Error, Event, EventKind, RunId, RunStatus, Topic,
};
use docbench_harness::{EventStream, Harness, HarnessConfig, OverallStatus};
use docbench_infrastructure::Store;
use docbench_testing::{
    sample_answers, sample_suite, MemoryStore, MockModelClient, MockSyntaxChecker,
    RunRequestBuilder, StaticVariantCatalog,
};

fn harness_with(client: MockModelClient) -> (Harness, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let catalog =
        Arc::new(StaticVariantCatalog::new().with_variant("core", "sample documentation"));
    let checker = Arc::new(MockSyntaxChecker::passing());
    let config = HarnessConfig::default().with_backoff(
        Duration::from_millis(1),
        2.0,
        Duration::from_millis(4),
    );
    let harness = Harness::new(
        sample_suite(),
        Arc::new(client),
        store.clone(),
        catalog,
        checker,
        config,
    );
    (harness, store)
}

fn passing_client() -> MockModelClient {
    let answers = sample_answers();
    MockModelClient::new(answers)
}

async fn await_terminal(stream: &mut EventStream) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for a terminal event")
            .expect("stream closed before a terminal event");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

async fn submit_one(harness: &Harness, batch_size: usize) -> (RunId, EventStream) {
    let request = RunRequestBuilder::new("model-x", "core")
        .batch_size(batch_size)
        .build();
    let run_ids = harness.submit(request).await.unwrap();
    assert_eq!(run_ids.len(), 1);
    let run_id = run_ids[0];
    // Cursor 0 replays from the ring, so no startup events are missed.
    let stream = harness.subscribe(&Topic::Run(run_id), Some(0));
    (run_id, stream)
}

#[tokio::test]
async fn happy_path_produces_full_artifact() {
    let (harness, store) = harness_with(passing_client());
    let (run_id, mut stream) = submit_one(&harness, 2).await;

    let events = await_terminal(&mut stream).await;
    let last = events.last().unwrap();
    assert!(matches!(last.kind, EventKind::RunCompleted { .. }));

    // Terminal is the last event on the run topic; nothing follows it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(stream.try_next().is_none());

    let snapshot = harness.run_status(run_id).unwrap();
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.total_batches, 2);
    assert_eq!(snapshot.completed_batches, 2);
    let sizes: Vec<usize> = snapshot.batches.iter().map(|b| b.size).collect();
    assert_eq!(sizes, vec![2, 1]);

    let artifact_id = snapshot.artifact_id.unwrap();
    let artifact = store.read_artifact(&artifact_id).await.unwrap();
    assert_eq!(artifact.responses.len(), 3);
    assert_eq!(artifact.responses["t1"], "A");
    assert_eq!(artifact.responses["t2"], "B C");
    assert_eq!(artifact.responses["t3"], "D");
    assert!(artifact.metadata.missing.is_empty());
}

#[tokio::test]
async fn sequence_numbers_are_monotonic_per_topic() {
    let (harness, _store) = harness_with(passing_client());
    let (_, mut stream) = submit_one(&harness, 1).await;

    let events = await_terminal(&mut stream).await;
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    for window in seqs.windows(2) {
        assert!(window[0] < window[1], "sequence not monotonic: {seqs:?}");
    }
}

#[tokio::test]
async fn retry_convergence_matches_clean_run() {
    let client = passing_client().fail_for(
        "\"t1\"",
        vec![
            Error::Transport("connection reset".into()),
            Error::Transport("connection reset".into()),
        ],
    );
    let (harness, store) = harness_with(client);

    // One batch holds the whole suite, so the scripted failures hit it.
    let (run_id, mut stream) = submit_one(&harness, 45).await;
    let events = await_terminal(&mut stream).await;

    let retries: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::BatchRetry { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);

    let snapshot = harness.run_status(run_id).unwrap();
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.batches[0].retry_count, 2);

    let artifact = store
        .read_artifact(&snapshot.artifact_id.unwrap())
        .await
        .unwrap();
    assert_eq!(artifact.responses["t1"], "A");
    assert!(artifact.metadata.missing.is_empty());
}

#[tokio::test]
async fn retry_exhaustion_completes_with_missing_responses() {
    let client = passing_client().fail_for(
        "\"t1\"",
        vec![Error::Transport("down".into()); 4],
    );
    let (harness, store) = harness_with(client);

    // batch_size 1: the failing batch only holds t1.
    let (run_id, mut stream) = submit_one(&harness, 1).await;
    await_terminal(&mut stream).await;

    let snapshot = harness.run_status(run_id).unwrap();
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.failed_batches, 1);
    assert_eq!(snapshot.batches[0].status, BatchStatus::Failed);
    assert_eq!(snapshot.batches[0].retry_count, 3);

    let artifact_id = snapshot.artifact_id.unwrap();
    let artifact = store.read_artifact(&artifact_id).await.unwrap();
    assert_eq!(artifact.responses["t1"], "");
    assert_eq!(artifact.metadata.missing, vec!["t1"]);

    // The overall percentage is computed over the full suite max:
    // (20 + 30) / 60.
    let result = harness.evaluate(&artifact_id).await.unwrap();
    assert_eq!(result.summary.overall_percentage, 83.33);
    assert_eq!(result.summary.tests_completed, 2);
    assert_eq!(result.summary.tests_total, 3);
}

#[tokio::test]
async fn cancellation_ends_every_run_without_artifacts() {
    // First batch (t1, t2) returns quickly; the t3 batch stalls so the
    // runs are mid-flight when the cancel lands.
    let client = passing_client().delay_for("\"t3\"", Duration::from_millis(500));
    let (harness, store) = harness_with(client);

    let request = RunRequestBuilder::new("model-x", "core")
        .batch_size(2)
        .queue_size(3)
        .build();
    let run_ids = harness.submit(request).await.unwrap();
    assert_eq!(run_ids.len(), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.cancel_all();

    for run_id in &run_ids {
        let mut stream = harness.subscribe(&Topic::Run(*run_id), Some(0));
        let events = await_terminal(&mut stream).await;
        assert_eq!(events.last().unwrap().kind, EventKind::RunCancelled);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(stream.try_next().is_none());

        let snapshot = harness.run_status(*run_id).unwrap();
        assert_eq!(snapshot.status, RunStatus::Cancelled);
        assert!(snapshot.artifact_id.is_none());
    }
    assert_eq!(store.artifact_count(), 0);
}

#[tokio::test]
async fn invalid_configurations_rejected_at_submit() {
    let (harness, _store) = harness_with(passing_client());

    let bad_sizes = RunRequestBuilder::new("model-x", "core")
        .custom_sizes(&[2, 2])
        .build();
    assert!(matches!(
        harness.submit(bad_sizes).await,
        Err(Error::Config(_))
    ));

    let oversum = RunRequestBuilder::new("model-x", "core")
        .custom_sizes(&[2, 2, 2])
        .build();
    assert!(matches!(harness.submit(oversum).await, Err(Error::Config(_))));

    let bad_queue = RunRequestBuilder::new("model-x", "core")
        .queue_size(21)
        .build();
    assert!(matches!(
        harness.submit(bad_queue).await,
        Err(Error::Config(_))
    ));

    let bad_temperature = RunRequestBuilder::new("model-x", "core")
        .temperature(2.5)
        .build();
    assert!(matches!(
        harness.submit(bad_temperature).await,
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn batch_sizing_boundaries() {
    let (harness, _store) = harness_with(passing_client());

    // batch_size 1 yields one batch per test.
    let (run_id, mut stream) = submit_one(&harness, 1).await;
    await_terminal(&mut stream).await;
    assert_eq!(harness.run_status(run_id).unwrap().total_batches, 3);

    // batch_size beyond the suite yields exactly one batch.
    let (run_id, mut stream) = submit_one(&harness, 100).await;
    await_terminal(&mut stream).await;
    assert_eq!(harness.run_status(run_id).unwrap().total_batches, 1);
}

#[tokio::test]
async fn batch_completion_events_arrive_in_completion_order() {
    let client = passing_client()
        .delay_for("\"t1\"", Duration::from_millis(300))
        .delay_for("\"t2\"", Duration::from_millis(50))
        .delay_for("\"t3\"", Duration::from_millis(150));
    let (harness, _store) = harness_with(client);

    let (_, mut stream) = submit_one(&harness, 1).await;
    let events = await_terminal(&mut stream).await;

    let completed: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::BatchCompleted { batch, .. } => Some(*batch),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![2, 3, 1]);
}

#[tokio::test]
async fn rerun_overwrites_failed_batch_responses() {
    // Batch 1 fails non-retryably; the t3 batch stalls long enough for the
    // operator rerun to land while the run is still active.
    let client = passing_client()
        .fail_for("\"t1\"", vec![Error::BadRequest("400".into())])
        .delay_for("\"t3\"", Duration::from_millis(600));
    let (harness, store) = harness_with(client);

    let (run_id, mut stream) = submit_one(&harness, 1).await;

    // Wait for the first batch to fail.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let mut rerun_stream = harness.subscribe(&Topic::BatchRerun(run_id), Some(0));
    harness.rerun_batch(run_id, 1).unwrap();

    await_terminal(&mut stream).await;

    let snapshot = harness.run_status(run_id).unwrap();
    assert_eq!(snapshot.status, RunStatus::Completed);

    let artifact = store
        .read_artifact(&snapshot.artifact_id.unwrap())
        .await
        .unwrap();
    assert_eq!(artifact.responses["t1"], "A");
    assert!(artifact.metadata.missing.is_empty());

    let rerun_event = tokio::time::timeout(Duration::from_secs(5), rerun_stream.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(rerun_event.kind, EventKind::BatchStarted { batch: 1 }));

    // A terminal run refuses further reruns.
    assert!(matches!(
        harness.rerun_batch(run_id, 1),
        Err(Error::BadRequest(_))
    ));
}

#[tokio::test]
async fn store_failure_fails_run_and_skips_evaluation() {
    let (harness, store) = harness_with(passing_client());
    store.fail_artifact_writes();

    let mut global = harness.subscribe(&Topic::Global, Some(0));
    let (run_id, mut stream) = submit_one(&harness, 45).await;
    let events = await_terminal(&mut stream).await;

    let EventKind::RunFailed { error } = &events.last().unwrap().kind else {
        panic!("expected run failure");
    };
    assert!(error.contains("store persistence failed"));

    let snapshot = harness.run_status(run_id).unwrap();
    assert_eq!(snapshot.status, RunStatus::Failed);
    assert!(snapshot.artifact_id.is_none());

    // No evaluation is ever scheduled for a failed run.
    tokio::time::sleep(Duration::from_millis(150)).await;
    while let Some(event) = global.try_next() {
        assert!(!matches!(event.kind, EventKind::EvaluationStarted { .. }));
    }
}

#[tokio::test]
async fn completed_runs_are_evaluated_automatically() {
    let (harness, store) = harness_with(passing_client());

    let mut global = harness.subscribe(&Topic::Global, Some(0));
    let (run_id, mut stream) = submit_one(&harness, 45).await;
    await_terminal(&mut stream).await;

    // global carries run.completed, then the evaluation pair, in order.
    let mut saw_run_completed = false;
    let mut saw_eval_started = false;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), global.next())
            .await
            .expect("timed out waiting for evaluation events")
            .unwrap();
        match event.kind {
            EventKind::RunCompleted { .. } => saw_run_completed = true,
            EventKind::EvaluationStarted { .. } => {
                assert!(saw_run_completed);
                saw_eval_started = true;
            }
            EventKind::EvaluationCompleted {
                overall_percentage, ..
            } => {
                assert!(saw_eval_started);
                assert_eq!(overall_percentage, 100.0);
                break;
            }
            _ => {}
        }
    }

    let artifact_id = harness.run_status(run_id).unwrap().artifact_id.unwrap();
    assert!(store.read_eval_result(&artifact_id).await.unwrap().is_some());

    // Evaluate is idempotent: repeated calls return the cached result.
    let first = harness.evaluate(&artifact_id).await.unwrap();
    let second = harness.evaluate(&artifact_id).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn global_progress_tracks_submit_lifecycle() {
    let client = passing_client().delay_all(Duration::from_millis(200));
    let (harness, _store) = harness_with(client);

    let request = RunRequestBuilder::new("model-x", "core")
        .batch_size(45)
        .queue_size(2)
        .build();
    let run_ids = harness.submit(request).await.unwrap();

    let progress = harness.global_progress();
    assert_eq!(progress.status, OverallStatus::Running);
    assert_eq!(progress.total_runs, 2);
    assert_eq!(progress.total_batches, 2);

    for run_id in &run_ids {
        let mut stream = harness.subscribe(&Topic::Run(*run_id), Some(0));
        await_terminal(&mut stream).await;
    }

    // Give the evaluator time to drain, then the submit is complete.
    for _ in 0..50 {
        if harness.global_progress().status == OverallStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let progress = harness.global_progress();
    assert_eq!(progress.status, OverallStatus::Completed);
    assert_eq!(progress.completed_batches, 2);
    assert_eq!(progress.active_runs, 0);
}

#[tokio::test]
async fn collections_promote_and_compare() {
    let (harness, _store) = harness_with(passing_client());
    let (run_id, mut stream) = submit_one(&harness, 45).await;
    await_terminal(&mut stream).await;

    let artifact_id = harness.run_status(run_id).unwrap().artifact_id.unwrap();
    let collection = harness
        .promote_to_collection(std::slice::from_ref(&artifact_id), "baseline")
        .await
        .unwrap();
    assert_eq!(collection.len(), 1);
    assert!(collection.metadata.is_some());

    // Promoting again is additive, not an error.
    let again = harness
        .promote_to_collection(std::slice::from_ref(&artifact_id), "baseline")
        .await
        .unwrap();
    assert_eq!(again.len(), 1);

    harness
        .promote_to_collection(std::slice::from_ref(&artifact_id), "candidate")
        .await
        .unwrap();
    let comparison = harness.compare("baseline", "candidate").await.unwrap();
    assert_eq!(comparison.left_stats.mean_percentage, 100.0);
    assert_eq!(comparison.right_stats.mean_percentage, 100.0);
    assert_eq!(comparison.left_stats.std_dev, 0.0);

    for delta in comparison.categories.values() {
        assert_eq!(delta.delta, Some(0.0));
    }

    // Invalid collection names are rejected before touching the store.
    assert!(matches!(
        harness.promote_to_collection(&[artifact_id], "bad name!").await,
        Err(Error::Config(_))
    ));
}
