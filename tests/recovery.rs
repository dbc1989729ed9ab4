//! Recovery Integration Tests
//!
//! Simulates a restart by reopening the stores over logs written by an
//! earlier process, then checks replay and reconciliation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scribe::adapters::{Lazy, ScriptedGenerator, ScriptedSpeech, SpeechToText, TextGenerator};
use scribe::config::PipelineSettings;
use scribe::core::{self, recovery};
use scribe::domain::TaskEventKind;
use scribe::{ResultStore, StatusApi, StoreError, TaskStatus, TaskStore, Worker, WorkerLock};
use tempfile::TempDir;
use tokio_test::assert_ok;
use uuid::Uuid;

struct Leftovers {
    interrupted: Uuid,
    waiting: Uuid,
    orphaned: Uuid,
    finished: Uuid,
}

/// Write the log a crashed process would leave behind
async fn crashed_process(dir: &Path) -> Leftovers {
    let tasks = TaskStore::open(dir.join("tasks.jsonl")).await.unwrap();

    let audio = dir.join("waiting.webm");
    std::fs::write(&audio, vec![1u8; 512]).unwrap();

    let interrupted = Uuid::new_v4();
    tasks.create(interrupted, "alice", "a.webm", &dir.join("a.webm")).await.unwrap();
    tasks.mark_processing(interrupted).await.unwrap();
    tasks.set_progress(interrupted, 45, "formatting part 2/5").await.unwrap();

    let finished = Uuid::new_v4();
    tasks.create(finished, "alice", "f.webm", &dir.join("f.webm")).await.unwrap();
    tasks.mark_processing(finished).await.unwrap();
    tasks.mark_completed(finished, Uuid::new_v4()).await.unwrap();

    let waiting = Uuid::new_v4();
    tasks.create(waiting, "bob", "waiting.webm", &audio).await.unwrap();

    let orphaned = Uuid::new_v4();
    tasks
        .create(orphaned, "bob", "gone.webm", &dir.join("gone.webm"))
        .await
        .unwrap();

    Leftovers {
        interrupted,
        waiting,
        orphaned,
        finished,
    }
}

#[test]
fn test_replay_reproduces_state() {
    tokio_test::block_on(async {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.jsonl");
        let ids = crashed_process(temp.path()).await;

        let first = assert_ok!(TaskStore::open(&path).await);
        let second = assert_ok!(TaskStore::open(&path).await);

        for id in [ids.interrupted, ids.waiting, ids.orphaned, ids.finished] {
            assert_eq!(first.get(id).await, second.get(id).await);
        }

        let interrupted = first.get(ids.interrupted).await.unwrap();
        assert_eq!(interrupted.status, TaskStatus::Processing);
        assert_eq!(interrupted.progress, 45);
        assert_eq!(interrupted.message, "formatting part 2/5");
    });
}

#[test]
fn test_replay_skips_events_that_break_invariants() {
    tokio_test::block_on(async {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tasks.jsonl");
        let ids = crashed_process(temp.path()).await;

        // A second completion for a terminal task, as a concurrent writer might leave
        let stray = serde_json::json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "task_id": ids.finished,
            "event": "failed",
            "error": "late write"
        });
        let mut log = std::fs::read_to_string(&path).unwrap();
        log.push_str(&format!("{}\n", stray));
        std::fs::write(&path, log).unwrap();

        let tasks = assert_ok!(TaskStore::open(&path).await);
        let finished = tasks.get(ids.finished).await.unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
        assert!(finished.error.is_none());
    });
}

#[tokio::test]
async fn test_reconcile_requeues_and_fails_leftovers() {
    let temp = TempDir::new().unwrap();
    let ids = crashed_process(temp.path()).await;

    let lock = WorkerLock::acquire(temp.path().join("worker.lock")).await.unwrap();
    let tasks = Arc::new(TaskStore::open(temp.path().join("tasks.jsonl")).await.unwrap());
    let results = Arc::new(ResultStore::open(temp.path().join("results.jsonl")).await.unwrap());
    let (queue, rx) = core::channel(tasks.clone());

    let report = core::reconcile(&queue, &lock).await.unwrap();
    assert_eq!(report.requeued, vec![ids.waiting, ids.orphaned]);
    assert_eq!(report.failed, vec![ids.interrupted]);

    let interrupted = tasks.get(ids.interrupted).await.unwrap();
    assert_eq!(interrupted.status, TaskStatus::Failed);
    assert_eq!(interrupted.progress, 0);
    assert_eq!(interrupted.error.as_deref(), Some(recovery::INTERRUPTED));

    // Missing audio is not judged here; the record waits for the worker
    assert_eq!(tasks.get(ids.orphaned).await.unwrap().status, TaskStatus::Queued);
    assert_eq!(tasks.get(ids.finished).await.unwrap().status, TaskStatus::Completed);

    // Requeued tasks run once a worker starts
    let settings = PipelineSettings {
        poll_interval_ms: 20,
        ..PipelineSettings::default()
    };
    let worker = Worker::new(
        tasks.clone(),
        results.clone(),
        rx,
        Lazy::ready("speech", Box::new(ScriptedSpeech::from_texts(&["halo"])) as Box<dyn SpeechToText>),
        Lazy::ready("generator", Box::new(ScriptedGenerator::new()) as Box<dyn TextGenerator>),
        settings,
    )
    .with_lock(lock)
    .spawn();

    let status = StatusApi::new(tasks.clone(), results);
    let snapshots = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let waiting = status.get_status(ids.waiting).await.unwrap();
            let orphaned = status.get_status(ids.orphaned).await.unwrap();
            if waiting.status.is_terminal() && orphaned.status.is_terminal() {
                return (waiting, orphaned);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (waiting, orphaned) = snapshots;
    assert_eq!(waiting.status, TaskStatus::Completed);
    assert_eq!(waiting.result.unwrap().owner, "bob");

    assert_eq!(orphaned.status, TaskStatus::Failed);
    assert!(orphaned
        .error
        .as_deref()
        .unwrap()
        .starts_with("invalid input audio"));

    let history = tasks.history(ids.orphaned).await.unwrap();
    assert!(history.iter().any(|e| matches!(e.kind, TaskEventKind::Started)));

    worker.shutdown().await;

    // A second pass finds nothing left to do
    let lock = WorkerLock::acquire(temp.path().join("worker.lock")).await.unwrap();
    let (queue, _rx) = core::channel(tasks);
    assert!(core::reconcile(&queue, &lock).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_worker_cannot_reconcile_a_live_store() {
    let temp = TempDir::new().unwrap();
    let lock_path = temp.path().join("worker.lock");
    let tasks_path = temp.path().join("tasks.jsonl");

    // Worker A owns the store and is midway through a task
    let lock_a = WorkerLock::acquire(&lock_path).await.unwrap();
    let tasks_a = TaskStore::open(&tasks_path).await.unwrap();
    let id = Uuid::new_v4();
    tasks_a
        .create(id, "alice", "a.webm", &temp.path().join("a.webm"))
        .await
        .unwrap();
    tasks_a.mark_processing(id).await.unwrap();

    // A second handle on the same path sees the task as abandoned...
    let tasks_b = TaskStore::open(&tasks_path).await.unwrap();
    assert_eq!(tasks_b.get(id).await.unwrap().status, TaskStatus::Processing);

    // ...but cannot claim the store, so it never reconciles
    let err = WorkerLock::acquire(&lock_path).await.unwrap_err();
    assert!(matches!(err, StoreError::Locked(ref p) if p == &lock_path));

    let result_id = Uuid::new_v4();
    tasks_a.mark_completed(id, result_id).await.unwrap();
    drop(lock_a);

    let replayed = TaskStore::open(&tasks_path).await.unwrap();
    let task = replayed.get(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result_id, Some(result_id));
    assert!(task.error.is_none());

    // Once A is gone the store can be claimed again
    assert_ok!(WorkerLock::acquire(&lock_path).await);
}
