//! Workflow behavior against the in-memory backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rfidgate_core::{
    Notifier, NotifyError, ToggleWorkflow, WorkflowError, NO_TAG_MESSAGE,
};
use rfidgate_storage::{
    GateStorage, LogEntryRecord, MemorySnapshot, MemoryStorage, NewLogEntry, StorageError,
    TagRecord, TagStatus,
};

// ── Test notifiers ────────────────────────────────────────────────────

/// Records every published status.
#[derive(Default)]
struct RecordingNotifier {
    published: Mutex<Vec<TagStatus>>,
}

impl RecordingNotifier {
    fn published(&self) -> Vec<TagStatus> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, status: TagStatus) -> Result<(), NotifyError> {
        self.published.lock().unwrap().push(status);
        Ok(())
    }
}

/// Always fails.
struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn publish(&self, _status: TagStatus) -> Result<(), NotifyError> {
        Err(NotifyError::Client("broker unreachable".to_string()))
    }
}

/// Never completes.
struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    async fn publish(&self, _status: TagStatus) -> Result<(), NotifyError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ── Test storage ──────────────────────────────────────────────────────

/// Delegates to MemoryStorage but can fail log appends or all access.
#[derive(Clone, Default)]
struct FaultyStorage {
    inner: MemoryStorage,
    fail_append: Arc<AtomicBool>,
    fail_abort: Arc<AtomicBool>,
    touched: Arc<AtomicBool>,
}

impl FaultyStorage {
    fn with_tags(tags: &[(&str, TagStatus)]) -> Self {
        Self {
            inner: MemoryStorage::with_tags(tags.iter().map(|(id, s)| (id.to_string(), *s))),
            ..Self::default()
        }
    }
}

#[async_trait]
impl GateStorage for FaultyStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.touched.store(true, Ordering::SeqCst);
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.abort_snapshot(snapshot).await?;
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("rollback interrupted".to_string()));
        }
        Ok(())
    }

    async fn register_tag(
        &self,
        snapshot: &mut MemorySnapshot,
        tag_id: &str,
        status: TagStatus,
    ) -> Result<(), StorageError> {
        self.inner.register_tag(snapshot, tag_id, status).await
    }

    async fn lookup_status_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        tag_id: &str,
    ) -> Result<Option<TagStatus>, StorageError> {
        self.inner.lookup_status_for_update(snapshot, tag_id).await
    }

    async fn update_status(
        &self,
        snapshot: &mut MemorySnapshot,
        tag_id: &str,
        expected: Option<TagStatus>,
        new_status: TagStatus,
    ) -> Result<u64, StorageError> {
        self.inner
            .update_status(snapshot, tag_id, expected, new_status)
            .await
    }

    async fn append_log(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: NewLogEntry,
    ) -> Result<LogEntryRecord, StorageError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk full".to_string()));
        }
        self.inner.append_log(snapshot, entry).await
    }

    async fn get_tag(&self, tag_id: &str) -> Result<Option<TagRecord>, StorageError> {
        self.touched.store(true, Ordering::SeqCst);
        self.inner.get_tag(tag_id).await
    }

    async fn list_tags(&self) -> Result<Vec<TagRecord>, StorageError> {
        self.inner.list_tags().await
    }

    async fn list_recent_logs(&self, limit: usize) -> Result<Vec<LogEntryRecord>, StorageError> {
        self.inner.list_recent_logs(limit).await
    }
}

// ── Helpers ───────────────────────────────────────────────────────────

fn workflow_with(
    tags: &[(&str, TagStatus)],
) -> (ToggleWorkflow<MemoryStorage>, Arc<RecordingNotifier>) {
    let storage = MemoryStorage::with_tags(tags.iter().map(|(id, s)| (id.to_string(), *s)));
    let notifier = Arc::new(RecordingNotifier::default());
    let workflow = ToggleWorkflow::new(Arc::new(storage), notifier.clone());
    (workflow, notifier)
}

async fn status_of<S: GateStorage>(workflow: &ToggleWorkflow<S>, tag_id: &str) -> Option<TagStatus> {
    workflow
        .storage()
        .get_tag(tag_id)
        .await
        .unwrap()
        .map(|t| t.status)
}

// ── Scan ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn scan_registered_absent_tag_checks_it_in() {
    let (workflow, notifier) = workflow_with(&[("A1", TagStatus::Absent)]);

    let result = workflow.process_scan("A1").await.unwrap();

    assert!(result.found);
    assert_eq!(result.tag_id, "A1");
    assert_eq!(result.previous_status, Some(TagStatus::Absent));
    assert_eq!(result.new_status, TagStatus::Present);
    assert!(result.notified);
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Present));

    let logs = workflow.recent_logs(0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tag_id, "A1");
    assert_eq!(logs[0].status, TagStatus::Present);
    assert_eq!(logs[0].timestamp, result.timestamp);
    assert_eq!(notifier.published(), vec![TagStatus::Present]);
}

#[tokio::test]
async fn scan_unknown_tag_logs_absent_without_registering() {
    let (workflow, notifier) = workflow_with(&[]);

    let result = workflow.process_scan("Z9").await.unwrap();

    assert!(!result.found);
    assert_eq!(result.previous_status, None);
    assert_eq!(result.new_status, TagStatus::Absent);
    assert_eq!(status_of(&workflow, "Z9").await, None);

    let logs = workflow.recent_logs(0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tag_id, "Z9");
    assert_eq!(logs[0].status, TagStatus::Absent);
    assert_eq!(notifier.published(), vec![TagStatus::Absent]);
}

#[tokio::test]
async fn repeated_scans_alternate_status() {
    let (workflow, notifier) = workflow_with(&[("A1", TagStatus::Present)]);

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(workflow.process_scan("A1").await.unwrap().new_status);
    }

    assert_eq!(
        seen,
        vec![
            TagStatus::Absent,
            TagStatus::Present,
            TagStatus::Absent,
            TagStatus::Present
        ]
    );
    assert_eq!(workflow.recent_logs(0).await.unwrap().len(), 4);
    assert_eq!(notifier.published(), seen);
}

#[tokio::test]
async fn repeated_unknown_scans_stay_absent() {
    let (workflow, _notifier) = workflow_with(&[]);

    for _ in 0..3 {
        let result = workflow.process_scan("Z9").await.unwrap();
        assert!(!result.found);
        assert_eq!(result.new_status, TagStatus::Absent);
    }
    let logs = workflow.recent_logs(0).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.status == TagStatus::Absent));
}

#[tokio::test]
async fn scan_trims_tag_id() {
    let (workflow, _notifier) = workflow_with(&[("A1", TagStatus::Absent)]);

    let result = workflow.process_scan("  A1\n").await.unwrap();

    assert!(result.found);
    assert_eq!(result.tag_id, "A1");
    assert_eq!(workflow.recent_logs(0).await.unwrap()[0].tag_id, "A1");
}

#[tokio::test]
async fn blank_scan_never_touches_storage_or_notifier() {
    let storage = FaultyStorage::default();
    let touched = storage.touched.clone();
    let notifier = Arc::new(RecordingNotifier::default());
    let workflow = ToggleWorkflow::new(Arc::new(storage), notifier.clone());

    for raw in ["", "   ", "\t"] {
        match workflow.process_scan(raw).await {
            Err(WorkflowError::Validation(msg)) => assert_eq!(msg, NO_TAG_MESSAGE),
            other => panic!("expected validation error, got {other:?}"),
        }
        match workflow.set_status(raw, TagStatus::Present).await {
            Err(WorkflowError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    assert!(!touched.load(Ordering::SeqCst), "storage was accessed");
    assert!(notifier.published().is_empty());
}

#[tokio::test]
async fn failed_log_append_rolls_back_toggle() {
    let storage = FaultyStorage::with_tags(&[("A1", TagStatus::Absent)]);
    storage.fail_append.store(true, Ordering::SeqCst);
    let notifier = Arc::new(RecordingNotifier::default());
    let workflow = ToggleWorkflow::new(Arc::new(storage), notifier.clone());

    let err = workflow.process_scan("A1").await.unwrap_err();

    assert!(matches!(err, WorkflowError::Store(StorageError::Backend(_))));
    assert!(err.to_string().contains("disk full"), "{err}");
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Absent));
    assert!(workflow.recent_logs(0).await.unwrap().is_empty());
    assert!(notifier.published().is_empty(), "no publish after failure");
}

#[tokio::test]
async fn failed_rollback_keeps_original_error() {
    let storage = FaultyStorage::with_tags(&[("A1", TagStatus::Absent)]);
    storage.fail_append.store(true, Ordering::SeqCst);
    storage.fail_abort.store(true, Ordering::SeqCst);
    let workflow = ToggleWorkflow::new(Arc::new(storage), Arc::new(RecordingNotifier::default()));

    let err = workflow.process_scan("A1").await.unwrap_err();
    assert!(err.to_string().contains("disk full"), "{err}");

    let err = workflow.register("A1", TagStatus::Present).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Store(StorageError::AlreadyRegistered { .. })
    ));

    // The writer lock was released despite the rollback error.
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Absent));
    assert!(workflow.recent_logs(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn notifier_failure_does_not_change_result() {
    let storage = MemoryStorage::with_tags([("A1", TagStatus::Absent)]);
    let workflow = ToggleWorkflow::new(Arc::new(storage), Arc::new(FailingNotifier));

    let result = workflow.process_scan("A1").await.unwrap();

    assert!(result.found);
    assert_eq!(result.new_status, TagStatus::Present);
    assert!(!result.notified);
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Present));
}

#[tokio::test]
async fn hanging_notifier_is_bounded_by_timeout() {
    let storage = MemoryStorage::with_tags([("A1", TagStatus::Absent)]);
    let workflow = ToggleWorkflow::new(Arc::new(storage), Arc::new(HangingNotifier))
        .with_notify_timeout(Duration::from_millis(50));

    let result = tokio::time::timeout(Duration::from_secs(2), workflow.process_scan("A1"))
        .await
        .expect("scan must not wait on a hanging notifier");

    let result = result.unwrap();
    assert_eq!(result.new_status, TagStatus::Present);
    assert!(!result.notified);
    assert_eq!(workflow.recent_logs(0).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_of_one_tag_serialize() {
    const SCANS: usize = 9;
    let (workflow, notifier) = workflow_with(&[("A1", TagStatus::Absent)]);
    let workflow = Arc::new(workflow);

    let mut handles = Vec::new();
    for _ in 0..SCANS {
        let workflow = workflow.clone();
        handles.push(tokio::spawn(async move {
            workflow.process_scan("A1").await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // An odd number of toggles from absent ends present; none lost.
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Present));
    let logs = workflow.recent_logs(0).await.unwrap();
    assert_eq!(logs.len(), SCANS);
    // Log order alternates because every scan saw the previous one's write.
    for pair in logs.windows(2) {
        assert_ne!(pair[0].status, pair[1].status, "lost toggle in {logs:?}");
    }
    assert_eq!(notifier.published().len(), SCANS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_of_different_tags_all_toggle() {
    let ids: Vec<String> = (0..8).map(|i| format!("T{i}")).collect();
    let seeds: Vec<(&str, TagStatus)> = ids.iter().map(|id| (id.as_str(), TagStatus::Absent)).collect();
    let (workflow, _notifier) = workflow_with(&seeds);
    let workflow = Arc::new(workflow);

    let mut handles = Vec::new();
    for id in ids.clone() {
        let workflow = workflow.clone();
        handles.push(tokio::spawn(async move { workflow.process_scan(&id).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().found);
    }

    for id in &ids {
        assert_eq!(status_of(&workflow, id).await, Some(TagStatus::Present));
    }
}

// ── Direct set ────────────────────────────────────────────────────────

#[tokio::test]
async fn set_status_writes_logs_and_publishes() {
    let (workflow, notifier) = workflow_with(&[("A1", TagStatus::Present)]);

    let outcome = workflow.set_status("A1", TagStatus::Absent).await.unwrap();

    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(outcome.new_status, TagStatus::Absent);
    assert!(outcome.notified);
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Absent));
    let logs = workflow.recent_logs(0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, TagStatus::Absent);
    assert_eq!(notifier.published(), vec![TagStatus::Absent]);
}

#[tokio::test]
async fn set_status_same_value_still_logs() {
    let (workflow, _notifier) = workflow_with(&[("A1", TagStatus::Present)]);

    let outcome = workflow.set_status("A1", TagStatus::Present).await.unwrap();

    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(workflow.recent_logs(0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn set_status_on_unknown_tag_logs_without_registry_row() {
    let (workflow, notifier) = workflow_with(&[]);

    let outcome = workflow.set_status("Z9", TagStatus::Present).await.unwrap();

    assert_eq!(outcome.rows_affected, 0);
    assert_eq!(status_of(&workflow, "Z9").await, None);
    let logs = workflow.recent_logs(0).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tag_id, "Z9");
    assert_eq!(logs[0].status, TagStatus::Present);
    assert_eq!(notifier.published(), vec![TagStatus::Present]);
}

#[tokio::test]
async fn set_status_rolls_back_on_log_failure() {
    let storage = FaultyStorage::with_tags(&[("A1", TagStatus::Absent)]);
    storage.fail_append.store(true, Ordering::SeqCst);
    let workflow = ToggleWorkflow::new(Arc::new(storage), Arc::new(RecordingNotifier::default()));

    assert!(workflow.set_status("A1", TagStatus::Present).await.is_err());
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Absent));
}

// ── Registration and queries ──────────────────────────────────────────

#[tokio::test]
async fn register_then_scan() {
    let (workflow, notifier) = workflow_with(&[]);

    let record = workflow.register(" C3 ", TagStatus::Absent).await.unwrap();
    assert_eq!(record.tag_id, "C3");
    assert!(notifier.published().is_empty(), "registration publishes nothing");
    assert!(workflow.recent_logs(0).await.unwrap().is_empty());

    let result = workflow.process_scan("C3").await.unwrap();
    assert!(result.found);
    assert_eq!(result.new_status, TagStatus::Present);
}

#[tokio::test]
async fn register_twice_is_a_store_error() {
    let (workflow, _notifier) = workflow_with(&[("A1", TagStatus::Absent)]);

    let err = workflow.register("A1", TagStatus::Present).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Store(StorageError::AlreadyRegistered { .. })
    ));
    assert_eq!(status_of(&workflow, "A1").await, Some(TagStatus::Absent));
}

#[tokio::test]
async fn recent_logs_caps_and_orders_newest_first() {
    let (workflow, _notifier) = workflow_with(&[]);
    for i in 0..60 {
        workflow.process_scan(&format!("T{i}")).await.unwrap();
    }

    let logs = workflow.recent_logs(50).await.unwrap();
    assert_eq!(logs.len(), 50);
    assert_eq!(logs[0].tag_id, "T59");
    assert_eq!(logs[49].tag_id, "T10");
}

#[tokio::test]
async fn tags_lists_registry() {
    let (workflow, _notifier) =
        workflow_with(&[("B2", TagStatus::Present), ("A1", TagStatus::Absent)]);

    let tags = workflow.tags().await.unwrap();
    let ids: Vec<&str> = tags.iter().map(|t| t.tag_id.as_str()).collect();
    assert_eq!(ids, ["A1", "B2"]);
}

#[tokio::test]
async fn scan_result_serializes_statuses_as_integers() {
    let (workflow, _notifier) = workflow_with(&[("A1", TagStatus::Absent)]);
    let result = workflow.process_scan("A1").await.unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["previous_status"], 0);
    assert_eq!(json["new_status"], 1);
    assert_eq!(json["found"], true);
}
