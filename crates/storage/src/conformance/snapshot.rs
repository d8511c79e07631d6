//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{committed_status, make_log_entry, seed_tags, TestResult};
use crate::{GateStorage, TagStatus};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "begin_and_commit_empty_snapshot",
        begin_and_commit_empty_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "begin_and_abort_empty_snapshot",
        begin_and_abort_empty_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_registration_invisible",
        uncommitted_registration_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_log_invisible",
        uncommitted_log_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_update_and_log",
        abort_discards_update_and_log(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "commit_applies_update_and_log_together",
        commit_applies_update_and_log_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_its_own_writes",
        snapshot_reads_its_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));

    results
}

async fn begin_and_commit_empty_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn begin_and_abort_empty_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

async fn uncommitted_registration_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.register_tag(&mut snap, "A1", TagStatus::Absent)
        .await
        .map_err(|e| e.to_string())?;

    let visible = s.get_tag("A1").await.map_err(|e| e.to_string());
    let _ = s.abort_snapshot(snap).await;

    if visible?.is_some() {
        return Err("uncommitted registration visible to get_tag".to_string());
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_status(&mut snap, "A1", None, TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;

    let seen = committed_status(&s, "A1").await;
    let _ = s.abort_snapshot(snap).await;

    let seen = seen?;
    if seen != TagStatus::Absent {
        return Err(format!("uncommitted update visible: status {seen}"));
    }
    Ok(())
}

async fn uncommitted_log_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_log(&mut snap, make_log_entry("A1", TagStatus::Absent))
        .await
        .map_err(|e| e.to_string())?;

    let logs = s.list_recent_logs(0).await.map_err(|e| e.to_string());
    let _ = s.abort_snapshot(snap).await;

    let logs = logs?;
    if !logs.is_empty() {
        return Err(format!("expected no visible logs, got {}", logs.len()));
    }
    Ok(())
}

async fn abort_discards_update_and_log<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_status(&mut snap, "A1", Some(TagStatus::Absent), TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;
    s.append_log(&mut snap, make_log_entry("A1", TagStatus::Present))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let status = committed_status(&s, "A1").await?;
    if status != TagStatus::Absent {
        return Err(format!("aborted update persisted: status {status}"));
    }
    let logs = s.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    if !logs.is_empty() {
        return Err(format!("aborted log persisted: {} entries", logs.len()));
    }
    Ok(())
}

async fn commit_applies_update_and_log_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_status(&mut snap, "A1", Some(TagStatus::Absent), TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;
    let appended = s
        .append_log(&mut snap, make_log_entry("A1", TagStatus::Present))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let status = committed_status(&s, "A1").await?;
    if status != TagStatus::Present {
        return Err(format!("expected status 1 after commit, got {status}"));
    }
    let logs = s.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    if logs != vec![appended] {
        return Err(format!("expected exactly the appended entry, got {logs:?}"));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = async {
        s.register_tag(&mut snap, "A1", TagStatus::Absent)
            .await
            .map_err(|e| e.to_string())?;
        s.update_status(&mut snap, "A1", Some(TagStatus::Absent), TagStatus::Present)
            .await
            .map_err(|e| e.to_string())?;
        s.lookup_status_for_update(&mut snap, "A1")
            .await
            .map_err(|e| e.to_string())
    }
    .await;
    let _ = s.abort_snapshot(snap).await;

    match result? {
        Some(TagStatus::Present) => Ok(()),
        other => Err(format!("expected own write Some(1), got {other:?}")),
    }
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut expected = TagStatus::Absent;
    for _ in 0..3 {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let current = s
            .lookup_status_for_update(&mut snap, "A1")
            .await
            .map_err(|e| e.to_string())?;
        if current != Some(expected) {
            let _ = s.abort_snapshot(snap).await;
            return Err(format!("expected Some({expected}), got {current:?}"));
        }
        s.update_status(&mut snap, "A1", Some(expected), expected.toggled())
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        expected = expected.toggled();
    }
    Ok(())
}
