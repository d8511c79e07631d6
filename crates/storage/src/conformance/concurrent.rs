use std::future::Future;
use std::sync::Arc;

use super::{committed_status, make_log_entry, seed_tags, TestResult};
use crate::{GateStorage, StorageError, TagStatus};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_cas_updates_exactly_one_wins",
        concurrent_cas_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_register_exactly_one_wins",
        concurrent_register_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_tags_all_succeed",
        concurrent_updates_different_tags_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_appends_all_persist",
        concurrent_appends_all_persist(factory).await,
    ));

    results
}

// ── Concurrent CAS update: exactly one wins ─────────────────────────────────

/// N tasks each open a snapshot and try to flip the same tag from absent to
/// present. Exactly one commit succeeds; the rest must get ConcurrentConflict.
async fn concurrent_cas_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_tags(storage.as_ref(), &[("A1", TagStatus::Absent)]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = s
                .update_status(&mut snap, "A1", Some(TagStatus::Absent), TagStatus::Present)
                .await;
            match result {
                Ok(_rows) => {
                    s.commit_snapshot(snap).await?;
                    Ok(true) // won the race
                }
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false) // lost the race
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    let status = committed_status(storage.as_ref(), "A1").await?;
    if status != TagStatus::Present {
        return Err(format!("expected final status 1, got {status}"));
    }

    Ok(())
}

// ── Concurrent registration: exactly one wins ───────────────────────────────

async fn concurrent_register_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s.register_tag(&mut snap, "A1", TagStatus::Absent).await {
                Ok(()) => {
                    s.commit_snapshot(snap).await?;
                    Ok(true)
                }
                Err(StorageError::AlreadyRegistered { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent updates to different tags: all succeed ───────────────────────

/// N tasks each toggle a different tag. No false conflicts when there is no
/// contention on a row.
async fn concurrent_updates_different_tags_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let ids: Vec<String> = (0..N).map(|i| format!("T{i}")).collect();
    let seeds: Vec<(&str, TagStatus)> = ids.iter().map(|id| (id.as_str(), TagStatus::Absent)).collect();
    seed_tags(storage.as_ref(), &seeds).await?;

    let mut handles = Vec::new();
    for id in ids.clone() {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let current = s.lookup_status_for_update(&mut snap, &id).await?;
            let current = current.unwrap_or_default();
            s.update_status(&mut snap, &id, Some(current), current.toggled())
                .await?;
            s.append_log(&mut snap, make_log_entry(&id, current.toggled()))
                .await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    for id in &ids {
        let status = committed_status(storage.as_ref(), id).await?;
        if status != TagStatus::Present {
            return Err(format!("tag {id} expected status 1, got {status}"));
        }
    }
    let logs = storage.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    if logs.len() != N {
        return Err(format!("expected {N} log entries, got {}", logs.len()));
    }
    Ok(())
}

// ── Concurrent appends: nothing lost ────────────────────────────────────────

async fn concurrent_appends_all_persist<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let rec = s
                .append_log(&mut snap, make_log_entry(&format!("T{i}"), TagStatus::Absent))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<_, StorageError>(rec.id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(
            handle
                .await
                .map_err(|e| format!("task panic: {e}"))?
                .map_err(|e| format!("storage error: {e}"))?,
        );
    }
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != N {
        return Err(format!("expected {N} distinct ids, got {}", ids.len()));
    }

    let logs = storage.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    if logs.len() != N {
        return Err(format!("expected {N} log entries, got {}", logs.len()));
    }
    Ok(())
}
