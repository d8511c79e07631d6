use std::future::Future;

use super::{committed_status, seed_tags, TestResult};
use crate::{GateStorage, StorageError, TagStatus};

pub(super) async fn run_registry_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "registry",
        "register_creates_tag_with_status",
        register_creates_tag_with_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "double_register_returns_already_registered",
        double_register_returns_already_registered(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "double_register_across_snapshots",
        double_register_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "lookup_unknown_tag_is_none",
        lookup_unknown_tag_is_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "lookup_for_update_sees_registered_status",
        lookup_for_update_sees_registered_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "unconditional_update_affects_one_row",
        unconditional_update_affects_one_row(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "update_unknown_tag_affects_zero_rows",
        update_unknown_tag_affects_zero_rows(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "cas_update_with_matching_status_succeeds",
        cas_update_with_matching_status_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "cas_update_with_stale_status_conflicts",
        cas_update_with_stale_status_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "registry",
        "list_tags_ordered_by_id",
        list_tags_ordered_by_id(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn register_creates_tag_with_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent), ("B2", TagStatus::Present)]).await?;

    let a1 = committed_status(&s, "A1").await?;
    let b2 = committed_status(&s, "B2").await?;
    if a1 != TagStatus::Absent || b2 != TagStatus::Present {
        return Err(format!("expected A1=0 B2=1, got A1={a1} B2={b2}"));
    }
    Ok(())
}

async fn double_register_returns_already_registered<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let second = s.register_tag(&mut snap, "A1", TagStatus::Present).await;
    let _ = s.abort_snapshot(snap).await;

    match second {
        Err(StorageError::AlreadyRegistered { tag_id }) if tag_id == "A1" => Ok(()),
        Err(StorageError::AlreadyRegistered { tag_id }) => {
            Err(format!("AlreadyRegistered carried wrong tag id '{tag_id}'"))
        }
        Err(e) => Err(format!("expected AlreadyRegistered, got {e}")),
        Ok(()) => Err("second registration succeeded".to_string()),
    }
}

async fn double_register_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let second = s.register_tag(&mut snap, "A1", TagStatus::Absent).await;
    let _ = s.abort_snapshot(snap).await;

    match second {
        Err(StorageError::AlreadyRegistered { .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyRegistered, got {e}")),
        Ok(()) => Err("re-registration in new snapshot succeeded".to_string()),
    }
}

async fn lookup_unknown_tag_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    if s.get_tag("Z9").await.map_err(|e| e.to_string())?.is_some() {
        return Err("get_tag returned a record for an unknown tag".to_string());
    }

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let status = s.lookup_status_for_update(&mut snap, "Z9").await;
    let _ = s.abort_snapshot(snap).await;
    match status {
        Ok(None) => Ok(()),
        Ok(Some(st)) => Err(format!("expected None, got {st}")),
        Err(e) => Err(e.to_string()),
    }
}

async fn lookup_for_update_sees_registered_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Present)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let status = s.lookup_status_for_update(&mut snap, "A1").await;
    let _ = s.abort_snapshot(snap).await;
    match status {
        Ok(Some(TagStatus::Present)) => Ok(()),
        Ok(other) => Err(format!("expected Some(1), got {other:?}")),
        Err(e) => Err(e.to_string()),
    }
}

async fn unconditional_update_affects_one_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rows = s
        .update_status(&mut snap, "A1", None, TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if rows != 1 {
        return Err(format!("expected 1 row affected, got {rows}"));
    }
    let status = committed_status(&s, "A1").await?;
    if status != TagStatus::Present {
        return Err(format!("expected status 1 after update, got {status}"));
    }
    Ok(())
}

async fn update_unknown_tag_affects_zero_rows<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let plain = s
        .update_status(&mut snap, "Z9", None, TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;
    let cas = s
        .update_status(&mut snap, "Z9", Some(TagStatus::Absent), TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if plain != 0 || cas != 0 {
        return Err(format!("expected 0 rows for unknown tag, got {plain} and {cas}"));
    }
    if s.get_tag("Z9").await.map_err(|e| e.to_string())?.is_some() {
        return Err("update created a registry row".to_string());
    }
    Ok(())
}

async fn cas_update_with_matching_status_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Absent)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let rows = s
        .update_status(&mut snap, "A1", Some(TagStatus::Absent), TagStatus::Present)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if rows != 1 {
        return Err(format!("expected 1 row affected, got {rows}"));
    }
    Ok(())
}

async fn cas_update_with_stale_status_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(&s, &[("A1", TagStatus::Present)]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_status(&mut snap, "A1", Some(TagStatus::Absent), TagStatus::Present)
        .await;
    let _ = s.abort_snapshot(snap).await;

    match result {
        Err(StorageError::ConcurrentConflict { tag_id }) if tag_id == "A1" => {}
        Err(e) => return Err(format!("expected ConcurrentConflict, got {e}")),
        Ok(rows) => return Err(format!("stale CAS update succeeded with {rows} rows")),
    }
    let status = committed_status(&s, "A1").await?;
    if status != TagStatus::Present {
        return Err(format!("status changed despite conflict: {status}"));
    }
    Ok(())
}

async fn list_tags_ordered_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_tags(
        &s,
        &[
            ("C3", TagStatus::Absent),
            ("A1", TagStatus::Present),
            ("B2", TagStatus::Absent),
        ],
    )
    .await?;

    let tags = s.list_tags().await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = tags.iter().map(|t| t.tag_id.as_str()).collect();
    if ids != ["A1", "B2", "C3"] {
        return Err(format!("expected [A1, B2, C3], got {ids:?}"));
    }
    Ok(())
}
