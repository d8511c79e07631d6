//! Event log conformance tests: append order and newest-first listing.

use std::future::Future;

use super::{make_log_entry, TestResult};
use crate::{GateStorage, TagStatus};

pub(super) async fn run_log_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "log",
        "append_returns_increasing_ids",
        append_returns_increasing_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "list_recent_is_newest_first",
        list_recent_is_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "list_recent_respects_limit",
        list_recent_respects_limit(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "list_recent_zero_limit_returns_all",
        list_recent_zero_limit_returns_all(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "unregistered_tags_can_be_logged",
        unregistered_tags_can_be_logged(factory).await,
    ));
    results.push(TestResult::from_result(
        "log",
        "log_fields_round_trip",
        log_fields_round_trip(factory).await,
    ));

    results
}

/// Append `count` entries, one committed snapshot each, tagged T0..T{count-1}.
async fn append_many<S: GateStorage>(s: &S, count: usize) -> Result<(), String> {
    for i in 0..count {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.append_log(&mut snap, make_log_entry(&format!("T{i}"), TagStatus::Absent))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn append_returns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let first = s
        .append_log(&mut snap, make_log_entry("A1", TagStatus::Present))
        .await
        .map_err(|e| e.to_string())?;
    let second = s
        .append_log(&mut snap, make_log_entry("A1", TagStatus::Absent))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if second.id <= first.id {
        return Err(format!(
            "ids not increasing: first {} second {}",
            first.id, second.id
        ));
    }
    Ok(())
}

async fn list_recent_is_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_many(&s, 5).await?;

    let logs = s.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    let tags: Vec<&str> = logs.iter().map(|l| l.tag_id.as_str()).collect();
    if tags != ["T4", "T3", "T2", "T1", "T0"] {
        return Err(format!("expected newest first, got {tags:?}"));
    }
    Ok(())
}

async fn list_recent_respects_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_many(&s, 60).await?;

    let logs = s.list_recent_logs(50).await.map_err(|e| e.to_string())?;
    if logs.len() != 50 {
        return Err(format!("expected 50 entries, got {}", logs.len()));
    }
    let newest = logs.first().map(|l| l.tag_id.as_str());
    let oldest = logs.last().map(|l| l.tag_id.as_str());
    if newest != Some("T59") || oldest != Some("T10") {
        return Err(format!(
            "expected T59..T10, got {newest:?}..{oldest:?}"
        ));
    }
    Ok(())
}

async fn list_recent_zero_limit_returns_all<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_many(&s, 7).await?;

    let logs = s.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    if logs.len() != 7 {
        return Err(format!("expected 7 entries, got {}", logs.len()));
    }
    Ok(())
}

async fn unregistered_tags_can_be_logged<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_many(&s, 1).await?;

    if s.get_tag("T0").await.map_err(|e| e.to_string())?.is_some() {
        return Err("logging created a registry row".to_string());
    }
    let logs = s.list_recent_logs(0).await.map_err(|e| e.to_string())?;
    if logs.len() != 1 {
        return Err(format!("expected 1 entry, got {}", logs.len()));
    }
    Ok(())
}

async fn log_fields_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_log(&mut snap, make_log_entry("A1", TagStatus::Present))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let logs = s.list_recent_logs(1).await.map_err(|e| e.to_string())?;
    let entry = logs.first().ok_or("no entry stored")?;
    if entry.tag_id != "A1"
        || entry.status != TagStatus::Present
        || entry.timestamp != "2026-01-01 08:00:00"
    {
        return Err(format!("stored entry differs: {entry:?}"));
    }
    Ok(())
}
