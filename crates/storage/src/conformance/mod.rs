//! Conformance test suite for `GateStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `GateStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Registry**: registration, duplicate detection, lookups, CAS updates
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Log ordering**: append order preserved, newest-first listing, limits
//! - **Concurrency**: exactly one CAS winner per status, independent tags
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use rfidgate_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_sqlite_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod log;
mod registry;
mod snapshot;

use std::fmt;
use std::future::Future;

use crate::record::{NewLogEntry, TagStatus};
use crate::GateStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "registry", "snapshot", "log").
    pub category: String,
    /// Test name (e.g. "register_creates_tag").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: GateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(registry::run_registry_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(log::run_log_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_log_entry(tag_id: &str, status: TagStatus) -> NewLogEntry {
    NewLogEntry {
        timestamp: "2026-01-01 08:00:00".to_string(),
        tag_id: tag_id.to_string(),
        status,
    }
}

/// Register tags in one committed snapshot.
async fn seed_tags<S: GateStorage>(s: &S, tags: &[(&str, TagStatus)]) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    for (tag_id, status) in tags {
        s.register_tag(&mut snap, tag_id, *status)
            .await
            .map_err(|e| format!("register {tag_id}: {e}"))?;
    }
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}

/// Read a committed tag's status, failing if it is not registered.
async fn committed_status<S: GateStorage>(s: &S, tag_id: &str) -> Result<TagStatus, String> {
    s.get_tag(tag_id)
        .await
        .map_err(|e| e.to_string())?
        .map(|t| t.status)
        .ok_or_else(|| format!("tag {tag_id} not found"))
}
