#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use xpl_history::db::LocalRepository;
use xpl_history::models::{FixedClock, LocalCalendar, Sample};
use xpl_history::HistoryEngine;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Reference instant of the fixtures: 2024-01-10 08:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()
}

/// `t0()` shifted by `ms` milliseconds.
pub fn at(ms: i64) -> DateTime<Utc> {
    t0() + TimeDelta::milliseconds(ms)
}

/// Repository holding `(offset ms, value)` readings for `device_key`.
pub fn repo_with(device_key: &str, readings: &[(i64, f64)]) -> LocalRepository {
    let repo = LocalRepository::new();
    repo.seed_samples(
        device_key,
        readings.iter().map(|(ms, v)| Sample::new(*v, at(*ms))),
    );
    repo
}

/// Engine over `repo` frozen at `now`, with UTC calendar days.
pub fn engine_at(repo: &LocalRepository, now: DateTime<Utc>) -> HistoryEngine {
    HistoryEngine::new(Arc::new(repo.clone()))
        .with_clock(Arc::new(FixedClock::new(now)))
        .with_calendar(LocalCalendar::utc())
}
