//! End-to-end checks of the engine operations over the in-memory store.

mod support;

use chrono::TimeDelta;
use support::{at, engine_at, repo_with, t0};
use xpl_history::db::repository::DayCacheRepository;
use xpl_history::models::{
    Aggregate, Field, Projection, QueryRange, Sample, SampleValue, Step,
};
use xpl_history::services::SensorMessage;
use xpl_history::EngineError;

const KEY: &str = "boiler@temp";

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn test_full_range_worked_example() {
    let repo = repo_with(KEY, &[(0, 10.0), (1000, 20.0), (2000, 15.0)]);
    let engine = engine_at(&repo, at(3_600_000));
    let range = QueryRange::between(at(0), at(3000));

    let Some(Aggregate::Full(stats)) = engine.get_aggregate(KEY, &range, None).await.unwrap() else {
        panic!("expected full-range statistics");
    };
    assert!(close(stats.average.unwrap(), 15.0));
    assert_eq!(stats.sum, Some(45.0));
    assert_eq!(stats.total_ms, Some(3000));
    assert_eq!(stats.min.unwrap().value, SampleValue::Number(10.0));
    assert_eq!(stats.max.unwrap().timestamp, at(1000));
}

#[tokio::test]
async fn test_bucketed_worked_example() {
    let repo = repo_with(KEY, &[(0, 10.0), (1000, 20.0), (2000, 15.0)]);
    let engine = engine_at(&repo, at(3_600_000));
    let range = QueryRange::between(at(0), at(3000));

    let Some(Aggregate::Stepped(agg)) = engine
        .get_aggregate(KEY, &range, Some(Step::Fixed(1500)))
        .await
        .unwrap()
    else {
        panic!("expected buckets");
    };
    assert_eq!(agg.buckets.len(), 2);
    assert!(close(agg.buckets[0].average.unwrap(), 20_000.0 / 1500.0));
    assert!(close(agg.buckets[1].average.unwrap(), 25_000.0 / 1500.0));
    assert_eq!(agg.buckets[0].count, Some(1));
    assert_eq!(agg.buckets[1].count, Some(2));
}

#[tokio::test]
async fn test_projection_limits_output() {
    let repo = repo_with(KEY, &[(0, 10.0), (1000, 20.0)]);
    let engine = engine_at(&repo, at(3_600_000));
    let range = QueryRange::between(at(0), at(2000))
        .with_projection(Projection::only([Field::Average, Field::Count]));

    let Some(Aggregate::Full(stats)) = engine.get_aggregate(KEY, &range, None).await.unwrap() else {
        panic!("expected full-range statistics");
    };
    assert!(close(stats.average.unwrap(), 15.0));
    assert_eq!(stats.count, Some(2));
    assert!(stats.min.is_none());
    assert!(stats.sum.is_none());
    assert!(stats.start_date.is_none());
}

#[tokio::test]
async fn test_day_cache_is_idempotent() {
    let day = |d: i64| t0() - TimeDelta::hours(8) + TimeDelta::days(d);
    let repo = xpl_history::db::LocalRepository::new();
    repo.seed_samples(
        "meter@power",
        vec![
            Sample::new(100.0, day(0) + TimeDelta::hours(1)),
            Sample::new(200.0, day(0) + TimeDelta::hours(13)),
            Sample::new(50.0, day(1) + TimeDelta::hours(6)),
            Sample::new(80.0, day(3) + TimeDelta::hours(2)),
        ],
    );
    let now = day(3) + TimeDelta::hours(12);
    let engine = engine_at(&repo, now);
    let range = QueryRange::between(day(0), now);

    let first = engine
        .get_aggregate("meter@power", &range, Some(Step::Day))
        .await
        .unwrap();
    let cached_days = repo.cached_day_count("meter@power");
    // Days 0, 1 and 2 are past; day 3 is today.
    assert_eq!(cached_days, 3);

    let second = engine
        .get_aggregate("meter@power", &range, Some(Step::Day))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(repo.cached_day_count("meter@power"), cached_days);

    let Some(Aggregate::Daily(daily)) = first else {
        panic!("expected daily buckets");
    };
    // Day 2 has no reading of its own.
    let starts: Vec<_> = daily.buckets.iter().map(|b| b.start_date).collect();
    assert_eq!(starts, vec![Some(day(0)), Some(day(1)), Some(day(3))]);

    let stored = repo
        .read_days("meter@power", day(0), day(3))
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|d| d.day_start < day(3)));
}

#[tokio::test]
async fn test_cumulative_counter() {
    let repo = repo_with(
        "odo@kwh",
        &[(0, 5.0), (1000, 8.0), (2000, 6.0), (3000, 9.0)],
    );
    let engine = engine_at(&repo, at(3_600_000));

    let result = engine
        .get_cumulative("odo@kwh", &QueryRange::between(at(0), at(4000)))
        .await
        .unwrap();
    assert_eq!(result.current, 6.0);
    assert_eq!(result.count, 4);
    assert_eq!(result.count_changes, 2);
    assert_eq!(result.device_key, "odo@kwh");
}

#[tokio::test]
async fn test_last_value_follows_ingest() {
    let repo = repo_with(KEY, &[(0, 10.0)]);
    let engine = engine_at(&repo, at(3_600_000));

    let before = engine.get_last_value(KEY).await.unwrap().unwrap();
    assert_eq!(before.value, SampleValue::Number(10.0));

    engine
        .save(&SensorMessage::new("boiler", "42", at(5000)).with_type("temp"))
        .await
        .unwrap();
    let after = engine.get_last_value(KEY).await.unwrap().unwrap();
    assert_eq!(after.value, SampleValue::Number(42.0));
    assert_eq!(after.timestamp, at(5000));

    // A late reading never moves the cached value backwards.
    engine
        .save(&SensorMessage::new("boiler", "1", at(2000)).with_type("temp"))
        .await
        .unwrap();
    let still = engine.get_last_value(KEY).await.unwrap().unwrap();
    assert_eq!(still.timestamp, at(5000));
}

#[tokio::test]
async fn test_no_data_is_not_an_error() {
    let repo = repo_with(KEY, &[(0, 10.0)]);
    let engine = engine_at(&repo, at(3_600_000));
    let empty = QueryRange::between(at(10_000), at(20_000));

    assert!(engine.get_aggregate(KEY, &empty, None).await.unwrap().is_none());
    assert!(engine
        .get_aggregate(KEY, &empty, Some(Step::Fixed(1000)))
        .await
        .unwrap()
        .is_none());
    assert!(engine.get_history(KEY, &empty).await.unwrap().is_empty());
    assert_eq!(engine.get_cumulative(KEY, &empty).await.unwrap().count, 0);
}

#[tokio::test]
async fn test_source_failure_aborts() {
    let repo = repo_with(KEY, &[(0, 10.0)]);
    repo.set_fetch_failure(Some("disk unplugged"));
    let engine = engine_at(&repo, at(3_600_000));

    let err = engine
        .get_aggregate(KEY, &QueryRange::between(at(0), at(1000)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Source(_)));
}
