#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use crate::db::repositories::LocalRepository;
    use crate::models::{
        BucketSumMode, Field, LocalCalendar, Projection, QueryRange, Sample, Step, Window,
    };
    use crate::services::error::EngineError;
    use crate::services::stepped::{
        aggregate_by_step, check_step, BucketGrid, StepOptions, SteppedFold, MAX_BUCKETS,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + TimeDelta::milliseconds(ms)
    }

    fn fixed(ms: i64) -> StepOptions {
        StepOptions::new(Step::Fixed(ms), LocalCalendar::utc())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn worked_example() -> Vec<Sample> {
        vec![
            Sample::new(10.0, at(0)),
            Sample::new(20.0, at(1000)),
            Sample::new(15.0, at(2000)),
        ]
    }

    fn fold_all(
        samples: Vec<Sample>,
        range: &QueryRange,
        end: DateTime<Utc>,
        options: StepOptions,
    ) -> Option<crate::models::SteppedAggregate> {
        let mut fold = SteppedFold::new("dev", range, end, options);
        for s in samples {
            fold.push(s);
        }
        fold.finish();
        fold.into_aggregate()
    }

    #[tokio::test]
    async fn test_worked_example_two_buckets() {
        let repo = LocalRepository::new();
        repo.seed_samples("boiler@temp", worked_example());
        let range = QueryRange::between(at(0), at(3000));

        let result = aggregate_by_step(&repo, "boiler@temp", &range, at(3000), fixed(1500))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.buckets.len(), 2);
        let first = &result.buckets[0];
        let second = &result.buckets[1];
        assert!(close(first.average.unwrap(), (10.0 * 1000.0 + 20.0 * 500.0) / 1500.0));
        assert!(close(second.average.unwrap(), (20.0 * 500.0 + 15.0 * 1000.0) / 1500.0));
        assert_eq!(first.total_ms, Some(1500));
        assert_eq!(second.total_ms, Some(1500));
        assert_eq!(first.start_date, Some(at(0)));
        assert_eq!(first.end_date, Some(at(1500)));
        assert_eq!(second.end_date, Some(at(3000)));
        assert_eq!(first.max.as_ref().unwrap().timestamp, at(1000));
        assert_eq!(second.min.as_ref().unwrap().timestamp, at(2000));
    }

    #[test]
    fn test_sum_asymmetry_between_inner_and_crossing_transitions() {
        let range = QueryRange::between(at(0), at(3000));
        let result = fold_all(worked_example(), &range, at(3000), fixed(1500)).unwrap();

        // 10 whole, then half of the held 20.
        assert!(close(result.buckets[0].sum.unwrap(), 20.0));
        // Other half of 20, then 15 whole up to the end.
        assert!(close(result.buckets[1].sum.unwrap(), 25.0));
        assert_eq!(result.buckets[0].count, Some(1));
        assert_eq!(result.buckets[1].count, Some(2));
    }

    #[test]
    fn test_attributed_sum_mode() {
        let range = QueryRange::between(at(0), at(3000));
        let options = fixed(1500).with_sum_mode(BucketSumMode::Attributed);
        let result = fold_all(worked_example(), &range, at(3000), options).unwrap();

        assert!(close(result.buckets[0].sum.unwrap(), 10.0));
        assert!(close(result.buckets[1].sum.unwrap(), 35.0));
        // Averages do not depend on the sum mode.
        assert!(close(result.buckets[0].average.unwrap(), 20_000.0 / 1500.0));
    }

    #[test]
    fn test_interior_gap_is_materialized() {
        let samples = vec![Sample::new(10.0, at(0)), Sample::new(20.0, at(5000))];
        let range = QueryRange::between(at(0), at(6000));
        let result = fold_all(samples, &range, at(6000), fixed(1000)).unwrap();

        assert_eq!(result.buckets.len(), 6);
        for gap in &result.buckets[1..5] {
            assert!(gap.min.is_none());
            assert_eq!(gap.count, Some(0));
            assert_eq!(gap.total_ms, Some(1000));
            assert_eq!(gap.average, Some(10.0));
        }
        let head = &result.buckets[5];
        assert_eq!(head.count, Some(2));
        assert_eq!(head.count_changes, Some(1));
        assert_eq!(head.average, Some(20.0));
    }

    #[test]
    fn test_end_on_boundary_creates_no_trailing_bucket() {
        let range = QueryRange::between(at(0), at(3000));
        let result = fold_all(worked_example(), &range, at(3000), fixed(1000)).unwrap();

        assert_eq!(result.buckets.len(), 3);
        assert_eq!(result.buckets[2].end_date, Some(at(3000)));
        assert_eq!(result.buckets[2].total_ms, Some(1000));
    }

    #[test]
    fn test_leading_buckets_before_first_sample() {
        let samples = vec![Sample::new(4.0, at(2500))];
        let range = QueryRange::between(at(0), at(3000));
        let result = fold_all(samples, &range, at(3000), fixed(1000)).unwrap();

        assert_eq!(result.buckets.len(), 3);
        assert!(result.buckets[0].average.is_none());
        assert_eq!(result.buckets[0].total_ms, Some(0));
        assert_eq!(result.buckets[2].count, Some(1));
        assert_eq!(result.buckets[2].total_ms, Some(500));
    }

    #[test]
    fn test_open_range_starts_at_first_sample() {
        let range = QueryRange::new().with_limit(10);
        let result = fold_all(worked_example(), &range, at(3000), fixed(1500)).unwrap();
        assert_eq!(result.buckets[0].start_date, Some(at(0)));
    }

    #[test]
    fn test_calendar_day_buckets() {
        let day1 = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let h = |hours: i64| day1 + TimeDelta::hours(hours);
        let samples = vec![
            Sample::new(1.0, h(6)),
            Sample::new(3.0, h(18)),
            Sample::new(5.0, h(36)),
        ];
        let range = QueryRange::between(h(3), h(48));
        let options = StepOptions::new(Step::Day, LocalCalendar::utc());
        let result = fold_all(samples, &range, h(48), options).unwrap();

        assert_eq!(result.buckets.len(), 2);
        assert_eq!(result.buckets[0].start_date, Some(day1));
        assert_eq!(result.buckets[0].end_date, Some(h(24)));
        assert_eq!(result.buckets[0].total_ms, Some(18 * 3_600_000));
        assert!(close(result.buckets[0].average.unwrap(), 30.0 / 18.0));
        assert_eq!(result.buckets[1].total_ms, Some(24 * 3_600_000));
        assert!(close(result.buckets[1].average.unwrap(), 4.0));
    }

    #[test]
    fn test_grid_with_offset_calendar() {
        let calendar = LocalCalendar::fixed_offset_minutes(120).unwrap();
        let origin = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let grid = BucketGrid::new(origin, Step::Day, calendar);

        assert_eq!(grid.origin(), Utc.with_ymd_and_hms(2024, 3, 3, 22, 0, 0).unwrap());
        assert_eq!(grid.index_of(Utc.with_ymd_and_hms(2024, 3, 4, 21, 59, 0).unwrap()), 0);
        assert_eq!(grid.index_of(Utc.with_ymd_and_hms(2024, 3, 4, 22, 0, 0).unwrap()), 1);
        assert_eq!(grid.end_of(0), Utc.with_ymd_and_hms(2024, 3, 4, 22, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_empty_range_is_no_data() {
        let repo = LocalRepository::new();
        repo.seed_samples("boiler@temp", worked_example());
        let range = QueryRange::between(at(5000), at(9000));

        let result = aggregate_by_step(&repo, "boiler@temp", &range, at(9000), fixed(1000))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let repo = LocalRepository::new();
        let range = QueryRange::between(at(0), at(1000));
        let err = aggregate_by_step(&repo, "ghost", &range, at(1000), fixed(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_projection_drops_dates() {
        let repo = LocalRepository::new();
        repo.seed_samples("boiler@temp", worked_example());
        let range = QueryRange::between(at(0), at(3000))
            .with_projection(Projection::only([Field::Average, Field::Delta]));

        let result = aggregate_by_step(&repo, "boiler@temp", &range, at(3000), fixed(1500))
            .await
            .unwrap()
            .unwrap();

        let first = &result.buckets[0];
        assert!(first.start_date.is_none());
        assert!(first.end_date.is_none());
        assert!(first.min.is_none());
        assert!(first.average.is_some());
        assert_eq!(first.delta, Some(10.0));
    }

    #[test]
    fn test_huge_step_saturates_bucket_end() {
        let grid = BucketGrid::new(t0(), Step::Fixed(i64::MAX), LocalCalendar::utc());
        assert_eq!(grid.start_of(0), t0());
        assert_eq!(grid.end_of(0), DateTime::<Utc>::MAX_UTC);

        let range = QueryRange::between(at(0), at(3_600_000));
        let agg = fold_all(
            vec![Sample::new(4.0, at(0))],
            &range,
            at(3_600_000),
            fixed(i64::MAX),
        )
        .unwrap();
        assert_eq!(agg.buckets.len(), 1);
        assert_eq!(agg.buckets[0].end_date, Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(agg.buckets[0].total_ms, Some(3_600_000));
    }

    #[test]
    fn test_check_step_rejects_unusable_widths() {
        let hour = Window::new(at(0), at(3_600_000));
        let invalid = |step, bounded| {
            matches!(
                check_step(step, &hour, bounded),
                Err(EngineError::InvalidQuery(_))
            )
        };

        assert!(invalid(Step::Fixed(0), true));
        assert!(invalid(Step::Fixed(-5), false));
        assert!(invalid(Step::Fixed(i64::MAX), false));
        // 3.6M one-millisecond buckets.
        assert!(invalid(Step::Fixed(1), true));
        assert!(check_step(Step::Fixed(1), &hour, false).is_ok());
        assert!(check_step(Step::Fixed(60_000), &hour, true).is_ok());
        assert!(check_step(Step::Fixed(TimeDelta::days(365).num_milliseconds()), &hour, true).is_ok());
        assert!(check_step(Step::Day, &hour, true).is_ok());
    }

    #[tokio::test]
    async fn test_too_many_buckets_is_invalid_query() {
        let repo = LocalRepository::new();
        let far = MAX_BUCKETS as i64 * 2;
        repo.seed_samples(
            "boiler@temp",
            vec![Sample::new(1.0, at(0)), Sample::new(2.0, at(far))],
        );
        let range = QueryRange::new().with_limit(10);

        let err = aggregate_by_step(&repo, "boiler@temp", &range, at(far + 1), fixed(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuery(_)));

        let mut fold = SteppedFold::new("dev", &range, at(far + 1), fixed(1));
        fold.push(Sample::new(1.0, at(0)));
        assert!(!fold.exceeded_bucket_limit());
        fold.push(Sample::new(2.0, at(far)));
        assert!(fold.exceeded_bucket_limit());
    }
}
