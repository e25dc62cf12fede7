#[cfg(test)]
mod tests {
    use crate::models::time::{from_millis, millis_between, Clock, FixedClock, LocalCalendar};
    use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};

    #[test]
    fn test_millis_between() {
        let a = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let b = a + TimeDelta::milliseconds(1500);
        assert_eq!(millis_between(a, b), 1500);
        assert_eq!(millis_between(b, a), -1500);
    }

    #[test]
    fn test_from_millis() {
        assert_eq!(from_millis(0), Some(chrono::DateTime::UNIX_EPOCH));
        assert_eq!(from_millis(86_400_000).map(|t| t.timestamp()), Some(86_400));
        assert_eq!(from_millis(9_000_000_000_000_000), None);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(TimeDelta::hours(2));
        assert_eq!(clock.now(), start + TimeDelta::hours(2));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_utc_day_start() {
        let cal = LocalCalendar::utc();
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 17, 45, 12).unwrap();
        assert_eq!(
            cal.day_start(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            cal.next_day_start(t),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_day_start_is_idempotent_on_midnight() {
        let cal = LocalCalendar::utc();
        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(cal.day_start(midnight), midnight);
    }

    #[test]
    fn test_fixed_offset_midnight() {
        // UTC+02:00: local midnight of 2024-03-01 is 22:00 UTC the day before.
        let cal = LocalCalendar::fixed_offset_minutes(120).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            cal.midnight(date),
            Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap()
        );

        let t = Utc.with_ymd_and_hms(2024, 2, 29, 23, 30, 0).unwrap();
        assert_eq!(cal.local_date(t), date);
    }

    #[test]
    fn test_fixed_offset_out_of_range() {
        assert!(LocalCalendar::fixed_offset_minutes(25 * 60).is_none());
        assert!(LocalCalendar::fixed_offset_minutes(-60).is_some());
    }

    #[test]
    fn test_days_between() {
        let cal = LocalCalendar::utc();
        let a = Utc.with_ymd_and_hms(2024, 2, 28, 23, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        // 2024 is a leap year: 28 Feb -> 29 Feb -> 1 Mar.
        assert_eq!(cal.days_between(a, b), 2);
        assert_eq!(cal.days_between(b, a), -2);
        assert_eq!(cal.days_between(a, a), 0);
    }

    #[test]
    fn test_nth_day_start() {
        let cal = LocalCalendar::utc();
        let origin = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            cal.nth_day_start(origin, 0),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            cal.nth_day_start(origin, 3),
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
        );
    }
}
