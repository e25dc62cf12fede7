#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::api::{
        device_key_from_path, device_key_to_path, http_date, is_not_modified, QueryParams,
    };
    use crate::models::{Field, Order, Step};
    use crate::services::EngineError;

    #[test]
    fn test_params_from_json() {
        let params: QueryParams = serde_json::from_str(
            r#"{
                "dateMin": "2024-05-01T00:00:00Z",
                "dateMax": "2024-05-02T00:00:00Z",
                "limit": 50,
                "step": "60000",
                "order": "desc",
                "projection": "min, max,average",
                "outputUnits": "C"
            }"#,
        )
        .unwrap();

        let range = params.to_range().unwrap();
        assert_eq!(
            range.date_min,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(range.limit, Some(50));
        assert_eq!(range.order, Order::Descending);
        assert!(range.projection.includes(Field::Average));
        assert!(!range.projection.includes(Field::Sum));
        assert_eq!(range.output_units.as_deref(), Some("C"));
        assert_eq!(params.step().unwrap(), Some(Step::Fixed(60_000)));
    }

    #[test]
    fn test_legacy_date_names() {
        let params: QueryParams =
            serde_json::from_str(r#"{"minDate": "2024-05-01T00:00:00Z"}"#).unwrap();
        assert!(params.date_min.is_some());
    }

    #[test]
    fn test_empty_params_select_everything() {
        let params = QueryParams::default();
        let range = params.to_range().unwrap();
        assert!(range.projection.is_all());
        assert_eq!(range.order, Order::Ascending);
        assert_eq!(params.step().unwrap(), None);
    }

    #[test]
    fn test_day_step() {
        let params = QueryParams {
            step: Some("Day".to_string()),
            ..Default::default()
        };
        assert_eq!(params.step().unwrap(), Some(Step::Day));
    }

    #[test]
    fn test_bad_params_are_invalid_queries() {
        let bad_step = QueryParams {
            step: Some("-5".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_step.step(), Err(EngineError::InvalidQuery(_))));

        let bad_field = QueryParams {
            projection: Some("min,median".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_field.to_range(), Err(EngineError::InvalidQuery(_))));

        let inverted = QueryParams {
            date_min: Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()),
            date_max: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(matches!(inverted.to_range(), Err(EngineError::InvalidQuery(_))));
    }

    #[test]
    fn test_device_path_mapping() {
        assert_eq!(device_key_from_path("kitchen/temp"), "kitchen@temp");
        assert_eq!(device_key_from_path("/floor1/kitchen/temp"), "floor1/kitchen@temp");
        assert_eq!(device_key_from_path("kitchen"), "kitchen");
        assert_eq!(device_key_to_path("kitchen@temp"), "kitchen/temp");
        assert_eq!(device_key_to_path("kitchen"), "kitchen");
    }

    #[test]
    fn test_last_modified_round_trip() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).unwrap();
        let header = http_date(t);
        assert_eq!(header, "Wed, 01 May 2024 08:30:15 GMT");
        assert!(is_not_modified(Some(&header), t));
        assert!(!is_not_modified(Some(&header), t + chrono::TimeDelta::seconds(1)));
        assert!(!is_not_modified(None, t));
        assert!(!is_not_modified(Some("garbage"), t));
    }
}
