#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::api::{
        AccessContext, BikeparkId, CacheAction, CacheParams, CacheState, CacheStatus,
        ReportGrouping, ReportSeries, ReportType,
    };

    #[test]
    fn test_cache_action_round_trip() {
        for (text, action) in [
            ("status", CacheAction::Status),
            ("createtable", CacheAction::CreateTable),
            ("droptable", CacheAction::DropTable),
            ("clear", CacheAction::Clear),
            ("rebuild", CacheAction::Rebuild),
            ("update", CacheAction::Update),
            ("createparentindices", CacheAction::CreateParentIndices),
            ("dropparentindices", CacheAction::DropParentIndices),
        ] {
            assert_eq!(CacheAction::from_str(text).unwrap(), action);
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", text));
        }
        assert!(CacheAction::from_str("truncate").is_err());
    }

    #[test]
    fn test_cache_action_classification() {
        assert!(!CacheAction::Status.is_mutating());
        assert!(CacheAction::Clear.is_mutating());
        assert!(CacheAction::Rebuild.needs_window());
        assert!(!CacheAction::CreateTable.needs_window());
    }

    #[test]
    fn test_report_grouping_ordering() {
        assert!(ReportGrouping::QuarterHour.period_minutes() < ReportGrouping::Hour.period_minutes());
        assert!(ReportGrouping::Week.period_minutes() < ReportGrouping::Month.period_minutes());
    }

    #[test]
    fn test_report_type_parse() {
        assert_eq!(
            ReportType::from_str("absolute_occupancy").unwrap(),
            ReportType::AbsoluteOccupancy
        );
        assert!(ReportType::from_str("occupancy").is_err());
    }

    #[test]
    fn test_split_category_at_last_underscore() {
        let (park, series) = ReportSeries::split_category("A_capacity");
        assert_eq!(park, "A");
        assert_eq!(series, "capacity");

        // Facility IDs may contain underscores themselves.
        let (park, series) = ReportSeries::split_category("utrecht_centraal_occupation");
        assert_eq!(park, "utrecht_centraal");
        assert_eq!(series, "occupation");
    }

    #[test]
    fn test_cache_status_summaries() {
        let missing = CacheStatus::missing("bezetting_cache");
        assert_eq!(missing.state, CacheState::Missing);
        assert!(missing.summary.contains("does not exist"));
        assert!(missing.row_count.is_none());

        let available = CacheStatus::available("bezetting_cache", 42, None, None);
        assert_eq!(available.state, CacheState::Available);
        assert_eq!(available.row_count, Some(42));
        assert!(available.summary.contains("42 rows"));
    }

    #[test]
    fn test_access_context_allows() {
        let access = AccessContext::admin(vec![BikeparkId::from("A"), BikeparkId::from("B")]);
        assert!(access.allows(&BikeparkId::from("A")));
        assert!(!access.allows(&BikeparkId::from("C")));
        assert!(access.is_admin);
    }

    #[test]
    fn test_cache_params_deserializes_camel_case_envelope() {
        let json = r#"{
            "action": "rebuild",
            "startDate": "2024-01-01",
            "endDate": "2024-01-31",
            "selectedBikeparkIds": ["A", "B"],
            "allDates": false,
            "allBikeparks": false
        }"#;
        let params: CacheParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.action, CacheAction::Rebuild);
        assert_eq!(params.selected_bikepark_ids.len(), 2);
        assert!(!params.all_dates);
    }
}
