use chrono::{DateTime, Utc};

/// Decide whether a feed has to be fetched at all.
///
/// Processes the feed when nothing is stored yet, when the source reports a
/// strictly newer marker, or when the source could not report one. Skips it
/// only when both markers are known and the current one is not newer.
pub fn should_process(
    feed_key: &str,
    stored: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
) -> bool {
    match (stored, current) {
        (_, None) => {
            tracing::debug!(feed = %feed_key, "No freshness marker from source, processing");
            true
        }
        (None, Some(_)) => true,
        (Some(stored), Some(current)) => {
            let changed = current > stored;
            if !changed {
                tracing::debug!(
                    feed = %feed_key,
                    stored = %stored,
                    current = %current,
                    "Feed unchanged since last run"
                );
            }
            changed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fail_open_without_any_marker() {
        assert!(should_process("show", None, None));
    }

    #[test]
    fn test_fail_open_when_source_has_no_marker() {
        assert!(should_process("show", Some(t0()), None));
    }

    #[test]
    fn test_first_run_processes() {
        assert!(should_process("show", None, Some(t0())));
    }

    #[test]
    fn test_newer_marker_processes() {
        assert!(should_process("show", Some(t0()), Some(t0() + Duration::seconds(1))));
    }

    #[test]
    fn test_same_marker_skips() {
        assert!(!should_process("show", Some(t0()), Some(t0())));
    }

    #[test]
    fn test_older_marker_skips() {
        assert!(!should_process("show", Some(t0()), Some(t0() - Duration::hours(1))));
    }
}
