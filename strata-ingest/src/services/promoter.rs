//! Tier promotion decisions and remote key layout
//!
//! Streamed arrivals never land exactly on a quarter-hour, so silver
//! promotion keys off proximity bands around the quarter-hour marks
//! instead of exact alignment. Raw fragments are always
//! bronze-eligible; the merged ledger is promoted only at a window
//! boundary.

use crate::partition::PartitionKey;

/// True when the seconds-like filename field falls strictly inside one
/// of the quarter-hour proximity bands (13,17), (27,31), (43,47),
/// (56,60).
pub fn end_of_window(second: u8) -> bool {
    matches!(second, 14..=16 | 28..=30 | 44..=46 | 57..=59)
}

/// Remote key for the bronze (raw) artifact:
/// `<prefix><client>/<YYYY>/<MM>/<DD>/Hour<HH>/<file name>`.
pub fn bronze_key(prefix: &str, key: &PartitionKey, file_name: &str) -> String {
    format!(
        "{prefix}{}/{:04}/{:02}/{:02}/Hour{:02}/{file_name}",
        key.client, key.year, key.month, key.day, key.hour
    )
}

/// Remote key for the silver (merged ledger) artifact, stored alongside
/// the day's bronze dumps:
/// `<prefix><client>/<YYYY>/<MM>/<DD>/<ledger file name>`.
pub fn silver_key(prefix: &str, key: &PartitionKey) -> String {
    format!(
        "{prefix}{}/{:04}/{:02}/{:02}/{}",
        key.client,
        key.year,
        key.month,
        key.day,
        key.ledger_file_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bands_are_strict() {
        // (13,17)
        assert!(!end_of_window(13));
        assert!(end_of_window(14));
        assert!(end_of_window(16));
        assert!(!end_of_window(17));
        // (27,31)
        assert!(!end_of_window(27));
        assert!(end_of_window(28));
        assert!(end_of_window(30));
        assert!(!end_of_window(31));
        // (43,47)
        assert!(!end_of_window(43));
        assert!(end_of_window(45));
        assert!(end_of_window(46));
        assert!(!end_of_window(47));
        // (56,60)
        assert!(!end_of_window(56));
        assert!(end_of_window(57));
        assert!(end_of_window(59));
    }

    #[test]
    fn test_values_outside_all_bands() {
        assert!(!end_of_window(0));
        assert!(!end_of_window(10));
        assert!(!end_of_window(20));
        assert!(!end_of_window(40));
        assert!(!end_of_window(50));
    }

    #[test]
    fn test_bronze_key_layout() {
        let key = PartitionKey::parse("labrat_2024_05_16_14_45_log.json").unwrap();
        assert_eq!(
            bronze_key("data/", &key, "labrat_2024_05_16_14_45_log.json"),
            "data/labrat/2024/05/16/Hour14/labrat_2024_05_16_14_45_log.json"
        );
    }

    #[test]
    fn test_silver_key_layout() {
        let key = PartitionKey::parse("labrat_2024_05_16_14_45_log.json").unwrap();
        assert_eq!(
            silver_key("data/", &key),
            "data/labrat/2024/05/16/labrat_2024_05_16_silver_log.csv"
        );
    }
}
