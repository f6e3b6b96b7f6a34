use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Format used for timestamps in JSON output and the persisted poll state.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Router timestamps come as "DD.MM.YY HH:MM:SS", sometimes without seconds.
const INPUT_FORMATS: [&str; 2] = ["%d.%m.%y %H:%M:%S", "%d.%m.%y %H:%M"];

/// A single event log entry reported by the Fritz!Box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local router clock, no timezone
    #[serde(with = "iso_timestamp")]
    pub timestamp: NaiveDateTime,
    /// Category tag (e.g. "WLAN", "Internet")
    pub group: String,
    /// Router-assigned message id, uniqueness not guaranteed
    #[serde(rename = "id")]
    pub entry_id: String,
    #[serde(rename = "msg")]
    pub message: String,
    /// Occurrence count from a grouped-message suffix, agent mode only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group_count: Option<u32>,
    /// First occurrence from a grouped-message suffix, agent mode only
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "iso_timestamp_opt"
    )]
    pub group_since: Option<NaiveDateTime>,
}

impl LogEntry {
    pub fn new(timestamp: NaiveDateTime, group: String, entry_id: String, message: String) -> Self {
        Self {
            timestamp,
            group,
            entry_id,
            message,
            group_count: None,
            group_since: None,
        }
    }

    /// Renders the entry the way the router's own log page shows it.
    pub fn to_text_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp.format("%d.%m.%y %H:%M:%S"),
            self.group,
            self.entry_id,
            self.message
        )
    }

    /// Dedup key identifying the same logical event independent of ordering.
    pub fn signature(&self) -> String {
        format!("{}|{}|{}", self.group, self.entry_id, self.message)
    }
}

/// Parses the router's split date/time fields, trying both accepted formats.
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let combined = format!("{} {}", date, time);
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
}

static GROUPED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s*\[(\d+)\s+Meldung(?:en)?\s+seit\s+(\d{2}\.\d{2}\.\d{2})\s+(\d{2}:\d{2}:\d{2})\]\s*$",
    )
    .unwrap()
});

fn grouped_suffix(message: &str) -> Option<(u32, NaiveDateTime, usize)> {
    let caps = GROUPED_SUFFIX.captures(message)?;
    let count = caps[1].parse::<u32>().ok()?;
    let since = parse_timestamp(&caps[2], &caps[3])?;
    Some((count, since, caps.get(0)?.start()))
}

/// Strips a grouped-occurrence suffix ("[N Meldungen seit DD.MM.YY HH:MM:SS]")
/// from the message and carries it as structured fields instead. Entries with
/// no suffix, or one whose timestamp does not parse, are returned untouched.
pub fn normalize_grouped(entry: LogEntry) -> LogEntry {
    match grouped_suffix(&entry.message) {
        Some((count, since, suffix_start)) => {
            let cleaned = entry.message[..suffix_start].trim_end().to_string();
            LogEntry {
                message: cleaned,
                group_count: Some(count),
                group_since: Some(since),
                ..entry
            }
        }
        None => entry,
    }
}

pub mod iso_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(super::TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, super::TIMESTAMP_FORMAT)
            .map_err(serde::de::Error::custom)
    }
}

pub mod iso_timestamp_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(timestamp) => super::iso_timestamp::serialize(timestamp, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => NaiveDateTime::parse_from_str(&text, super::TIMESTAMP_FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_timestamp_with_seconds() {
        assert_eq!(
            parse_timestamp("01.01.24", "10:00:00"),
            Some(ts(2024, 1, 1, 10, 0, 0))
        );
    }

    #[test]
    fn parses_timestamp_without_seconds() {
        assert_eq!(
            parse_timestamp("31.12.23", "23:59"),
            Some(ts(2023, 12, 31, 23, 59, 0))
        );
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        assert_eq!(parse_timestamp("2024-01-01", "10:00:00"), None);
        assert_eq!(parse_timestamp("", ""), None);
    }

    #[test]
    fn text_line_matches_router_layout() {
        let entry = LogEntry::new(
            ts(2024, 1, 2, 3, 4, 5),
            "WLAN".to_string(),
            "119".to_string(),
            "device connected".to_string(),
        );
        assert_eq!(entry.to_text_line(), "02.01.24 03:04:05 WLAN 119 device connected");
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let entry = LogEntry::new(
            ts(2024, 5, 6, 7, 8, 9),
            "Internet".to_string(),
            "33".to_string(),
            "connection established".to_string(),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn json_shape_uses_short_keys_and_omits_empty_options() {
        let entry = LogEntry::new(
            ts(2024, 1, 1, 10, 0, 0),
            "WLAN".to_string(),
            "1".to_string(),
            "x".to_string(),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["timestamp"], "2024-01-01T10:00:00");
        assert_eq!(value["group"], "WLAN");
        assert_eq!(value["id"], "1");
        assert_eq!(value["msg"], "x");
        assert!(value.get("group_count").is_none());
        assert!(value.get("group_since").is_none());
    }

    #[test]
    fn signature_joins_group_id_and_message() {
        let entry = LogEntry::new(
            ts(2024, 1, 1, 10, 0, 0),
            "WLAN".to_string(),
            "1".to_string(),
            "x".to_string(),
        );
        assert_eq!(entry.signature(), "WLAN|1|x");
    }

    #[test]
    fn normalize_strips_grouped_suffix() {
        let entry = LogEntry::new(
            ts(2024, 1, 1, 10, 0, 0),
            "WLAN".to_string(),
            "1".to_string(),
            "login failed [3 Meldungen seit 01.01.24 09:00:00]".to_string(),
        );
        let normalized = normalize_grouped(entry);
        assert_eq!(normalized.message, "login failed");
        assert_eq!(normalized.group_count, Some(3));
        assert_eq!(normalized.group_since, Some(ts(2024, 1, 1, 9, 0, 0)));
    }

    #[test]
    fn normalize_handles_singular_form() {
        let entry = LogEntry::new(
            ts(2024, 1, 1, 10, 0, 0),
            "WLAN".to_string(),
            "1".to_string(),
            "login failed [1 Meldung seit 01.01.24 09:30:00]".to_string(),
        );
        let normalized = normalize_grouped(entry);
        assert_eq!(normalized.message, "login failed");
        assert_eq!(normalized.group_count, Some(1));
    }

    #[test]
    fn normalize_leaves_plain_messages_untouched() {
        let entry = LogEntry::new(
            ts(2024, 1, 1, 10, 0, 0),
            "WLAN".to_string(),
            "1".to_string(),
            "login failed".to_string(),
        );
        assert_eq!(normalize_grouped(entry.clone()), entry);
    }

    #[test]
    fn normalize_keeps_entry_when_suffix_timestamp_is_invalid() {
        let entry = LogEntry::new(
            ts(2024, 1, 1, 10, 0, 0),
            "WLAN".to_string(),
            "1".to_string(),
            "login failed [2 Meldungen seit 99.99.99 09:00:00]".to_string(),
        );
        let normalized = normalize_grouped(entry.clone());
        assert_eq!(normalized, entry);
    }
}
