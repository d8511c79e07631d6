use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Registered status of a tag: checked-in (`1`) or checked-out (`0`).
///
/// Serializes as the integer `0` or `1`. Deserializes from `0`/`1`,
/// `true`/`false`, or the strings `"0"`/`"1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TagStatus {
    #[default]
    Absent,
    Present,
}

impl TagStatus {
    /// The opposite status.
    pub fn toggled(self) -> Self {
        match self {
            TagStatus::Absent => TagStatus::Present,
            TagStatus::Present => TagStatus::Absent,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            TagStatus::Absent => 0,
            TagStatus::Present => 1,
        }
    }

    /// Decode a stored integer. Only `0` and `1` are valid.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(TagStatus::Absent),
            1 => Some(TagStatus::Present),
            _ => None,
        }
    }

    /// Message body published for this status.
    pub fn payload(self) -> &'static str {
        match self {
            TagStatus::Absent => "0",
            TagStatus::Present => "1",
        }
    }
}

impl From<bool> for TagStatus {
    fn from(present: bool) -> Self {
        if present {
            TagStatus::Present
        } else {
            TagStatus::Absent
        }
    }
}

impl fmt::Display for TagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload())
    }
}

impl std::str::FromStr for TagStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" | "false" | "absent" => Ok(TagStatus::Absent),
            "1" | "true" | "present" => Ok(TagStatus::Present),
            other => Err(format!("invalid status '{}': expected 0 or 1", other)),
        }
    }
}

impl Serialize for TagStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_i64() as u8)
    }
}

struct TagStatusVisitor;

impl<'de> Visitor<'de> for TagStatusVisitor {
    type Value = TagStatus;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0, 1, true, false, \"0\" or \"1\"")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<TagStatus, E> {
        Ok(TagStatus::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TagStatus, E> {
        TagStatus::from_i64(v).ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TagStatus, E> {
        match v {
            0 => Ok(TagStatus::Absent),
            1 => Ok(TagStatus::Present),
            _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TagStatus, E> {
        match v.trim() {
            "0" => Ok(TagStatus::Absent),
            "1" => Ok(TagStatus::Present),
            _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for TagStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TagStatusVisitor)
    }
}

/// A tag in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(rename = "rfid_data")]
    pub tag_id: String,
    #[serde(rename = "rfid_status")]
    pub status: TagStatus,
}

/// A log entry to be appended. The backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    /// `YYYY-MM-DD HH:MM:SS` timestamp string.
    pub timestamp: String,
    pub tag_id: String,
    pub status: TagStatus,
}

/// A stored log entry. Ids increase in append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryRecord {
    pub id: i64,
    #[serde(rename = "time_log")]
    pub timestamp: String,
    #[serde(rename = "rfid_data")]
    pub tag_id: String,
    #[serde(rename = "rfid_status")]
    pub status: TagStatus,
}

impl LogEntryRecord {
    pub fn from_new(id: i64, entry: NewLogEntry) -> Self {
        Self {
            id,
            timestamp: entry.timestamp,
            tag_id: entry.tag_id,
            status: entry.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggled_flips_both_ways() {
        assert_eq!(TagStatus::Absent.toggled(), TagStatus::Present);
        assert_eq!(TagStatus::Present.toggled(), TagStatus::Absent);
        assert_eq!(TagStatus::Present.toggled().toggled(), TagStatus::Present);
    }

    #[test]
    fn status_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&TagStatus::Present).unwrap(), "1");
        assert_eq!(serde_json::to_string(&TagStatus::Absent).unwrap(), "0");
    }

    #[test]
    fn status_accepts_ints_bools_and_strings() {
        let cases = [
            ("0", TagStatus::Absent),
            ("1", TagStatus::Present),
            ("false", TagStatus::Absent),
            ("true", TagStatus::Present),
            ("\"0\"", TagStatus::Absent),
            ("\"1\"", TagStatus::Present),
        ];
        for (json, expected) in cases {
            let parsed: TagStatus = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, expected, "input {json}");
        }
    }

    #[test]
    fn status_rejects_out_of_range() {
        assert!(serde_json::from_str::<TagStatus>("2").is_err());
        assert!(serde_json::from_str::<TagStatus>("-1").is_err());
        assert!(serde_json::from_str::<TagStatus>("\"yes\"").is_err());
        assert!(serde_json::from_str::<TagStatus>("null").is_err());
    }

    #[test]
    fn log_entry_uses_wire_column_names() {
        let entry = LogEntryRecord {
            id: 7,
            timestamp: "2026-01-01 08:00:00".to_string(),
            tag_id: "A1".to_string(),
            status: TagStatus::Present,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "time_log": "2026-01-01 08:00:00",
                "rfid_data": "A1",
                "rfid_status": 1,
            })
        );
    }

    #[test]
    fn parse_status_from_cli_text() {
        assert_eq!("1".parse::<TagStatus>().unwrap(), TagStatus::Present);
        assert_eq!(" absent ".parse::<TagStatus>().unwrap(), TagStatus::Absent);
        assert!("maybe".parse::<TagStatus>().is_err());
    }
}
