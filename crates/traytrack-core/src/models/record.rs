//! Storage-facing record shapes.
//!
//! Documents arrive from storage as loosely-typed JSON. After normalization
//! they deserialize into a [`RequirementDraft`], which validation turns into a
//! typed record wrapped in [`Stored`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a stored record. Records are tombstoned, never removed.
///
/// `at` is `None` when a tombstone is present but its timestamp is unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Active,
    Deleted { at: Option<DateTime<Utc>> },
}

impl RecordState {
    /// Any non-null tombstone value marks the record deleted.
    pub fn from_tombstone(deleted_at: Option<&Value>) -> Self {
        match deleted_at {
            None | Some(Value::Null) => RecordState::Active,
            Some(value) => RecordState::Deleted {
                at: parse_timestamp(value),
            },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RecordState::Active)
    }

    pub fn is_deleted(&self) -> bool {
        !self.is_active()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RecordState::Active => None,
            RecordState::Deleted { at } => *at,
        }
    }
}

/// Read a stored timestamp in any of the shapes documents have used:
/// RFC 3339 strings, epoch milliseconds, or `{seconds, nanoseconds}` objects
/// (also with leading underscores). Anything else yields `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let nanos = u32::try_from(nanos).ok()?;
            Utc.timestamp_opt(seconds, nanos).single()
        }
        _ => None,
    }
}

/// Lenient field deserializer: an unreadable timestamp becomes `None`
/// instead of failing the whole document.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

/// A typed record together with its document metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub state: RecordState,
    pub record: T,
}

impl<T> Stored<T> {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

impl<T: Serialize> Stored<T> {
    /// Render as a canonical snake_case document for writing back to storage.
    pub fn to_document(&self) -> serde_json::Result<Value> {
        let mut doc = match serde_json::to_value(&self.record)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("record".to_string(), other);
                map
            }
        };
        doc.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(created_at) = self.created_at {
            doc.insert("created_at".to_string(), serde_json::to_value(created_at)?);
        }
        if let Some(updated_at) = self.updated_at {
            doc.insert("updated_at".to_string(), serde_json::to_value(updated_at)?);
        }
        match self.state {
            RecordState::Active => {}
            RecordState::Deleted { at: Some(at) } => {
                doc.insert("deleted_at".to_string(), serde_json::to_value(at)?);
            }
            // Time unknown, but the record must stay deleted
            RecordState::Deleted { at: None } => {
                doc.insert("deleted_at".to_string(), Value::Bool(true));
            }
        }
        Ok(Value::Object(doc))
    }
}

/// Untyped shape shared by both requirement record kinds.
///
/// Every field is optional: this is what storage or user input actually
/// holds before validation. Numeric fields stay raw JSON so that validation
/// can report a non-integer value instead of failing to parse the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physician_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tray_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tray_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    /// Raw tombstone; see [`RecordState::from_tombstone`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Value>,
}

impl RequirementDraft {
    pub fn state(&self) -> RecordState {
        RecordState::from_tombstone(self.deleted_at.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseTypeRequirement, RequirementType};
    use serde_json::json;

    #[test]
    fn test_record_state_from_tombstone() {
        assert_eq!(RecordState::from_tombstone(None), RecordState::Active);
        assert_eq!(RecordState::from_tombstone(Some(&Value::Null)), RecordState::Active);

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let state = RecordState::from_tombstone(Some(&json!("2024-03-01T12:00:00Z")));
        assert!(state.is_deleted());
        assert_eq!(state.deleted_at(), Some(at));
    }

    #[test]
    fn test_unreadable_tombstone_still_deletes() {
        for raw in [json!(true), json!("sometime last week"), json!({"when": "then"})] {
            let state = RecordState::from_tombstone(Some(&raw));
            assert_eq!(state, RecordState::Deleted { at: None }, "tombstone {raw}");
        }
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-01-01T00:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-01-01T01:00:00+01:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!(1704067200000_i64)), Some(expected));
        assert_eq!(
            parse_timestamp(&json!({"seconds": 1704067200, "nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!({"_seconds": 1704067200, "_nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!({"nanoseconds": 5})), None);
        assert_eq!(parse_timestamp(&json!(false)), None);
    }

    #[test]
    fn test_draft_tolerates_legacy_timestamps() {
        let draft: RequirementDraft = serde_json::from_value(json!({
            "tray_id": "T1",
            "created_at": 1704067200000_i64,
            "updated_at": {"seconds": 1704067200, "nanoseconds": 0}
        }))
        .unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(draft.created_at, Some(expected));
        assert_eq!(draft.updated_at, Some(expected));

        let draft: RequirementDraft =
            serde_json::from_value(json!({"tray_id": "T1", "created_at": "yesterday"})).unwrap();
        assert!(draft.created_at.is_none());
        assert_eq!(draft.state(), RecordState::Active);
    }

    #[test]
    fn test_draft_tolerates_missing_fields() {
        let draft: RequirementDraft = serde_json::from_str(r#"{"tray_id": "T1"}"#).unwrap();
        assert_eq!(draft.tray_id.as_deref(), Some("T1"));
        assert!(draft.case_type.is_none());
        assert!(draft.quantity.is_none());
        assert_eq!(draft.state(), RecordState::Active);
    }

    #[test]
    fn test_draft_null_priority_is_unset() {
        let draft: RequirementDraft =
            serde_json::from_str(r#"{"tray_id": "T1", "priority": null}"#).unwrap();
        assert!(draft.priority.is_none());
    }

    #[test]
    fn test_to_document_includes_metadata() {
        let deleted = Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
        let stored = Stored {
            id: "abc".to_string(),
            created_at: None,
            updated_at: None,
            state: RecordState::Deleted { at: Some(deleted) },
            record: CaseTypeRequirement {
                case_type: "SI fusion".to_string(),
                tray_id: "T1".to_string(),
                tray_name: "Fusion Set".to_string(),
                requirement_type: RequirementType::Required,
                quantity: 1,
                priority: 1,
                notes: String::new(),
            },
        };

        let doc = stored.to_document().unwrap();
        assert_eq!(doc["id"], "abc");
        assert_eq!(doc["requirement_type"], "required");
        assert!(doc.get("created_at").is_none());

        // The tombstone survives a round trip through the draft shape
        let draft: RequirementDraft = serde_json::from_value(doc).unwrap();
        assert_eq!(draft.state(), RecordState::Deleted { at: Some(deleted) });
    }

    #[test]
    fn test_to_document_keeps_undated_tombstone() {
        let stored = Stored {
            id: "abc".to_string(),
            created_at: None,
            updated_at: None,
            state: RecordState::Deleted { at: None },
            record: CaseTypeRequirement {
                case_type: "SI fusion".to_string(),
                tray_id: "T1".to_string(),
                tray_name: String::new(),
                requirement_type: RequirementType::Optional,
                quantity: 1,
                priority: 3,
                notes: String::new(),
            },
        };

        let doc = stored.to_document().unwrap();
        assert_eq!(doc["deleted_at"], true);
        let draft: RequirementDraft = serde_json::from_value(doc).unwrap();
        assert!(draft.state().is_deleted());
    }
}
