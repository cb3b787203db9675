//! Field-name normalization for stored documents.
//!
//! Documents written over the system's lifetime mix legacy camelCase names
//! with the current snake_case ones. Every document read from storage passes
//! through [`normalize`] once, before typed deserialization.

use serde_json::{Map, Value};

/// Legacy field name and its canonical replacement.
///
/// Several legacy names may map to the same canonical name; earlier entries
/// win over later ones when more than one is present.
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("deletedAt", "deleted_at"),
    ("caseType", "case_type"),
    ("trayId", "tray_id"),
    ("trayName", "tray_name"),
    ("requirementType", "requirement_type"),
    ("physicianId", "physician_id"),
    ("surgeon", "physician_id"),
    ("surgeonId", "physician_id"),
    ("trayRequirements", "tray_requirements"),
];

/// Nested arrays whose elements are themselves requirement documents.
const NESTED_COLLECTIONS: &[&str] = &["tray_requirements"];

/// Return the canonical form of a document.
pub fn normalize(mut doc: Value) -> Value {
    normalize_in_place(&mut doc);
    doc
}

/// Canonicalize a document in place.
///
/// The snake_case value wins when both spellings are present (a `null`
/// counts as absent). Legacy keys are always removed, so normalizing an
/// already-normalized document changes nothing. Missing fields stay missing.
/// Non-object values are left untouched.
pub fn normalize_in_place(doc: &mut Value) {
    let Value::Object(map) = doc else {
        return;
    };

    for (legacy, canonical) in FIELD_ALIASES {
        if let Some(value) = map.remove(*legacy) {
            if is_absent(map, canonical) {
                map.insert((*canonical).to_string(), value);
            }
        }
    }

    for field in NESTED_COLLECTIONS {
        if let Some(Value::Array(items)) = map.get_mut(*field) {
            items.iter_mut().for_each(normalize_in_place);
        }
    }
}

fn is_absent(map: &Map<String, Value>, key: &str) -> bool {
    matches!(map.get(key), None | Some(Value::Null))
}
