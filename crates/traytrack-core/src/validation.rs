//! Field rules for requirement records.
//!
//! Both record kinds are checked before they are accepted into storage.
//! Every rule is evaluated; the resulting [`ValidationError`] lists all
//! violations at once.

use serde_json::Value;

use crate::error::ValidationError;
use crate::models::{CaseTypeRequirement, PhysicianPreference, RequirementDraft, RequirementType};

pub const MSG_TRAY_ID_REQUIRED: &str = "Tray ID is required";
pub const MSG_CASE_TYPE_REQUIRED: &str = "Case type is required";
pub const MSG_PHYSICIAN_ID_REQUIRED: &str = "Physician ID is required";
pub const MSG_REQUIREMENT_TYPE_REQUIRED: &str = "Requirement type is required";
pub const MSG_REQUIREMENT_TYPE_INVALID: &str =
    "Requirement type must be one of: required, preferred, optional";
pub const MSG_QUANTITY_NOT_INTEGER: &str = "Quantity must be a whole number";
pub const MSG_QUANTITY_TOO_SMALL: &str = "Quantity must be at least 1";
pub const MSG_QUANTITY_TOO_LARGE: &str = "Quantity is too large";
pub const MSG_PRIORITY_NOT_INTEGER: &str = "Priority must be a whole number";
pub const MSG_PRIORITY_OUT_OF_RANGE: &str = "Priority must be between 1 and 10";

pub const DEFAULT_QUANTITY: u32 = 1;
pub const DEFAULT_PRIORITY: u8 = 1;
pub const MIN_PRIORITY: i64 = 1;
pub const MAX_PRIORITY: i64 = 10;

/// Fields shared by both record kinds, checked but not yet accepted.
struct CommonFields {
    case_type: String,
    tray_id: String,
    tray_name: String,
    requirement_type: Option<RequirementType>,
    quantity: u32,
    priority: Option<u8>,
    notes: Option<String>,
}

/// Validate a draft as a case type default requirement.
pub fn validate_case_type_requirement(
    draft: &RequirementDraft,
) -> Result<CaseTypeRequirement, ValidationError> {
    let mut violations = Vec::new();
    let common = check_common(draft, &mut violations);

    match common.requirement_type {
        Some(requirement_type) if violations.is_empty() => Ok(CaseTypeRequirement {
            case_type: common.case_type,
            tray_id: common.tray_id,
            tray_name: common.tray_name,
            requirement_type,
            quantity: common.quantity,
            priority: common.priority.unwrap_or(DEFAULT_PRIORITY),
            notes: common.notes.unwrap_or_default(),
        }),
        _ => Err(ValidationError::new(violations)),
    }
}

/// Validate a draft as a physician preference.
///
/// An unset priority stays unset; the resolver applies its own default.
pub fn validate_physician_preference(
    draft: &RequirementDraft,
) -> Result<PhysicianPreference, ValidationError> {
    let mut violations = Vec::new();

    let physician_id = required_text(draft.physician_id.as_deref());
    if physician_id.is_none() {
        violations.push(MSG_PHYSICIAN_ID_REQUIRED.to_string());
    }

    let common = check_common(draft, &mut violations);

    match (physician_id, common.requirement_type) {
        (Some(physician_id), Some(requirement_type)) if violations.is_empty() => {
            Ok(PhysicianPreference {
                physician_id,
                case_type: common.case_type,
                tray_id: common.tray_id,
                tray_name: common.tray_name,
                requirement_type,
                quantity: common.quantity,
                priority: common.priority,
                notes: common.notes,
            })
        }
        _ => Err(ValidationError::new(violations)),
    }
}

fn check_common(draft: &RequirementDraft, violations: &mut Vec<String>) -> CommonFields {
    let tray_id = required_text(draft.tray_id.as_deref());
    if tray_id.is_none() {
        violations.push(MSG_TRAY_ID_REQUIRED.to_string());
    }

    let case_type = required_text(draft.case_type.as_deref());
    if case_type.is_none() {
        violations.push(MSG_CASE_TYPE_REQUIRED.to_string());
    }

    let requirement_type = match required_text(draft.requirement_type.as_deref()) {
        None => {
            violations.push(MSG_REQUIREMENT_TYPE_REQUIRED.to_string());
            None
        }
        Some(raw) => match raw.parse::<RequirementType>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                violations.push(MSG_REQUIREMENT_TYPE_INVALID.to_string());
                None
            }
        },
    };

    let quantity = match draft.quantity.as_ref().filter(|v| !v.is_null()) {
        None => DEFAULT_QUANTITY,
        Some(value) => match whole_number(value) {
            None => {
                violations.push(MSG_QUANTITY_NOT_INTEGER.to_string());
                DEFAULT_QUANTITY
            }
            Some(n) if n < 1 => {
                violations.push(MSG_QUANTITY_TOO_SMALL.to_string());
                DEFAULT_QUANTITY
            }
            Some(n) => u32::try_from(n).unwrap_or_else(|_| {
                violations.push(MSG_QUANTITY_TOO_LARGE.to_string());
                DEFAULT_QUANTITY
            }),
        },
    };

    let priority = match draft.priority.as_ref().filter(|v| !v.is_null()) {
        None => None,
        Some(value) => match whole_number(value) {
            None => {
                violations.push(MSG_PRIORITY_NOT_INTEGER.to_string());
                None
            }
            Some(n) if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&n) => {
                violations.push(MSG_PRIORITY_OUT_OF_RANGE.to_string());
                None
            }
            // In range, so the narrowing is lossless
            Some(n) => Some(n as u8),
        },
    };

    CommonFields {
        case_type: case_type.unwrap_or_default(),
        tray_id: tray_id.unwrap_or_default(),
        tray_name: draft.tray_name.clone().unwrap_or_default(),
        requirement_type,
        quantity,
        priority,
        notes: draft.notes.clone(),
    }
}

/// A present, non-blank string, returned as written.
fn required_text(value: Option<&str>) -> Option<String> {
    value
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

/// Interpret a JSON value as an integer.
///
/// Accepts integer numbers, floats with no fractional part, and strings
/// holding an integer (form inputs store numbers as text).
fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
