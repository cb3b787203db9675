//! Tray requirement resolution.
//!
//! Merges a case type's default tray requirements with one physician's
//! preferences into a single ordered equipment list. Resolution is a pure
//! function of its inputs; callers re-run it whenever either record set
//! changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{
    CaseTypeRequirement, PhysicianPreference, RequirementSource, RequirementType,
    ResolvedRequirement,
};

/// Priority given to a tray a physician adds without stating one.
pub const ADDED_TRAY_PRIORITY: u8 = 5;

/// Notes used when a physician preference carries none.
pub const PHYSICIAN_PREFERENCE_NOTE: &str = "Physician preference";

/// Merge default requirements with physician preferences.
///
/// `defaults` and `preferences` must already be scoped to `case_type` (and,
/// for preferences, one physician) with deleted records removed.
///
/// A preference for a tray already in the defaults replaces its requirement
/// type, quantity and notes; the default's priority is kept unless the
/// preference sets one. A preference for any other tray is added. The result
/// holds each tray ID once, sorted by priority and then requirement type,
/// with remaining ties in insertion order.
pub fn resolve(
    case_type: &str,
    defaults: &[CaseTypeRequirement],
    preferences: &[PhysicianPreference],
) -> Vec<ResolvedRequirement> {
    let mut entries: Vec<ResolvedRequirement> =
        Vec::with_capacity(defaults.len() + preferences.len());
    let mut index: HashMap<&str, usize> = HashMap::new();

    for default in defaults {
        match index.get(default.tray_id.as_str()).copied() {
            // Repeated tray: later value, original position
            Some(pos) => entries[pos] = ResolvedRequirement::from(default),
            None => {
                index.insert(default.tray_id.as_str(), entries.len());
                entries.push(ResolvedRequirement::from(default));
            }
        }
    }

    let mut overridden = 0usize;
    for pref in preferences {
        let notes = pref
            .notes
            .clone()
            .unwrap_or_else(|| PHYSICIAN_PREFERENCE_NOTE.to_string());

        match index.get(pref.tray_id.as_str()).copied() {
            Some(pos) => {
                let entry = &mut entries[pos];
                entry.requirement_type = pref.requirement_type;
                entry.quantity = pref.quantity;
                entry.notes = notes;
                if let Some(priority) = pref.priority {
                    entry.priority = priority;
                }
                if entry.tray_name.is_empty() {
                    entry.tray_name = pref.tray_name.clone();
                }
                if entry.source == RequirementSource::Default {
                    entry.source = RequirementSource::PhysicianOverride;
                    overridden += 1;
                }
            }
            None => {
                index.insert(pref.tray_id.as_str(), entries.len());
                entries.push(ResolvedRequirement {
                    tray_id: pref.tray_id.clone(),
                    tray_name: pref.tray_name.clone(),
                    requirement_type: pref.requirement_type,
                    quantity: pref.quantity,
                    priority: pref.priority.unwrap_or(ADDED_TRAY_PRIORITY),
                    notes,
                    source: RequirementSource::PhysicianAddition,
                });
            }
        }
    }

    // sort_by is stable
    entries.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.requirement_type.cmp(&b.requirement_type))
    });

    debug!(
        case_type,
        defaults = defaults.len(),
        preferences = preferences.len(),
        overridden,
        resolved = entries.len(),
        "Resolved tray requirements"
    );

    entries
}

/// A resolved equipment list together with what it was resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Resolution {
    pub case_type: String,
    pub physician_id: Option<String>,
    pub requirements: Vec<ResolvedRequirement>,
}

impl Resolution {
    pub fn new(
        case_type: &str,
        physician_id: Option<&str>,
        defaults: &[CaseTypeRequirement],
        preferences: &[PhysicianPreference],
    ) -> Self {
        Self {
            case_type: case_type.to_string(),
            physician_id: physician_id.map(|s| s.to_string()),
            requirements: resolve(case_type, defaults, preferences),
        }
    }

    /// No defaults and no preferences: nothing has been configured yet.
    pub fn is_unconfigured(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn count_of(&self, requirement_type: RequirementType) -> usize {
        self.requirements
            .iter()
            .filter(|r| r.requirement_type == requirement_type)
            .count()
    }

    /// Short count summary, e.g. "2 required, 1 optional".
    pub fn summary(&self) -> String {
        if self.is_unconfigured() {
            return "No equipment list configured".to_string();
        }
        RequirementType::ALL
            .iter()
            .filter_map(|&kind| match self.count_of(kind) {
                0 => None,
                n => Some(format!("{} {}", n, kind)),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
