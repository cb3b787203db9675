use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How necessary a tray is for a case type.
///
/// Variants are declared in sort order: `Required` sorts before `Preferred`,
/// which sorts before `Optional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum RequirementType {
    Required,
    Preferred,
    Optional,
}

impl RequirementType {
    pub const ALL: [RequirementType; 3] = [
        RequirementType::Required,
        RequirementType::Preferred,
        RequirementType::Optional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementType::Required => "required",
            RequirementType::Preferred => "preferred",
            RequirementType::Optional => "optional",
        }
    }
}

impl std::fmt::Display for RequirementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a string is not one of the three requirement types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRequirementType(pub String);

impl std::fmt::Display for UnknownRequirementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown requirement type: {:?}", self.0)
    }
}

impl std::error::Error for UnknownRequirementType {}

impl FromStr for RequirementType {
    type Err = UnknownRequirementType;

    /// Exact, case-sensitive match. Stored values are always lowercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "required" => Ok(RequirementType::Required),
            "preferred" => Ok(RequirementType::Preferred),
            "optional" => Ok(RequirementType::Optional),
            other => Err(UnknownRequirementType(other.to_string())),
        }
    }
}

/// A default tray requirement attached to a case type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseTypeRequirement {
    pub case_type: String,
    pub tray_id: String,
    #[serde(default)]
    pub tray_name: String,
    pub requirement_type: RequirementType,
    pub quantity: u32,
    pub priority: u8,
    #[serde(default)]
    pub notes: String,
}

/// A physician-specific override of, or addition to, a case type's defaults.
///
/// `priority` and `notes` stay optional so the resolver can tell an unset
/// value from an explicit one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicianPreference {
    pub physician_id: String,
    pub case_type: String,
    pub tray_id: String,
    #[serde(default)]
    pub tray_name: String,
    pub requirement_type: RequirementType,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Where a resolved entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum RequirementSource {
    /// Taken unchanged from the case type defaults.
    Default,
    /// A case type default replaced by a physician preference.
    PhysicianOverride,
    /// A tray added by a physician preference.
    PhysicianAddition,
}

impl std::fmt::Display for RequirementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequirementSource::Default => write!(f, "default"),
            RequirementSource::PhysicianOverride => write!(f, "physician override"),
            RequirementSource::PhysicianAddition => write!(f, "physician addition"),
        }
    }
}

/// One line of a case's merged equipment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ResolvedRequirement {
    pub tray_id: String,
    pub tray_name: String,
    pub requirement_type: RequirementType,
    pub quantity: u32,
    pub priority: u8,
    pub notes: String,
    pub source: RequirementSource,
}

impl ResolvedRequirement {
    /// Tray name for display, falling back to the tray ID when no name was stored.
    pub fn display_name(&self) -> &str {
        if self.tray_name.trim().is_empty() {
            &self.tray_id
        } else {
            &self.tray_name
        }
    }
}

impl From<&CaseTypeRequirement> for ResolvedRequirement {
    fn from(req: &CaseTypeRequirement) -> Self {
        Self {
            tray_id: req.tray_id.clone(),
            tray_name: req.tray_name.clone(),
            requirement_type: req.requirement_type,
            quantity: req.quantity,
            priority: req.priority,
            notes: req.notes.clone(),
            source: RequirementSource::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_type_from_str_exact() {
        assert_eq!("required".parse(), Ok(RequirementType::Required));
        assert_eq!("preferred".parse(), Ok(RequirementType::Preferred));
        assert_eq!("optional".parse(), Ok(RequirementType::Optional));
        // Only the exact lowercase spellings are accepted
        assert!("Required".parse::<RequirementType>().is_err());
        assert!(" optional".parse::<RequirementType>().is_err());
        assert!("".parse::<RequirementType>().is_err());
    }

    #[test]
    fn test_requirement_type_ordering() {
        assert!(RequirementType::Required < RequirementType::Preferred);
        assert!(RequirementType::Preferred < RequirementType::Optional);
    }

    #[test]
    fn test_requirement_type_serde() {
        let json = serde_json::to_string(&RequirementType::Preferred).unwrap();
        assert_eq!(json, "\"preferred\"");
        let parsed: RequirementType = serde_json::from_str("\"optional\"").unwrap();
        assert_eq!(parsed, RequirementType::Optional);
    }

    #[test]
    fn test_display_name_falls_back_to_tray_id() {
        let mut resolved = ResolvedRequirement {
            tray_id: "T1".to_string(),
            tray_name: "  ".to_string(),
            requirement_type: RequirementType::Required,
            quantity: 1,
            priority: 1,
            notes: String::new(),
            source: RequirementSource::Default,
        };
        assert_eq!(resolved.display_name(), "T1");

        resolved.tray_name = "Lateral SI Fusion Set".to_string();
        assert_eq!(resolved.display_name(), "Lateral SI Fusion Set");
    }

    #[test]
    fn test_preference_skips_unset_optionals() {
        let pref = PhysicianPreference {
            physician_id: "dr-1".to_string(),
            case_type: "SI fusion".to_string(),
            tray_id: "T1".to_string(),
            tray_name: String::new(),
            requirement_type: RequirementType::Optional,
            quantity: 2,
            priority: None,
            notes: None,
        };
        let value = serde_json::to_value(&pref).unwrap();
        assert!(value.get("priority").is_none());
        assert!(value.get("notes").is_none());
    }
}
