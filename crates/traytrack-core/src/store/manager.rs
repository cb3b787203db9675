use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, ValidationError};
use crate::models::{
    CaseTypeRequirement, PhysicianPreference, RecordState, RequirementDraft, Stored,
};
use crate::normalize::normalize;
use crate::resolver::Resolution;
use crate::validation::{validate_case_type_requirement, validate_physician_preference};

pub type StoreResult<T> = Result<T, StoreError>;

/// A record collection, stored as one JSON array per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    CaseTypeRequirements,
    PhysicianPreferences,
}

impl Collection {
    pub const ALL: [Collection; 2] = [
        Collection::CaseTypeRequirements,
        Collection::PhysicianPreferences,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::CaseTypeRequirements => "case_type_requirements",
            Collection::PhysicianPreferences => "physician_preferences",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// File-backed access to the requirement collections.
///
/// Every document read passes through normalization and validation;
/// documents that fail either are logged and skipped. Writes validate first
/// and enforce one active record per key.
pub struct RecordStore {
    data_dir: PathBuf,
}

impl RecordStore {
    pub fn open(data_dir: PathBuf) -> StoreResult<Self> {
        std::fs::create_dir_all(&data_dir)?;
        debug!(dir = %data_dir.display(), "Opened record store");
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection.name()))
    }

    /// Read a collection's raw documents, normalized. A missing file is empty.
    pub fn load_documents(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&path)?;
        let docs: Vec<Value> = serde_json::from_str(&contents)?;
        Ok(docs.into_iter().map(normalize).collect())
    }

    fn save_documents(&self, collection: Collection, docs: &[Value]) -> StoreResult<()> {
        let path = self.collection_path(collection);
        let contents = serde_json::to_string_pretty(docs)?;
        std::fs::write(&path, contents)?;
        debug!(collection = %collection, count = docs.len(), "Saved collection");
        Ok(())
    }

    fn load_records<T>(
        &self,
        collection: Collection,
        validate: fn(&RequirementDraft) -> Result<T, ValidationError>,
    ) -> StoreResult<Vec<Stored<T>>> {
        let docs = self.load_documents(collection)?;
        let mut records = Vec::with_capacity(docs.len());

        for (position, doc) in docs.into_iter().enumerate() {
            let draft: RequirementDraft = match serde_json::from_value(doc) {
                Ok(draft) => draft,
                Err(e) => {
                    warn!(collection = %collection, position, error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            let id = document_id(draft.id.as_deref(), position);
            match validate(&draft) {
                Ok(record) => records.push(Stored {
                    id,
                    created_at: draft.created_at,
                    updated_at: draft.updated_at,
                    state: draft.state(),
                    record,
                }),
                Err(e) => {
                    warn!(collection = %collection, id = %id, error = %e, "Skipping invalid document");
                }
            }
        }

        Ok(records)
    }

    // ===== Case Type Requirements =====

    /// All readable case type requirements, deleted ones included.
    pub fn load_case_type_requirements(&self) -> StoreResult<Vec<Stored<CaseTypeRequirement>>> {
        self.load_records(Collection::CaseTypeRequirements, validate_case_type_requirement)
    }

    /// Active default requirements for one case type, in stored order.
    pub fn defaults_for(&self, case_type: &str) -> StoreResult<Vec<CaseTypeRequirement>> {
        Ok(active(self.load_case_type_requirements()?)
            .filter(|r| r.case_type == case_type)
            .collect())
    }

    pub fn add_case_type_requirement(
        &self,
        draft: &RequirementDraft,
    ) -> StoreResult<Stored<CaseTypeRequirement>> {
        let record = validate_case_type_requirement(draft)?;

        let duplicate = active(self.load_case_type_requirements()?)
            .any(|r| r.case_type == record.case_type && r.tray_id == record.tray_id);
        if duplicate {
            return Err(StoreError::Duplicate {
                key: format!("case type {:?}, tray {:?}", record.case_type, record.tray_id),
            });
        }

        let stored = new_stored(record);
        self.append(Collection::CaseTypeRequirements, &stored)?;
        info!(id = %stored.id, case_type = %stored.record.case_type, tray_id = %stored.record.tray_id, "Added case type requirement");
        Ok(stored)
    }

    // ===== Physician Preferences =====

    /// All readable physician preferences, deleted ones included.
    pub fn load_physician_preferences(&self) -> StoreResult<Vec<Stored<PhysicianPreference>>> {
        self.load_records(Collection::PhysicianPreferences, validate_physician_preference)
    }

    /// Active preferences of one physician for one case type, in stored order.
    pub fn preferences_for(
        &self,
        physician_id: &str,
        case_type: &str,
    ) -> StoreResult<Vec<PhysicianPreference>> {
        Ok(active(self.load_physician_preferences()?)
            .filter(|p| p.physician_id == physician_id && p.case_type == case_type)
            .collect())
    }

    pub fn add_physician_preference(
        &self,
        draft: &RequirementDraft,
    ) -> StoreResult<Stored<PhysicianPreference>> {
        let record = validate_physician_preference(draft)?;

        let duplicate = active(self.load_physician_preferences()?).any(|p| {
            p.physician_id == record.physician_id
                && p.case_type == record.case_type
                && p.tray_id == record.tray_id
        });
        if duplicate {
            return Err(StoreError::Duplicate {
                key: format!(
                    "physician {:?}, case type {:?}, tray {:?}",
                    record.physician_id, record.case_type, record.tray_id
                ),
            });
        }

        let stored = new_stored(record);
        self.append(Collection::PhysicianPreferences, &stored)?;
        info!(id = %stored.id, physician_id = %stored.record.physician_id, tray_id = %stored.record.tray_id, "Added physician preference");
        Ok(stored)
    }

    // ===== Resolution =====

    /// Load, scope and resolve the equipment list for a case.
    ///
    /// Without a physician only the case type defaults apply.
    pub fn resolve_case(
        &self,
        case_type: &str,
        physician_id: Option<&str>,
    ) -> StoreResult<Resolution> {
        let defaults = self.defaults_for(case_type)?;
        let preferences = match physician_id {
            Some(physician_id) => self.preferences_for(physician_id, case_type)?,
            None => Vec::new(),
        };
        Ok(Resolution::new(case_type, physician_id, &defaults, &preferences))
    }

    // ===== Lifecycle =====

    fn append<T: Serialize>(&self, collection: Collection, stored: &Stored<T>) -> StoreResult<()> {
        let mut docs = self.load_documents(collection)?;
        docs.push(stored.to_document()?);
        self.save_documents(collection, &docs)
    }

    /// Tombstone an active document. Deleted documents are kept.
    pub fn soft_delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let mut docs = self.load_documents(collection)?;

        let target = docs.iter_mut().enumerate().find_map(|(position, doc)| {
            let doc_id = doc.get("id").and_then(Value::as_str);
            let is_match = document_id(doc_id, position) == id;
            let is_active = matches!(doc.get("deleted_at"), None | Some(Value::Null));
            (is_match && is_active).then_some(doc)
        });

        let Some(Value::Object(doc)) = target else {
            return Err(StoreError::NotFound(id.to_string()));
        };

        let now = serde_json::to_value(Utc::now())?;
        doc.insert("deleted_at".to_string(), now.clone());
        doc.insert("updated_at".to_string(), now);
        self.save_documents(collection, &docs)?;
        info!(collection = %collection, id, "Soft-deleted record");
        Ok(())
    }

    /// Most recent modification time across all collection files.
    ///
    /// Used to poll for changes; `None` when no collection file exists.
    pub fn last_modified(&self) -> Option<SystemTime> {
        Collection::ALL
            .iter()
            .filter_map(|&c| std::fs::metadata(self.collection_path(c)).ok())
            .filter_map(|meta| meta.modified().ok())
            .max()
    }
}

fn active<T>(records: Vec<Stored<T>>) -> impl Iterator<Item = T> {
    records
        .into_iter()
        .filter(|r| r.state == RecordState::Active)
        .map(|r| r.record)
}

fn new_stored<T>(record: T) -> Stored<T> {
    let now = Utc::now();
    Stored {
        id: Uuid::new_v4().to_string(),
        created_at: Some(now),
        updated_at: Some(now),
        state: RecordState::Active,
        record,
    }
}

/// Documents written before IDs were assigned are addressed by position.
fn document_id(id: Option<&str>, position: usize) -> String {
    match id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("#{}", position),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{RequirementSource, RequirementType};
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    const CASE: &str = "SI fusion - lateral";

    fn store_with(defaults: Value, preferences: Value) -> (TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("case_type_requirements.json"),
            defaults.to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("physician_preferences.json"),
            preferences.to_string(),
        )
        .unwrap();
        let store = RecordStore::open(dir.path().to_path_buf()).unwrap();
        (dir, store)
    }

    fn empty_store() -> (TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("data")).unwrap();
        (dir, store)
    }

    fn draft(value: Value) -> RequirementDraft {
        serde_json::from_value(value).unwrap()
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    #[test]
    fn test_missing_files_are_empty() {
        let (_dir, store) = empty_store();
        assert!(store.load_case_type_requirements().unwrap().is_empty());
        assert!(store.last_modified().is_none());

        let resolution = store.resolve_case(CASE, Some("dr-1")).unwrap();
        assert!(resolution.is_unconfigured());
    }

    #[test]
    fn test_legacy_documents_normalized_and_filtered() {
        let (_dir, store) = store_with(
            json!([
                {"id": "a", "caseType": CASE, "trayId": "T1", "requirementType": "required"},
                {"id": "b", "case_type": CASE, "tray_id": "T2", "requirement_type": "optional",
                 "deletedAt": "2024-01-05T10:00:00Z"},
                {"id": "c", "case_type": "Other", "tray_id": "T3", "requirement_type": "required"}
            ]),
            json!([]),
        );

        let all = store.load_case_type_requirements().unwrap();
        assert_eq!(all.len(), 3);
        assert!(!all[1].is_active());

        let defaults = store.defaults_for(CASE).unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].tray_id, "T1");
    }

    #[test]
    fn test_invalid_documents_skipped() {
        let (_dir, store) = store_with(
            json!([
                {"id": "ok", "case_type": CASE, "tray_id": "T1", "requirement_type": "required"},
                {"id": "bad-qty", "case_type": CASE, "tray_id": "T2", "requirement_type": "required", "quantity": 0},
                "not even an object"
            ]),
            json!([]),
        );

        let ids: Vec<String> = store
            .load_case_type_requirements()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["ok".to_string()]);
    }

    #[test]
    fn test_legacy_timestamps_do_not_drop_records() {
        let (_dir, store) = store_with(
            json!([
                {"id": "millis", "caseType": "SI", "trayId": "T1", "requirementType": "required",
                 "createdAt": 1704067200000_i64},
                {"id": "object", "caseType": "SI", "trayId": "T2", "requirementType": "required",
                 "createdAt": {"seconds": 1704067200, "nanoseconds": 0}},
                {"id": "garbled", "caseType": "SI", "trayId": "T3", "requirementType": "optional",
                 "updatedAt": "last tuesday"}
            ]),
            json!([]),
        );

        let resolution = store.resolve_case("SI", None).unwrap();
        let trays: Vec<&str> = resolution.requirements.iter().map(|r| r.tray_id.as_str()).collect();
        assert_eq!(trays, vec!["T1", "T2", "T3"]);

        let all = store.load_case_type_requirements().unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(all[0].created_at, Some(expected));
        assert_eq!(all[1].created_at, Some(expected));
        assert_eq!(all[2].updated_at, None);

        // Still visible to the duplicate check
        let again = draft(json!({"case_type": "SI", "tray_id": "T1", "requirement_type": "optional"}));
        assert!(matches!(
            store.add_case_type_requirement(&again),
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_any_tombstone_value_deletes() {
        let (_dir, store) = store_with(
            json!([
                {"id": "a", "case_type": CASE, "tray_id": "T1", "requirement_type": "required",
                 "deletedAt": 1704067200000_i64},
                {"id": "b", "case_type": CASE, "tray_id": "T2", "requirement_type": "required",
                 "deleted_at": "not a date"},
                {"id": "c", "case_type": CASE, "tray_id": "T3", "requirement_type": "required",
                 "deleted_at": null}
            ]),
            json!([]),
        );

        let defaults = store.defaults_for(CASE).unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].tray_id, "T3");

        // Already tombstoned, even with an unreadable timestamp
        assert!(matches!(
            store.soft_delete(Collection::CaseTypeRequirements, "b"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_surgeon_field_scopes_preferences() {
        let (_dir, store) = store_with(
            json!([]),
            json!([
                {"surgeon": "dr-1", "caseType": CASE, "trayId": "T1", "requirementType": "optional"},
                {"surgeon": "dr-2", "caseType": CASE, "trayId": "T2", "requirementType": "optional"}
            ]),
        );

        let prefs = store.preferences_for("dr-1", CASE).unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].tray_id, "T1");
        assert!(store.preferences_for("dr-1", "Other").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_case_merges_scoped_records() {
        let (_dir, store) = store_with(
            json!([
                {"case_type": CASE, "tray_id": "T1", "requirement_type": "required", "priority": 1},
                {"case_type": CASE, "tray_id": "T2", "requirement_type": "preferred", "priority": 2}
            ]),
            json!([
                {"physician_id": "dr-1", "case_type": CASE, "tray_id": "T2", "requirement_type": "required", "quantity": 2},
                {"physician_id": "dr-2", "case_type": CASE, "tray_id": "T9", "requirement_type": "required", "priority": 1}
            ]),
        );

        let resolution = store.resolve_case(CASE, Some("dr-1")).unwrap();
        let trays: Vec<&str> = resolution.requirements.iter().map(|r| r.tray_id.as_str()).collect();
        assert_eq!(trays, vec!["T1", "T2"]);
        assert_eq!(resolution.requirements[1].quantity, 2);
        assert_eq!(resolution.requirements[1].source, RequirementSource::PhysicianOverride);

        let defaults_only = store.resolve_case(CASE, None).unwrap();
        assert_eq!(defaults_only.requirements[1].requirement_type, RequirementType::Preferred);
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    #[test]
    fn test_add_rejects_invalid_with_all_violations() {
        let (_dir, store) = empty_store();
        let err = store
            .add_physician_preference(&draft(json!({"case_type": CASE, "quantity": 0})))
            .unwrap_err();

        match err {
            StoreError::Invalid(e) => {
                assert!(e.contains("Physician ID is required"));
                assert!(e.contains("Tray ID is required"));
                assert!(e.contains("Quantity must be at least 1"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(store.last_modified().is_none());
    }

    #[test]
    fn test_add_enforces_one_active_record_per_key() {
        let (_dir, store) = empty_store();
        let input = draft(json!({"case_type": CASE, "tray_id": "T1", "requirement_type": "required"}));

        let first = store.add_case_type_requirement(&input).unwrap();
        assert!(first.created_at.is_some());
        assert!(matches!(
            store.add_case_type_requirement(&input),
            Err(StoreError::Duplicate { .. })
        ));

        // A tombstoned record frees the key
        store
            .soft_delete(Collection::CaseTypeRequirements, &first.id)
            .unwrap();
        let second = store.add_case_type_requirement(&input).unwrap();
        assert_ne!(first.id, second.id);

        let all = store.load_case_type_requirements().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.defaults_for(CASE).unwrap().len(), 1);
    }

    #[test]
    fn test_preference_key_includes_physician() {
        let (_dir, store) = empty_store();
        let base = json!({"case_type": CASE, "tray_id": "T1", "requirement_type": "optional"});

        let mut one = base.clone();
        one["physician_id"] = json!("dr-1");
        let mut two = base;
        two["physician_id"] = json!("dr-2");

        store.add_physician_preference(&draft(one.clone())).unwrap();
        store.add_physician_preference(&draft(two)).unwrap();
        assert!(matches!(
            store.add_physician_preference(&draft(one)),
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_soft_delete_unknown_or_deleted() {
        let (_dir, store) = store_with(
            json!([
                {"case_type": CASE, "tray_id": "T1", "requirement_type": "required"},
                {"id": "gone", "case_type": CASE, "tray_id": "T2", "requirement_type": "required",
                 "deleted_at": "2024-01-05T10:00:00Z"}
            ]),
            json!([]),
        );

        assert!(matches!(
            store.soft_delete(Collection::CaseTypeRequirements, "missing"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.soft_delete(Collection::CaseTypeRequirements, "gone"),
            Err(StoreError::NotFound(_))
        ));

        // Documents without an id are addressed by position
        store
            .soft_delete(Collection::CaseTypeRequirements, "#0")
            .unwrap();
        assert!(store.defaults_for(CASE).unwrap().is_empty());
    }

    #[test]
    fn test_writes_canonicalize_documents() {
        let (_dir, store) = store_with(
            json!([{"id": "a", "caseType": CASE, "trayId": "T1", "requirementType": "required"}]),
            json!([]),
        );
        store
            .add_case_type_requirement(&draft(json!({
                "case_type": CASE, "tray_id": "T2", "requirement_type": "optional"
            })))
            .unwrap();

        let raw = std::fs::read_to_string(store.data_dir().join("case_type_requirements.json")).unwrap();
        assert!(!raw.contains("caseType"));
        assert!(raw.contains("\"tray_id\": \"T1\""));
        assert!(store.last_modified().is_some());
    }
}
