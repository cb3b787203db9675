//! Data models for tray requirement records.
//!
//! - `CaseTypeRequirement`: a case type's default tray requirement
//! - `PhysicianPreference`: a surgeon's override or addition for a case type
//! - `ResolvedRequirement`: one entry of a merged equipment list
//! - `RequirementDraft`, `Stored`, `RecordState`: storage-facing shapes

pub mod record;
pub mod requirement;

pub use record::{RecordState, RequirementDraft, Stored};
pub use requirement::{
    CaseTypeRequirement, PhysicianPreference, RequirementSource, RequirementType,
    ResolvedRequirement, UnknownRequirementType,
};
