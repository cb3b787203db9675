//! Core library for traytrack.
//!
//! Resolves which surgical trays a scheduled case needs by merging a case
//! type's default tray requirements with a physician's preferences.
//!
//! - [`normalize`]: canonicalize legacy field names on stored documents
//! - [`validation`]: field rules for both record kinds
//! - [`resolver`]: the merge and ordering of requirements
//! - [`store`]: JSON file collections feeding the resolver
//! - [`config`]: application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod resolver;
pub mod store;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::{StoreError, ValidationError};
pub use models::{
    CaseTypeRequirement, PhysicianPreference, RecordState, RequirementDraft, RequirementSource,
    RequirementType, ResolvedRequirement, Stored,
};
pub use normalize::normalize;
pub use resolver::{resolve, Resolution};
pub use store::{Collection, RecordStore};
pub use validation::{validate_case_type_requirement, validate_physician_preference};
