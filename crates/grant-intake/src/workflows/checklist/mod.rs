//! Requirements library and the deduplicated checklist computed from a program shortlist.

pub mod builder;
pub mod library;

pub use builder::{build_checklist, outstanding, ChecklistItem, ChecklistSource};
pub use library::{
    DocumentSpec, ExtractSpec, FieldRequirement, LibraryError, ProgramKey, ProgramRequirements,
    RequirementsLibrary,
};
