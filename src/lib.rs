//! Avro Compatibility Gate
//!
//! Fails a project's verification step when Avro IDL schemas evolve in a way
//! that breaks readers or writers of previously published data.
//!
//! ## Features
//!
//! - **IDL Parsing**: `.avdl` protocols, imports and all named types
//! - **Coverage Check**: every previously published schema must still exist
//! - **Compatibility Rules**: Avro schema resolution, full transitive by default
//! - **Artifact Resolution**: previous releases from Maven repositories or git
//! - **Task Wiring**: `avroCompatibilityCheck` runs as part of `check`
//!
//! ## Flow
//!
//! ```text
//! config ──> FileSetResolver ──> FileSets { source, against }
//!                                     │
//!                     SchemaLoader ───┴──> SchemaSet x2
//!                                             │
//!                     Evaluator (coverage, compatibility) ──> CheckReport
//! ```

pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod idl;
pub mod loader;
pub mod resolver;
pub mod schema;
pub mod task;

pub use checksum::Fingerprint;
pub use compatibility::{CompatibilityChecker, CompatibilityLevel, Incompatibility, IncompatibilityKind};
pub use config::{CompatConfig, RelocatedRole};
pub use error::{CompatError, Result};
pub use evaluator::{CheckReport, Evaluator};
pub use loader::{DuplicatePolicy, SchemaLoader, SchemaSet};
pub use resolver::{Coordinate, FileSetResolver, FileSets};
pub use schema::SchemaDefinition;
pub use task::{
    CompatibilityTask, Task, TaskGraph, TaskOutcome, CHECK_TASK_NAME, COMPATIBILITY_CHECK_TASK_NAME,
};
