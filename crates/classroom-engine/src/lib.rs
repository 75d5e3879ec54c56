//! Classroom Engine
//!
//! Ordered module and exercise chains across template, teacher, course and
//! student tiers, with replication, progression, and an HTTP API.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod model;
pub mod progression;
pub mod replicate;
pub mod service;
pub mod store;
pub mod sync;

pub use api::{create_router, AppState, ErrorResponse, MoveResponse, StatusResponse};
pub use chain::{Chain, Materialized};
pub use config::Config;
pub use error::{EngineError, IntegrityViolation, Result};
pub use model::{
    Enrollment, ExerciseBody, ExerciseDraft, ExerciseNode, ExerciseStatus, ModuleBody,
    ModuleDraft, ModuleNode, ModuleType, Node, NodeId, ScopeId, StudentId, StudentProgress, Tier,
};
pub use progression::EnrollmentSummary;
pub use replicate::{CopyPair, IdGenerator, ReplicationReport, SequentialIds, UuidIds};
pub use service::{Classroom, CopyReport, EnrollmentReport, ProgressUpdate, SyncReport};
pub use store::{MemoryStore, NodeStore, StoreSnapshot, StoreStats, STORE_VERSION};
