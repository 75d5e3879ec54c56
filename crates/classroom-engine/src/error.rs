//! Error types for the classroom engine.
//!
//! This module defines the error hierarchy for chain mutations, replication,
//! exercise status changes, configuration loading, and store persistence.

use std::path::PathBuf;

use crate::model::{ExerciseStatus, NodeId, ScopeId};

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while operating on course content chains.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// The targeted node or scope is absent from storage.
    ///
    /// Callers treat this as a no-op: nothing was changed.
    #[error("{kind} not found: '{id}'")]
    NotFound {
        /// What was looked up ("module", "exercise", "course", "enrollment").
        kind: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    // ========================================================================
    // Chain Integrity Errors
    // ========================================================================
    /// A mutation would leave the chain inconsistent and was rejected.
    ///
    /// The stored chain is untouched when this is returned.
    #[error("Chain integrity violated in scope '{scope}': {violation}\n\nSuggestion: Repair the chain to relink it in its materialized order")]
    Integrity {
        /// Scope of the rejected chain.
        scope: ScopeId,
        /// The first violation detected.
        violation: IntegrityViolation,
    },

    // ========================================================================
    // Replication Errors
    // ========================================================================
    /// A retried replication found one source node copied more than once.
    #[error("Replication conflict in scope '{scope}': source '{source_ref}' has {copies} copies\n\nSuggestion: Remove the duplicate copies before retrying")]
    ReplicationConflict {
        /// Target scope of the replication.
        scope: ScopeId,
        /// The source node with multiple copies.
        source_ref: NodeId,
        /// How many copies were found.
        copies: usize,
    },

    // ========================================================================
    // Progression Errors
    // ========================================================================
    /// Exercise status change not permitted by the progression state machine.
    #[error("Invalid status transition: cannot go from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: ExerciseStatus,
        /// The requested status.
        to: ExerciseStatus,
    },

    /// A request carried values the engine cannot apply.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your classroom.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Store snapshot contains data that cannot be restored.
    #[error("Corrupted store file '{path}': {message}\n\nSuggestion: Restore the data file from backup or remove it to start empty")]
    StoreCorrupted {
        /// Path to the snapshot file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The specific way a chain fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityViolation {
    /// Two nodes share the same id.
    #[error("duplicate node id '{0}'")]
    DuplicateId(NodeId),

    /// A node belongs to a different scope than the chain.
    #[error("node '{0}' belongs to another scope")]
    ForeignScope(NodeId),

    /// A pointer refers to an id not present in the scope.
    #[error("node '{node}' points at missing node '{target}'")]
    DanglingPointer {
        /// Node carrying the pointer.
        node: NodeId,
        /// Unresolved target.
        target: NodeId,
    },

    /// `a.next == b` without `b.previous == a` (or the reverse).
    #[error("link between '{from}' and '{to}' is not mirrored")]
    AsymmetricLink {
        /// Node whose pointer is not reciprocated.
        from: NodeId,
        /// Node that should point back.
        to: NodeId,
    },

    /// No node has a null `previous`.
    #[error("chain has no head")]
    NoHead,

    /// More than one node has a null `previous`.
    #[error("chain has {0} heads")]
    MultipleHeads(usize),

    /// Walking `next` pointers revisits a node.
    #[error("cycle detected at '{0}'")]
    Cycle(NodeId),

    /// Nodes not reachable from the head.
    #[error("{0} node(s) unreachable from the head")]
    Unreachable(usize),
}

impl EngineError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates a new `Integrity` error.
    #[must_use]
    pub fn integrity(scope: impl Into<ScopeId>, violation: IntegrityViolation) -> Self {
        Self::Integrity {
            scope: scope.into(),
            violation,
        }
    }

    /// Creates a new `ReplicationConflict` error.
    #[must_use]
    pub fn replication_conflict(
        scope: impl Into<ScopeId>,
        source_ref: impl Into<NodeId>,
        copies: usize,
    ) -> Self {
        Self::ReplicationConflict {
            scope: scope.into(),
            source_ref: source_ref.into(),
            copies,
        }
    }

    /// Creates a new `InvalidTransition` error.
    #[must_use]
    pub const fn invalid_transition(from: ExerciseStatus, to: ExerciseStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `StoreCorrupted` error.
    #[must_use]
    pub fn store_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the caller's prior state is intact and the request
    /// can be retried or corrected.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Integrity { .. }
                | Self::ReplicationConflict { .. }
                | Self::InvalidTransition { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Returns `true` if the error was caused by the request rather than the
    /// engine or its environment.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InvalidTransition { .. } | Self::InvalidInput { .. }
        )
    }
}
