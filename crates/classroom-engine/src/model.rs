//! Node and identifier types shared by every chain tier.
//!
//! Modules and exercises are both stored as [`Node`]s: an id, the scope the
//! node is chained in, `previous`/`next` sibling pointers, and a tier-agnostic
//! payload. Pointers are ids into the scope's node set, never references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identifier of a module or exercise node, unique within its tier.
    NodeId
);

id_type!(
    /// Identifier of a chain scope.
    ///
    /// Module chains are scoped by course (or by student enrollment), exercise
    /// chains by the id of their owning module.
    ScopeId
);

id_type!(
    /// Identifier of an enrolled student.
    StudentId
);

impl ScopeId {
    /// Scope of a student's personal module chain within a course.
    #[must_use]
    pub fn for_student(course_id: &Self, student_id: &StudentId) -> Self {
        Self(format!("{course_id}/students/{student_id}"))
    }
}

impl From<NodeId> for ScopeId {
    fn from(module_id: NodeId) -> Self {
        Self(module_id.0)
    }
}

impl From<&NodeId> for ScopeId {
    fn from(module_id: &NodeId) -> Self {
        Self(module_id.0.clone())
    }
}

// ============================================================================
// Tier
// ============================================================================

/// Ownership level at which a copy of a chain exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Authored once by administrators.
    Template,
    /// A teacher's own reusable content.
    Teacher,
    /// Content attached to one course.
    Course,
    /// A student's personal copy with progress.
    Student,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Teacher => write!(f, "teacher"),
            Self::Course => write!(f, "course"),
            Self::Student => write!(f, "student"),
        }
    }
}

// ============================================================================
// ModuleType
// ============================================================================

/// Unlock policy a module applies to its exercises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// Every exercise is available at once.
    #[default]
    All,
    /// Exercises unlock one after another as the previous one clears.
    Progress,
}

impl ModuleType {
    /// Parses a string into a `ModuleType`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(Self::All),
            "progress" => Some(Self::Progress),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Progress => write!(f, "progress"),
        }
    }
}

impl<'de> Deserialize<'de> for ModuleType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid module type '{s}': expected one of 'all', 'progress'"
            ))
        })
    }
}

impl Serialize for ModuleType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

// ============================================================================
// ExerciseStatus
// ============================================================================

/// Progress status of a student-tier exercise.
///
/// The forward path is `Pending` -> `Ready` -> `InProgress` -> `Completed`
/// -> `Reviewed`; a revoked grade sends `Completed`/`Reviewed` back to `Ready`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseStatus {
    /// Locked until the unlock policy releases it.
    #[default]
    Pending,
    /// Available to start.
    Ready,
    /// Started by the student.
    InProgress,
    /// Submitted by the student.
    Completed,
    /// Graded by a teacher.
    Reviewed,
}

impl ExerciseStatus {
    /// Returns `true` once the exercise counts as done for unlocking and progress.
    #[must_use]
    pub const fn is_cleared(&self) -> bool {
        matches!(self, Self::Completed | Self::Reviewed)
    }

    /// Returns `true` if the exercise has been released to the student.
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ExerciseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Reviewed => write!(f, "reviewed"),
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// A chained record: one module or exercise at one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node<T> {
    /// Unique id within the tier.
    pub id: NodeId,

    /// Scope the node is chained in.
    pub scope_id: ScopeId,

    /// Ownership tier.
    pub tier: Tier,

    /// Preceding sibling, `None` at the head.
    #[serde(default)]
    pub previous: Option<NodeId>,

    /// Following sibling, `None` at the tail.
    #[serde(default)]
    pub next: Option<NodeId>,

    /// Position hint, consulted only when pointer traversal fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,

    /// Node this one was copied from in the tier above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<NodeId>,

    /// Creation time, the primary fallback ordering key.
    pub created_at: DateTime<Utc>,

    /// Tier-agnostic content.
    #[serde(flatten)]
    pub body: T,
}

impl<T> Node<T> {
    /// Creates an unlinked node stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, scope_id: impl Into<ScopeId>, tier: Tier, body: T) -> Self {
        Self {
            id: id.into(),
            scope_id: scope_id.into(),
            tier,
            previous: None,
            next: None,
            order: None,
            source_ref: None,
            created_at: Utc::now(),
            body,
        }
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sets the source reference.
    #[must_use]
    pub fn with_source(mut self, source_ref: impl Into<NodeId>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    /// Sets both sibling pointers.
    #[must_use]
    pub fn with_links(mut self, previous: Option<&str>, next: Option<&str>) -> Self {
        self.previous = previous.map(NodeId::from);
        self.next = next.map(NodeId::from);
        self
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Module content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBody {
    /// Display title.
    pub title: String,

    /// Unlock policy for the module's exercises.
    #[serde(rename = "type", default)]
    pub module_type: ModuleType,

    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModuleBody {
    /// Creates a module body with no description.
    #[must_use]
    pub fn new(title: impl Into<String>, module_type: ModuleType) -> Self {
        Self {
            title: title.into(),
            module_type,
            description: None,
        }
    }
}

/// Per-student progress carried by student-tier exercises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    /// Current status.
    pub status: ExerciseStatus,

    /// Grade assigned by the teacher, in `0..=max_score`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,

    /// Number of submissions.
    #[serde(default)]
    pub attempts: u32,

    /// Highest grade ever assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<u32>,
}

/// Exercise content, plus progress at the student tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseBody {
    /// Display title.
    pub title: String,

    /// Exercise content (markdown, rendered elsewhere).
    #[serde(default)]
    pub content: String,

    /// Maximum achievable score.
    pub max_score: u32,

    /// Course-tier exercise a student copy derives from; `None` marks an extra.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_exercise_ref: Option<NodeId>,

    /// Student progress, present only at the student tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<StudentProgress>,
}

impl ExerciseBody {
    /// Creates an exercise body without progress.
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>, max_score: u32) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            max_score,
            course_exercise_ref: None,
            progress: None,
        }
    }

    /// Current status, if this is a student copy.
    #[must_use]
    pub fn status(&self) -> Option<ExerciseStatus> {
        self.progress.as_ref().map(|p| p.status)
    }
}

/// A module node at any tier.
pub type ModuleNode = Node<ModuleBody>;

/// An exercise node at any tier.
pub type ExerciseNode = Node<ExerciseBody>;

impl ExerciseNode {
    /// Returns `true` for student exercises with no course counterpart.
    #[must_use]
    pub fn is_extra(&self) -> bool {
        self.tier == Tier::Student && self.body.course_exercise_ref.is_none()
    }
}

// ============================================================================
// Drafts and Enrollments
// ============================================================================

/// Input for authoring a new module.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDraft {
    /// Display title.
    pub title: String,
    /// Unlock policy.
    #[serde(rename = "type", default)]
    pub module_type: ModuleType,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for authoring a new exercise.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDraft {
    /// Display title.
    pub title: String,
    /// Exercise content.
    #[serde(default)]
    pub content: String,
    /// Maximum score; the configured default applies when omitted.
    #[serde(default)]
    pub max_score: Option<u32>,
}

/// A student's enrollment in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    /// The course scope.
    pub course_id: ScopeId,
    /// The enrolled student.
    pub student_id: StudentId,
    /// Scope of the student's module chain.
    pub scope_id: ScopeId,
    /// When the student was first enrolled.
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    /// Creates an enrollment with the derived student scope.
    #[must_use]
    pub fn new(course_id: ScopeId, student_id: StudentId) -> Self {
        let scope_id = ScopeId::for_student(&course_id, &student_id);
        Self {
            course_id,
            student_id,
            scope_id,
            enrolled_at: Utc::now(),
        }
    }
}
