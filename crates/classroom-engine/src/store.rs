//! Node storage.
//!
//! [`NodeStore`] is the persistence seam: lookups by id and by scope, whole
//! scope write-back, and the reverse lookups synchronization needs.
//! [`MemoryStore`] keeps everything in concurrent maps and can be snapshotted
//! to a versioned JSON file.

use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::Chain;
use crate::error::{EngineError, Result};
use crate::model::{
    Enrollment, ExerciseBody, ExerciseNode, ModuleBody, ModuleNode, Node, NodeId, ScopeId,
    StudentId,
};
use crate::progression::EnrollmentSummary;

/// Current snapshot format version.
pub const STORE_VERSION: u32 = 1;

/// Record counts, as reported by the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Module nodes across all tiers.
    pub modules: usize,
    /// Exercise nodes across all tiers.
    pub exercises: usize,
    /// Distinct module chains.
    pub module_scopes: usize,
    /// Distinct exercise chains.
    pub exercise_scopes: usize,
    /// Enrollments.
    pub enrollments: usize,
}

/// Storage backend for chains, enrollments, and cached summaries.
///
/// Scope reads return nodes in insertion order; that order is what the
/// materializer falls back on for orphans.
pub trait NodeStore: Send + Sync {
    /// Module by id.
    fn module(&self, id: &NodeId) -> Option<ModuleNode>;

    /// All modules chained in `scope`.
    fn modules(&self, scope: &ScopeId) -> Vec<ModuleNode>;

    /// Replaces every module of the chain's scope with the chain's nodes.
    fn write_modules(&self, chain: &Chain<ModuleBody>);

    /// Modules (at any tier) copied from `source`.
    fn modules_sourced_from(&self, source: &NodeId) -> Vec<ModuleNode>;

    /// Exercise by id.
    fn exercise(&self, id: &NodeId) -> Option<ExerciseNode>;

    /// All exercises chained in `scope` (a module id).
    fn exercises(&self, scope: &ScopeId) -> Vec<ExerciseNode>;

    /// Replaces every exercise of the chain's scope with the chain's nodes.
    fn write_exercises(&self, chain: &Chain<ExerciseBody>);

    /// Deletes a whole exercise chain, returning how many nodes went.
    fn delete_exercises(&self, scope: &ScopeId) -> usize;

    /// Student exercises whose `course_exercise_ref` is `course_exercise`.
    fn exercises_derived_from(&self, course_exercise: &NodeId) -> Vec<ExerciseNode>;

    /// Enrollment of `student` in `course`.
    fn enrollment(&self, course: &ScopeId, student: &StudentId) -> Option<Enrollment>;

    /// Enrollment owning a student module scope.
    fn enrollment_by_scope(&self, scope: &ScopeId) -> Option<Enrollment>;

    /// All enrollments of a course, oldest first.
    fn enrollments(&self, course: &ScopeId) -> Vec<Enrollment>;

    /// Inserts or replaces an enrollment.
    fn put_enrollment(&self, enrollment: Enrollment);

    /// Last computed summary for an enrollment.
    fn summary(&self, course: &ScopeId, student: &StudentId) -> Option<EnrollmentSummary>;

    /// Stores a freshly computed summary.
    fn put_summary(&self, summary: EnrollmentSummary);

    /// Record counts.
    fn stats(&self) -> StoreStats;
}

// ============================================================================
// Collection
// ============================================================================

/// Nodes of one kind, indexed by id and by scope.
#[derive(Debug)]
struct Collection<T> {
    nodes: DashMap<NodeId, Node<T>>,
    scopes: DashMap<ScopeId, Vec<NodeId>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            nodes: DashMap::new(),
            scopes: DashMap::new(),
        }
    }
}

impl<T: Clone> Collection<T> {
    fn get(&self, id: &NodeId) -> Option<Node<T>> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    fn in_scope(&self, scope: &ScopeId) -> Vec<Node<T>> {
        let ids = self.scope_ids(scope);
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    fn scope_ids(&self, scope: &ScopeId) -> Vec<NodeId> {
        self.scopes
            .get(scope)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Inserts a loaded node. Returns `false` if the id was already taken.
    fn insert(&self, node: Node<T>) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.scopes
            .entry(node.scope_id.clone())
            .or_default()
            .push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        true
    }

    fn replace_scope(&self, scope: &ScopeId, nodes: &[Node<T>]) {
        let stale = self.scope_ids(scope);
        for id in &stale {
            if !nodes.iter().any(|n| &n.id == id) {
                self.nodes.remove(id);
            }
        }
        for node in nodes {
            self.nodes.insert(node.id.clone(), node.clone());
        }
        if nodes.is_empty() {
            self.scopes.remove(scope);
        } else {
            self.scopes
                .insert(scope.clone(), nodes.iter().map(|n| n.id.clone()).collect());
        }
    }

    fn delete_scope(&self, scope: &ScopeId) -> usize {
        let Some((_, ids)) = self.scopes.remove(scope) else {
            return 0;
        };
        ids.iter().filter(|id| self.nodes.remove(*id).is_some()).count()
    }

    fn find(&self, predicate: impl Fn(&Node<T>) -> bool) -> Vec<Node<T>> {
        let mut found: Vec<Node<T>> = self
            .nodes
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Every node, grouped by scope in insertion order.
    fn all(&self) -> Vec<Node<T>> {
        let mut scopes: Vec<ScopeId> = self.scopes.iter().map(|e| e.key().clone()).collect();
        scopes.sort();
        scopes.iter().flat_map(|scope| self.in_scope(scope)).collect()
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Concurrent in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    modules: Collection<ModuleBody>,
    exercises: Collection<ExerciseBody>,
    /// Keyed by the student module scope.
    enrollments: DashMap<ScopeId, Enrollment>,
    /// Keyed by the student module scope.
    summaries: DashMap<ScopeId, EnrollmentSummary>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the full store contents.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut enrollments: Vec<Enrollment> =
            self.enrollments.iter().map(|e| e.value().clone()).collect();
        enrollments.sort_by(|a, b| a.scope_id.cmp(&b.scope_id));
        let mut summaries: Vec<EnrollmentSummary> =
            self.summaries.iter().map(|e| e.value().clone()).collect();
        summaries.sort_by(|a, b| {
            (&a.course_id, &a.student_id).cmp(&(&b.course_id, &b.student_id))
        });

        StoreSnapshot {
            version: STORE_VERSION,
            saved_at: Utc::now(),
            modules: self.modules.all(),
            exercises: self.exercises.all(),
            enrollments,
            summaries,
        }
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// Nodes reusing an already loaded id are dropped with a warning.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for node in snapshot.modules {
            let id = node.id.clone();
            if !store.modules.insert(node) {
                warn!(module = %id, "Dropping module with duplicate id from snapshot");
            }
        }
        for node in snapshot.exercises {
            let id = node.id.clone();
            if !store.exercises.insert(node) {
                warn!(exercise = %id, "Dropping exercise with duplicate id from snapshot");
            }
        }
        for enrollment in snapshot.enrollments {
            store.put_enrollment(enrollment);
        }
        for summary in snapshot.summaries {
            store.put_summary(summary);
        }
        store
    }

    /// Writes a snapshot to `path`.
    ///
    /// The file is written next to its destination and renamed into place.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(
            path = %path.display(),
            modules = snapshot.modules.len(),
            exercises = snapshot.exercises.len(),
            "Saved store snapshot"
        );
        Ok(())
    }

    /// Loads a snapshot from `path`, or `None` if the file does not exist.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: StoreSnapshot = serde_json::from_slice(&contents)
            .map_err(|e| EngineError::store_corrupted(path, e.to_string()))?;
        if snapshot.version != STORE_VERSION {
            return Err(EngineError::store_corrupted(
                path,
                format!(
                    "unsupported version {} (expected {STORE_VERSION})",
                    snapshot.version
                ),
            ));
        }

        Ok(Some(Self::from_snapshot(snapshot)))
    }
}

impl NodeStore for MemoryStore {
    fn module(&self, id: &NodeId) -> Option<ModuleNode> {
        self.modules.get(id)
    }

    fn modules(&self, scope: &ScopeId) -> Vec<ModuleNode> {
        self.modules.in_scope(scope)
    }

    fn write_modules(&self, chain: &Chain<ModuleBody>) {
        self.modules.replace_scope(chain.scope(), chain.nodes());
    }

    fn modules_sourced_from(&self, source: &NodeId) -> Vec<ModuleNode> {
        self.modules.find(|n| n.source_ref.as_ref() == Some(source))
    }

    fn exercise(&self, id: &NodeId) -> Option<ExerciseNode> {
        self.exercises.get(id)
    }

    fn exercises(&self, scope: &ScopeId) -> Vec<ExerciseNode> {
        self.exercises.in_scope(scope)
    }

    fn write_exercises(&self, chain: &Chain<ExerciseBody>) {
        self.exercises.replace_scope(chain.scope(), chain.nodes());
    }

    fn delete_exercises(&self, scope: &ScopeId) -> usize {
        self.exercises.delete_scope(scope)
    }

    fn exercises_derived_from(&self, course_exercise: &NodeId) -> Vec<ExerciseNode> {
        self.exercises
            .find(|n| n.body.course_exercise_ref.as_ref() == Some(course_exercise))
    }

    fn enrollment(&self, course: &ScopeId, student: &StudentId) -> Option<Enrollment> {
        self.enrollment_by_scope(&ScopeId::for_student(course, student))
    }

    fn enrollment_by_scope(&self, scope: &ScopeId) -> Option<Enrollment> {
        self.enrollments.get(scope).map(|e| e.value().clone())
    }

    fn enrollments(&self, course: &ScopeId) -> Vec<Enrollment> {
        let mut found: Vec<Enrollment> = self
            .enrollments
            .iter()
            .filter(|e| &e.value().course_id == course)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.enrolled_at.cmp(&b.enrolled_at).then_with(|| a.scope_id.cmp(&b.scope_id)));
        found
    }

    fn put_enrollment(&self, enrollment: Enrollment) {
        self.enrollments.insert(enrollment.scope_id.clone(), enrollment);
    }

    fn summary(&self, course: &ScopeId, student: &StudentId) -> Option<EnrollmentSummary> {
        self.summaries
            .get(&ScopeId::for_student(course, student))
            .map(|s| s.value().clone())
    }

    fn put_summary(&self, summary: EnrollmentSummary) {
        let scope = ScopeId::for_student(&summary.course_id, &summary.student_id);
        self.summaries.insert(scope, summary);
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            modules: self.modules.nodes.len(),
            exercises: self.exercises.nodes.len(),
            module_scopes: self.modules.scopes.len(),
            exercise_scopes: self.exercises.scopes.len(),
            enrollments: self.enrollments.len(),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Format version, see [`STORE_VERSION`].
    pub version: u32,

    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,

    /// Module nodes, grouped by scope.
    #[serde(default)]
    pub modules: Vec<ModuleNode>,

    /// Exercise nodes, grouped by scope.
    #[serde(default)]
    pub exercises: Vec<ExerciseNode>,

    /// Enrollments.
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,

    /// Cached enrollment summaries.
    #[serde(default)]
    pub summaries: Vec<EnrollmentSummary>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ModuleType, Tier};

    fn module(id: &str, scope: &str) -> ModuleNode {
        Node::new(id, scope, Tier::Course, ModuleBody::new(id.to_uppercase(), ModuleType::All))
    }

    fn module_chain(scope: &str, ids: &[&str]) -> Chain<ModuleBody> {
        let mut chain = Chain::new(ScopeId::new(scope));
        for id in ids {
            chain.append(module(id, scope)).unwrap();
        }
        chain
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("classroom-store-{}-{name}", std::process::id()))
            .join("store.json")
    }

    #[test]
    fn test_write_and_read_scope() {
        let store = MemoryStore::new();
        store.write_modules(&module_chain("c1", &["a", "b"]));

        let ids: Vec<String> = store
            .modules(&ScopeId::new("c1"))
            .into_iter()
            .map(|n| n.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.module(&NodeId::new("b")).unwrap().previous, Some(NodeId::new("a")));
        assert!(store.modules(&ScopeId::new("other")).is_empty());
    }

    #[test]
    fn test_write_back_drops_removed_nodes() {
        let store = MemoryStore::new();
        let mut chain = module_chain("c1", &["a", "b", "c"]);
        store.write_modules(&chain);

        chain.remove(&NodeId::new("b")).unwrap();
        store.write_modules(&chain);

        assert!(store.module(&NodeId::new("b")).is_none());
        assert_eq!(store.modules(&ScopeId::new("c1")).len(), 2);
        assert_eq!(store.stats().modules, 2);
    }

    #[test]
    fn test_reverse_lookups() {
        let store = MemoryStore::new();
        let mut chain = Chain::new(ScopeId::new("c1"));
        chain.append(module("copy", "c1").with_source("tpl")).unwrap();
        store.write_modules(&chain);

        let mut exercises = Chain::new(ScopeId::new("copy"));
        let mut body = ExerciseBody::new("E", "", 10);
        body.course_exercise_ref = Some(NodeId::new("ce"));
        exercises.append(Node::new("se", "copy", Tier::Student, body)).unwrap();
        store.write_exercises(&exercises);

        assert_eq!(store.modules_sourced_from(&NodeId::new("tpl")).len(), 1);
        assert_eq!(store.exercises_derived_from(&NodeId::new("ce"))[0].id, NodeId::new("se"));
        assert!(store.exercises_derived_from(&NodeId::new("zz")).is_empty());

        assert_eq!(store.delete_exercises(&ScopeId::new("copy")), 1);
        assert!(store.exercise(&NodeId::new("se")).is_none());
    }

    #[test]
    fn test_enrollment_lookup() {
        let store = MemoryStore::new();
        let enrollment = Enrollment::new(ScopeId::new("c1"), StudentId::new("s1"));
        store.put_enrollment(enrollment.clone());

        assert_eq!(store.enrollment(&ScopeId::new("c1"), &StudentId::new("s1")), Some(enrollment.clone()));
        assert_eq!(store.enrollment_by_scope(&enrollment.scope_id), Some(enrollment));
        assert_eq!(store.enrollments(&ScopeId::new("c1")).len(), 1);
        assert!(store.enrollments(&ScopeId::new("c2")).is_empty());
    }

    #[test]
    fn test_snapshot_drops_duplicate_ids() {
        let snapshot = StoreSnapshot {
            version: STORE_VERSION,
            saved_at: Utc::now(),
            modules: vec![module("a", "c1"), module("a", "c1")],
            exercises: Vec::new(),
            enrollments: Vec::new(),
            summaries: Vec::new(),
        };
        let store = MemoryStore::from_snapshot(snapshot);
        assert_eq!(store.modules(&ScopeId::new("c1")).len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let store = MemoryStore::new();
        store.write_modules(&module_chain("c1", &["a", "b"]));
        store.put_enrollment(Enrollment::new(ScopeId::new("c1"), StudentId::new("s1")));

        store.save(&path).await.unwrap();
        let loaded = MemoryStore::load(&path).await.unwrap().unwrap();

        assert_eq!(loaded.modules(&ScopeId::new("c1")), store.modules(&ScopeId::new("c1")));
        assert_eq!(loaded.stats(), store.stats());
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let path = temp_path("missing");
        assert!(MemoryStore::load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_rejects_garbage_and_unknown_version() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MemoryStore::load(&path).await,
            Err(EngineError::StoreCorrupted { .. })
        ));

        std::fs::write(&path, r#"{"version": 99, "savedAt": "2026-02-03T10:00:00Z"}"#).unwrap();
        let err = MemoryStore::load(&path).await.err().unwrap();
        assert!(err.to_string().contains("unsupported version 99"));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
