//! The classroom service: every chain operation, run against a store.
//!
//! Each write loads a scope into a [`Chain`], mutates it under that scope's
//! lock, and writes the whole scope back. Locks are taken module chain first,
//! then exercise chains, and course scopes before student scopes.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chain::{Chain, Materialized};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::model::{
    Enrollment, ExerciseBody, ExerciseDraft, ExerciseNode, ExerciseStatus, ModuleBody,
    ModuleDraft, ModuleNode, Node, NodeId, ScopeId, StudentId, StudentProgress, Tier,
};
use crate::progression::{self, EnrollmentSummary};
use crate::replicate::{replicate, IdGenerator, ReplicationReport, UuidIds};
use crate::store::{NodeStore, StoreStats};
use crate::sync;

// ============================================================================
// Scope locks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Modules(ScopeId),
    Exercises(ScopeId),
}

/// One mutex per chain, created on first use.
#[derive(Debug, Default)]
struct ScopeLocks {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl ScopeLocks {
    fn handle(&self, key: LockKey) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key).or_default().value())
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Module and exercise copies made by one replication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyReport {
    /// Module copies.
    pub modules: ReplicationReport,
    /// Exercise copies across every copied module.
    pub exercises: ReplicationReport,
}

/// Result of enrolling a student.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReport {
    /// The enrollment, new or existing.
    pub enrollment: Enrollment,
    /// What this call copied.
    pub copies: CopyReport,
    /// Summary after replication.
    pub summary: EnrollmentSummary,
}

/// Result of a status or score change on a student exercise.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// The exercise after the change.
    pub exercise: ExerciseNode,
    /// Exercises of the same module released by the change.
    pub unlocked: Vec<NodeId>,
    /// Refreshed summary of the owning enrollment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<EnrollmentSummary>,
}

/// Result of a content or max-score edit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// The edited exercise.
    pub exercise: ExerciseNode,
    /// Student copies that received the edit.
    pub updated_copies: Vec<NodeId>,
    /// How many scores were rescaled.
    pub rescaled: usize,
}

// ============================================================================
// Classroom
// ============================================================================

/// Entry point for every chain, replication, and progression operation.
pub struct Classroom {
    store: Arc<dyn NodeStore>,
    ids: Arc<dyn IdGenerator>,
    locks: ScopeLocks,
    config: Config,
}

impl std::fmt::Debug for Classroom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classroom")
            .field("ids", &self.ids)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Classroom {
    /// Creates a service over `store` issuing UUID node ids.
    #[must_use]
    pub fn new(store: Arc<dyn NodeStore>, config: Config) -> Self {
        Self {
            store,
            ids: Arc::new(UuidIds),
            locks: ScopeLocks::default(),
            config,
        }
    }

    /// Replaces the id generator.
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Record counts of the underlying store.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Modules of a course or student scope in chain order.
    ///
    /// Never fails: broken pointers degrade to fallback ordering.
    #[must_use]
    pub fn materialize_modules(&self, scope: &ScopeId) -> Vec<ModuleNode> {
        let chain = self.module_chain(scope);
        ordered_with_diagnostics("module", &chain)
    }

    /// Exercises of a module in chain order.
    pub fn materialize_exercises(&self, module_id: &NodeId) -> Result<Vec<ExerciseNode>> {
        self.module(module_id)?;
        let chain = self.exercise_chain(module_id);
        Ok(ordered_with_diagnostics("exercise", &chain))
    }

    /// A student's summary.
    ///
    /// Every write touching the student's chains recomputes the summary, so
    /// this serves the stored one and only computes it when none exists.
    pub fn enrollment_summary(
        &self,
        course_id: &ScopeId,
        student_id: &StudentId,
    ) -> Result<EnrollmentSummary> {
        let enrollment = self
            .store
            .enrollment(course_id, student_id)
            .ok_or_else(|| EngineError::not_found("enrollment", format!("{course_id}/{student_id}")))?;
        Ok(self
            .store
            .summary(course_id, student_id)
            .unwrap_or_else(|| self.refresh_summary(&enrollment)))
    }

    // ------------------------------------------------------------------------
    // Authoring
    // ------------------------------------------------------------------------

    /// Appends a newly authored module to a template, teacher, or course chain.
    pub fn create_module(&self, scope: &ScopeId, tier: Tier, draft: ModuleDraft) -> Result<ModuleNode> {
        if tier == Tier::Student {
            return Err(EngineError::invalid_input(
                "student modules are created by enrollment",
            ));
        }
        let body = ModuleBody {
            title: draft.title,
            module_type: draft.module_type,
            description: draft.description,
        };
        let node = Node::new(self.ids.next_id(), scope.clone(), tier, body);
        self.append_module(scope, node)
    }

    /// Appends a newly authored exercise to a module.
    ///
    /// At course tier the exercise also reaches every enrolled student; at
    /// student tier it becomes an extra.
    pub fn create_exercise(&self, module_id: &NodeId, draft: ExerciseDraft) -> Result<ExerciseNode> {
        let module = self.module(module_id)?;
        let max_score = draft.max_score.unwrap_or(self.config.default_max_score);
        if max_score == 0 {
            return Err(EngineError::invalid_input("maxScore must be greater than 0"));
        }
        let body = ExerciseBody::new(draft.title, draft.content, max_score);
        self.append_exercise(&module, body, None)
    }

    /// Copies a whole module chain, exercises included, into another scope.
    ///
    /// Safe to retry: modules and exercises already copied are skipped.
    pub fn copy_modules(&self, source: &ScopeId, target: &ScopeId, tier: Tier) -> Result<CopyReport> {
        if tier == Tier::Student {
            return Err(EngineError::invalid_input(
                "student copies are created by enrollment",
            ));
        }
        let source_chain = self.module_chain(source);
        if source_chain.is_empty() {
            return Err(EngineError::not_found("scope", source));
        }

        self.with_lock(LockKey::Modules(target.clone()), || {
            let mut target_chain = self.module_chain(target);
            let modules = replicate(&source_chain, &mut target_chain, tier, self.ids.as_ref(), |n| {
                n.body.clone()
            })?;
            self.store.write_modules(&target_chain);

            let mut report = CopyReport {
                modules,
                exercises: ReplicationReport::default(),
            };
            for pair in report.modules.pairs() {
                let copied = self.copy_exercises(&pair.source, &pair.copy, tier, authored_copy)?;
                report.exercises.merge(copied);
            }
            Ok(report)
        })
    }

    // ------------------------------------------------------------------------
    // Chain edits
    // ------------------------------------------------------------------------

    /// Copies a teacher or template module, with its exercises, to the tail of
    /// a course and replicates it to every enrolled student.
    pub fn add_module(&self, course_id: &ScopeId, source_module_id: &NodeId) -> Result<ModuleNode> {
        let source = self.module(source_module_id)?;
        let node = Node::new(self.ids.next_id(), course_id.clone(), Tier::Course, source.body.clone())
            .with_source(source.id.clone());

        let added = self.with_lock(LockKey::Modules(course_id.clone()), || {
            let added = self.append_module_locked(course_id, node)?;
            self.copy_exercises(&source.id, &added.id, Tier::Course, authored_copy)?;

            for enrollment in self.store.enrollments(course_id) {
                self.sync_student(&enrollment)?;
                self.refresh_summary(&enrollment);
            }
            Ok(added)
        })?;

        debug!(course = %course_id, module = %added.id, source = %source.id, "Added module");
        Ok(added)
    }

    /// Copies an exercise to the tail of a module.
    ///
    /// At course tier the copy reaches every student copy of the module.
    pub fn add_exercise(&self, module_id: &NodeId, source_exercise_id: &NodeId) -> Result<ExerciseNode> {
        let module = self.module(module_id)?;
        let source = self.exercise(source_exercise_id)?;
        self.append_exercise(&module, authored_copy(&source), Some(source.id))
    }

    /// Removes a module and its exercises.
    ///
    /// Student copies of a course module are left in place.
    pub fn remove_module(&self, module_id: &NodeId) -> Result<ModuleNode> {
        let module = self.module(module_id)?;
        let scope = module.scope_id.clone();

        let removed = self.with_lock(LockKey::Modules(scope.clone()), || {
            let mut chain = self.module_chain(&scope);
            let removed = chain.remove(module_id)?;
            self.store.write_modules(&chain);

            let exercise_scope = ScopeId::from(module_id);
            let deleted = self.with_lock(LockKey::Exercises(exercise_scope.clone()), || {
                Ok(self.store.delete_exercises(&exercise_scope))
            })?;
            debug!(module = %module_id, exercises = deleted, "Removed module");
            Ok(removed)
        })?;

        if let Some(enrollment) = self.store.enrollment_by_scope(&scope) {
            self.refresh_summary(&enrollment);
        }
        Ok(removed)
    }

    /// Removes an exercise from its module.
    ///
    /// Student copies of a course exercise are left in place.
    pub fn remove_exercise(&self, exercise_id: &NodeId) -> Result<ExerciseNode> {
        let exercise = self.exercise(exercise_id)?;
        let module = self.owning_module(&exercise)?;

        let removed = self.with_lock(LockKey::Exercises(exercise.scope_id.clone()), || {
            self.module(&module.id)?;
            let mut chain = self.exercise_chain(&module.id);
            let removed = chain.remove(exercise_id)?;
            progression::evaluate_unlocks(module.body.module_type, &mut chain);
            self.store.write_exercises(&chain);
            Ok(removed)
        })?;

        self.refresh_student_summary(&module);
        Ok(removed)
    }

    /// Moves a module to `target_index` within its scope.
    ///
    /// Returns `false` if nothing moved.
    pub fn move_module(&self, scope: &ScopeId, module_id: &NodeId, target_index: usize) -> Result<bool> {
        self.with_lock(LockKey::Modules(scope.clone()), || {
            let mut chain = self.module_chain(scope);
            if !chain.contains(module_id) {
                return Err(EngineError::not_found("module", module_id));
            }
            let moved = chain.move_to_index(module_id, target_index)?;
            if moved {
                self.store.write_modules(&chain);
            }
            Ok(moved)
        })
    }

    /// Moves an exercise to `target_index` within its module.
    ///
    /// Returns `false` if nothing moved.
    pub fn move_exercise(&self, module_id: &NodeId, exercise_id: &NodeId, target_index: usize) -> Result<bool> {
        let module = self.module(module_id)?;
        self.with_lock(LockKey::Exercises(ScopeId::from(module_id)), || {
            self.module(module_id)?;
            let mut chain = self.exercise_chain(module_id);
            if !chain.contains(exercise_id) {
                return Err(EngineError::not_found("exercise", exercise_id));
            }
            let moved = chain.move_to_index(exercise_id, target_index)?;
            if moved {
                progression::evaluate_unlocks(module.body.module_type, &mut chain);
                self.store.write_exercises(&chain);
            }
            Ok(moved)
        })
    }

    /// Rewrites a module chain's pointers to follow its materialized order.
    pub fn repair_modules(&self, scope: &ScopeId) -> Result<Materialized> {
        let before = self.with_lock(LockKey::Modules(scope.clone()), || {
            let mut chain = self.module_chain(scope);
            if chain.is_empty() {
                return Err(EngineError::not_found("scope", scope));
            }
            let before = chain.relink();
            self.store.write_modules(&chain);
            log_repair(scope, &before);
            Ok(before)
        })?;

        if let Some(enrollment) = self.store.enrollment_by_scope(scope) {
            self.refresh_summary(&enrollment);
        }
        Ok(before)
    }

    /// Rewrites an exercise chain's pointers to follow its materialized order.
    pub fn repair_exercises(&self, module_id: &NodeId) -> Result<Materialized> {
        let module = self.module(module_id)?;
        let scope = ScopeId::from(module_id);
        let before = self.with_lock(LockKey::Exercises(scope.clone()), || {
            self.module(module_id)?;
            let mut chain = self.exercise_chain(module_id);
            let before = chain.relink();
            progression::evaluate_unlocks(module.body.module_type, &mut chain);
            self.store.write_exercises(&chain);
            log_repair(&scope, &before);
            Ok(before)
        })?;

        self.refresh_student_summary(&module);
        Ok(before)
    }

    // ------------------------------------------------------------------------
    // Enrollment
    // ------------------------------------------------------------------------

    /// Enrolls a student, copying every course module and exercise into the
    /// student's own chains.
    ///
    /// Safe to retry: only missing copies are created, in course order.
    pub fn replicate_course_to_student(
        &self,
        course_id: &ScopeId,
        student_id: &StudentId,
    ) -> Result<EnrollmentReport> {
        if self.store.modules(course_id).is_empty() {
            return Err(EngineError::not_found("course", course_id));
        }

        let enrollment = self.store.enrollment(course_id, student_id).unwrap_or_else(|| {
            let enrollment = Enrollment::new(course_id.clone(), student_id.clone());
            self.store.put_enrollment(enrollment.clone());
            enrollment
        });

        let copies = self.sync_student(&enrollment)?;
        let summary = self.refresh_summary(&enrollment);
        debug!(
            course = %course_id,
            student = %student_id,
            modules = copies.modules.created.len(),
            exercises = copies.exercises.created.len(),
            "Replicated course to student"
        );

        Ok(EnrollmentReport {
            enrollment,
            copies,
            summary,
        })
    }

    // ------------------------------------------------------------------------
    // Progression
    // ------------------------------------------------------------------------

    /// Grades a student exercise and re-evaluates its module.
    pub fn set_exercise_score(&self, exercise_id: &NodeId, score: u32) -> Result<ProgressUpdate> {
        self.update_progress(exercise_id, |body| progression::apply_score(body, score))
    }

    /// Changes a student exercise's status and re-evaluates its module.
    pub fn set_exercise_status(&self, exercise_id: &NodeId, status: ExerciseStatus) -> Result<ProgressUpdate> {
        self.update_progress(exercise_id, |body| progression::apply_status(body, status).map(|_| ()))
    }

    // ------------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------------

    /// Changes an exercise's max score.
    ///
    /// A course exercise pushes the change to every student copy, rescaling
    /// recorded scores. A student exercise is edited on its own.
    pub fn set_exercise_max_score(&self, exercise_id: &NodeId, max_score: u32) -> Result<SyncReport> {
        if max_score == 0 {
            return Err(EngineError::invalid_input("maxScore must be greater than 0"));
        }
        self.sync_edit(exercise_id, |body| sync::apply_max_score(body, max_score))
    }

    /// Replaces an exercise's content, pushing it to student copies of a
    /// course exercise.
    pub fn set_exercise_content(&self, exercise_id: &NodeId, content: &str) -> Result<SyncReport> {
        self.sync_edit(exercise_id, |body| {
            sync::apply_content(body, content);
            false
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn with_lock<R>(&self, key: LockKey, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let lock = self.locks.handle(key);
        let _guard = lock.lock();
        f()
    }

    fn module(&self, id: &NodeId) -> Result<ModuleNode> {
        self.store.module(id).ok_or_else(|| EngineError::not_found("module", id))
    }

    fn exercise(&self, id: &NodeId) -> Result<ExerciseNode> {
        self.store.exercise(id).ok_or_else(|| EngineError::not_found("exercise", id))
    }

    fn owning_module(&self, exercise: &ExerciseNode) -> Result<ModuleNode> {
        self.module(&NodeId::new(exercise.scope_id.as_str()))
    }

    fn module_chain(&self, scope: &ScopeId) -> Chain<ModuleBody> {
        Chain::from_nodes(scope.clone(), self.store.modules(scope))
    }

    fn exercise_chain(&self, module_id: &NodeId) -> Chain<ExerciseBody> {
        let scope = ScopeId::from(module_id);
        let nodes = self.store.exercises(&scope);
        Chain::from_nodes(scope, nodes)
    }

    fn append_module(&self, scope: &ScopeId, node: ModuleNode) -> Result<ModuleNode> {
        self.with_lock(LockKey::Modules(scope.clone()), || self.append_module_locked(scope, node))
    }

    fn append_module_locked(&self, scope: &ScopeId, node: ModuleNode) -> Result<ModuleNode> {
        let id = node.id.clone();
        let mut chain = self.module_chain(scope);
        chain.append(node)?;
        self.store.write_modules(&chain);
        chain.get(&id).cloned().ok_or_else(|| EngineError::not_found("module", &id))
    }

    /// Appends an exercise to `module`; course exercises are then copied to
    /// every student copy of the module.
    fn append_exercise(
        &self,
        module: &ModuleNode,
        mut body: ExerciseBody,
        source: Option<NodeId>,
    ) -> Result<ExerciseNode> {
        if module.tier == Tier::Student {
            body.course_exercise_ref = None;
            body.progress = Some(StudentProgress::default());
        }
        let mut node = Node::new(self.ids.next_id(), ScopeId::from(&module.id), module.tier, body);
        node.source_ref = source;
        let id = node.id.clone();

        let added = self.with_lock(LockKey::Exercises(ScopeId::from(&module.id)), || {
            self.module(&module.id)?;
            let mut chain = self.exercise_chain(&module.id);
            chain.append(node)?;
            if module.tier == Tier::Student {
                progression::evaluate_unlocks(module.body.module_type, &mut chain);
            }
            self.store.write_exercises(&chain);
            chain.get(&id).cloned().ok_or_else(|| EngineError::not_found("exercise", &id))
        })?;

        match module.tier {
            Tier::Course => {
                for copy in self.store.modules_sourced_from(&module.id) {
                    if copy.tier != Tier::Student {
                        continue;
                    }
                    match self.copy_exercises(&module.id, &copy.id, Tier::Student, progression::student_copy) {
                        // the student copy was removed since it was listed
                        Err(EngineError::NotFound { .. }) => continue,
                        other => other?,
                    };
                    self.refresh_student_summary(&copy);
                }
            }
            Tier::Student => {
                self.refresh_student_summary(module);
            }
            Tier::Template | Tier::Teacher => {}
        }
        Ok(added)
    }

    /// Replicates one module's exercise chain into another module.
    fn copy_exercises(
        &self,
        source_module: &NodeId,
        target_module: &NodeId,
        tier: Tier,
        seed: fn(&ExerciseNode) -> ExerciseBody,
    ) -> Result<ReplicationReport> {
        let target = self.module(target_module)?;
        let source_chain = self.exercise_chain(source_module);

        self.with_lock(LockKey::Exercises(ScopeId::from(target_module)), || {
            self.module(target_module)?;
            let mut target_chain = self.exercise_chain(target_module);
            let report = replicate(&source_chain, &mut target_chain, tier, self.ids.as_ref(), seed)?;
            if tier == Tier::Student {
                progression::evaluate_unlocks(target.body.module_type, &mut target_chain);
            }
            if !report.is_noop() || tier == Tier::Student {
                self.store.write_exercises(&target_chain);
            }
            Ok(report)
        })
    }

    /// Brings a student's chains up to date with the course.
    fn sync_student(&self, enrollment: &Enrollment) -> Result<CopyReport> {
        let course_chain = self.module_chain(&enrollment.course_id);
        let scope = &enrollment.scope_id;

        self.with_lock(LockKey::Modules(scope.clone()), || {
            let mut student_chain = self.module_chain(scope);
            let modules = replicate(
                &course_chain,
                &mut student_chain,
                Tier::Student,
                self.ids.as_ref(),
                |n| n.body.clone(),
            )?;
            if !modules.is_noop() {
                self.store.write_modules(&student_chain);
            }

            let mut report = CopyReport {
                modules,
                exercises: ReplicationReport::default(),
            };
            for pair in report.modules.pairs() {
                let copied =
                    self.copy_exercises(&pair.source, &pair.copy, Tier::Student, progression::student_copy)?;
                report.exercises.merge(copied);
            }
            Ok(report)
        })
    }

    fn update_progress(
        &self,
        exercise_id: &NodeId,
        apply: impl FnOnce(&mut ExerciseBody) -> Result<()>,
    ) -> Result<ProgressUpdate> {
        let exercise = self.exercise(exercise_id)?;
        let module = self.owning_module(&exercise)?;

        let (updated, unlocked) = self.with_lock(LockKey::Exercises(exercise.scope_id.clone()), || {
            self.module(&module.id)?;
            let mut chain = self.exercise_chain(&module.id);
            let mut body = chain
                .get(exercise_id)
                .map(|n| n.body.clone())
                .ok_or_else(|| EngineError::not_found("exercise", exercise_id))?;
            apply(&mut body)?;
            chain.update_body(exercise_id, |b| *b = body);

            let unlocked = progression::evaluate_unlocks(module.body.module_type, &mut chain);
            self.store.write_exercises(&chain);
            let updated = chain
                .get(exercise_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("exercise", exercise_id))?;
            Ok((updated, unlocked))
        })?;

        let summary = self.refresh_student_summary(&module);
        Ok(ProgressUpdate {
            exercise: updated,
            unlocked,
            summary,
        })
    }

    /// Applies `edit` to an exercise and, for course exercises, to every
    /// student copy. `edit` returns whether it rescaled a score.
    fn sync_edit(&self, exercise_id: &NodeId, edit: impl Fn(&mut ExerciseBody) -> bool) -> Result<SyncReport> {
        let exercise = self.exercise(exercise_id)?;
        let module = self.owning_module(&exercise)?;
        let mut rescaled = 0;

        let updated = self.with_lock(LockKey::Exercises(exercise.scope_id.clone()), || {
            self.module(&module.id)?;
            let mut chain = self.exercise_chain(&module.id);
            let mut changed = false;
            chain.update_body(exercise_id, |body| changed = edit(body));
            if changed {
                rescaled += 1;
            }
            if exercise.tier == Tier::Student {
                progression::evaluate_unlocks(module.body.module_type, &mut chain);
            }
            self.store.write_exercises(&chain);
            chain
                .get(exercise_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("exercise", exercise_id))
        })?;

        let mut updated_copies = Vec::new();
        if exercise.tier == Tier::Course {
            let mut by_scope: BTreeMap<ScopeId, Vec<NodeId>> = BTreeMap::new();
            for copy in self.store.exercises_derived_from(exercise_id) {
                by_scope.entry(copy.scope_id).or_default().push(copy.id);
            }

            for (scope, copies) in by_scope {
                let copy_module = self.module(&NodeId::new(scope.as_str()))?;
                self.with_lock(LockKey::Exercises(scope.clone()), || {
                    if self.store.module(&copy_module.id).is_none() {
                        return Ok(());
                    }
                    let mut chain = self.exercise_chain(&copy_module.id);
                    for id in &copies {
                        let mut changed = false;
                        if chain.update_body(id, |body| changed = edit(body)) {
                            updated_copies.push(id.clone());
                        }
                        if changed {
                            rescaled += 1;
                        }
                    }
                    progression::evaluate_unlocks(copy_module.body.module_type, &mut chain);
                    self.store.write_exercises(&chain);
                    Ok(())
                })?;
                self.refresh_student_summary(&copy_module);
            }
        } else if exercise.tier == Tier::Student {
            self.refresh_student_summary(&module);
        }

        debug!(
            exercise = %exercise_id,
            copies = updated_copies.len(),
            rescaled,
            "Synchronized exercise edit"
        );
        Ok(SyncReport {
            exercise: updated,
            updated_copies,
            rescaled,
        })
    }

    fn refresh_student_summary(&self, module: &ModuleNode) -> Option<EnrollmentSummary> {
        if module.tier != Tier::Student {
            return None;
        }
        self.store
            .enrollment_by_scope(&module.scope_id)
            .map(|enrollment| self.refresh_summary(&enrollment))
    }

    fn refresh_summary(&self, enrollment: &Enrollment) -> EnrollmentSummary {
        let modules: Vec<Chain<ExerciseBody>> = self
            .module_chain(&enrollment.scope_id)
            .ordered()
            .iter()
            .map(|module| self.exercise_chain(&module.id))
            .collect();
        let summary = progression::summarize(
            &enrollment.course_id,
            &enrollment.student_id,
            &modules,
            self.config.points_per_exercise,
        );
        self.store.put_summary(summary.clone());
        summary
    }
}

/// Exercise payload for a copy outside the student tier.
fn authored_copy(node: &ExerciseNode) -> ExerciseBody {
    ExerciseBody {
        course_exercise_ref: None,
        progress: None,
        ..node.body.clone()
    }
}

fn ordered_with_diagnostics<T: Clone>(kind: &str, chain: &Chain<T>) -> Vec<Node<T>> {
    let materialized = chain.materialize();
    if !materialized.is_clean() {
        warn!(
            kind,
            scope = %chain.scope(),
            duplicates = materialized.duplicates.len(),
            orphans = materialized.orphans.len(),
            heads = materialized.head_candidates,
            fallback = materialized.fallback,
            "Chain is degraded; serving best-effort order"
        );
    }
    materialized
        .order
        .iter()
        .filter_map(|id| chain.get(id).cloned())
        .collect()
}

fn log_repair(scope: &ScopeId, before: &Materialized) {
    if before.is_clean() {
        debug!(scope = %scope, "Chain already consistent; pointers rewritten");
    } else {
        warn!(
            scope = %scope,
            duplicates = before.duplicates.len(),
            orphans = before.orphans.len(),
            fallback = before.fallback,
            "Repaired degraded chain"
        );
    }
}
