//! Student progression: the exercise status machine, unlock policies, and
//! enrollment summaries.
//!
//! Status changes go through [`apply_status`] and [`apply_score`]; both leave
//! the exercise untouched when they return an error. Unlocking is a separate
//! pass ([`evaluate_unlocks`]) run over a whole module after any change, so the
//! policy only ever looks at materialized order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::error::{EngineError, Result};
use crate::model::{
    ExerciseBody, ExerciseNode, ExerciseStatus, ModuleType, NodeId, ScopeId, StudentId,
    StudentProgress,
};

// ============================================================================
// Status machine
// ============================================================================

/// Returns `true` if a direct status change from `from` to `to` is allowed.
///
/// `Reviewed` is never a direct target: it is reached only by grading.
///
/// # Examples
///
/// ```
/// use classroom_engine::progression::is_allowed_transition;
/// use classroom_engine::ExerciseStatus;
///
/// assert!(is_allowed_transition(ExerciseStatus::Ready, ExerciseStatus::InProgress));
/// assert!(is_allowed_transition(ExerciseStatus::Reviewed, ExerciseStatus::Ready));
/// assert!(!is_allowed_transition(ExerciseStatus::Pending, ExerciseStatus::Completed));
/// ```
#[must_use]
pub const fn is_allowed_transition(from: ExerciseStatus, to: ExerciseStatus) -> bool {
    use ExerciseStatus::{Completed, InProgress, Pending, Ready, Reviewed};
    matches!(
        (from, to),
        (Pending, Ready)
            | (Ready, InProgress)
            | (InProgress, Completed)
            | (Completed | Reviewed, Ready)
    )
}

/// Moves a student exercise to `to`.
///
/// Returns `Ok(false)` when the exercise already has that status. Submitting
/// (`InProgress` -> `Completed`) counts an attempt; revoking back to `Ready`
/// clears the current score but keeps the best one.
pub fn apply_status(body: &mut ExerciseBody, to: ExerciseStatus) -> Result<bool> {
    let progress = student_progress(body)?;
    let from = progress.status;
    if from == to {
        return Ok(false);
    }
    if !is_allowed_transition(from, to) {
        return Err(EngineError::invalid_transition(from, to));
    }

    if to == ExerciseStatus::Completed {
        progress.attempts = progress.attempts.saturating_add(1);
    }
    if from.is_cleared() && to == ExerciseStatus::Ready {
        progress.score = None;
    }
    progress.status = to;
    Ok(true)
}

/// Records a teacher's grade and marks the exercise `Reviewed`.
///
/// Allowed from any unlocked status; a still-locked exercise cannot be graded.
pub fn apply_score(body: &mut ExerciseBody, score: u32) -> Result<()> {
    let max_score = body.max_score;
    if score > max_score {
        return Err(EngineError::invalid_input(format!(
            "score {score} exceeds max score {max_score}"
        )));
    }
    let progress = student_progress(body)?;
    if !progress.status.is_unlocked() {
        return Err(EngineError::invalid_transition(
            progress.status,
            ExerciseStatus::Reviewed,
        ));
    }

    progress.score = Some(score);
    progress.best_score = Some(progress.best_score.map_or(score, |best| best.max(score)));
    progress.status = ExerciseStatus::Reviewed;
    Ok(())
}

fn student_progress(body: &mut ExerciseBody) -> Result<&mut StudentProgress> {
    body.progress
        .as_mut()
        .ok_or_else(|| EngineError::invalid_input("progress is tracked on student exercises only"))
}

// ============================================================================
// Unlock policy
// ============================================================================

/// Body of a fresh student copy of `course_exercise`.
///
/// The copy starts `Pending` with no score; [`evaluate_unlocks`] releases it.
#[must_use]
pub fn student_copy(course_exercise: &ExerciseNode) -> ExerciseBody {
    ExerciseBody {
        course_exercise_ref: Some(course_exercise.id.clone()),
        progress: Some(StudentProgress::default()),
        ..course_exercise.body.clone()
    }
}

/// Releases exercises according to the module's unlock policy.
///
/// `All` makes every pending exercise ready. `Progress` makes the head ready
/// and each later exercise ready once its predecessor has cleared. Unlocking
/// never re-locks: an exercise that is already past `Pending` stays there.
/// Returns the ids that moved from `Pending` to `Ready`, in chain order.
pub fn evaluate_unlocks(module_type: ModuleType, exercises: &mut Chain<ExerciseBody>) -> Vec<NodeId> {
    let mut released = Vec::new();
    let mut predecessor_cleared = true;

    for id in exercises.order() {
        let Some(status) = exercises.get(&id).and_then(|n| n.body.status()) else {
            continue;
        };

        let unlock = match module_type {
            ModuleType::All => true,
            ModuleType::Progress => predecessor_cleared,
        };
        if status == ExerciseStatus::Pending && unlock {
            exercises.update_body(&id, |body| {
                if let Some(progress) = body.progress.as_mut() {
                    progress.status = ExerciseStatus::Ready;
                }
            });
            released.push(id);
        }
        predecessor_cleared = status.is_cleared();
    }

    released
}

// ============================================================================
// EnrollmentSummary
// ============================================================================

/// Aggregate progress of one student in one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    /// The course.
    pub course_id: ScopeId,

    /// The student.
    pub student_id: StudentId,

    /// Fraction of exercises cleared, in `0.0..=1.0`.
    pub progress: f64,

    /// Number of cleared exercises.
    pub completed_exercises: usize,

    /// Number of student exercises, extras included.
    pub total_exercises: usize,

    /// Number of non-empty modules whose exercises have all cleared.
    pub completed_modules: usize,

    /// Number of modules in the student's chain.
    pub total_modules: usize,

    /// Mean percentage score over graded exercises, `None` if nothing is graded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,

    /// `average_score` applied to `total_points`, rounded.
    pub earned_points: u32,

    /// Exercise count times the per-exercise weight.
    pub total_points: u32,

    /// Cleared exercise ids.
    pub completed_exercise_ids: Vec<NodeId>,

    /// Completed module ids.
    pub completed_module_ids: Vec<NodeId>,

    /// When the summary was computed.
    pub updated_at: DateTime<Utc>,
}

/// Recomputes a student's summary from every exercise chain they own.
///
/// Each chain is one module; its scope is the module id. Scores are
/// normalised to a percentage of each exercise's own max score before
/// averaging, so exercises with different maxima weigh the same.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn summarize(
    course_id: &ScopeId,
    student_id: &StudentId,
    modules: &[Chain<ExerciseBody>],
    points_per_exercise: u32,
) -> EnrollmentSummary {
    let mut completed_exercise_ids = Vec::new();
    let mut completed_module_ids = Vec::new();
    let mut total_exercises = 0_usize;
    let mut percentages = Vec::new();

    for module in modules {
        let mut all_cleared = !module.is_empty();
        for exercise in module.ordered() {
            total_exercises += 1;
            let Some(progress) = &exercise.body.progress else {
                all_cleared = false;
                continue;
            };
            if progress.status.is_cleared() {
                completed_exercise_ids.push(exercise.id.clone());
            } else {
                all_cleared = false;
            }
            if let Some(score) = progress.score {
                let max = exercise.body.max_score.max(1);
                percentages.push(f64::from(score) * 100.0 / f64::from(max));
            }
        }
        if all_cleared {
            completed_module_ids.push(NodeId::new(module.scope().as_str()));
        }
    }

    let total_points =
        u32::try_from(total_exercises).unwrap_or(u32::MAX).saturating_mul(points_per_exercise);
    let average_score =
        (!percentages.is_empty()).then(|| percentages.iter().sum::<f64>() / percentages.len() as f64);
    let earned_points = average_score
        .map_or(0, |avg| (avg / 100.0 * f64::from(total_points)).round() as u32);
    let progress = if total_exercises == 0 {
        0.0
    } else {
        completed_exercise_ids.len() as f64 / total_exercises as f64
    };

    EnrollmentSummary {
        course_id: course_id.clone(),
        student_id: student_id.clone(),
        progress,
        completed_exercises: completed_exercise_ids.len(),
        total_exercises,
        completed_modules: completed_module_ids.len(),
        total_modules: modules.len(),
        average_score,
        earned_points,
        total_points,
        completed_exercise_ids,
        completed_module_ids,
        updated_at: Utc::now(),
    }
}

// ============================================================================
// Tests
// ============================================================================
