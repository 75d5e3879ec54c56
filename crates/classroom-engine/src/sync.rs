//! Course-to-student synchronization of exercise content and max scores.
//!
//! Only the field edits live here; finding the student copies of a course
//! exercise (and skipping extras) is the service's job.

use crate::model::{ExerciseBody, ExerciseStatus};

/// Rescales a score to a new maximum, keeping the achieved proportion.
///
/// A zero old maximum has no proportion to keep, so the score is only clamped.
///
/// # Examples
///
/// ```
/// use classroom_engine::sync::rescale_score;
///
/// assert_eq!(rescale_score(8, 10, 20), 16);
/// assert_eq!(rescale_score(0, 10, 20), 0);
/// assert_eq!(rescale_score(1, 3, 10), 3);
/// ```
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn rescale_score(score: u32, old_max: u32, new_max: u32) -> u32 {
    if old_max == 0 {
        return score.min(new_max);
    }
    let scaled = (f64::from(score) * f64::from(new_max) / f64::from(old_max)).round();
    (scaled as u32).min(new_max)
}

/// Sets a new max score on an exercise.
///
/// Student copies with a recorded score get it rescaled and are marked
/// `Reviewed`. Returns `true` if a score was rescaled.
pub fn apply_max_score(body: &mut ExerciseBody, new_max: u32) -> bool {
    let old_max = std::mem::replace(&mut body.max_score, new_max);
    let Some(progress) = body.progress.as_mut() else {
        return false;
    };
    if old_max == new_max {
        return false;
    }

    progress.best_score = progress
        .best_score
        .map(|best| rescale_score(best, old_max, new_max));
    match progress.score {
        Some(score) => {
            progress.score = Some(rescale_score(score, old_max, new_max));
            progress.status = ExerciseStatus::Reviewed;
            true
        }
        None => false,
    }
}

/// Replaces an exercise's content. Returns `true` if it changed.
pub fn apply_content(body: &mut ExerciseBody, content: &str) -> bool {
    if body.content == content {
        return false;
    }
    content.clone_into(&mut body.content);
    true
}
