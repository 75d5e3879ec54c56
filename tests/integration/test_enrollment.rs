//! End-to-end tests for course authoring, enrollment and progression.
//!
//! These drive the engine through `Classroom` the way the HTTP layer does,
//! then check the resulting chains and summaries.

use std::path::PathBuf;
use std::sync::Arc;

use classroom_engine::{
    Classroom, Config, ExerciseDraft, ExerciseStatus, MemoryStore, ModuleDraft, ModuleNode,
    ModuleType, NodeId, NodeStore, ScopeId, SequentialIds, StudentId, Tier,
};

fn classroom_over(store: Arc<MemoryStore>) -> Classroom {
    Classroom::new(store, Config::default()).with_ids(Arc::new(SequentialIds::new("n")))
}

fn module_draft(title: &str, module_type: ModuleType) -> ModuleDraft {
    ModuleDraft {
        title: title.to_string(),
        module_type,
        description: None,
    }
}

fn exercise_draft(title: &str, max_score: u32) -> ExerciseDraft {
    ExerciseDraft {
        title: title.to_string(),
        content: format!("Solve {title}"),
        max_score: Some(max_score),
    }
}

/// Authors course `c1` with one module holding exercises A, B and C.
fn author_course(classroom: &Classroom, module_type: ModuleType) -> (ScopeId, ModuleNode) {
    let course = ScopeId::new("c1");
    let module = classroom
        .create_module(&course, Tier::Course, module_draft("Unit 1", module_type))
        .expect("Failed to create module");
    for title in ["A", "B", "C"] {
        classroom
            .create_exercise(&module.id, exercise_draft(title, 10))
            .expect("Failed to create exercise");
    }
    (course, module)
}

fn student_statuses(classroom: &Classroom, course: &ScopeId, student: &StudentId) -> Vec<(NodeId, ExerciseStatus)> {
    let scope = ScopeId::for_student(course, student);
    let modules = classroom.materialize_modules(&scope);
    assert_eq!(modules.len(), 1, "student should own one module copy");
    classroom
        .materialize_exercises(&modules[0].id)
        .expect("Failed to materialize student exercises")
        .into_iter()
        .map(|e| {
            let status = e.body.status().expect("student copy has progress");
            (e.id, status)
        })
        .collect()
}

/// Tests the grade, unlock and rescale walk through a progress module.
#[test]
fn test_progress_module_scenario() {
    let classroom = classroom_over(Arc::new(MemoryStore::new()));
    let (course, module) = author_course(&classroom, ModuleType::Progress);
    let student = StudentId::new("s1");

    classroom
        .replicate_course_to_student(&course, &student)
        .expect("Failed to enroll");

    let statuses = student_statuses(&classroom, &course, &student);
    let [(a, a_status), (b, b_status), (_, c_status)] = statuses.as_slice() else {
        panic!("expected three exercises, got {statuses:?}");
    };
    assert_eq!(*a_status, ExerciseStatus::Ready);
    assert_eq!(*b_status, ExerciseStatus::Pending);
    assert_eq!(*c_status, ExerciseStatus::Pending);

    let update = classroom.set_exercise_score(a, 8).expect("Failed to grade");
    assert_eq!(update.exercise.body.status(), Some(ExerciseStatus::Reviewed));
    assert_eq!(update.unlocked, vec![b.clone()]);

    let after = student_statuses(&classroom, &course, &student);
    assert_eq!(after[1].1, ExerciseStatus::Ready);
    assert_eq!(after[2].1, ExerciseStatus::Pending);

    let course_a = classroom
        .materialize_exercises(&module.id)
        .expect("Failed to materialize course exercises")[0]
        .id
        .clone();
    let report = classroom
        .set_exercise_max_score(&course_a, 20)
        .expect("Failed to change max score");
    assert_eq!(report.updated_copies.len(), 1);
    assert_eq!(report.rescaled, 1);

    let student_module = classroom.materialize_modules(&ScopeId::for_student(&course, &student))[0].id.clone();
    let student_a = &classroom
        .materialize_exercises(&student_module)
        .expect("Failed to materialize student exercises")[0];
    assert_eq!(student_a.id, *a);
    assert_eq!(student_a.body.max_score, 20);
    let progress = student_a.body.progress.as_ref().expect("progress");
    assert_eq!(progress.score, Some(16));
    assert_eq!(progress.status, ExerciseStatus::Reviewed);
}

/// Tests that an `all` module releases every exercise on enrollment.
#[test]
fn test_all_module_unlocks_everything() {
    let classroom = classroom_over(Arc::new(MemoryStore::new()));
    let (course, _) = author_course(&classroom, ModuleType::All);
    let student = StudentId::new("s1");

    classroom
        .replicate_course_to_student(&course, &student)
        .expect("Failed to enroll");

    let statuses = student_statuses(&classroom, &course, &student);
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|(_, s)| *s == ExerciseStatus::Ready));
}

/// Tests that enrolling twice creates no duplicate copies.
#[test]
fn test_enrollment_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let classroom = classroom_over(Arc::clone(&store));
    let (course, _) = author_course(&classroom, ModuleType::Progress);
    let student = StudentId::new("s1");

    let first = classroom
        .replicate_course_to_student(&course, &student)
        .expect("Failed to enroll");
    let before = store.stats();
    let second = classroom
        .replicate_course_to_student(&course, &student)
        .expect("Failed to re-enroll");

    assert_eq!(first.copies.exercises.created.len(), 3);
    assert!(second.copies.modules.created.is_empty());
    assert!(second.copies.exercises.created.is_empty());
    assert_eq!(second.copies.exercises.skipped.len(), 3);
    assert_eq!(store.stats(), before);
    assert_eq!(before.enrollments, 1);
}

/// Tests the template to teacher to course flow followed by enrollment.
#[test]
fn test_template_to_student_flow() {
    let classroom = classroom_over(Arc::new(MemoryStore::new()));
    let template = ScopeId::new("templates/rust-101");
    let teacher = ScopeId::new("teachers/t1");
    let course = ScopeId::new("c1");

    let intro = classroom
        .create_module(&template, Tier::Template, module_draft("Intro", ModuleType::All))
        .expect("Failed to create template module");
    classroom
        .create_exercise(&intro.id, exercise_draft("Hello", 5))
        .expect("Failed to create template exercise");
    classroom
        .create_module(&template, Tier::Template, module_draft("Ownership", ModuleType::Progress))
        .expect("Failed to create template module");

    let copied = classroom
        .copy_modules(&template, &teacher, Tier::Teacher)
        .expect("Failed to copy to teacher");
    assert_eq!(copied.modules.created.len(), 2);
    assert_eq!(copied.exercises.created.len(), 1);

    classroom
        .copy_modules(&teacher, &course, Tier::Course)
        .expect("Failed to copy to course");
    let course_modules = classroom.materialize_modules(&course);
    let titles: Vec<&str> = course_modules.iter().map(|m| m.body.title.as_str()).collect();
    assert_eq!(titles, ["Intro", "Ownership"]);

    let report = classroom
        .replicate_course_to_student(&course, &StudentId::new("s1"))
        .expect("Failed to enroll");
    assert_eq!(report.summary.total_modules, 2);
    assert_eq!(report.summary.total_exercises, 1);
    assert_eq!(report.summary.total_points, 10);
}

/// Tests that moves and removals keep the course chain consistent.
#[test]
fn test_move_and_remove_course_exercises() {
    let classroom = classroom_over(Arc::new(MemoryStore::new()));
    let (_, module) = author_course(&classroom, ModuleType::All);
    let ids: Vec<NodeId> = classroom
        .materialize_exercises(&module.id)
        .expect("materialize")
        .into_iter()
        .map(|e| e.id)
        .collect();

    assert!(classroom.move_exercise(&module.id, &ids[2], 0).expect("move"));
    let moved: Vec<NodeId> = classroom
        .materialize_exercises(&module.id)
        .expect("materialize")
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(moved, vec![ids[2].clone(), ids[0].clone(), ids[1].clone()]);

    classroom.remove_exercise(&ids[0]).expect("remove");
    let remaining = classroom.materialize_exercises(&module.id).expect("materialize");
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].next.as_ref(), Some(&ids[1]));
    assert_eq!(remaining[1].previous.as_ref(), Some(&ids[2]));
}

/// Tests that a saved snapshot restores the same chains and summaries.
#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir: PathBuf = std::env::temp_dir().join(format!("classroom-it-{}", std::process::id()));
    let path = dir.join("store.json");

    let store = Arc::new(MemoryStore::new());
    let classroom = classroom_over(Arc::clone(&store));
    let (course, _) = author_course(&classroom, ModuleType::Progress);
    let student = StudentId::new("s1");
    classroom
        .replicate_course_to_student(&course, &student)
        .expect("Failed to enroll");
    let first = student_statuses(&classroom, &course, &student)[0].0.clone();
    classroom.set_exercise_score(&first, 10).expect("Failed to grade");

    store.save(&path).await.expect("Failed to save snapshot");

    let restored = MemoryStore::load(&path)
        .await
        .expect("Failed to load snapshot")
        .expect("Snapshot should exist");
    assert_eq!(restored.stats(), store.stats());

    let restored = classroom_over(Arc::new(restored));
    let summary = restored
        .enrollment_summary(&course, &student)
        .expect("Failed to summarize");
    assert_eq!(summary.completed_exercises, 1);
    assert_eq!(summary.total_points, 30);
    assert_eq!(
        student_statuses(&restored, &course, &student)
            .into_iter()
            .map(|(_, s)| s)
            .collect::<Vec<_>>(),
        vec![ExerciseStatus::Reviewed, ExerciseStatus::Ready, ExerciseStatus::Pending]
    );

    std::fs::remove_dir_all(&dir).ok();
}

/// Tests concurrent moves against one module from many threads.
#[test]
fn test_concurrent_moves_keep_chain_whole() {
    let classroom = Arc::new(classroom_over(Arc::new(MemoryStore::new())));
    let (_, module) = author_course(&classroom, ModuleType::All);
    let ids: Vec<NodeId> = classroom
        .materialize_exercises(&module.id)
        .expect("materialize")
        .into_iter()
        .map(|e| e.id)
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let classroom = Arc::clone(&classroom);
            let module_id = module.id.clone();
            let id = ids[i % ids.len()].clone();
            std::thread::spawn(move || {
                for k in 0..20 {
                    classroom
                        .move_exercise(&module_id, &id, (i + k) % 3)
                        .expect("move should succeed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let after = classroom.materialize_exercises(&module.id).expect("materialize");
    let mut seen: Vec<NodeId> = after.iter().map(|e| e.id.clone()).collect();
    seen.sort();
    let mut expected = ids;
    expected.sort();
    assert_eq!(seen, expected);

    assert!(after[0].previous.is_none());
    assert!(after[2].next.is_none());
    for pair in after.windows(2) {
        assert_eq!(pair[0].next.as_ref(), Some(&pair[1].id));
        assert_eq!(pair[1].previous.as_ref(), Some(&pair[0].id));
    }
}
