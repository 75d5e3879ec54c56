//! HTTP API for the classroom engine.
//!
//! Every route maps onto one [`Classroom`] operation. Bodies are camelCase
//! JSON; failures come back as `{"error": "..."}` with a status derived from
//! the [`EngineError`] variant.
//!
//! # Endpoints
//!
//! - `GET /api/status` - Version, configuration and store counts
//! - `GET|POST /api/scopes/:scope/modules` - Materialize / author modules
//! - `POST /api/scopes/:scope/modules/copy` - Copy another scope's modules
//! - `POST /api/scopes/:scope/modules/repair` - Relink a module chain
//! - `POST /api/scopes/:scope/modules/:module/move` - Move a module
//! - `POST /api/courses/:course/modules` - Add a module to a course
//! - `DELETE /api/modules/:module` - Remove a module
//! - `GET|POST /api/modules/:module/exercises` - Materialize / author exercises
//! - `POST /api/modules/:module/exercises/copy` - Add an exercise copy
//! - `POST /api/modules/:module/exercises/repair` - Relink an exercise chain
//! - `POST /api/modules/:module/exercises/:exercise/move` - Move an exercise
//! - `DELETE /api/exercises/:exercise` - Remove an exercise
//! - `PUT /api/exercises/:exercise/{score,max-score,status,content}` - Progress and sync edits
//! - `POST /api/courses/:course/students/:student/enroll` - Replicate a course to a student
//! - `GET /api/courses/:course/students/:student/modules` - A student's modules
//! - `GET /api/courses/:course/students/:student/summary` - Enrollment summary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use classroom_engine::{create_router, AppState, Classroom, Config, MemoryStore};
//!
//! # async fn example() {
//! let classroom = Classroom::new(Arc::new(MemoryStore::new()), Config::default());
//! let router = create_router(AppState::new(Config::default(), classroom));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::chain::Materialized;
use crate::config::Config;
use crate::error::EngineError;
use crate::model::{
    ExerciseDraft, ExerciseNode, ExerciseStatus, ModuleDraft, ModuleNode, NodeId, ScopeId,
    StudentId, Tier,
};
use crate::progression::EnrollmentSummary;
use crate::service::{Classroom, CopyReport, EnrollmentReport, ProgressUpdate, SyncReport};
use crate::store::StoreStats;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for authoring a module.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModuleRequest {
    /// Tier of the scope being authored.
    pub tier: Tier,
    /// Module content.
    #[serde(flatten)]
    pub draft: ModuleDraft,
}

/// Request body for copying one scope's modules into another.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyModulesRequest {
    /// Scope to copy from.
    pub source_scope_id: ScopeId,
    /// Tier of the copies.
    pub tier: Tier,
}

/// Request body for adding a module copy to a course.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddModuleRequest {
    /// Teacher or template module to copy.
    pub source_module_id: NodeId,
}

/// Request body for adding an exercise copy to a module.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddExerciseRequest {
    /// Exercise to copy.
    pub source_exercise_id: NodeId,
}

/// Request body for move endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// Position the node should end up at.
    pub target_index: usize,
}

/// Response body for move endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveResponse {
    /// Whether the chain changed.
    pub moved: bool,
}

/// Request body for grading.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScoreRequest {
    /// Score in `0..=maxScore`.
    pub score: u32,
}

/// Request body for max-score edits.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxScoreRequest {
    /// New maximum, greater than zero.
    pub max_score: u32,
}

/// Request body for status changes.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusRequest {
    /// Requested status.
    pub status: ExerciseStatus,
}

/// Request body for content edits.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentRequest {
    /// New content.
    pub content: String,
}

/// Response body for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Crate version.
    pub version: String,
    /// Active engine configuration.
    pub config: Config,
    /// Store record counts.
    pub stats: StoreStats,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Engine configuration.
    pub config: Config,
    /// The service every handler delegates to.
    pub classroom: Arc<Classroom>,
}

impl AppState {
    /// Creates a new `AppState` around a service.
    #[must_use]
    pub fn new(config: Config, classroom: Classroom) -> Self {
        Self {
            config,
            classroom: Arc::new(classroom),
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Engine error carried to the HTTP boundary.
#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Integrity { .. } | EngineError::ReplicationConflict { .. } => {
                StatusCode::CONFLICT
            }
            EngineError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() || status == StatusCode::CONFLICT {
            warn!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// All routes live under `/api`, behind a permissive CORS layer and request
/// tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handle_status))
        .route(
            "/scopes/:scope/modules",
            get(handle_list_modules).post(handle_create_module),
        )
        .route("/scopes/:scope/modules/copy", post(handle_copy_modules))
        .route("/scopes/:scope/modules/repair", post(handle_repair_modules))
        .route("/scopes/:scope/modules/:module/move", post(handle_move_module))
        .route("/courses/:course/modules", post(handle_add_module))
        .route("/modules/:module", delete(handle_remove_module))
        .route(
            "/modules/:module/exercises",
            get(handle_list_exercises).post(handle_create_exercise),
        )
        .route("/modules/:module/exercises/copy", post(handle_add_exercise))
        .route("/modules/:module/exercises/repair", post(handle_repair_exercises))
        .route(
            "/modules/:module/exercises/:exercise/move",
            post(handle_move_exercise),
        )
        .route("/exercises/:exercise", delete(handle_remove_exercise))
        .route("/exercises/:exercise/score", put(handle_set_score))
        .route("/exercises/:exercise/max-score", put(handle_set_max_score))
        .route("/exercises/:exercise/status", put(handle_set_status))
        .route("/exercises/:exercise/content", put(handle_set_content))
        .route(
            "/courses/:course/students/:student/enroll",
            post(handle_enroll),
        )
        .route(
            "/courses/:course/students/:student/modules",
            get(handle_student_modules),
        )
        .route(
            "/courses/:course/students/:student/summary",
            get(handle_summary),
        );

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

type AppStateRef = State<Arc<AppState>>;

/// Handler for `GET /api/status`.
async fn handle_status(State(state): AppStateRef) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        config: state.config.clone(),
        stats: state.classroom.stats(),
    })
}

async fn handle_list_modules(
    State(state): AppStateRef,
    Path(scope): Path<ScopeId>,
) -> Json<Vec<ModuleNode>> {
    Json(state.classroom.materialize_modules(&scope))
}

async fn handle_create_module(
    State(state): AppStateRef,
    Path(scope): Path<ScopeId>,
    Json(request): Json<CreateModuleRequest>,
) -> ApiResult<(StatusCode, Json<ModuleNode>)> {
    let module = state
        .classroom
        .create_module(&scope, request.tier, request.draft)?;
    info!(scope = %scope, module = %module.id, "Module created");
    Ok((StatusCode::CREATED, Json(module)))
}

async fn handle_copy_modules(
    State(state): AppStateRef,
    Path(scope): Path<ScopeId>,
    Json(request): Json<CopyModulesRequest>,
) -> ApiResult<Json<CopyReport>> {
    let report = state
        .classroom
        .copy_modules(&request.source_scope_id, &scope, request.tier)?;
    info!(
        source = %request.source_scope_id,
        target = %scope,
        modules = report.modules.created.len(),
        exercises = report.exercises.created.len(),
        "Modules copied"
    );
    Ok(Json(report))
}

async fn handle_repair_modules(
    State(state): AppStateRef,
    Path(scope): Path<ScopeId>,
) -> ApiResult<Json<Materialized>> {
    Ok(Json(state.classroom.repair_modules(&scope)?))
}

async fn handle_move_module(
    State(state): AppStateRef,
    Path((scope, module)): Path<(ScopeId, NodeId)>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Json<MoveResponse>> {
    let moved = state
        .classroom
        .move_module(&scope, &module, request.target_index)?;
    info!(scope = %scope, module = %module, target = request.target_index, moved, "Module move");
    Ok(Json(MoveResponse { moved }))
}

async fn handle_add_module(
    State(state): AppStateRef,
    Path(course): Path<ScopeId>,
    Json(request): Json<AddModuleRequest>,
) -> ApiResult<(StatusCode, Json<ModuleNode>)> {
    let module = state
        .classroom
        .add_module(&course, &request.source_module_id)?;
    info!(course = %course, module = %module.id, "Module added to course");
    Ok((StatusCode::CREATED, Json(module)))
}

async fn handle_remove_module(
    State(state): AppStateRef,
    Path(module): Path<NodeId>,
) -> ApiResult<Json<ModuleNode>> {
    let removed = state.classroom.remove_module(&module)?;
    info!(module = %module, "Module removed");
    Ok(Json(removed))
}

async fn handle_list_exercises(
    State(state): AppStateRef,
    Path(module): Path<NodeId>,
) -> ApiResult<Json<Vec<ExerciseNode>>> {
    Ok(Json(state.classroom.materialize_exercises(&module)?))
}

async fn handle_create_exercise(
    State(state): AppStateRef,
    Path(module): Path<NodeId>,
    Json(draft): Json<ExerciseDraft>,
) -> ApiResult<(StatusCode, Json<ExerciseNode>)> {
    let exercise = state.classroom.create_exercise(&module, draft)?;
    info!(module = %module, exercise = %exercise.id, "Exercise created");
    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn handle_add_exercise(
    State(state): AppStateRef,
    Path(module): Path<NodeId>,
    Json(request): Json<AddExerciseRequest>,
) -> ApiResult<(StatusCode, Json<ExerciseNode>)> {
    let exercise = state
        .classroom
        .add_exercise(&module, &request.source_exercise_id)?;
    info!(module = %module, exercise = %exercise.id, "Exercise added");
    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn handle_repair_exercises(
    State(state): AppStateRef,
    Path(module): Path<NodeId>,
) -> ApiResult<Json<Materialized>> {
    Ok(Json(state.classroom.repair_exercises(&module)?))
}

async fn handle_move_exercise(
    State(state): AppStateRef,
    Path((module, exercise)): Path<(NodeId, NodeId)>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<Json<MoveResponse>> {
    let moved = state
        .classroom
        .move_exercise(&module, &exercise, request.target_index)?;
    info!(module = %module, exercise = %exercise, target = request.target_index, moved, "Exercise move");
    Ok(Json(MoveResponse { moved }))
}

async fn handle_remove_exercise(
    State(state): AppStateRef,
    Path(exercise): Path<NodeId>,
) -> ApiResult<Json<ExerciseNode>> {
    let removed = state.classroom.remove_exercise(&exercise)?;
    info!(exercise = %exercise, "Exercise removed");
    Ok(Json(removed))
}

async fn handle_set_score(
    State(state): AppStateRef,
    Path(exercise): Path<NodeId>,
    Json(request): Json<ScoreRequest>,
) -> ApiResult<Json<ProgressUpdate>> {
    let update = state.classroom.set_exercise_score(&exercise, request.score)?;
    info!(exercise = %exercise, score = request.score, unlocked = update.unlocked.len(), "Exercise graded");
    Ok(Json(update))
}

async fn handle_set_max_score(
    State(state): AppStateRef,
    Path(exercise): Path<NodeId>,
    Json(request): Json<MaxScoreRequest>,
) -> ApiResult<Json<SyncReport>> {
    let report = state
        .classroom
        .set_exercise_max_score(&exercise, request.max_score)?;
    info!(
        exercise = %exercise,
        max_score = request.max_score,
        copies = report.updated_copies.len(),
        rescaled = report.rescaled,
        "Max score changed"
    );
    Ok(Json(report))
}

async fn handle_set_status(
    State(state): AppStateRef,
    Path(exercise): Path<NodeId>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<ProgressUpdate>> {
    let update = state.classroom.set_exercise_status(&exercise, request.status)?;
    info!(exercise = %exercise, status = %request.status, "Exercise status changed");
    Ok(Json(update))
}

async fn handle_set_content(
    State(state): AppStateRef,
    Path(exercise): Path<NodeId>,
    Json(request): Json<ContentRequest>,
) -> ApiResult<Json<SyncReport>> {
    let report = state
        .classroom
        .set_exercise_content(&exercise, &request.content)?;
    info!(exercise = %exercise, copies = report.updated_copies.len(), "Content changed");
    Ok(Json(report))
}

async fn handle_enroll(
    State(state): AppStateRef,
    Path((course, student)): Path<(ScopeId, StudentId)>,
) -> ApiResult<Json<EnrollmentReport>> {
    let report = state
        .classroom
        .replicate_course_to_student(&course, &student)?;
    info!(
        course = %course,
        student = %student,
        modules = report.copies.modules.created.len(),
        exercises = report.copies.exercises.created.len(),
        "Student enrolled"
    );
    Ok(Json(report))
}

async fn handle_student_modules(
    State(state): AppStateRef,
    Path((course, student)): Path<(ScopeId, StudentId)>,
) -> Json<Vec<ModuleNode>> {
    let scope = ScopeId::for_student(&course, &student);
    Json(state.classroom.materialize_modules(&scope))
}

async fn handle_summary(
    State(state): AppStateRef,
    Path((course, student)): Path<(ScopeId, StudentId)>,
) -> ApiResult<Json<EnrollmentSummary>> {
    Ok(Json(state.classroom.enrollment_summary(&course, &student)?))
}

// ============================================================================
// Tests
// ============================================================================
