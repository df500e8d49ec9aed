use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentGrader};
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::{normalize_component_marks, validate_payload};
use crate::core::state::AppState;
use crate::repositories::ScoreFilter;
use crate::schemas::score::{
    ComponentMarks, ListOverallScoresQuery, OverallScoreOverride, OverallScoreResponse,
    PublishRequest, PublishResponse, RecomputeResponse, ScoreWeightResponse, UnpublishResponse,
    WeightsUpdate,
};
use crate::services::grading::ScoreComponent;
use crate::services::scoring::{ComponentGrade, OverallOverride, WeightsInput};

pub(super) async fn set_weights(
    Path((module_id, intake_id)): Path<(String, String)>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<WeightsUpdate>,
) -> Result<Json<ScoreWeightResponse>, ApiError> {
    validate_payload(&payload)?;

    let weights = state
        .scores()
        .set_weights(
            &module_id,
            &intake_id,
            WeightsInput {
                assignments_weight: payload.assignments_weight,
                exams_weight: payload.exams_weight,
                is_published: payload.is_published,
            },
        )
        .await?;

    tracing::debug!(actor = %admin.id, module_id = %weights.module_id, "Weights updated");
    Ok(Json(weights.into()))
}

pub(super) async fn get_weights(
    Path((module_id, intake_id)): Path<(String, String)>,
    CurrentGrader(_user): CurrentGrader,
    State(state): State<AppState>,
) -> Result<Json<ScoreWeightResponse>, ApiError> {
    let weights = state.scores().get_weights(&module_id, &intake_id).await?;
    Ok(Json(weights.into()))
}

pub(super) async fn record_component(
    Path((module_id, intake_id, student_nic, component)): Path<(String, String, String, String)>,
    CurrentGrader(grader): CurrentGrader,
    State(state): State<AppState>,
    Json(payload): Json<ComponentMarks>,
) -> Result<Json<OverallScoreResponse>, ApiError> {
    let component = parse_component(&component)?;
    let value = normalize_component_marks(&payload)?;

    let score = state
        .scores()
        .record_component(ComponentGrade { student_nic, module_id, intake_id, component, value })
        .await?;

    tracing::debug!(actor = %grader.id, role = grader.role.as_str(), "Component graded");
    Ok(Json(score.into()))
}

pub(super) async fn recompute(
    Path((module_id, intake_id)): Path<(String, String)>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let recomputed_count = state.scores().recompute(&module_id, &intake_id).await?;
    Ok(Json(RecomputeResponse { recomputed_count }))
}

pub(super) async fn publish(
    Path((module_id, intake_id)): Path<(String, String)>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PublishResponse>, ApiError> {
    let payload = parse_publish_request(&body)?;

    let published_count =
        state.scores().publish(&module_id, &intake_id, payload.student_nics).await?;

    tracing::debug!(actor = %admin.id, published_count, "Cohort publish requested");
    Ok(Json(PublishResponse { published_count }))
}

pub(super) async fn unpublish(
    Path((module_id, intake_id)): Path<(String, String)>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<UnpublishResponse>, ApiError> {
    let unpublished_count = state.scores().unpublish(&module_id, &intake_id).await?;

    tracing::debug!(actor = %admin.id, unpublished_count, "Cohort unpublish requested");
    Ok(Json(UnpublishResponse { unpublished_count }))
}

pub(super) async fn list_overall_scores(
    Query(params): Query<ListOverallScoresQuery>,
    CurrentGrader(_user): CurrentGrader,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<OverallScoreResponse>>, ApiError> {
    let filter = ScoreFilter {
        module_id: params.module_id,
        intake_id: params.intake_id,
        skip: params.skip,
        limit: params.limit,
    };

    let page = state.scores().list_overall_scores(filter).await?;

    Ok(Json(PaginatedResponse {
        items: page.items.into_iter().map(OverallScoreResponse::from).collect(),
        total_count: page.total,
        skip: params.skip,
        limit: params.limit,
    }))
}

pub(super) async fn set_overall_marks(
    Path((student_nic, module_id)): Path<(String, String)>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<OverallScoreOverride>,
) -> Result<Json<OverallScoreResponse>, ApiError> {
    validate_payload(&payload)?;

    let score = state
        .scores()
        .set_overall_marks(OverallOverride {
            student_nic,
            module_id,
            intake_id: payload.intake_id,
            overall_score: payload.overall_score,
            is_finalized: payload.is_finalized,
        })
        .await?;

    tracing::debug!(actor = %admin.id, "Overall score overridden");
    Ok(Json(score.into()))
}

pub(super) async fn clear_override(
    Path((student_nic, module_id)): Path<(String, String)>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<OverallScoreResponse>, ApiError> {
    let score = state.scores().clear_override(&student_nic, &module_id).await?;
    Ok(Json(score.into()))
}

/// The publish body is optional; an empty body targets the whole cohort.
fn parse_publish_request(body: &[u8]) -> Result<PublishRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PublishRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid publish request: {e}")))
}

fn parse_component(raw: &str) -> Result<ScoreComponent, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "assignment" | "assignments" => Ok(ScoreComponent::Assignment),
        "exam" | "exams" => Ok(ScoreComponent::Exam),
        other => Err(ApiError::BadRequest(format!(
            "Unknown component '{other}'; expected 'assignment' or 'exam'"
        ))),
    }
}
