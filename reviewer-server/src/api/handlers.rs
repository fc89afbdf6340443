//! HTTP handlers for teams, users, pull requests and stats.
//!
//! Handlers only decode requests and shape responses; all decisions are
//! made by `ReviewService`.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use reviewer_core::{
    PullRequest, PullRequestId, PullRequestShort, Stats, Team, TeamName, User, UserId,
};

use super::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Unwrap a JSON body, turning decode failures into `INVALID_REQUEST`.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidRequest(format!("Invalid request body: {rejection}")))
}

/// Unwrap query parameters, turning decode failures into `INVALID_REQUEST`.
fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::InvalidRequest(format!("Invalid query: {rejection}")))
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidRequest(format!("{name} is required")))
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

#[derive(Debug, Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: UserId,
}

#[derive(Debug, Serialize)]
pub struct UserReviewsResponse {
    pub user_id: UserId,
    pub pull_requests: Vec<PullRequestShort>,
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub team_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrRequest {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MergePrRequest {
    pub pull_request_id: PullRequestId,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: PullRequestId,
    pub old_user_id: UserId,
}

/// Handler: GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "reviewer"
    }))
}

/// Handler: POST /team/add
pub async fn add_team(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Team>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TeamResponse>)> {
    let team = state.service.create_team(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

/// Handler: GET /team/get?team_name=
pub async fn get_team(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TeamQuery>, QueryRejection>,
) -> ApiResult<Json<Team>> {
    let team_name = TeamName(required(query(params)?.team_name, "team_name")?);
    let team = state.service.get_team(&team_name).await?;
    Ok(Json(team))
}

/// Handler: POST /users/setIsActive
pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetActiveRequest>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let request = body(payload)?;
    let user = state
        .service
        .set_user_active(&request.user_id, request.is_active)
        .await?;
    Ok(Json(UserResponse { user }))
}

/// Handler: GET /users/getReview?user_id=
pub async fn get_user_reviews(
    State(state): State<Arc<AppState>>,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult<Json<UserReviewsResponse>> {
    let user_id = UserId(required(query(params)?.user_id, "user_id")?);
    let pull_requests = state.service.get_user_reviews(&user_id).await?;
    Ok(Json(UserReviewsResponse {
        user_id,
        pull_requests,
    }))
}

/// Handler: POST /pullRequest/create
pub async fn create_pr(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePrRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PullRequestResponse>)> {
    let request = body(payload)?;
    let pr = state
        .service
        .create_pr(
            request.pull_request_id,
            request.pull_request_name,
            request.author_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

/// Handler: POST /pullRequest/merge
pub async fn merge_pr(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MergePrRequest>, JsonRejection>,
) -> ApiResult<Json<PullRequestResponse>> {
    let request = body(payload)?;
    let pr = state.service.merge_pr(&request.pull_request_id).await?;
    Ok(Json(PullRequestResponse { pr }))
}

/// Handler: POST /pullRequest/reassign
pub async fn reassign_reviewer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> ApiResult<Json<ReassignResponse>> {
    let request = body(payload)?;
    let (pr, replaced_by) = state
        .service
        .reassign_reviewer(&request.pull_request_id, &request.old_user_id)
        .await?;
    Ok(Json(ReassignResponse { pr, replaced_by }))
}

/// Handler: GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Stats>> {
    Ok(Json(state.service.compute_stats().await?))
}
