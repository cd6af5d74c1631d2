use crate::AppState;
use crate::auth::CurrentUser;
use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use forum_core::error::ForumError;
use forum_core::review::CodeReview;

/// POST /reviews
pub async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<CodeReview>), ForumError> {
    let review = state.reviews.create_review(user.as_ref())?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// GET /reviews/{id}
pub async fn get_review(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<CodeReview>, ForumError> {
    let Path(id) = id?;
    Ok(Json(state.reviews.get_review(id)?))
}
