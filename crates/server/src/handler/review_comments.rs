//! JSON endpoints for adding and editing code-review comments.

use crate::AppState;
use crate::auth::CurrentUser;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use forum_core::error::ForumError;
use forum_core::review::CodeReviewComment;
use serde::{Deserialize, Serialize};

pub const MAX_BODY_CHARS: usize = 5000;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeReviewCommentDto {
    pub id: u64,
    pub line_number: u32,
    pub body: Option<String>,
    pub author_id: u64,
    pub author_username: Option<String>,
}

impl CodeReviewCommentDto {
    /// Trim every string field; blank strings become absent.
    pub fn trimmed(self) -> Self {
        fn trim(value: Option<String>) -> Option<String> {
            value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        }
        Self {
            body: trim(self.body),
            author_username: trim(self.author_username),
            ..self
        }
    }

    fn validate(&self, kind: Submission) -> Vec<FieldError> {
        let mut errors = Vec::new();
        match self.body.as_deref() {
            None => errors.push(FieldError::new("body", "must not be blank")),
            Some(body) if body.chars().count() > MAX_BODY_CHARS => errors.push(FieldError::new(
                "body",
                &format!("must be at most {MAX_BODY_CHARS} characters"),
            )),
            Some(_) => {}
        }
        if kind == Submission::New && self.line_number < 1 {
            errors.push(FieldError::new("lineNumber", "must be at least 1"));
        }
        errors
    }
}

impl From<&CodeReviewComment> for CodeReviewCommentDto {
    fn from(comment: &CodeReviewComment) -> Self {
        Self {
            id: comment.id,
            line_number: comment.line_number,
            body: Some(comment.body.clone()),
            author_id: comment.author.id,
            author_username: Some(comment.author.username.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    New,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JsonResponseStatus {
    Success,
    Fail,
}

/// Envelope for every JSON response of this controller.
#[derive(Debug, Serialize)]
pub struct JsonResponse<T> {
    pub status: JsonResponseStatus,
    pub result: T,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(result: T) -> Self {
        Self {
            status: JsonResponseStatus::Success,
            result,
        }
    }
}

impl JsonResponse<Vec<FieldError>> {
    pub fn fail(errors: Vec<FieldError>) -> Self {
        Self {
            status: JsonResponseStatus::Fail,
            result: errors,
        }
    }
}

impl<T: Serialize> IntoResponse for JsonResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentQuery {
    pub review_id: u64,
}

/// POST /reviewcomments/new?reviewId={id}
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<NewCommentQuery>, QueryRejection>,
    payload: Result<Json<CodeReviewCommentDto>, JsonRejection>,
) -> Result<Response, ForumError> {
    let Query(query) = query?;
    let Json(dto) = payload?;
    let dto = dto.trimmed();
    let errors = dto.validate(Submission::New);
    if !errors.is_empty() {
        tracing::debug!(review_id = query.review_id, ?errors, "Comment rejected by validation");
        return Ok(JsonResponse::fail(errors).into_response());
    }

    let comment = state.reviews.add_comment(
        query.review_id,
        dto.line_number,
        dto.body.as_deref().unwrap_or_default(),
        user.as_ref(),
    )?;
    Ok(JsonResponse::success(CodeReviewCommentDto::from(&comment)).into_response())
}

/// POST /reviewcomments/edit
pub async fn edit_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CodeReviewCommentDto>, JsonRejection>,
) -> Result<Response, ForumError> {
    let Json(dto) = payload?;
    let dto = dto.trimmed();
    let errors = dto.validate(Submission::Edit);
    if !errors.is_empty() {
        tracing::debug!(comment_id = dto.id, ?errors, "Comment edit rejected by validation");
        return Ok(JsonResponse::fail(errors).into_response());
    }

    let comment = state.comments.update_comment(
        dto.id,
        dto.body.as_deref().unwrap_or_default(),
        user.as_ref(),
    )?;
    Ok(JsonResponse::success(CodeReviewCommentDto::from(&comment)).into_response())
}
