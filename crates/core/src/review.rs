//! Code reviews and their line comments.

use crate::error::ForumError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
}

impl User {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReviewComment {
    pub id: u64,
    pub body: String,
    pub line_number: u32,
    pub author: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeReview {
    pub id: u64,
    pub author: User,
    pub comments: Vec<CodeReviewComment>,
}

/// Operations on a review as a whole.
pub trait CodeReviewService: Send + Sync {
    /// Open a new empty review. Anonymous actors are rejected.
    fn create_review(&self, actor: Option<&User>) -> Result<CodeReview, ForumError>;

    fn get_review(&self, review_id: u64) -> Result<CodeReview, ForumError>;

    /// Attach a comment to line `line_number` of review `review_id`.
    fn add_comment(
        &self,
        review_id: u64,
        line_number: u32,
        body: &str,
        actor: Option<&User>,
    ) -> Result<CodeReviewComment, ForumError>;
}

/// Operations on individual comments.
pub trait CodeReviewCommentService: Send + Sync {
    /// Replace the body of a comment. Only its author may do this.
    fn update_comment(
        &self,
        comment_id: u64,
        body: &str,
        actor: Option<&User>,
    ) -> Result<CodeReviewComment, ForumError>;
}

fn require_actor(actor: Option<&User>) -> Result<&User, ForumError> {
    actor.ok_or_else(|| ForumError::AccessDenied("authentication required".into()))
}

#[derive(Default)]
struct StoreInner {
    next_review_id: u64,
    next_comment_id: u64,
    reviews: HashMap<u64, CodeReview>,
    /// comment id → owning review id
    comment_index: HashMap<u64, u64>,
}

/// In-memory implementation of both review services.
#[derive(Default)]
pub struct InMemoryReviewStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreInner>, ForumError> {
        self.inner
            .write()
            .map_err(|_| ForumError::Internal("review store lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreInner>, ForumError> {
        self.inner
            .read()
            .map_err(|_| ForumError::Internal("review store lock poisoned".into()))
    }
}

impl CodeReviewService for InMemoryReviewStore {
    fn create_review(&self, actor: Option<&User>) -> Result<CodeReview, ForumError> {
        let author = require_actor(actor)?;
        let mut inner = self.write()?;
        inner.next_review_id += 1;
        let review = CodeReview {
            id: inner.next_review_id,
            author: author.clone(),
            comments: Vec::new(),
        };
        inner.reviews.insert(review.id, review.clone());
        tracing::info!(review_id = review.id, "Code review created");
        Ok(review)
    }

    fn get_review(&self, review_id: u64) -> Result<CodeReview, ForumError> {
        self.read()?
            .reviews
            .get(&review_id)
            .cloned()
            .ok_or_else(|| ForumError::NotFound(format!("code review {review_id}")))
    }

    fn add_comment(
        &self,
        review_id: u64,
        line_number: u32,
        body: &str,
        actor: Option<&User>,
    ) -> Result<CodeReviewComment, ForumError> {
        let mut inner = self.write()?;
        if !inner.reviews.contains_key(&review_id) {
            return Err(ForumError::NotFound(format!("code review {review_id}")));
        }
        let author = require_actor(actor)?;

        inner.next_comment_id += 1;
        let comment = CodeReviewComment {
            id: inner.next_comment_id,
            body: body.to_string(),
            line_number,
            author: author.clone(),
        };
        inner.comment_index.insert(comment.id, review_id);
        if let Some(review) = inner.reviews.get_mut(&review_id) {
            review.comments.push(comment.clone());
        }
        tracing::info!(review_id, comment_id = comment.id, line_number, "Review comment added");
        Ok(comment)
    }
}

impl CodeReviewCommentService for InMemoryReviewStore {
    fn update_comment(
        &self,
        comment_id: u64,
        body: &str,
        actor: Option<&User>,
    ) -> Result<CodeReviewComment, ForumError> {
        let mut inner = self.write()?;
        let not_found = || ForumError::NotFound(format!("review comment {comment_id}"));

        let review_id = *inner.comment_index.get(&comment_id).ok_or_else(not_found)?;
        let comment = inner
            .reviews
            .get_mut(&review_id)
            .and_then(|r| r.comments.iter_mut().find(|c| c.id == comment_id))
            .ok_or_else(not_found)?;

        let actor = require_actor(actor)?;
        if comment.author.id != actor.id {
            return Err(ForumError::AccessDenied(format!(
                "user {} is not the author of comment {comment_id}",
                actor.username
            )));
        }

        comment.body = body.to_string();
        tracing::info!(comment_id, "Review comment updated");
        Ok(comment.clone())
    }
}
