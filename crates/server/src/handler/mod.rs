pub mod auth;
pub mod health;
pub mod review_comments;
pub mod reviews;
