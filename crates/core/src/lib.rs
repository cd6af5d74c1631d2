pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod mdc;
pub mod review;
