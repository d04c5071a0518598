//! Library Service
//!
//! REST JSON API for a small lending library: a book catalog with per-title
//! inventory, user accounts with bearer tokens, and borrowings that take a
//! copy out of stock until the book is returned.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
