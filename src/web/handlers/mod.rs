//! HTTP request handlers.

pub mod admin;
pub mod files;

use crate::context::AppContext;

/// Shared state for all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application context.
    pub ctx: AppContext,
}

impl AppState {
    /// Create handler state from an application context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}
