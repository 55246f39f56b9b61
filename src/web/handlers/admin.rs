//! Admin handlers: login, audit log, settings overrides, purge.
//!
//! Admin requests carry the shared secret in the `X-Admin-Password`
//! header. An empty configured password disables the whole surface.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::json;

use crate::db::{AuditRepository, SettingsRepository};
use crate::sweep::Purger;
use crate::web::dto::{
    AdminLoginRequest, ApiResponse, AuditPageResponse, LogsQuery, PurgeResponse, SettingEntry,
    SettingRequest, SettingsResponse,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Header carrying the admin secret.
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

fn check_password(state: &AppState, supplied: &str) -> Result<(), ApiError> {
    let configured = &state.ctx.config.admin.password;
    if configured.is_empty() {
        return Err(ApiError::forbidden("admin interface is disabled"));
    }
    if supplied != configured {
        return Err(ApiError::unauthorized("invalid admin password"));
    }
    Ok(())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let supplied = headers
        .get(ADMIN_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    check_password(state, supplied)
}

/// POST /admin/login - Verify the admin password.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdminLoginRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    check_password(&state, &request.password)?;
    Ok(Json(ApiResponse::new(json!({ "ok": true }))))
}

/// GET /admin/logs - One page of the audit log, newest first.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<AuditPageResponse>>, ApiError> {
    require_admin(&state, &headers)?;

    let audit = AuditRepository::new(state.ctx.db.pool());
    let page = audit
        .list_page(
            query.page.unwrap_or(1),
            state.ctx.config.admin.logs_per_page,
        )
        .await?;
    Ok(Json(ApiResponse::new(page.into())))
}

/// GET /admin/settings - List stored configuration overrides.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SettingsResponse>>, ApiError> {
    require_admin(&state, &headers)?;

    let repo = SettingsRepository::new(state.ctx.db.pool());
    let overrides = repo
        .all()
        .await?
        .into_iter()
        .map(|(key, value)| SettingEntry { key, value })
        .collect();
    Ok(Json(ApiResponse::new(SettingsResponse { overrides })))
}

/// PUT /admin/settings - Set or clear one configuration override.
pub async fn put_setting(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SettingRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require_admin(&state, &headers)?;

    let repo = SettingsRepository::new(state.ctx.db.pool());
    let audit = AuditRepository::new(state.ctx.db.pool());

    match &request.value {
        Some(value) => {
            repo.set(&request.key, value).await?;
            audit
                .append(
                    "CONFIG",
                    &format!("setting '{}' overridden to '{}'", request.key, value),
                )
                .await?;
        }
        None => {
            repo.unset(&request.key).await?;
            audit
                .append(
                    "CONFIG",
                    &format!("setting '{}' override removed", request.key),
                )
                .await?;
        }
    }

    Ok(Json(ApiResponse::new(json!({ "ok": true }))))
}

/// POST /admin/purge - Remove all stored content.
pub async fn purge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<PurgeResponse>>, ApiError> {
    require_admin(&state, &headers)?;

    let purger = Purger::new(state.ctx.db.pool(), &state.ctx.storage);
    let report = purger.purge_all().await?;
    Ok(Json(ApiResponse::new(PurgeResponse {
        files_removed: report.files_removed,
        items_removed: report.items_removed,
        failures: report.failures,
    })))
}

/// POST /admin/logs/purge - Clear the audit log.
pub async fn purge_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    require_admin(&state, &headers)?;

    let purger = Purger::new(state.ctx.db.pool(), &state.ctx.storage);
    let removed = purger.purge_logs().await?;
    Ok(Json(ApiResponse::new(json!({ "removed": removed }))))
}
