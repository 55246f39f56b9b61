//! Upload, browse, and download handlers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::{EffectiveSettings, SettingsRepository};
use crate::file::{ChunkOutcome, ChunkReceiver, ChunkUpload, TreeService};
use crate::web::dto::{
    ApiResponse, ChunkResponse, ConfigResponse, CreateDirectoryRequest, ItemResponse, ListQuery,
    ListingResponse, RenameRequest,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Fields collected from an upload multipart form.
#[derive(Debug, Default)]
struct UploadForm {
    upload_id: Option<String>,
    chunk_index: Option<u32>,
    total_chunks: Option<u32>,
    file_name: Option<String>,
    directory_path: String,
    parent_id: Option<i64>,
    expires_in_minutes: Option<i64>,
    data: Option<Vec<u8>>,
}

impl UploadForm {
    /// Drain a multipart stream into the form. The chunk field may carry
    /// the file name when the metadata field is absent.
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "chunk" | "file" => {
                    if form.file_name.is_none() {
                        form.file_name = field.file_name().map(str::to_string);
                    }
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("unreadable chunk: {e}")))?;
                    form.data = Some(bytes.to_vec());
                }
                "upload_id" => form.upload_id = Some(text(field).await?),
                "chunk_index" => form.chunk_index = Some(parse(&name, text(field).await?)?),
                "total_chunks" => form.total_chunks = Some(parse(&name, text(field).await?)?),
                "file_name" => form.file_name = Some(text(field).await?),
                "directory_path" => form.directory_path = text(field).await?,
                "parent_id" => form.parent_id = Some(parse(&name, text(field).await?)?),
                "expires_in_minutes" => {
                    form.expires_in_minutes = Some(parse(&name, text(field).await?)?)
                }
                _ => {}
            }
        }

        Ok(form)
    }

    fn require<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
        value.ok_or_else(|| ApiError::bad_request(format!("missing field '{name}'")))
    }
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("unreadable field: {e}")))
}

fn parse<T: std::str::FromStr>(name: &str, raw: String) -> Result<T, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid value for '{name}'")))
}

async fn effective_settings(state: &AppState) -> Result<EffectiveSettings, ApiError> {
    let repo = SettingsRepository::new(state.ctx.db.pool());
    Ok(EffectiveSettings::load(&repo, &state.ctx.config.storage).await?)
}

async fn receive(
    state: &AppState,
    form: UploadForm,
    upload_id: String,
    chunk_index: u32,
    total_chunks: u32,
) -> Result<ChunkResponse, ApiError> {
    let settings = effective_settings(state).await?;

    let data = UploadForm::require(form.data, "chunk")?;

    let minutes = settings.clamp_expiration(form.expires_in_minutes);
    let expires_at = Some(Utc::now() + Duration::minutes(minutes));

    // The receiver enforces the size limit over the whole upload, staged
    // chunks included.
    let receiver = ChunkReceiver::new(
        state.ctx.db.pool(),
        &state.ctx.staging,
        state.ctx.config.jobs.max_attempts,
        settings.max_upload_size_bytes,
    );
    let outcome = receiver
        .receive(ChunkUpload {
            upload_id,
            chunk_index,
            total_chunks,
            file_name: UploadForm::require(form.file_name, "file_name")?,
            directory_path: form.directory_path,
            parent_id: form.parent_id,
            expires_at,
            data,
        })
        .await?;

    Ok(match outcome {
        ChunkOutcome::Accepted { received, total } => ChunkResponse {
            complete: false,
            received: Some(received),
            total: Some(total),
            job_id: None,
        },
        ChunkOutcome::Queued { job_id } => ChunkResponse {
            complete: true,
            received: None,
            total: None,
            job_id: Some(job_id),
        },
    })
}

/// POST /api/upload/chunk - Accept one chunk of a chunked upload.
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ChunkResponse>>, ApiError> {
    let form = UploadForm::read(&mut multipart).await?;

    let upload_id = UploadForm::require(form.upload_id.clone(), "upload_id")?;
    let chunk_index = UploadForm::require(form.chunk_index, "chunk_index")?;
    let total_chunks = UploadForm::require(form.total_chunks, "total_chunks")?;

    let response = receive(&state, form, upload_id, chunk_index, total_chunks).await?;
    Ok(Json(ApiResponse::new(response)))
}

/// POST /api/upload - Accept a whole file in one request.
///
/// Takes the same path as a chunked upload with a single chunk, so the
/// assembly, hashing, and audit behavior is identical.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ChunkResponse>>, ApiError> {
    let form = UploadForm::read(&mut multipart).await?;
    let upload_id = Uuid::new_v4().to_string();

    let response = receive(&state, form, upload_id, 0, 1).await?;
    Ok(Json(ApiResponse::new(response)))
}

/// GET /api/items - List a directory with breadcrumbs.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<ListingResponse>>, ApiError> {
    let service = TreeService::new(state.ctx.db.pool(), &state.ctx.storage);
    let listing = service.list(query.parent_id).await?;
    Ok(Json(ApiResponse::new(listing.into())))
}

/// POST /api/directories - Create a directory.
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateDirectoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ItemResponse>>), ApiError> {
    let service = TreeService::new(state.ctx.db.pool(), &state.ctx.storage);
    let dir = service
        .create_directory(&request.name, request.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(dir.into()))))
}

/// DELETE /api/items/{id} - Delete a file or directory.
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let service = TreeService::new(state.ctx.db.pool(), &state.ctx.storage);
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/items/{id}/rename - Rename a file or directory in place.
pub async fn rename_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<ApiResponse<ItemResponse>>, ApiError> {
    let service = TreeService::new(state.ctx.db.pool(), &state.ctx.storage);
    let item = service.rename(id, &request.new_name).await?;
    Ok(Json(ApiResponse::new(item.into())))
}

/// GET /api/download/{id} - Download a file.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response<Body>, ApiError> {
    let service = TreeService::new(state.ctx.db.pool(), &state.ctx.storage);
    let (item, full_path) = service.open_for_download(id).await?;

    let content = tokio::fs::read(&full_path).await.map_err(|e| {
        tracing::error!(path = %full_path.display(), error = %e, "failed to read file");
        ApiError::internal("Failed to read file")
    })?;

    let content_type = mime_guess::from_path(&item.name)
        .first_or_octet_stream()
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&item.name),
        )
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// GET /api/config - Advertise effective upload limits to clients.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ConfigResponse>>, ApiError> {
    let settings = effective_settings(&state).await?;
    Ok(Json(ApiResponse::new(ConfigResponse {
        max_upload_size_bytes: settings.max_upload_size_bytes,
        chunk_size_bytes: settings.chunk_size_bytes,
        default_expiration_minutes: settings.default_expiration_minutes,
        max_expiration_minutes: settings.max_expiration_minutes,
    })))
}

/// Generate a safe Content-Disposition header value.
///
/// Control characters are stripped and quotes escaped so the name cannot
/// inject headers; non-ASCII names get an RFC 5987 `filename*` parameter.
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{filename}\"");
    }

    let encoded = urlencoding::encode(filename);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}
