//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::db::{AuditEntry, AuditPage, Item};
use crate::file::Listing;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Response payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// One item in a listing.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    /// Item ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// "file" or "directory".
    pub item_type: String,
    /// Root-relative path.
    pub path: String,
    /// Parent directory ID.
    pub parent_id: Option<i64>,
    /// File size in bytes (files only).
    pub size_bytes: Option<i64>,
    /// SHA-256 content hash (files only).
    pub content_hash: Option<String>,
    /// Processing status.
    pub status: String,
    /// Creation time, RFC 3339.
    pub created_at: String,
    /// Expiration time, RFC 3339 (None = never).
    pub expires_at: Option<String>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            item_type: item.item_type.as_str().to_string(),
            path: item.path,
            parent_id: item.parent_id,
            size_bytes: item.size_bytes,
            content_hash: item.content_hash,
            status: item.status.as_str().to_string(),
            created_at: item.created_at.to_rfc3339(),
            expires_at: item.expires_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// A directory listing with breadcrumbs.
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    /// Items in the directory, directories first.
    pub items: Vec<ItemResponse>,
    /// Ancestors from the root down to the listed directory.
    pub breadcrumbs: Vec<ItemResponse>,
}

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            items: listing.items.into_iter().map(Into::into).collect(),
            breadcrumbs: listing.breadcrumbs.into_iter().map(Into::into).collect(),
        }
    }
}

/// Query parameters for GET /api/items.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Directory to list (absent = root level).
    pub parent_id: Option<i64>,
}

/// Response to an accepted chunk.
#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    /// Whether all chunks have arrived and assembly was queued.
    pub complete: bool,
    /// Chunks staged so far (absent once complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<u32>,
    /// Total chunks expected (absent once complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    /// Assembly job ID (present once complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Body for POST /api/directories.
#[derive(Debug, Deserialize)]
pub struct CreateDirectoryRequest {
    /// Directory name, or a slash-separated chain to create.
    pub name: String,
    /// Parent directory ID (absent = root level).
    pub parent_id: Option<i64>,
}

/// Body for PUT /api/items/{id}/rename.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// New name for the item.
    pub new_name: String,
}

/// Public configuration advertised to upload clients.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    /// Maximum upload size in bytes.
    pub max_upload_size_bytes: u64,
    /// Recommended chunk size in bytes.
    pub chunk_size_bytes: u64,
    /// Expiration applied when none is requested, in minutes.
    pub default_expiration_minutes: i64,
    /// Ceiling for requested expirations, in minutes.
    pub max_expiration_minutes: i64,
}

/// Body for POST /admin/login.
#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    /// Admin password.
    pub password: String,
}

/// One audit log entry.
#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    /// Entry ID.
    pub id: i64,
    /// Entry time, RFC 3339.
    pub timestamp: String,
    /// Action tag.
    pub action: String,
    /// Free-text details.
    pub details: String,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id,
            timestamp: entry.timestamp.to_rfc3339(),
            action: entry.action,
            details: entry.details,
        }
    }
}

/// One page of audit log entries.
#[derive(Debug, Serialize)]
pub struct AuditPageResponse {
    /// Entries on this page, newest first.
    pub entries: Vec<AuditEntryResponse>,
    /// Total number of pages.
    pub total_pages: i64,
    /// The returned page (1-based).
    pub current_page: i64,
}

impl From<AuditPage> for AuditPageResponse {
    fn from(page: AuditPage) -> Self {
        Self {
            entries: page.entries.into_iter().map(Into::into).collect(),
            total_pages: page.total_pages,
            current_page: page.current_page,
        }
    }
}

/// Query parameters for GET /admin/logs.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Page to return (1-based, default 1).
    pub page: Option<i64>,
}

/// Body for PUT /admin/settings.
#[derive(Debug, Deserialize)]
pub struct SettingRequest {
    /// Setting key.
    pub key: String,
    /// New value. Absent removes the override.
    pub value: Option<String>,
}

/// Stored settings overrides.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Key/value pairs currently overriding config defaults.
    pub overrides: Vec<SettingEntry>,
}

/// One settings override.
#[derive(Debug, Serialize)]
pub struct SettingEntry {
    /// Setting key.
    pub key: String,
    /// Override value.
    pub value: String,
}

/// Result of an admin purge.
#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    /// Files removed from disk.
    pub files_removed: usize,
    /// Item rows removed.
    pub items_removed: u64,
    /// Disk entries that could not be removed.
    pub failures: Vec<String>,
}
