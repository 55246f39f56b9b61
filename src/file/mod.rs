//! File tree management: path resolution, chunked uploads, assembly.

pub mod assembler;
pub mod path;
pub mod receiver;
pub mod service;
pub mod staging;
pub mod storage;

pub use assembler::{AssembleRequest, Assembler};
pub use path::{join_path, sanitize_name, validate_upload_id, PathResolver};
pub use receiver::{ChunkOutcome, ChunkReceiver, ChunkUpload};
pub use service::{Listing, TreeService};
pub use staging::StagingArea;
pub use storage::Storage;

/// Name of the staging directory under the storage root. Reserved: no
/// tree item may occupy this name at the root level.
pub const STAGING_DIR_NAME: &str = "tmp";

/// Maximum length of a single sanitized name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Buffer size for streaming file reads and writes.
pub const IO_BUF_SIZE: usize = 64 * 1024;
