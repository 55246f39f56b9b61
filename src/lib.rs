//! SHELF - Self-Hosted Exchange for Large Files
//!
//! A self-hosted file-sharing service built around a chunked-upload
//! assembly pipeline: chunks are staged on disk, assembled and hashed by
//! a durable job queue, and tracked in a SQLite-backed item tree with
//! expiry and empty-directory sweeps.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod file;
pub mod jobs;
pub mod logging;
pub mod sweep;
pub mod web;

pub use config::Config;
pub use context::AppContext;
pub use db::{
    AuditEntry, AuditPage, AuditRepository, Database, EffectiveSettings, Item, ItemRepository,
    ItemStatus, ItemType, Job, JobRepository, JobStatus, JobType, NewItem, SettingsRepository,
};
pub use error::{Result, ShelfError};
pub use file::{
    AssembleRequest, Assembler, ChunkOutcome, ChunkReceiver, ChunkUpload, PathResolver,
    StagingArea, Storage, TreeService,
};
pub use jobs::{Scheduler, WorkerPool};
pub use sweep::{DirectoryReclaimer, ExpiryReaper, Purger};
