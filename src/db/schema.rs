//! Database schema migrations for SHELF.
//!
//! Each entry is applied in order inside its own transaction and recorded
//! in the `schema_version` table.

/// Ordered list of schema migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: initial schema
    r#"
    CREATE TABLE items (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        name         TEXT NOT NULL,
        item_type    TEXT NOT NULL CHECK (item_type IN ('file', 'directory')),
        path         TEXT NOT NULL UNIQUE,
        parent_id    INTEGER REFERENCES items(id) ON DELETE CASCADE,
        size_bytes   INTEGER,
        content_hash TEXT,
        status       TEXT NOT NULL DEFAULT 'processed',
        created_at   TEXT NOT NULL,
        expires_at   TEXT
    );
    CREATE INDEX idx_items_parent ON items(parent_id);
    CREATE INDEX idx_items_expires ON items(expires_at) WHERE expires_at IS NOT NULL;

    CREATE TABLE audit_log (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        action    TEXT NOT NULL,
        details   TEXT NOT NULL DEFAULT ''
    );
    CREATE INDEX idx_audit_timestamp ON audit_log(timestamp);

    CREATE TABLE jobs (
        id           TEXT PRIMARY KEY,
        job_type     TEXT NOT NULL,
        payload      TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'pending',
        attempts     INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        run_at       TEXT NOT NULL,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    );
    CREATE INDEX idx_jobs_status_run_at ON jobs(status, run_at);

    CREATE TABLE settings (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#,
];
