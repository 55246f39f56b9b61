//! Path resolution for the item tree.
//!
//! Translates symbolic hierarchical requests (a relative directory path
//! under a parent, or a single name) into tree-consistent, disk-safe
//! paths, creating intermediate directories as needed. The UNIQUE index
//! on `items.path` arbitrates concurrent creation races.

use sqlx::SqlitePool;

use super::storage::Storage;
use super::{MAX_NAME_LENGTH, STAGING_DIR_NAME};
use crate::db::{Item, ItemRepository, NewItem};
use crate::{Result, ShelfError};

/// Sanitize a display name into a disk-safe single path segment.
///
/// Alphanumeric characters (including non-ASCII), `.`, `-`, and `_` are
/// kept; path separators and everything else collapse to a single `_`.
/// Leading dots are stripped, so `..` and hidden-file names cannot
/// survive sanitization.
pub fn sanitize_name(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());

    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() || ch == '.' || ch == '-' || ch == '_' {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let cleaned = out.trim_matches(&['.', '_'][..]);

    if cleaned.is_empty() {
        return Err(ShelfError::InvalidName(format!(
            "'{raw}' is empty after sanitization"
        )));
    }
    if cleaned.chars().count() > MAX_NAME_LENGTH {
        return Err(ShelfError::InvalidName(format!(
            "name exceeds {MAX_NAME_LENGTH} characters"
        )));
    }

    Ok(cleaned.to_string())
}

/// Validate a client-supplied upload identifier.
///
/// The id is used as a staging directory name, so it is restricted to
/// `[A-Za-z0-9_-]` and at most 64 characters. Anything else is rejected
/// before it can reach the filesystem.
pub fn validate_upload_id(raw: &str) -> Result<()> {
    if raw.is_empty() || raw.len() > 64 {
        return Err(ShelfError::InvalidName(
            "upload id must be 1-64 characters".to_string(),
        ));
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ShelfError::InvalidName(
            "upload id may only contain letters, digits, '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

/// Join a parent tree path and a child name.
pub fn join_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}/{name}")
    }
}

/// Resolver for hierarchical storage paths.
pub struct PathResolver<'a> {
    pool: &'a SqlitePool,
    storage: &'a Storage,
}

impl<'a> PathResolver<'a> {
    /// Create a new PathResolver.
    pub fn new(pool: &'a SqlitePool, storage: &'a Storage) -> Self {
        Self { pool, storage }
    }

    /// Ensure every directory along `relative_path` exists under
    /// `parent_id`, creating missing segments on disk and in the tree.
    ///
    /// Returns the leaf directory's id (or `parent_id` unchanged when the
    /// path has no segments). Idempotent under concurrent calls: a caller
    /// that loses the insert race on a segment re-reads the winner's
    /// record and continues, so both callers converge on the same ids.
    pub async fn ensure_directory_path(
        &self,
        relative_path: &str,
        parent_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let items = ItemRepository::new(self.pool);

        let (mut current_parent, mut current_path) = match parent_id {
            Some(id) => {
                let parent = items
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| ShelfError::NotFound("parent directory".to_string()))?;
                if !parent.is_directory() {
                    return Err(ShelfError::Validation(
                        "parent item is not a directory".to_string(),
                    ));
                }
                (Some(id), parent.path)
            }
            None => (None, String::new()),
        };

        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            let name = sanitize_name(segment)?;
            if current_path.is_empty() && name == STAGING_DIR_NAME {
                return Err(ShelfError::InvalidName(format!(
                    "'{STAGING_DIR_NAME}' is reserved"
                )));
            }

            let path = join_path(&current_path, &name);
            let dir = self.lookup_or_create_dir(&items, &name, &path, current_parent).await?;

            current_parent = Some(dir.id);
            current_path = dir.path;
        }

        Ok(current_parent)
    }

    /// Refuse if any item already occupies `path`.
    pub async fn ensure_vacant(&self, path: &str) -> Result<()> {
        let items = ItemRepository::new(self.pool);
        if items.get_by_path(path).await?.is_some() {
            return Err(ShelfError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    async fn lookup_or_create_dir(
        &self,
        items: &ItemRepository<'_>,
        name: &str,
        path: &str,
        parent_id: Option<i64>,
    ) -> Result<Item> {
        if let Some(existing) = items.get_by_path(path).await? {
            return existing_as_directory(existing);
        }

        self.storage.create_dir(path)?;

        match items.create(&NewItem::directory(name, path, parent_id)).await {
            Ok(item) => Ok(item),
            Err(ShelfError::AlreadyExists(_)) => {
                // Lost the insert race; the winner's record is authoritative.
                let winner = items.get_by_path(path).await?.ok_or_else(|| {
                    ShelfError::Database(format!("item at '{path}' vanished after insert conflict"))
                })?;
                existing_as_directory(winner)
            }
            Err(e) => Err(e),
        }
    }
}

fn existing_as_directory(item: Item) -> Result<Item> {
    if item.is_directory() {
        Ok(item)
    } else {
        // A file occupies the path; a directory cannot be merged into it.
        Err(ShelfError::AlreadyExists(item.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tempfile::TempDir;

    async fn setup() -> (Database, TempDir, Storage) {
        let db = Database::open_in_memory().await.unwrap();
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path()).unwrap();
        (db, temp_dir, storage)
    }

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_name("my-file_v2.txt").unwrap(), "my-file_v2.txt");
        assert_eq!(sanitize_name("請求書.pdf").unwrap(), "請求書.pdf");
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_name("a/b\\c.txt").unwrap(), "a_b_c.txt");
        assert_eq!(sanitize_name("my file.txt").unwrap(), "my_file.txt");
        assert_eq!(sanitize_name("a  &  b.txt").unwrap(), "a_b.txt");
    }

    #[test]
    fn test_sanitize_strips_leading_dots() {
        assert_eq!(sanitize_name(".hidden").unwrap(), "hidden");
        assert_eq!(sanitize_name("../../etc/passwd").unwrap(), "etc_passwd");
        assert!(matches!(
            sanitize_name(".."),
            Err(ShelfError::InvalidName(_))
        ));
    }

    #[test]
    fn test_sanitize_empty() {
        assert!(matches!(sanitize_name(""), Err(ShelfError::InvalidName(_))));
        assert!(matches!(
            sanitize_name("   "),
            Err(ShelfError::InvalidName(_))
        ));
        assert!(matches!(
            sanitize_name("///"),
            Err(ShelfError::InvalidName(_))
        ));
    }

    #[test]
    fn test_sanitize_too_long() {
        let long = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            sanitize_name(&long),
            Err(ShelfError::InvalidName(_))
        ));
    }

    #[test]
    fn test_validate_upload_id() {
        assert!(validate_upload_id("abc-123_XYZ").is_ok());
        assert!(validate_upload_id("").is_err());
        assert!(validate_upload_id("../escape").is_err());
        assert!(validate_upload_id("has space").is_err());
        assert!(validate_upload_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("docs", "a.txt"), "docs/a.txt");
    }

    #[tokio::test]
    async fn test_ensure_directory_path_creates_segments() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);
        let items = ItemRepository::new(db.pool());

        let leaf = resolver
            .ensure_directory_path("docs/invoices/2026", None)
            .await
            .unwrap()
            .unwrap();

        let leaf_item = items.get_by_id(leaf).await.unwrap().unwrap();
        assert_eq!(leaf_item.path, "docs/invoices/2026");
        assert!(leaf_item.is_directory());
        assert!(storage.exists("docs/invoices/2026"));

        // Intermediate segments registered with correct parents
        let docs = items.get_by_path("docs").await.unwrap().unwrap();
        let invoices = items.get_by_path("docs/invoices").await.unwrap().unwrap();
        assert!(docs.parent_id.is_none());
        assert_eq!(invoices.parent_id, Some(docs.id));
        assert_eq!(leaf_item.parent_id, Some(invoices.id));
    }

    #[tokio::test]
    async fn test_ensure_directory_path_idempotent() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);

        let first = resolver
            .ensure_directory_path("docs/sub", None)
            .await
            .unwrap();
        let second = resolver
            .ensure_directory_path("docs/sub", None)
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_ensure_directory_path_empty_returns_parent() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);

        assert_eq!(resolver.ensure_directory_path("", None).await.unwrap(), None);

        let dir = resolver
            .ensure_directory_path("docs", None)
            .await
            .unwrap();
        assert_eq!(
            resolver
                .ensure_directory_path("", dir)
                .await
                .unwrap(),
            dir
        );
    }

    #[tokio::test]
    async fn test_ensure_directory_path_under_parent() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);
        let items = ItemRepository::new(db.pool());

        let docs = resolver
            .ensure_directory_path("docs", None)
            .await
            .unwrap();
        let leaf = resolver
            .ensure_directory_path("a/b", docs)
            .await
            .unwrap()
            .unwrap();

        let leaf_item = items.get_by_id(leaf).await.unwrap().unwrap();
        assert_eq!(leaf_item.path, "docs/a/b");
    }

    #[tokio::test]
    async fn test_ensure_directory_path_rejects_missing_parent() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);

        let result = resolver.ensure_directory_path("docs", Some(999)).await;
        assert!(matches!(result, Err(ShelfError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ensure_directory_path_rejects_file_parent() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);
        let items = ItemRepository::new(db.pool());

        let file = items
            .create(&NewItem::file("a.txt", "a.txt", None))
            .await
            .unwrap();

        let result = resolver.ensure_directory_path("docs", Some(file.id)).await;
        assert!(matches!(result, Err(ShelfError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ensure_directory_path_blocked_by_file() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);
        let items = ItemRepository::new(db.pool());

        items
            .create(&NewItem::file("docs", "docs", None))
            .await
            .unwrap();

        let result = resolver.ensure_directory_path("docs/sub", None).await;
        assert!(matches!(result, Err(ShelfError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_reserved_staging_name() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);

        let result = resolver.ensure_directory_path("tmp", None).await;
        assert!(matches!(result, Err(ShelfError::InvalidName(_))));

        // Only reserved at the root
        resolver
            .ensure_directory_path("docs/tmp", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_vacant() {
        let (db, _temp_dir, storage) = setup().await;
        let resolver = PathResolver::new(db.pool(), &storage);
        let items = ItemRepository::new(db.pool());

        resolver.ensure_vacant("a.txt").await.unwrap();

        items
            .create(&NewItem::file("a.txt", "a.txt", None))
            .await
            .unwrap();

        let result = resolver.ensure_vacant("a.txt").await;
        assert!(matches!(result, Err(ShelfError::AlreadyExists(_))));
    }
}
