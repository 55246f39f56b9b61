//! Item tree types and repository for SHELF.
//!
//! Items form the hierarchical metadata tree: every file and directory is
//! one row, keyed by a globally unique slash-separated `path`. The UNIQUE
//! index on `path` is the synchronization point for all concurrent
//! path-insert races.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{Result, ShelfError};

/// Type of a tree item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

impl ItemType {
    /// String representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Directory => "directory",
        }
    }
}

impl TryFrom<String> for ItemType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "file" => Ok(ItemType::File),
            "directory" => Ok(ItemType::Directory),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

/// Processing status of a file item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Upload accepted, assembly not finished.
    Pending,
    /// Assembled, hash and size recorded.
    Processed,
    /// Assembly failed.
    Error,
}

impl ItemStatus {
    /// String representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processed => "processed",
            ItemStatus::Error => "error",
        }
    }
}

impl TryFrom<String> for ItemStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        match value.as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "processed" => Ok(ItemStatus::Processed),
            "error" => Ok(ItemStatus::Error),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// A node in the file/directory tree.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Item {
    /// Unique item ID.
    pub id: i64,
    /// Display name (sanitized).
    pub name: String,
    /// Item type.
    #[sqlx(try_from = "String")]
    pub item_type: ItemType,
    /// Root-relative slash-separated path, globally unique.
    pub path: String,
    /// Parent directory ID (None for root items).
    pub parent_id: Option<i64>,
    /// File size in bytes (files only).
    pub size_bytes: Option<i64>,
    /// SHA-256 content hash in hex (files only).
    pub content_hash: Option<String>,
    /// Processing status.
    #[sqlx(try_from = "String")]
    pub status: ItemStatus,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
    /// When the item expires (None = never; always None for directories).
    pub expires_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Whether this item is a directory.
    pub fn is_directory(&self) -> bool {
        self.item_type == ItemType::Directory
    }

    /// Whether this item is a file.
    pub fn is_file(&self) -> bool {
        self.item_type == ItemType::File
    }
}

/// Data for creating a new item.
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Display name.
    pub name: String,
    /// Item type.
    pub item_type: ItemType,
    /// Root-relative path.
    pub path: String,
    /// Parent directory ID.
    pub parent_id: Option<i64>,
    /// File size in bytes.
    pub size_bytes: Option<i64>,
    /// SHA-256 content hash.
    pub content_hash: Option<String>,
    /// Processing status.
    pub status: ItemStatus,
    /// Expiration time.
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewItem {
    /// Create a new file item.
    pub fn file(name: impl Into<String>, path: impl Into<String>, parent_id: Option<i64>) -> Self {
        Self {
            name: name.into(),
            item_type: ItemType::File,
            path: path.into(),
            parent_id,
            size_bytes: None,
            content_hash: None,
            status: ItemStatus::Processed,
            expires_at: None,
        }
    }

    /// Create a new directory item. Directories never expire.
    pub fn directory(
        name: impl Into<String>,
        path: impl Into<String>,
        parent_id: Option<i64>,
    ) -> Self {
        Self {
            name: name.into(),
            item_type: ItemType::Directory,
            path: path.into(),
            parent_id,
            size_bytes: None,
            content_hash: None,
            status: ItemStatus::Processed,
            expires_at: None,
        }
    }

    /// Set the size in bytes.
    pub fn with_size(mut self, size_bytes: i64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Set the content hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Set the processing status.
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the expiration time.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

const ITEM_COLUMNS: &str = "id, name, item_type, path, parent_id, size_bytes, content_hash, \
                            status, created_at, expires_at";

/// Repository for item tree operations.
pub struct ItemRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ItemRepository<'a> {
    /// Create a new ItemRepository with the given database pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new item.
    ///
    /// Returns [`ShelfError::AlreadyExists`] when another item holds the
    /// same path. Callers racing on directory creation catch that variant
    /// and re-read the winner's record.
    pub async fn create(&self, item: &NewItem) -> Result<Item> {
        let result = sqlx::query(
            "INSERT INTO items (name, item_type, path, parent_id, size_bytes, content_hash, status, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.name)
        .bind(item.item_type.as_str())
        .bind(&item.path)
        .bind(item.parent_id)
        .bind(item.size_bytes)
        .bind(&item.content_hash)
        .bind(item.status.as_str())
        .bind(Utc::now())
        .bind(item.expires_at)
        .execute(self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(e) => return Err(map_insert_error(e, &item.path)),
        };

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ShelfError::NotFound("item".to_string()))
    }

    /// Get an item by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(item)
    }

    /// Get an item by its exact path.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE path = ?"
        ))
        .bind(path)
        .fetch_optional(self.pool)
        .await?;

        Ok(item)
    }

    /// List children of a directory (None = root level), directories first.
    pub async fn list_by_parent(&self, parent_id: Option<i64>) -> Result<Vec<Item>> {
        let items = match parent_id {
            Some(id) => {
                sqlx::query_as::<_, Item>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items WHERE parent_id = ?
                     ORDER BY item_type DESC, name"
                ))
                .bind(id)
                .fetch_all(self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Item>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items WHERE parent_id IS NULL
                     ORDER BY item_type DESC, name"
                ))
                .fetch_all(self.pool)
                .await?
            }
        };

        Ok(items)
    }

    /// List an item and all its descendants by path prefix.
    ///
    /// Prefix matching is done with `substr` rather than LIKE so that
    /// `_` in item names is not treated as a wildcard.
    pub async fn list_subtree(&self, path: &str) -> Result<Vec<Item>> {
        let prefix = format!("{path}/");
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
             ORDER BY length(path) DESC"
        ))
        .bind(path)
        .bind(&prefix)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// List file items whose expiration has elapsed.
    pub async fn list_expired_files(&self, now: DateTime<Utc>) -> Result<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE item_type = 'file' AND expires_at IS NOT NULL AND expires_at <= ?
             ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Rename an item, rewriting descendant paths in the same transaction
    /// when the item is a directory.
    ///
    /// Returns [`ShelfError::AlreadyExists`] if the new path is taken.
    pub async fn rename(&self, item: &Item, new_name: &str, new_path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE items SET name = ?, path = ? WHERE id = ?")
            .bind(new_name)
            .bind(new_path)
            .bind(item.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, new_path))?;

        if updated.rows_affected() == 0 {
            return Err(ShelfError::NotFound("item".to_string()));
        }

        if item.is_directory() {
            // Rewrite every descendant path under the old prefix.
            sqlx::query(
                "UPDATE items
                 SET path = ?1 || substr(path, length(?2) + 1)
                 WHERE substr(path, 1, length(?2) + 1) = ?2 || '/'",
            )
            .bind(new_path)
            .bind(&item.path)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, new_path))?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete an item by ID. Children cascade via the parent_id foreign key.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every item. Returns the number of rows removed.
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM items").execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Get the chain of ancestors from the root down to (and including)
    /// the given item.
    pub async fn ancestors(&self, id: i64) -> Result<Vec<Item>> {
        let mut chain = Vec::new();
        let mut current_id = Some(id);

        while let Some(item_id) = current_id {
            if let Some(item) = self.get_by_id(item_id).await? {
                current_id = item.parent_id;
                chain.push(item);
            } else {
                break;
            }
        }

        chain.reverse();
        Ok(chain)
    }
}

/// Map an insert/update error, detecting the path UNIQUE constraint.
fn map_insert_error(e: sqlx::Error, path: &str) -> ShelfError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ShelfError::AlreadyExists(path.to_string())
        }
        _ => ShelfError::Database(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_file_item() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let item = repo
            .create(
                &NewItem::file("report.pdf", "report.pdf", None)
                    .with_size(1024)
                    .with_content_hash("ab".repeat(32)),
            )
            .await
            .unwrap();

        assert_eq!(item.name, "report.pdf");
        assert_eq!(item.item_type, ItemType::File);
        assert_eq!(item.size_bytes, Some(1024));
        assert_eq!(item.status, ItemStatus::Processed);
        assert!(item.parent_id.is_none());
        assert!(item.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_path() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        repo.create(&NewItem::file("a.txt", "a.txt", None))
            .await
            .unwrap();
        let result = repo.create(&NewItem::file("a.txt", "a.txt", None)).await;

        assert!(matches!(result, Err(ShelfError::AlreadyExists(p)) if p == "a.txt"));
    }

    #[tokio::test]
    async fn test_get_by_path() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let created = repo
            .create(&NewItem::directory("docs", "docs", None))
            .await
            .unwrap();

        let found = repo.get_by_path("docs").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(found.is_directory());

        assert!(repo.get_by_path("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_parent() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let dir = repo
            .create(&NewItem::directory("docs", "docs", None))
            .await
            .unwrap();
        repo.create(&NewItem::file("b.txt", "docs/b.txt", Some(dir.id)))
            .await
            .unwrap();
        repo.create(&NewItem::directory("sub", "docs/sub", Some(dir.id)))
            .await
            .unwrap();
        repo.create(&NewItem::file("root.txt", "root.txt", None))
            .await
            .unwrap();

        let children = repo.list_by_parent(Some(dir.id)).await.unwrap();
        assert_eq!(children.len(), 2);
        // Directories sort before files
        assert_eq!(children[0].name, "sub");
        assert_eq!(children[1].name, "b.txt");

        let roots = repo.list_by_parent(None).await.unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[tokio::test]
    async fn test_list_subtree() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let a = repo
            .create(&NewItem::directory("a", "a", None))
            .await
            .unwrap();
        let b = repo
            .create(&NewItem::directory("b", "a/b", Some(a.id)))
            .await
            .unwrap();
        repo.create(&NewItem::file("c.txt", "a/b/c.txt", Some(b.id)))
            .await
            .unwrap();
        // Sibling that shares a textual prefix but not the tree prefix
        repo.create(&NewItem::directory("ab", "ab", None))
            .await
            .unwrap();

        let subtree = repo.list_subtree("a").await.unwrap();
        let paths: Vec<_> = subtree.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"a"));
        assert!(paths.contains(&"a/b"));
        assert!(paths.contains(&"a/b/c.txt"));
        assert!(!paths.contains(&"ab"));
        // Deepest first
        assert_eq!(paths[0], "a/b/c.txt");
    }

    #[tokio::test]
    async fn test_list_expired_files() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());
        let now = Utc::now();

        repo.create(
            &NewItem::file("old.txt", "old.txt", None)
                .with_expires_at(now - Duration::minutes(10)),
        )
        .await
        .unwrap();
        repo.create(
            &NewItem::file("new.txt", "new.txt", None)
                .with_expires_at(now + Duration::minutes(10)),
        )
        .await
        .unwrap();
        repo.create(&NewItem::file("keep.txt", "keep.txt", None))
            .await
            .unwrap();

        let expired = repo.list_expired_files(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].name, "old.txt");
    }

    #[tokio::test]
    async fn test_rename_file() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let file = repo
            .create(&NewItem::file("a.txt", "a.txt", None))
            .await
            .unwrap();

        repo.rename(&file, "b.txt", "b.txt").await.unwrap();

        let renamed = repo.get_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(renamed.name, "b.txt");
        assert_eq!(renamed.path, "b.txt");
    }

    #[tokio::test]
    async fn test_rename_directory_cascades_paths() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let a = repo
            .create(&NewItem::directory("a", "a", None))
            .await
            .unwrap();
        let b = repo
            .create(&NewItem::directory("b", "a/b", Some(a.id)))
            .await
            .unwrap();
        repo.create(&NewItem::file("d.txt", "a/b/d.txt", Some(b.id)))
            .await
            .unwrap();
        let other = repo
            .create(&NewItem::file("x.txt", "x.txt", None))
            .await
            .unwrap();

        repo.rename(&b, "c", "a/c").await.unwrap();

        let descendant = repo.get_by_path("a/c/d.txt").await.unwrap();
        assert!(descendant.is_some());
        assert!(repo.get_by_path("a/b/d.txt").await.unwrap().is_none());
        // Unrelated item untouched
        let untouched = repo.get_by_id(other.id).await.unwrap().unwrap();
        assert_eq!(untouched.path, "x.txt");
    }

    #[tokio::test]
    async fn test_rename_collision() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let a = repo
            .create(&NewItem::file("a.txt", "a.txt", None))
            .await
            .unwrap();
        repo.create(&NewItem::file("b.txt", "b.txt", None))
            .await
            .unwrap();

        let result = repo.rename(&a, "b.txt", "b.txt").await;
        assert!(matches!(result, Err(ShelfError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_children() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let dir = repo
            .create(&NewItem::directory("docs", "docs", None))
            .await
            .unwrap();
        let child = repo
            .create(&NewItem::file("a.txt", "docs/a.txt", Some(dir.id)))
            .await
            .unwrap();

        assert!(repo.delete(dir.id).await.unwrap());
        assert!(repo.get_by_id(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        assert!(!repo.delete(9999).await.unwrap());
    }

    #[tokio::test]
    async fn test_ancestors() {
        let db = setup_db().await;
        let repo = ItemRepository::new(db.pool());

        let a = repo
            .create(&NewItem::directory("a", "a", None))
            .await
            .unwrap();
        let b = repo
            .create(&NewItem::directory("b", "a/b", Some(a.id)))
            .await
            .unwrap();
        let c = repo
            .create(&NewItem::file("c.txt", "a/b/c.txt", Some(b.id)))
            .await
            .unwrap();

        let chain = repo.ancestors(c.id).await.unwrap();
        let names: Vec<_> = chain.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c.txt"]);
    }
}
