// Key-value persistence backends for the task list slot

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A named-slot key-value store holding serialized values
pub trait Storage {
    /// Read the value stored under `key`, or `None` if the slot is empty
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }
}

/// Slot keys double as filenames, so keep them to a safe alphabet
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Storage key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Storage key too long: {} (max 64 characters)", key.len()));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!(
            "Invalid storage key '{}': only alphanumeric, underscore and hyphen allowed",
            key
        ));
    }
    Ok(())
}

// ============================================================================
// In-memory
// ============================================================================

/// In-process storage. Clones share the same slots, so a test can keep a
/// handle and inspect what the store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage with `key` already holding `value`
    pub fn with_value(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage.slots().insert(key.to_string(), value.to_string());
        storage
    }

    /// Raw slot contents
    pub fn get(&self, key: &str) -> Option<String> {
        self.slots().get(key).cloned()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.slots().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// Files
// ============================================================================

/// One JSON file per key inside a directory: `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open or create file storage rooted at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create storage directory")?;
        debug!(path = ?base_path, "Opened file storage");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }

    fn lock_path(&self) -> PathBuf {
        self.base_path.join(".lock")
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.slot_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(content))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .context("Failed to open storage lock file")?;

        // Acquire exclusive lock before writing
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        let path = self.slot_path(key);
        let tmp_path = self.base_path.join(format!(".{}.json.tmp", key));
        {
            let mut tmp = fs::File::create(&tmp_path).context("Failed to create temp slot file")?;
            tmp.write_all(value.as_bytes())?;
            tmp.sync_all()?; // Ensure data is flushed to disk
        }
        fs::rename(&tmp_path, &path).with_context(|| format!("Failed to replace {}", path.display()))?;

        FileExt::unlock(&lock).context("Failed to release file lock")?;

        debug!(key, bytes = value.len(), "Wrote slot file");
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// Slots kept as rows of a SQLite table
pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }
        let db = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating slot schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .context("Failed to create slots table")?;
        Ok(Self { db })
    }

    /// Get a reference to the SQLite database connection
    pub fn db(&self) -> &Connection {
        &self.db
    }
}

impl Storage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let value = self
            .db
            .query_row("SELECT value FROM slots WHERE key = ?1", [key], |row| row.get::<_, String>(0))
            .optional()
            .context("Failed to read slot")?;
        Ok(value)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.db
            .execute(
                "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, chrono::Utc::now().timestamp_millis()],
            )
            .context("Failed to write slot")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("todos").is_ok());
        assert!(validate_key("work-list_2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_memory_storage_shared_handle() {
        let storage = MemoryStorage::new();
        let mut writer = storage.clone();

        assert_eq!(storage.read("todos").unwrap(), None);
        writer.write("todos", "[]").unwrap();
        assert_eq!(storage.read("todos").unwrap(), Some("[]".to_string()));
        assert_eq!(storage.get("todos"), Some("[]".to_string()));
    }

    #[test]
    fn test_memory_storage_rejects_bad_key() {
        let mut storage = MemoryStorage::new();
        assert!(storage.write("no/slashes", "[]").is_err());
        assert!(storage.read("").is_err());
    }

    #[test]
    fn test_file_storage_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("data");

        let storage = FileStorage::open(&dir).unwrap();
        assert!(dir.exists());
        assert_eq!(storage.base_path(), dir.as_path());
    }

    #[test]
    fn test_file_storage_read_missing() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        assert_eq!(storage.read("todos").unwrap(), None);
    }

    #[test]
    fn test_file_storage_write_and_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let mut storage = FileStorage::open(temp.path()).unwrap();
            storage.write("todos", r#"[{"id":1}]"#).unwrap();
            storage.write("todos", "[]").unwrap();
        }

        let storage = FileStorage::open(temp.path()).unwrap();
        assert_eq!(storage.read("todos").unwrap(), Some("[]".to_string()));

        let content = fs::read_to_string(temp.path().join("todos.json")).unwrap();
        assert_eq!(content, "[]");
        assert!(!temp.path().join(".todos.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_keys_are_separate() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::open(temp.path()).unwrap();
        storage.write("home", "1").unwrap();
        storage.write("work", "2").unwrap();

        assert_eq!(storage.read("home").unwrap(), Some("1".to_string()));
        assert_eq!(storage.read("work").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_sqlite_storage_upsert() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.read("todos").unwrap(), None);

        storage.write("todos", "first").unwrap();
        storage.write("todos", "second").unwrap();
        assert_eq!(storage.read("todos").unwrap(), Some("second".to_string()));

        let rows: i64 = storage
            .db()
            .query_row("SELECT COUNT(*) FROM slots", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_sqlite_storage_persists_across_open() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("todostore.db");
        {
            let mut storage = SqliteStorage::open(&db_path).unwrap();
            storage.write("todos", "[]").unwrap();
        }

        let storage = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(storage.read("todos").unwrap(), Some("[]".to_string()));
    }

    #[test]
    fn test_boxed_storage_delegates() {
        let inner = MemoryStorage::new();
        let mut boxed: Box<dyn Storage> = Box::new(inner.clone());
        boxed.write("todos", "[]").unwrap();
        assert_eq!(inner.get("todos"), Some("[]".to_string()));
    }
}
