use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::ffi::ErrorCode;
use rusqlite::{Connection, Error as SqliteError, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use crate::config::{AppConfig, CacheBackend};
use crate::errors::{AppError, AppResult};

pub const BLOB_DB_FILE: &str = "territory-map.db";

/// String-keyed storage for whole serialized blobs.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

pub fn open_blob_store(config: &AppConfig) -> AppResult<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.geo_cache_backend {
        CacheBackend::File => Arc::new(FileBlobStore::new(&config.data_dir)),
        CacheBackend::Sqlite => Arc::new(SqliteBlobStore::open(config.data_dir.join(BLOB_DB_FILE))?),
        CacheBackend::Memory => Arc::new(MemoryBlobStore::default()),
    };
    Ok(store)
}

/// One `<key>.json` file per blob.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        remove_if_exists(&self.path_for(key))
    }
}

pub struct SqliteBlobStore {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteBlobStore {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let connection = match establish_connection(&path) {
            Ok(connection) => connection,
            Err(AppError::Database(err)) if should_attempt_recovery(&err, &path) => {
                warn!(
                    target: "blob_store",
                    path = %path.display(),
                    error = %err,
                    "blob database failed to open, recreating"
                );
                recover_store(&path)?;
                establish_connection(&path)?
            }
            Err(err) => return Err(err),
        };
        info!(target: "blob_store", path = %path.display(), "sqlite blob store ready");
        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.connection.lock();
        conn.query_row("SELECT value FROM blobs WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(AppError::from)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO blobs (key, value, updated_at)
            VALUES (?1, ?2, DATETIME('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            (key, value),
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let conn = self.connection.lock();
        conn.execute("DELETE FROM blobs WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.blobs.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.blobs.lock().remove(key);
        Ok(())
    }
}

fn establish_connection(path: &Path) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(path, flags)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;

        CREATE TABLE IF NOT EXISTS blobs (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );
        "#,
    )?;
    Ok(connection)
}

fn should_attempt_recovery(err: &SqliteError, path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    match err {
        SqliteError::SqliteFailure(code, message) => {
            matches!(code.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
                || message
                    .as_deref()
                    .map(|msg| msg.contains("database disk image is malformed"))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn recover_store(path: &Path) -> AppResult<()> {
    remove_if_exists(path)?;
    remove_if_exists(&sibling(path, "-wal"))?;
    remove_if_exists(&sibling(path, "-shm"))?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}
