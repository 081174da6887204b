use crate::error::StorageError;
use crate::utils::fs::replace_file;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

pub type KvFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Durable key/value primitive holding JSON documents.
///
/// Every `set` is all-or-nothing with respect to its backing medium: once the
/// returned future resolves `Ok`, the value survives a process restart.
pub trait KvStore: Send + Sync {
    /// Backend name (e.g. "file", "memory")
    fn name(&self) -> &str;

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<Value>>;

    fn set<'a>(&'a self, key: &'a str, value: Value) -> KvFuture<'a, ()>;

    fn remove<'a>(&'a self, key: &'a str) -> KvFuture<'a, ()>;
}

// ── In-memory backend ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<Value>> {
        let value = self.entries().get(key).cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> KvFuture<'a, ()> {
        self.entries().insert(key.to_string(), value);
        Box::pin(async move { Ok(()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> KvFuture<'a, ()> {
        self.entries().remove(key);
        Box::pin(async move { Ok(()) })
    }
}

// ── JSON file backend ────────────────────────────────────────────

/// All keys live in one JSON object file, rewritten through a synced temp
/// file and an atomic rename on every mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    io: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A file that is not a JSON object is moved
    /// aside to `<name>.corrupt` and the store carries on empty.
    async fn read_document(&self, key: &str) -> Result<Map<String, Value>, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    message: format!("{}: {e}", self.path.display()),
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        let problem = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => "not a JSON object".to_string(),
            Err(e) => e.to_string(),
        };
        self.set_aside(key, &problem).await?;
        Ok(Map::new())
    }

    async fn set_aside(&self, key: &str, problem: &str) -> Result<(), StorageError> {
        let aside = self.corrupt_path();
        tracing::error!(
            "State file {} is unreadable ({problem}); moved to {} and starting empty",
            self.path.display(),
            aside.display()
        );
        tokio::fs::rename(&self.path, &aside)
            .await
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                message: format!("{}: {problem}; could not move aside: {e}", self.path.display()),
            })
    }

    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".corrupt");
        self.path.with_file_name(name)
    }

    async fn write_document(
        &self,
        key: &str,
        document: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        let write_err = |message: String| StorageError::Write {
            key: key.to_string(),
            message,
        };
        let json = serde_json::to_string_pretty(document).map_err(|e| write_err(e.to_string()))?;
        replace_file(&self.path, json.as_bytes())
            .await
            .map_err(|e| write_err(format!("{}: {e}", self.path.display())))
    }
}

impl KvStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<Value>> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let mut document = self.read_document(key).await?;
            Ok(document.remove(key))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> KvFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let mut document = self.read_document(key).await?;
            document.insert(key.to_string(), value);
            self.write_document(key, &document).await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> KvFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.io.lock().await;
            let mut document = self.read_document(key).await?;
            if document.remove(key).is_some() {
                self.write_document(key, &document).await?;
            }
            Ok(())
        })
    }
}
