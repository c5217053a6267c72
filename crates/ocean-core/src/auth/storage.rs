//! Persisted token storage.
//!
//! Tokens live in a string-keyed, string-valued store under the fixed keys
//! `accessToken` and `refreshToken`. Three backends are provided: a JSON
//! file in the cache directory, the OS keychain, and an in-memory map.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use crate::models::TokenPair;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Token file name in cache directory
const TOKEN_FILE: &str = "tokens.json";

/// Keychain service name
const SERVICE_NAME: &str = "ocean";

/// String key-value storage shared by every session in the process.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// ============================================================================
// File backend
// ============================================================================

/// JSON object on disk, rewritten on every change.
pub struct FileStore {
    cache_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    fn path(&self) -> PathBuf {
        self.cache_dir.join(TOKEN_FILE)
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let path = self.path();
        if entries.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove token file")?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&path, contents).context("Failed to write token file")?;
        restrict_permissions(&path);
        Ok(())
    }

    /// A corrupt file is replaced rather than blocking every later write.
    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = match self.read_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable token file");
                BTreeMap::new()
            }
        };
        f(&mut entries);
        self.write_all(&entries)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(error = %e, "Failed to restrict token file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) {}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}

// ============================================================================
// Keychain backend
// ============================================================================

/// One OS keychain entry per key, under the `ocean` service.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

// ============================================================================
// Memory backend
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow::anyhow!("Token store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow::anyhow!("Token store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow::anyhow!("Token store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// Token pair view
// ============================================================================

/// Whatever is currently persisted; either token may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Reads and writes the access/refresh pair as a unit.
pub struct TokenStorage {
    store: Box<dyn KeyValueStore>,
}

impl TokenStorage {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    pub fn access_token(&self) -> Result<Option<String>> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    pub fn load(&self) -> Result<StoredTokens> {
        Ok(StoredTokens {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
        })
    }

    /// Persist both tokens. If the refresh token cannot be written the
    /// access token just written is removed again.
    pub fn save(&self, pair: &TokenPair) -> Result<()> {
        self.store.set(ACCESS_TOKEN_KEY, &pair.access_token)?;
        if let Err(e) = self.store.set(REFRESH_TOKEN_KEY, &pair.refresh_token) {
            warn!(error = %e, "Failed to persist refresh token, rolling back access token");
            if let Err(rollback) = self.store.remove(ACCESS_TOKEN_KEY) {
                warn!(error = %rollback, "Failed to roll back access token");
            }
            return Err(e);
        }
        debug!("Token pair persisted");
        Ok(())
    }

    /// Remove both tokens. Both removals are attempted even if the first fails.
    pub fn clear(&self) -> Result<()> {
        let access = self.store.remove(ACCESS_TOKEN_KEY);
        let refresh = self.store.remove(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Store that refuses to write one key.
    pub(crate) struct FailingStore {
        pub(crate) inner: MemoryStore,
        pub(crate) fail_key: &'static str,
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key == self.fail_key {
                anyhow::bail!("disk full");
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_save_load_clear() {
        let storage = TokenStorage::memory();
        assert_eq!(storage.load().unwrap(), StoredTokens::default());

        storage.save(&TokenPair::new("a", "r")).unwrap();
        let stored = storage.load().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("a"));
        assert_eq!(stored.refresh_token.as_deref(), Some("r"));

        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), StoredTokens::default());
        // Clearing an empty store is fine
        storage.clear().unwrap();
    }

    #[test]
    fn test_partial_write_is_rolled_back() {
        let storage = TokenStorage::new(Box::new(FailingStore {
            inner: MemoryStore::new(),
            fail_key: REFRESH_TOKEN_KEY,
        }));
        assert!(storage.save(&TokenPair::new("a", "r")).is_err());
        assert_eq!(storage.load().unwrap(), StoredTokens::default());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);

        store.set(ACCESS_TOKEN_KEY, "a").unwrap();
        store.set(REFRESH_TOKEN_KEY, "r").unwrap();

        // A second handle on the same directory sees the same values
        let reopened = FileStore::new(dir.path().join("nested"));
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r"));

        let contents = std::fs::read_to_string(dir.path().join("nested").join(TOKEN_FILE)).unwrap();
        assert!(contents.contains("\"accessToken\""));
    }

    #[test]
    fn test_file_store_removes_file_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::new(Box::new(FileStore::new(dir.path().to_path_buf())));
        storage.save(&TokenPair::new("a", "r")).unwrap();
        assert!(dir.path().join(TOKEN_FILE).exists());

        storage.clear().unwrap();
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "not json").unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        assert!(store.get(ACCESS_TOKEN_KEY).is_err());
    }

    #[test]
    fn test_file_store_overwrites_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "not json").unwrap();
        let storage = TokenStorage::new(Box::new(FileStore::new(dir.path().to_path_buf())));

        storage.save(&TokenPair::new("a", "r")).unwrap();
        let stored = storage.load().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("a"));
        assert_eq!(stored.refresh_token.as_deref(), Some("r"));

        std::fs::write(dir.path().join(TOKEN_FILE), "not json").unwrap();
        storage.clear().unwrap();
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }
}
