use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use moka::sync::Cache;
use tracing::{info, warn};

use crate::cache::CACHE_TTL;
use crate::config::{CacheBackend, CacheSettings};
use crate::crypto::{self, CryptoError, KdfParams, SealingKey, SALT_LEN};
use crate::error::CacheError;

const SALT_FILE: &str = "salt";
const ENTRY_EXT: &str = "entry";

/// Backing store for cached predictions. Values are opaque bytes.
///
/// Implementations report failures as `CacheError`; the prediction cache
/// treats any failure as a miss.
pub trait CacheStore: Send + Sync {
    /// `false` means every read should bypass the store entirely.
    fn is_available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Store that holds nothing. Every read misses and nothing is written.
#[derive(Debug, Default)]
pub struct NoopStore;

impl CacheStore for NoopStore {
    fn is_available(&self) -> bool {
        false
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Bounded in-process store. Entries also age out of moka after the cache TTL
/// so expired predictions do not pile up.
pub struct MemoryStore {
    cache: Cache<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(CACHE_TTL)
            .build();
        Self { cache }
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.cache.get(key))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key);
        Ok(())
    }
}

/// One encrypted file per key under a directory. The key is derived once
/// from the passphrase and a per-directory salt.
#[derive(Debug)]
pub struct EncryptedFileStore {
    dir: PathBuf,
    key: SealingKey,
}

impl EncryptedFileStore {
    pub fn open(dir: &Path, passphrase: &str, params: KdfParams) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let salt_path = dir.join(SALT_FILE);
        let salt = match fs::read(&salt_path) {
            Ok(salt) if salt.len() == SALT_LEN => salt,
            Ok(_) => return Err(CryptoError::InvalidFormat.into()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let salt = crypto::generate_salt();
                fs::write(&salt_path, salt)?;
                salt.to_vec()
            }
            Err(e) => return Err(e.into()),
        };
        let key = SealingKey::derive(passphrase, &salt, params)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            key,
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{b:02x}")).collect();
        self.dir.join(name).with_extension(ENTRY_EXT)
    }
}

impl CacheStore for EncryptedFileStore {
    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.entry_path(key)) {
            Ok(sealed) => Ok(Some(crypto::open(&self.key, &sealed)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let sealed = crypto::seal(&self.key, &value)?;
        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, sealed)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Build the configured store. A store that cannot be opened degrades to
/// `NoopStore` so forecasts keep working uncached.
pub fn open_store(settings: &CacheSettings, passphrase: Option<&str>) -> Arc<dyn CacheStore> {
    match settings.backend {
        CacheBackend::None => Arc::new(NoopStore),
        CacheBackend::Memory => Arc::new(MemoryStore::new(settings.capacity)),
        CacheBackend::File => {
            let Some(passphrase) = passphrase else {
                warn!("file cache selected without a passphrase, caching disabled");
                return Arc::new(NoopStore);
            };
            let params = KdfParams {
                memory_kib: settings.kdf_memory_kib,
                iterations: settings.kdf_iterations,
            };
            let opened = settings
                .resolved_directory()
                .map_err(|e| CacheError::Unavailable(e.to_string()))
                .and_then(|dir| EncryptedFileStore::open(&dir, passphrase, params));
            match opened {
                Ok(store) => {
                    info!(dir = %store.dir.display(), "opened encrypted prediction cache");
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(error = %e, "prediction cache unavailable, caching disabled");
                    Arc::new(NoopStore)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KDF: KdfParams = KdfParams {
        memory_kib: 8,
        iterations: 1,
    };

    #[test]
    fn noop_store_always_misses() {
        let store = NoopStore;
        store.set("predictions:a", b"x".to_vec()).unwrap();
        assert!(!store.is_available());
        assert_eq!(store.get("predictions:a").unwrap(), None);
    }

    #[test]
    fn memory_store_get_set_delete() {
        let store = MemoryStore::new(100);
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", b"value".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"value".to_vec()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = EncryptedFileStore::open(dir.path(), "pass", TEST_KDF).unwrap();
            store.set("predictions:u1", b"payload".to_vec()).unwrap();
        }
        let store = EncryptedFileStore::open(dir.path(), "pass", TEST_KDF).unwrap();
        assert!(store.is_available());
        assert_eq!(store.get("predictions:u1").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.get("predictions:u2").unwrap(), None);
    }

    #[test]
    fn file_store_entries_are_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), "pass", TEST_KDF).unwrap();
        store.set("predictions:u1", b"heavy".to_vec()).unwrap();
        let raw = fs::read(store.entry_path("predictions:u1")).unwrap();
        assert!(!raw.windows(5).any(|w| w == b"heavy"));
    }

    #[test]
    fn file_store_wrong_passphrase_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), "right", TEST_KDF).unwrap();
        store.set("k", b"v".to_vec()).unwrap();

        let other = EncryptedFileStore::open(dir.path(), "wrong", TEST_KDF).unwrap();
        assert!(matches!(other.get("k"), Err(CacheError::Crypto(_))));
    }

    #[test]
    fn file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedFileStore::open(dir.path(), "pass", TEST_KDF).unwrap();
        store.set("k", b"v".to_vec()).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_backend_without_passphrase_degrades() {
        let settings = CacheSettings {
            backend: CacheBackend::File,
            ..CacheSettings::default()
        };
        assert!(!open_store(&settings, None).is_available());
    }
}
