//! Local Session Cache.
//!
//! Persists `{SessionID, AccessKey}` per server origin so a restarted client
//! can skip the key exchange. Entries live under two well-known keys,
//! `SessionID` and `AccessKey` (hex).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;
use tunnel_common::{Error, Result};
use tunnel_crypto::AccessKey;

pub const SESSION_ID_KEY: &str = "SessionID";
pub const ACCESS_KEY_KEY: &str = "AccessKey";

/// A session the client can resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub session_id: String,
    pub access_key: AccessKey,
}

/// Durable storage for at most one session.
pub trait SessionCache: Send + Sync {
    /// `Ok(None)` when nothing usable is stored.
    fn load(&self) -> Result<Option<CachedSession>>;

    fn save(&self, session: &CachedSession) -> Result<()>;

    /// Remove the entry. Clearing an empty cache is not an error.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(rename = "SessionID", default)]
    session_id: Option<String>,
    #[serde(rename = "AccessKey", default)]
    access_key: Option<String>,
}

impl CacheEntry {
    fn into_session(self) -> Option<CachedSession> {
        let session_id = self.session_id.filter(|id| !id.is_empty())?;
        let access_key = match AccessKey::from_hex(&self.access_key?) {
            Ok(key) => key,
            Err(e) => {
                warn!("failed to decode cached AccessKey: {}", e);
                return None;
            }
        };
        Some(CachedSession {
            session_id,
            access_key,
        })
    }
}

/// JSON file per server origin, readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    /// Cache for `origin` (e.g. `http://localhost:8010`) inside `dir`.
    pub fn new(dir: impl AsRef<Path>, origin: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", origin_file_stem(origin))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn origin_file_stem(origin: &str) -> String {
    let origin = origin.trim().trim_end_matches('/');
    hex::encode(Sha256::digest(origin.as_bytes()))
}

/// Write `body` to `path` with mode 0600 on Unix.
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // mode() only applies on creation; a leftover file keeps its own
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(body)?;
    file.sync_all()
}

impl SessionCache for FileSessionCache {
    fn load(&self) -> Result<Option<CachedSession>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(entry.into_session()),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable session cache: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&self, session: &CachedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entry = CacheEntry {
            session_id: Some(session.session_id.clone()),
            access_key: Some(session.access_key.to_hex()),
        };
        let body = serde_json::to_vec_pretty(&entry)?;

        // write-then-rename so a crash never leaves half an entry
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process cache. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionCache {
    slot: Arc<Mutex<Option<CachedSession>>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: CachedSession) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(session))),
        }
    }
}

impl SessionCache for MemorySessionCache {
    fn load(&self) -> Result<Option<CachedSession>> {
        self.slot
            .lock()
            .map(|slot| slot.clone())
            .map_err(|_| Error::internal("session cache lock poisoned"))
    }

    fn save(&self, session: &CachedSession) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::internal("session cache lock poisoned"))?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::internal("session cache lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CachedSession {
        CachedSession {
            session_id: "s1".into(),
            access_key: AccessKey::from_bytes([4u8; 32]),
        }
    }

    #[test]
    fn test_file_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSessionCache::new(dir.path(), "http://localhost:8010");

        assert_eq!(cache.load().unwrap(), None);
        cache.save(&session()).unwrap();
        assert_eq!(cache.load().unwrap(), Some(session()));

        cache.clear().unwrap();
        assert_eq!(cache.load().unwrap(), None);
        cache.clear().unwrap();
    }

    #[test]
    fn test_file_cache_uses_well_known_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSessionCache::new(dir.path(), "http://localhost:8010");
        cache.save(&session()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(raw[SESSION_ID_KEY], "s1");
        assert_eq!(raw[ACCESS_KEY_KEY], "04".repeat(32));
    }

    #[test]
    fn test_file_cache_is_per_origin() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileSessionCache::new(dir.path(), "http://localhost:8010");
        let b = FileSessionCache::new(dir.path(), "https://tunnel.example.com");
        a.save(&session()).unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(b.load().unwrap(), None);
    }

    #[test]
    fn test_similar_origins_do_not_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let dotted = FileSessionCache::new(dir.path(), "http://a.b");
        let underscored = FileSessionCache::new(dir.path(), "http://a_b");
        assert_ne!(dotted.path(), underscored.path());

        dotted.save(&session()).unwrap();
        assert_eq!(underscored.load().unwrap(), None);

        // trailing slash is the same origin
        let slashed = FileSessionCache::new(dir.path(), "http://a.b/");
        assert_eq!(slashed.path(), dotted.path());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_cache_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = FileSessionCache::new(dir.path(), "http://localhost:8010");

        // a stale world-readable tmp file must not leak its mode
        fs::write(cache.path().with_extension("json.tmp"), "{}").unwrap();
        fs::set_permissions(
            cache.path().with_extension("json.tmp"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        cache.save(&session()).unwrap();
        let mode = fs::metadata(cache.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_incomplete_or_corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSessionCache::new(dir.path(), "http://localhost:8010");

        fs::write(cache.path(), r#"{"SessionID":"s1"}"#).unwrap();
        assert_eq!(cache.load().unwrap(), None);

        fs::write(cache.path(), r#"{"SessionID":"s1","AccessKey":"zz"}"#).unwrap();
        assert_eq!(cache.load().unwrap(), None);

        fs::write(cache.path(), "not json").unwrap();
        assert_eq!(cache.load().unwrap(), None);
    }

    #[test]
    fn test_memory_cache_shared_between_clones() {
        let cache = MemorySessionCache::new();
        let other = cache.clone();
        cache.save(&session()).unwrap();
        assert_eq!(other.load().unwrap(), Some(session()));
        other.clear().unwrap();
        assert_eq!(cache.load().unwrap(), None);
    }
}
