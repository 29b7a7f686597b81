use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use super::session::PersistedSession;

/// Session file name in the cache directory
pub const SESSION_FILE: &str = "session.json";

/// Durable home for the session between process runs.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the session as JSON in a single file.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Storage at `<dir>/session.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        let session: PersistedSession =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;

        // The file holds a bearer token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict session file permissions")?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Keeps the session only for the life of the process.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<PersistedSession>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Result<Option<PersistedSession>> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        Ok(slot.clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use crate::models::{RecordId, UserProfile};
    use chrono::Utc;
    use serde_json::Map;

    fn persisted() -> PersistedSession {
        PersistedSession {
            token: Token::new("jwt-value", Utc::now()),
            user: UserProfile {
                id: RecordId::Number(9),
                email: Some("teacher@school.test".to_string()),
                name: Some("Ana".to_string()),
                role: None,
                extra: Map::new(),
            },
        }
    }

    #[test]
    fn test_file_storage_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::in_dir(&dir.path().join("nested"));

        assert!(storage.load().unwrap().is_none());

        let session = persisted();
        storage.save(&session).unwrap();
        assert_eq!(storage.load().unwrap(), Some(session));

        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        // Clearing twice is fine
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::in_dir(dir.path());
        std::fs::write(storage.path(), "{ not json").unwrap();
        assert!(storage.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::in_dir(dir.path());
        storage.save(&persisted()).unwrap();
        let mode = std::fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemorySessionStorage::new();
        assert!(storage.load().unwrap().is_none());
        storage.save(&persisted()).unwrap();
        assert!(storage.load().unwrap().is_some());
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }
}
