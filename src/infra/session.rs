// src/infra/session.rs — Session state and durable credential storage

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::infra::paths;

/// An authenticated session: bearer token plus the profile the auth
/// collaborator returned with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_id: u64,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub vendor_slug: Option<String>,
}

impl Session {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_administrator(&self) -> bool {
        self.has_role("administrator")
    }
}

/// Session file stored at ~/.vendora/session.json
///
/// # Security Note
/// The bearer token is stored as plaintext JSON on disk with chmod 600 on
/// Unix. For higher security environments, run with VENDORA_HOME pointing
/// at an ephemeral directory.
pub struct CredentialStore {
    path: PathBuf,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            path: paths::session_file_path(),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted session, if any. A missing or unreadable file is
    /// "not logged in", never an error.
    pub fn load(&self) -> Option<Session> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("discarding unparseable session file: {e}");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    /// Remove the persisted session. Idempotent: clearing an already-clear
    /// store succeeds.
    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            token: "jwt-abc".into(),
            user_id: 42,
            email: "vendor@example.com".into(),
            display_name: "Vendor Co".into(),
            roles: ["vendor".to_string()].into_iter().collect(),
            vendor_slug: Some("vendor-co".into()),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("session.json"));
        store.save(&sample_session()).unwrap();
        assert_eq!(store.load().unwrap(), sample_session());
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("session.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("session.json"));
        store.save(&sample_session()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_role_queries() {
        let s = sample_session();
        assert!(s.has_role("vendor"));
        assert!(!s.is_administrator());
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_mode_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("session.json"));
        store.save(&sample_session()).unwrap();
        let mode = std::fs::metadata(dir.path().join("session.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
