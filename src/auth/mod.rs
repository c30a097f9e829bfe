// src/auth/mod.rs — Session Gateway: JWT credential exchange and session state

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;

use crate::infra::errors::VendoraError;
use crate::infra::session::{CredentialStore, Session};

/// The slice of session identity forwarded to the assistant workflow with
/// every run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UserIdentity {
    pub email: String,
    pub vendor_slug: Option<String>,
    pub vendor_id: u64,
    pub roles: BTreeSet<String>,
}

impl UserIdentity {
    pub fn from_session(session: &Session) -> Self {
        Self {
            email: session.email.clone(),
            vendor_slug: session.vendor_slug.clone(),
            vendor_id: session.user_id,
            roles: session.roles.clone(),
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.roles.contains("administrator")
    }
}

/// Wire shape of the auth collaborator's success response.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_email: String,
    #[serde(default)]
    pub user_display_name: String,
    #[serde(default)]
    pub user_roles: RolesWire,
    pub user_id: u64,
    #[serde(default)]
    pub vendor_slug: Option<String>,
}

/// The auth endpoint reports roles either as a list or as an index-keyed
/// object; both flatten to a set.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub enum RolesWire {
    #[default]
    Missing,
    List(Vec<String>),
    Map(std::collections::BTreeMap<String, String>),
}

impl RolesWire {
    pub fn into_set(self) -> BTreeSet<String> {
        match self {
            RolesWire::Missing => BTreeSet::new(),
            RolesWire::List(v) => v.into_iter().collect(),
            RolesWire::Map(m) => m.into_values().collect(),
        }
    }
}

impl From<AuthResponse> for Session {
    fn from(resp: AuthResponse) -> Self {
        Session {
            token: resp.token,
            user_id: resp.user_id,
            email: resp.user_email,
            display_name: resp.user_display_name,
            roles: resp.user_roles.into_set(),
            vendor_slug: resp.vendor_slug,
        }
    }
}

/// Credential exchange against the auth collaborator.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn exchange(&self, username: &str, password: &str) -> Result<AuthResponse, VendoraError>;
}

/// JWT auth endpoint client.
pub struct JwtAuthClient {
    client: reqwest::Client,
    auth_url: String,
}

impl JwtAuthClient {
    pub fn new(auth_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_url,
        }
    }
}

#[async_trait]
impl AuthBackend for JwtAuthClient {
    async fn exchange(&self, username: &str, password: &str) -> Result<AuthResponse, VendoraError> {
        let resp = self
            .client
            .post(&self.auth_url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| VendoraError::Auth {
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            // The endpoint reports rejection detail as {"message": "..."}.
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let message = body["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(VendoraError::Auth { message });
        }

        resp.json().await.map_err(|e| VendoraError::Auth {
            message: format!("Malformed auth response: {e}"),
        })
    }
}

/// Process-wide session state: written only by login/logout, read from
/// everywhere. Injectable so nothing reaches for ambient storage.
pub struct SessionGateway {
    backend: Arc<dyn AuthBackend>,
    store: CredentialStore,
    current: RwLock<Option<Session>>,
}

impl SessionGateway {
    pub fn new(backend: Arc<dyn AuthBackend>, store: CredentialStore) -> Self {
        let current = RwLock::new(store.load());
        Self {
            backend,
            store,
            current,
        }
    }

    /// Exchange credentials for a session. On success the token + profile
    /// are persisted and process-wide state is updated. No retry policy: a
    /// rejected exchange surfaces immediately.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, VendoraError> {
        let session: Session = self.backend.exchange(username, password).await?.into();
        self.store.save(&session).map_err(VendoraError::Other)?;
        *self.current.write().expect("session lock poisoned") = Some(session.clone());
        tracing::info!(email = %session.email, "logged in");
        Ok(session)
    }

    /// Clear persisted and in-process session state. Idempotent.
    pub fn logout(&self) -> Result<(), VendoraError> {
        self.store.clear().map_err(VendoraError::Other)?;
        *self.current.write().expect("session lock poisoned") = None;
        Ok(())
    }

    /// Read-only view of the current session; never blocks on IO.
    pub fn current_session(&self) -> Option<Session> {
        self.current.read().expect("session lock poisoned").clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.current_session()
            .map(|s| s.has_role(role))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAuth {
        accept: bool,
    }

    #[async_trait]
    impl AuthBackend for FakeAuth {
        async fn exchange(
            &self,
            username: &str,
            _password: &str,
        ) -> Result<AuthResponse, VendoraError> {
            if !self.accept {
                return Err(VendoraError::Auth {
                    message: "invalid credentials".into(),
                });
            }
            Ok(AuthResponse {
                token: "jwt-xyz".into(),
                user_email: format!("{username}@example.com"),
                user_display_name: "Vendor Co".into(),
                user_roles: RolesWire::List(vec!["vendor".into()]),
                user_id: 7,
                vendor_slug: Some("vendor-co".into()),
            })
        }
    }

    fn gateway(accept: bool, dir: &tempfile::TempDir) -> SessionGateway {
        SessionGateway::new(
            Arc::new(FakeAuth { accept }),
            CredentialStore::at(dir.path().join("session.json")),
        )
    }

    #[tokio::test]
    async fn test_login_persists_and_updates_state() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(true, &dir);
        assert!(!gw.is_authenticated());

        let session = gw.login("vendor", "pw").await.unwrap();
        assert_eq!(session.email, "vendor@example.com");
        assert!(gw.is_authenticated());
        assert!(gw.has_role("vendor"));
        assert!(!gw.has_role("administrator"));

        // Durable: a fresh gateway over the same store sees the session.
        let gw2 = gateway(true, &dir);
        assert!(gw2.is_authenticated());
    }

    #[tokio::test]
    async fn test_rejected_login_surfaces_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(false, &dir);
        let err = gw.login("vendor", "bad").await.unwrap_err();
        assert!(matches!(err, VendoraError::Auth { .. }));
        assert!(!gw.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(true, &dir);
        gw.login("vendor", "pw").await.unwrap();

        gw.logout().unwrap();
        let after_first = gw.current_session();
        gw.logout().unwrap();
        assert_eq!(after_first, gw.current_session());
        assert!(!gw.is_authenticated());
    }

    #[test]
    fn test_roles_wire_map_flattens() {
        let wire: RolesWire =
            serde_json::from_value(serde_json::json!({"0": "vendor", "1": "seller"})).unwrap();
        let set = wire.into_set();
        assert!(set.contains("vendor") && set.contains("seller"));
    }

    #[test]
    fn test_roles_wire_list() {
        let wire: RolesWire = serde_json::from_value(serde_json::json!(["vendor"])).unwrap();
        assert!(wire.into_set().contains("vendor"));
    }
}
