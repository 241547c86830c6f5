//! Authenticated session held by the client
//!
//! A session is the bearer token plus the account it was issued for. It is
//! built once after login and handed to [`super::PortalClient`] explicitly;
//! nothing reads it from global state.

use crate::access::Role;
use crate::models::Account;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use super::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub account: Account,
    pub role: Role,
}

impl Session {
    /// The role is derived here, once, from the account's authorities
    pub fn new(token: impl Into<String>, account: Account) -> Self {
        let role = Role::from_authorities(&account.authorities);
        Self {
            token: token.into(),
            account,
            role,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Persist the session as JSON
    pub async fn save(&self, path: &Path) -> Result<(), ClientError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ClientError::Storage(format!("Failed to encode session: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::Storage(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
        fs::write(path, json)
            .await
            .map_err(|e| ClientError::Storage(format!("Failed to write {:?}: {}", path, e)))
    }

    /// Restore a saved session. A missing file is not an error; a corrupt
    /// one is reported so the caller can discard it.
    pub async fn load(path: &Path) -> Result<Option<Session>, ClientError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ClientError::Storage(format!("Corrupt session file {:?}: {}", path, e)))
    }

    /// Remove a saved session, if any
    pub async fn clear(path: &Path) -> Result<(), ClientError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(format!(
                "Failed to remove {:?}: {}",
                path, e
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    pub(crate) fn account(authorities: &[&str]) -> Account {
        Account {
            id: 7,
            login: "08123457".to_string(),
            email: "amel@example.tn".to_string(),
            first_name: Some("Amel".to_string()),
            last_name: Some("Ben Salah".to_string()),
            phone: None,
            authorities: authorities.iter().map(|a| a.to_string()).collect(),
            activated: true,
            lang_key: "fr".to_string(),
        }
    }

    #[test]
    fn test_role_derived_from_authorities() {
        assert_eq!(Session::new("t", account(&["ROLE_USER"])).role, Role::User);
        assert_eq!(
            Session::new("t", account(&["ROLE_USER", "ROLE_AGENT"])).role,
            Role::Agent
        );
        assert_eq!(
            Session::new("t", account(&["ROLE_AGENT", "ROLE_ADMIN"])).role,
            Role::Admin
        );
        assert_eq!(Session::new("t", account(&["role_admin"])).role, Role::User);
    }

    #[tokio::test]
    async fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal").join("session.json");

        assert_eq!(Session::load(&path).await.unwrap(), None);

        let session = Session::new("abc123", account(&["ROLE_AGENT"]));
        assert_ok!(session.save(&path).await);
        assert_eq!(Session::load(&path).await.unwrap(), Some(session));

        assert_ok!(Session::clear(&path).await);
        assert_eq!(Session::load(&path).await.unwrap(), None);
        // Clearing twice is fine
        assert_ok!(Session::clear(&path).await);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = assert_err!(Session::load(&path).await);
        assert!(matches!(err, ClientError::Storage(_)));
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(Session::new("abc", account(&[])).bearer(), "Bearer abc");
    }
}
