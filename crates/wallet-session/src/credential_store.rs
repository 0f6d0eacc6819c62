//! Holder of the delegated credential and the identity it is bound to

use crate::DelegatedCredential;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct StoredCredential {
    account_id: Option<String>,
    credential: Option<DelegatedCredential>,
}

/// Single writer (the session manager), many readers.
///
/// Account and credential are replaced and cleared together under one lock.
#[derive(Debug, Default)]
pub struct CredentialStore {
    inner: RwLock<StoredCredential>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the account and credential together
    pub async fn set(&self, account_id: String, credential: DelegatedCredential) {
        let mut inner = self.inner.write().await;
        debug!(
            "Storing credential {} for {}",
            credential.public_key, account_id
        );
        inner.account_id = Some(account_id);
        inner.credential = Some(credential);
    }

    /// Drop the account and credential
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.account_id = None;
        inner.credential = None;
    }

    /// Current credential, if any
    pub async fn get(&self) -> Option<DelegatedCredential> {
        self.inner.read().await.credential.clone()
    }

    /// Account the credential is bound to
    pub async fn account_id(&self) -> Option<String> {
        self.inner.read().await.account_id.clone()
    }

    /// True iff a credential with a secret key is held
    pub async fn is_locally_signable(&self) -> bool {
        self.inner
            .read()
            .await
            .credential
            .as_ref()
            .is_some_and(DelegatedCredential::is_locally_signable)
    }

    /// Nothing is stored
    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.read().await;
        inner.credential.is_none() && inner.account_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScopeEntry;

    fn credential(secret: Option<&str>) -> DelegatedCredential {
        DelegatedCredential {
            public_key: "ed25519:pub".to_string(),
            secret_key: secret.map(String::from),
            scope: vec![ScopeEntry {
                receiver_id: "app.testnet".to_string(),
                method_names: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn test_set_get_clear() {
        let store = CredentialStore::new();
        assert!(store.is_empty().await);
        assert!(store.get().await.is_none());

        store
            .set("alice.testnet".to_string(), credential(Some("ed25519:secret")))
            .await;
        assert_eq!(store.account_id().await.as_deref(), Some("alice.testnet"));
        assert_eq!(store.get().await.unwrap().public_key, "ed25519:pub");
        assert!(store.is_locally_signable().await);

        store.clear().await;
        assert!(store.is_empty().await);
        assert!(!store.is_locally_signable().await);
    }

    #[tokio::test]
    async fn test_credential_without_secret_is_not_signable() {
        let store = CredentialStore::new();
        store.set("alice.testnet".to_string(), credential(None)).await;
        assert!(!store.is_locally_signable().await);

        store
            .set("alice.testnet".to_string(), credential(Some("")))
            .await;
        assert!(!store.is_locally_signable().await);
    }
}
