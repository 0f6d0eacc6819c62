//! Dual-path transaction submission
//!
//! The provider path hands the batch to the wallet, which asks the user to confirm.
//! The local path signs with the cached delegated key and talks to the node
//! directly, without any prompt, and is only open to receivers inside the key's
//! scope. A batch that cannot go through the local path is an error there; it is
//! never rerouted to the provider, since the two paths differ in what the user is
//! asked to approve.

use crate::credential_store::CredentialStore;
use crate::event_stream::{Event, EventStream};
use crate::network::{EndpointCache, Network};
use crate::provider::{reject_error_payload, WalletProvider};
use crate::session::SessionManager;
use crate::signer::LocalSigner;
use crate::{Action, DelegatedCredential, Result, SessionError, Transaction, TransactionBatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionPath {
    /// Wallet-mediated, interactive
    Provider,
    /// Signed with the cached delegated key, no prompt
    LocalKey,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Provider => write!(f, "Provider"),
            ExecutionPath::LocalKey => write!(f, "LocalKey"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Unique id, also carried by the submission events
    pub submission_id: String,
    /// Path the batch went through
    pub path: ExecutionPath,
    /// One entry per provider call or broadcast transaction
    pub results: Vec<Value>,
    /// Completion time
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// Submits compiled batches through either path
pub struct Executor {
    session: SessionManager,
    provider: Arc<dyn WalletProvider>,
    store: Arc<CredentialStore>,
    network: Option<Arc<dyn Network>>,
    endpoints: Arc<EndpointCache>,
    events: Arc<EventStream>,
    timeout: Duration,
}

impl Executor {
    /// Create an executor with the provider path only; see [`Executor::with_network`]
    pub fn new(
        session: SessionManager,
        provider: Arc<dyn WalletProvider>,
        store: Arc<CredentialStore>,
        endpoints: Arc<EndpointCache>,
        events: Arc<EventStream>,
        timeout: Duration,
    ) -> Self {
        Self {
            session,
            provider,
            store,
            network: None,
            endpoints,
            events,
            timeout,
        }
    }

    /// Enable the local-signing path
    pub fn with_network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Submit `batch` once through `path`. Failures are returned as-is, never retried.
    pub async fn execute(&self, batch: TransactionBatch, path: ExecutionPath) -> Result<ExecutionOutcome> {
        let submission_id = uuid::Uuid::new_v4().to_string();
        let receivers = batch.receivers();
        info!(
            "Submitting {} transaction(s) via {} [{}]",
            batch.len(),
            path,
            submission_id
        );

        let results = match path {
            ExecutionPath::Provider => self.execute_with_provider(batch).await,
            ExecutionPath::LocalKey => self.execute_locally(batch).await,
        };

        match results {
            Ok(results) => {
                self.events.emit(Event::TransactionsSubmitted {
                    submission_id: submission_id.clone(),
                    path,
                    receivers,
                });
                Ok(ExecutionOutcome {
                    submission_id,
                    path,
                    results,
                    submitted_at: chrono::Utc::now(),
                })
            }
            Err(e) => {
                error!("Submission {} via {} failed: {}", submission_id, path, e);
                self.events.emit(Event::SubmissionFailed {
                    submission_id,
                    path,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute_with_provider(&self, batch: TransactionBatch) -> Result<Vec<Value>> {
        self.session.require_account().await?;

        let mut transactions = batch.into_transactions();
        let payload = if transactions.len() == 1 {
            let transaction = transactions.remove(0);
            match transaction.as_plain_transfer() {
                Some(amount) => {
                    self.provider
                        .send_money(transaction.receiver_id, amount)
                        .await?
                }
                None => self.provider.sign_and_send_transaction(transaction).await?,
            }
        } else {
            self.provider.request_sign_transactions(transactions).await?
        };

        Ok(vec![reject_error_payload(payload)?])
    }

    async fn execute_locally(&self, batch: TransactionBatch) -> Result<Vec<Value>> {
        let credential = self
            .store
            .get()
            .await
            .filter(DelegatedCredential::is_locally_signable)
            .ok_or_else(|| {
                SessionError::LocalSigningUnavailable("no secret key for the session".to_string())
            })?;

        for transaction in batch.transactions() {
            check_scope(&credential, transaction)?;
        }

        let network = self.network.as_ref().ok_or_else(|| {
            SessionError::LocalSigningUnavailable("no network configured".to_string())
        })?;
        let account_id = self.session.require_account().await?;

        let secret_key = credential.secret_key.as_deref().unwrap_or_default();
        let signer = LocalSigner::from_secret_key(secret_key)?;
        if signer.public_key() != credential.public_key {
            return Err(SessionError::InvalidKey(
                "secret key does not match the session public key".to_string(),
            ));
        }

        let rpc = self.endpoints.resolve().await;
        let access_key = self
            .bounded(network.view_access_key(
                rpc.node_url.clone(),
                account_id.clone(),
                credential.public_key.clone(),
            ))
            .await?;

        let mut results = Vec::with_capacity(batch.len());
        let mut nonce = access_key.nonce;
        for transaction in batch.transactions() {
            nonce = nonce.checked_add(1).ok_or_else(|| {
                SessionError::Network(format!(
                    "access key nonce exhausted for {account_id}"
                ))
            })?;
            let signed =
                signer.sign_transaction(&account_id, nonce, &access_key.block_hash, transaction)?;
            info!(
                "Broadcasting {} to {} (nonce {})",
                signed.hash, transaction.receiver_id, nonce
            );
            let outcome = self
                .bounded(network.broadcast_transaction(rpc.node_url.clone(), signed.encoded))
                .await?;
            // In-band node errors fail the batch; later transactions are not sent
            let outcome = reject_error_payload(outcome).map_err(|e| match e {
                SessionError::ProviderRejected(message) => SessionError::Network(message),
                other => other,
            })?;
            results.push(outcome);
        }
        Ok(results)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SessionError::Timeout)?
    }
}

/// Delegated keys may only call allowed methods on scoped receivers, without deposits
fn check_scope(credential: &DelegatedCredential, transaction: &Transaction) -> Result<()> {
    let entry = credential.scope_for(&transaction.receiver_id).ok_or_else(|| {
        SessionError::LocalSigningUnavailable(format!(
            "{} is outside the delegated scope",
            transaction.receiver_id
        ))
    })?;

    for action in &transaction.actions {
        match action {
            Action::FunctionCall { method_name, .. } if !entry.allows_method(method_name) => {
                return Err(SessionError::LocalSigningUnavailable(format!(
                    "{method_name} on {} is not delegated",
                    transaction.receiver_id
                )));
            }
            Action::FunctionCall { .. } if !action.attached_value().is_zero() => {
                return Err(SessionError::LocalSigningUnavailable(
                    "delegated keys cannot attach deposits".to_string(),
                ));
            }
            Action::Transfer { .. } => {
                return Err(SessionError::LocalSigningUnavailable(
                    "delegated keys cannot transfer value".to_string(),
                ));
            }
            Action::FunctionCall { .. } => {}
        }
    }
    Ok(())
}
