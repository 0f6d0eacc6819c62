//! Session lifecycle against the wallet provider
//!
//! States move `SignedOut -> Authenticating -> SignedIn` on `connect()` and back to
//! `SignedOut` on `disconnect()`, a provider sign-out, or an account change to an
//! identity without an access key. Every transition runs under one async mutex so
//! overlapping calls never interleave their effects.

use crate::config::ClientConfig;
use crate::credential_store::CredentialStore;
use crate::event_stream::{Event, EventStream, SignOutReason};
use crate::network::EndpointCache;
use crate::provider::{InitRequest, ProviderEvent, SignInRequest, WalletProvider};
use crate::{AccessKey, DelegatedCredential, Result, ScopeEntry, Session, SessionError, SessionStatus};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type ConnectAttempt = Shared<BoxFuture<'static, Result<Session>>>;

#[derive(Debug, Default)]
struct SessionState {
    status: SessionStatus,
    account_id: Option<String>,
}

struct Inner {
    provider: Arc<dyn WalletProvider>,
    store: Arc<CredentialStore>,
    endpoints: Arc<EndpointCache>,
    events: Arc<EventStream>,
    contract_id: String,
    method_names: Vec<String>,
    state: RwLock<SessionState>,
    transition: Mutex<()>,
    inflight: Mutex<Option<ConnectAttempt>>,
}

/// Owns the session and is the only writer of the credential store
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

/// Live provider-event subscription; dropping it also unsubscribes
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        store: Arc<CredentialStore>,
        endpoints: Arc<EndpointCache>,
        events: Arc<EventStream>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                endpoints,
                events,
                contract_id: config.contract_id.clone(),
                method_names: config.method_names.clone(),
                state: RwLock::new(SessionState::default()),
                transition: Mutex::new(()),
                inflight: Mutex::new(None),
            }),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.state.read().await.status
    }

    /// Current session, present only while signed in
    pub async fn session(&self) -> Option<Session> {
        self.inner.current_session().await
    }

    pub async fn require_account(&self) -> Result<String> {
        self.session()
            .await
            .map(|session| session.account_id)
            .ok_or(SessionError::NotSignedIn)
    }

    /// Sign in, restoring an existing provider session when one exists.
    ///
    /// Concurrent calls share one attempt, so the user sees at most one prompt.
    /// The attempt runs on its own task and finishes even if every caller is
    /// dropped. Must be called from within a tokio runtime.
    pub async fn connect(&self) -> Result<Session> {
        let attempt = {
            let mut inflight = self.inner.inflight.lock().await;
            match inflight.as_ref() {
                Some(attempt) if attempt.peek().is_none() => {
                    debug!("Joining in-flight sign-in");
                    attempt.clone()
                }
                _ => {
                    let attempt = Arc::clone(&self.inner).spawn_connect();
                    *inflight = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Sign out through the provider, then clear local state whatever the provider says.
    ///
    /// A provider failure is returned after the local session is already gone.
    pub async fn disconnect(&self) -> Result<()> {
        let _transition = self.inner.transition.lock().await;

        let outcome = if self.status().await == SessionStatus::SignedIn {
            self.inner.provider.sign_out().await
        } else {
            Ok(())
        };

        self.inner.clear(SignOutReason::Requested).await;

        if let Err(e) = &outcome {
            warn!("Provider sign-out failed, local session cleared: {}", e);
        }
        outcome
    }

    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::RpcChanged(rpc) => {
                info!("Provider endpoint changed to {}", rpc.node_url);
                self.inner.endpoints.invalidate().await;
                self.inner.events.emit(Event::EndpointChanged {
                    network_id: rpc.network_id,
                    node_url: rpc.node_url,
                });
            }
            ProviderEvent::SignedOut => {
                let _transition = self.inner.transition.lock().await;
                if self.status().await != SessionStatus::SignedOut {
                    info!("Provider signed out");
                    self.inner.clear(SignOutReason::Provider).await;
                }
            }
            ProviderEvent::AccountChanged { account_id } => {
                let _transition = self.inner.transition.lock().await;
                self.inner.refresh_account(account_id).await;
            }
        }
    }

    /// Route provider notifications into `handle_event` until unsubscribed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&self) -> Subscription {
        let mut receiver = self.inner.provider.subscribe();
        let manager = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => manager.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} provider events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Provider event channel closed");
                        break;
                    }
                }
            }
        });

        Subscription { handle }
    }
}

impl Inner {
    async fn current_session(&self) -> Option<Session> {
        let state = self.state.read().await;
        match (state.status, state.account_id.as_ref()) {
            (SessionStatus::SignedIn, Some(account_id)) => Some(Session {
                account_id: account_id.clone(),
                status: SessionStatus::SignedIn,
            }),
            _ => None,
        }
    }

    /// Start a sign-in task; it drops itself from `inflight` once resolved
    fn spawn_connect(self: Arc<Self>) -> ConnectAttempt {
        let task = tokio::spawn(async move {
            let outcome = self.run_connect().await;
            self.inflight.lock().await.take();
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(SessionError::AuthenticationFailed(format!(
                    "sign-in task ended: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }

    async fn run_connect(&self) -> Result<Session> {
        let _transition = self.transition.lock().await;

        if let Some(session) = self.current_session().await {
            debug!("Already signed in as {}", session.account_id);
            return Ok(session);
        }

        self.state.write().await.status = SessionStatus::Authenticating;
        info!("Connecting to provider for {}", self.contract_id);

        match self.authenticate().await {
            Ok((account_id, credential, restored)) => {
                let public_key = credential.public_key.clone();
                self.store.set(account_id.clone(), credential).await;
                {
                    let mut state = self.state.write().await;
                    state.status = SessionStatus::SignedIn;
                    state.account_id = Some(account_id.clone());
                }

                info!("Signed in as {} (restored: {})", account_id, restored);
                self.events.emit(Event::SignedIn {
                    account_id: account_id.clone(),
                    public_key,
                    restored,
                });
                Ok(Session {
                    account_id,
                    status: SessionStatus::SignedIn,
                })
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.store.clear().await;
                *self.state.write().await = SessionState::default();
                Err(e)
            }
        }
    }

    /// Probe first, prompt only when the probe yields no key
    async fn authenticate(&self) -> Result<(String, DelegatedCredential, bool)> {
        match self
            .provider
            .init(InitRequest {
                contract_id: self.contract_id.clone(),
            })
            .await
        {
            Ok(probe) => {
                if let Some(access_key) = probe.access_key {
                    let account_id = self.resolve_account(probe.account_id)?;
                    return Ok((account_id, self.credential(access_key)?, true));
                }
            }
            Err(e) => warn!("Session probe failed, prompting instead: {}", e),
        }

        let response = self
            .provider
            .request_sign_in(SignInRequest {
                contract_id: self.contract_id.clone(),
                method_names: self.method_names.clone(),
            })
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(SessionError::AuthenticationFailed(error));
        }
        let access_key = response.access_key.ok_or_else(|| {
            SessionError::AuthenticationFailed("no access key granted".to_string())
        })?;
        let account_id = self.resolve_account(response.account_id)?;
        Ok((account_id, self.credential(access_key)?, false))
    }

    fn resolve_account(&self, reported: Option<String>) -> Result<String> {
        reported
            .filter(|account_id| !account_id.is_empty())
            .or_else(|| self.provider.account_id())
            .ok_or_else(|| {
                SessionError::AuthenticationFailed("provider reported no account".to_string())
            })
    }

    fn credential(&self, access_key: AccessKey) -> Result<DelegatedCredential> {
        if access_key.public_key.is_empty() {
            return Err(SessionError::AuthenticationFailed(
                "access key has no public key".to_string(),
            ));
        }
        Ok(DelegatedCredential::from_access_key(
            access_key,
            vec![ScopeEntry {
                receiver_id: self.contract_id.clone(),
                method_names: self.method_names.clone(),
            }],
        ))
    }

    async fn refresh_account(&self, account_id: String) {
        let previous = {
            let state = self.state.read().await;
            if state.status != SessionStatus::SignedIn {
                debug!("Ignoring account change to {} while signed out", account_id);
                return;
            }
            state.account_id.clone()
        };

        let probe = self
            .provider
            .init(InitRequest {
                contract_id: self.contract_id.clone(),
            })
            .await;

        let refreshed = match probe {
            Ok(probe) => probe.access_key.and_then(|access_key| {
                let account_id = probe.account_id.unwrap_or_else(|| account_id.clone());
                self.credential(access_key)
                    .ok()
                    .map(|credential| (account_id, credential))
            }),
            Err(e) => {
                warn!("Session probe after account change failed: {}", e);
                None
            }
        };

        match refreshed {
            Some((account_id, credential)) => {
                info!("Account changed to {}", account_id);
                self.store.set(account_id.clone(), credential).await;
                self.state.write().await.account_id = Some(account_id.clone());
                self.events.emit(Event::AccountChanged {
                    previous,
                    account_id,
                });
            }
            None => {
                info!("Account {} has no access key, signing out", account_id);
                self.clear(SignOutReason::AccountChanged).await;
            }
        }
    }

    async fn clear(&self, reason: SignOutReason) {
        self.store.clear().await;
        let previous = std::mem::take(&mut *self.state.write().await);
        if previous.status != SessionStatus::SignedOut || previous.account_id.is_some() {
            self.events.emit(Event::SignedOut {
                account_id: previous.account_id,
                reason,
            });
        }
    }
}
