//! Wallet client wiring session, batching and execution together

use crate::batch::{BatchCompiler, BatchIntent};
use crate::config::ClientConfig;
use crate::credential_store::CredentialStore;
use crate::event_stream::{Event, EventStream};
use crate::executor::{ExecutionOutcome, ExecutionPath, Executor};
use crate::network::{EndpointCache, Network, ProviderViewer, RpcViewer, ViewFunction};
use crate::provider::{RpcInfo, WalletProvider};
use crate::session::{SessionManager, Subscription};
use crate::storage::StorageShim;
use crate::{Action, Balance, Result, Session, SessionStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Smallest deposit, required by token methods that move value
pub const ONE_YOCTO: Balance = Balance(1);

pub const NEAR_DEPOSIT: &str = "near_deposit";
pub const FT_TRANSFER: &str = "ft_transfer";

pub struct WalletClient {
    config: ClientConfig,
    provider: Arc<dyn WalletProvider>,
    events: Arc<EventStream>,
    session: SessionManager,
    viewer: Arc<dyn ViewFunction>,
    compiler: BatchCompiler,
    executor: Executor,
}

impl WalletClient {
    /// Provider-only client: views and submissions go through the wallet
    pub fn new(config: ClientConfig, provider: Arc<dyn WalletProvider>) -> Result<Self> {
        Self::build(config, provider, None)
    }

    /// Client that can also sign locally and read directly from the node
    pub fn with_network(
        config: ClientConfig,
        provider: Arc<dyn WalletProvider>,
        network: Arc<dyn Network>,
    ) -> Result<Self> {
        Self::build(config, provider, Some(network))
    }

    fn build(
        config: ClientConfig,
        provider: Arc<dyn WalletProvider>,
        network: Option<Arc<dyn Network>>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing wallet client for {} on {}",
            config.contract_id, config.network.network_id
        );

        let store = Arc::new(CredentialStore::new());
        let events = Arc::new(EventStream::new());
        let endpoints = Arc::new(EndpointCache::new(
            provider.clone(),
            RpcInfo {
                network_id: config.network.network_id.clone(),
                node_url: config.network.node_url.clone(),
            },
        ));

        let session = SessionManager::new(
            provider.clone(),
            store.clone(),
            endpoints.clone(),
            events.clone(),
            &config,
        );

        let viewer: Arc<dyn ViewFunction> = match &network {
            Some(network) => Arc::new(RpcViewer::new(network.clone(), endpoints.clone())),
            None => Arc::new(ProviderViewer::new(provider.clone())),
        };

        let shim = StorageShim::new(viewer.clone(), config.storage_rule.clone())
            .with_events(events.clone());
        let compiler = BatchCompiler::new(Arc::new(shim));

        let executor = Executor::new(
            session.clone(),
            provider.clone(),
            store,
            endpoints,
            events.clone(),
            config.local_signing_timeout,
        );
        let executor = match network {
            Some(network) => executor.with_network(network),
            None => executor,
        };

        Ok(Self {
            config,
            provider,
            events,
            session,
            viewer,
            compiler,
            executor,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Follow provider notifications; see [`SessionManager::listen`]
    pub fn listen(&self) -> Subscription {
        self.session.listen()
    }

    pub async fn connect(&self) -> Result<Session> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Signed in locally and still signed in according to the provider
    pub async fn is_signed_in(&self) -> bool {
        self.session.status().await == SessionStatus::SignedIn && self.provider.is_signed_in()
    }

    pub async fn account_id(&self) -> Option<String> {
        self.session.session().await.map(|session| session.account_id)
    }

    /// Compile `intent` for the signed-in account and submit it through `path`
    pub async fn submit(&self, intent: BatchIntent, path: ExecutionPath) -> Result<ExecutionOutcome> {
        let account_id = self.session.require_account().await?;
        let batch = self.compiler.compile(intent, &account_id).await?;
        self.executor.execute(batch, path).await
    }

    /// Call a delegated method on the primary contract with the cached key, no prompt
    pub async fn call_contract(&self, method_name: &str, args: Value) -> Result<ExecutionOutcome> {
        self.submit(
            BatchIntent::Single {
                receiver_id: self.config.contract_id.clone(),
                action: Action::function_call(method_name, args),
            },
            ExecutionPath::LocalKey,
        )
        .await
    }

    pub async fn view_contract(&self, method_name: &str, args: Value) -> Result<Value> {
        self.viewer
            .view(&self.config.contract_id, method_name, args)
            .await
    }

    pub async fn send_native(&self, receiver_id: &str, amount: Balance) -> Result<ExecutionOutcome> {
        self.submit(
            BatchIntent::Single {
                receiver_id: receiver_id.to_string(),
                action: Action::transfer(amount),
            },
            ExecutionPath::Provider,
        )
        .await
    }

    /// Wrap native tokens into the wrapped-native fungible token
    pub async fn wrap_native(&self, amount: Balance) -> Result<ExecutionOutcome> {
        self.submit(
            BatchIntent::Single {
                receiver_id: self.config.wrap_contract_id.clone(),
                action: wrap_action(amount),
            },
            ExecutionPath::Provider,
        )
        .await
    }

    pub async fn send_wrapped(&self, receiver_id: &str, amount: Balance) -> Result<ExecutionOutcome> {
        self.submit(
            BatchIntent::Single {
                receiver_id: self.config.wrap_contract_id.clone(),
                action: ft_transfer_action(receiver_id, amount),
            },
            ExecutionPath::Provider,
        )
        .await
    }

    /// Wrap `wrap_amount` then send `amount` of the wrapped token.
    ///
    /// With `split` the two steps go out as separate transactions, wrap first.
    pub async fn wrap_and_send(
        &self,
        receiver_id: &str,
        wrap_amount: Balance,
        amount: Balance,
        split: bool,
    ) -> Result<ExecutionOutcome> {
        let actions = vec![wrap_action(wrap_amount), ft_transfer_action(receiver_id, amount)];
        let intent = if split {
            BatchIntent::split(self.config.wrap_contract_id.clone(), actions)
        } else {
            BatchIntent::Combined {
                receiver_id: self.config.wrap_contract_id.clone(),
                actions,
            }
        };
        self.submit(intent, ExecutionPath::Provider).await
    }
}

pub fn wrap_action(amount: Balance) -> Action {
    Action::function_call_with_deposit(NEAR_DEPOSIT, json!({}), amount)
}

pub fn ft_transfer_action(receiver_id: &str, amount: Balance) -> Action {
    Action::function_call_with_deposit(
        FT_TRANSFER,
        json!({ "receiver_id": receiver_id, "amount": amount.to_string() }),
        ONE_YOCTO,
    )
}
