//! Opaque network access and read-only view calls

use crate::provider::{reject_error_payload, RpcInfo, ViewRequest, WalletProvider};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Access key state needed to build a locally signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeyView {
    /// Last nonce used by the key
    pub nonce: u64,
    /// Recent block hash, base58
    pub block_hash: String,
}

/// Direct RPC access against a node URL. Transport is left to the implementor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Network: Send + Sync {
    /// Look up `public_key` on `account_id`, failing when the key is not registered
    async fn view_access_key(
        &self,
        node_url: String,
        account_id: String,
        public_key: String,
    ) -> Result<AccessKeyView>;

    /// Read-only contract call
    async fn view_function(
        &self,
        node_url: String,
        contract_id: String,
        method_name: String,
        args: Value,
    ) -> Result<Value>;

    /// Broadcast a base64 encoded signed transaction and wait for its outcome.
    ///
    /// An outcome carrying an `error` field is treated as a failed submission.
    async fn broadcast_transaction(&self, node_url: String, signed_transaction: String)
        -> Result<Value>;
}

/// Cached view-call endpoint.
///
/// Resolved from the provider on first use and dropped whenever the provider
/// reports an RPC change.
pub struct EndpointCache {
    provider: Arc<dyn WalletProvider>,
    fallback: RpcInfo,
    cached: RwLock<Option<RpcInfo>>,
}

impl EndpointCache {
    /// Create an empty cache that falls back to `fallback`
    pub fn new(provider: Arc<dyn WalletProvider>, fallback: RpcInfo) -> Self {
        Self {
            provider,
            fallback,
            cached: RwLock::new(None),
        }
    }

    /// Cached endpoint, asking the provider on a miss
    pub async fn resolve(&self) -> RpcInfo {
        if let Some(rpc) = self.cached.read().await.as_ref() {
            return rpc.clone();
        }

        let mut cached = self.cached.write().await;
        if let Some(rpc) = cached.as_ref() {
            return rpc.clone();
        }

        match self.provider.get_rpc().await {
            Ok(rpc) => {
                debug!("Resolved endpoint {} ({})", rpc.node_url, rpc.network_id);
                *cached = Some(rpc.clone());
                rpc
            }
            Err(e) => {
                warn!(
                    "Provider endpoint lookup failed, using {}: {}",
                    self.fallback.node_url, e
                );
                self.fallback.clone()
            }
        }
    }

    /// Forget the cached endpoint
    pub async fn invalidate(&self) {
        if self.cached.write().await.take().is_some() {
            debug!("Endpoint cache invalidated");
        }
    }

    /// Whether an endpoint is cached
    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}

/// Read-only, unsigned contract query
#[async_trait]
pub trait ViewFunction: Send + Sync {
    async fn view(&self, contract_id: &str, method_name: &str, args: Value) -> Result<Value>;
}

/// View calls routed through the provider
pub struct ProviderViewer {
    provider: Arc<dyn WalletProvider>,
}

impl ProviderViewer {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ViewFunction for ProviderViewer {
    async fn view(&self, contract_id: &str, method_name: &str, args: Value) -> Result<Value> {
        let payload = self
            .provider
            .view_function_call(ViewRequest {
                contract_id: contract_id.to_string(),
                method_name: method_name.to_string(),
                args,
            })
            .await?;
        reject_error_payload(payload)
    }
}

/// View calls sent straight to the cached endpoint
pub struct RpcViewer {
    network: Arc<dyn Network>,
    endpoints: Arc<EndpointCache>,
}

impl RpcViewer {
    pub fn new(network: Arc<dyn Network>, endpoints: Arc<EndpointCache>) -> Self {
        Self { network, endpoints }
    }
}

#[async_trait]
impl ViewFunction for RpcViewer {
    async fn view(&self, contract_id: &str, method_name: &str, args: Value) -> Result<Value> {
        let rpc = self.endpoints.resolve().await;
        self.network
            .view_function(
                rpc.node_url,
                contract_id.to_string(),
                method_name.to_string(),
                args,
            )
            .await
    }
}
