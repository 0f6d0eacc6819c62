//! Interface to the injected wallet provider
//!
//! The provider brokers interactive sign-in, transaction confirmation and network
//! access on behalf of the user. It is always passed in explicitly; nothing in this
//! crate looks it up from ambient state.

use crate::{AccessKey, Balance, Result, SessionError, Transaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Non-interactive session probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub contract_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub access_key: Option<AccessKey>,
}

/// Interactive sign-in requesting a key scoped to `contract_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub contract_id: String,
    pub method_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub access_key: Option<AccessKey>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRequest {
    pub contract_id: String,
    pub method_name: String,
    #[serde(default)]
    pub args: Value,
}

/// Endpoint the provider currently talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcInfo {
    #[serde(rename = "network")]
    pub network_id: String,
    pub node_url: String,
}

/// Notifications pushed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEvent {
    AccountChanged { account_id: String },
    RpcChanged(RpcInfo),
    SignedOut,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Probe for an existing session without prompting the user
    async fn init(&self, request: InitRequest) -> Result<InitResponse>;

    /// Ask the user to approve a delegated access key
    async fn request_sign_in(&self, request: SignInRequest) -> Result<SignInResponse>;

    async fn sign_out(&self) -> Result<()>;

    fn is_signed_in(&self) -> bool;

    fn account_id(&self) -> Option<String>;

    /// Channel of provider notifications; each call yields a fresh receiver
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    async fn sign_and_send_transaction(&self, transaction: Transaction) -> Result<Value>;

    async fn request_sign_transactions(&self, transactions: Vec<Transaction>) -> Result<Value>;

    async fn send_money(&self, receiver_id: String, amount: Balance) -> Result<Value>;

    async fn view_function_call(&self, request: ViewRequest) -> Result<Value>;

    async fn get_rpc(&self) -> Result<RpcInfo>;
}

/// Turn an error payload returned in-band by the provider into `ProviderRejected`
pub(crate) fn reject_error_payload(payload: Value) -> Result<Value> {
    match payload.get("error") {
        Some(Value::Null) | None => Ok(payload),
        Some(Value::String(message)) => Err(SessionError::ProviderRejected(message.clone())),
        Some(other) => Err(SessionError::ProviderRejected(
            other
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| other.to_string(), String::from),
        )),
    }
}
