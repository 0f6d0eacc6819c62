//! Wallet Session
//!
//! Client-side session and transaction-composition layer for injected
//! account-abstraction wallets. Authenticates against the wallet with a delegated,
//! scope-limited access key, compiles actions into transaction batches, and submits
//! them either through the wallet (interactive confirmation) or by signing locally
//! with the cached key.

use thiserror::Error;

pub mod batch;
pub mod client;
pub mod config;
pub mod credential_store;
pub mod event_stream;
pub mod executor;
pub mod network;
pub mod provider;
pub mod session;
pub mod signer;
pub mod storage;
pub mod telemetry;
pub mod types;

pub use batch::{BatchCompiler, BatchIntent};
pub use client::WalletClient;
pub use config::{BalanceComparison, ClientConfig, NetworkEndpoints, StorageRegistrationRule};
pub use credential_store::CredentialStore;
pub use event_stream::{Event, EventStream};
pub use executor::{ExecutionOutcome, ExecutionPath, Executor};
pub use network::{AccessKeyView, EndpointCache, Network, ProviderViewer, RpcViewer, ViewFunction};
pub use provider::{
    InitRequest, InitResponse, ProviderEvent, RpcInfo, SignInRequest, SignInResponse,
    ViewRequest, WalletProvider,
};
pub use session::{SessionManager, Subscription};
pub use storage::StorageShim;
pub use types::{
    AccessKey, Action, Balance, DelegatedCredential, Gas, ScopeEntry, Session, SessionStatus,
    StorageBalance, Transaction, TransactionBatch,
};

/// Errors surfaced by the session layer.
///
/// `Clone` so a single in-flight sign-in can hand its outcome to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Storage registration check failed for {0}")]
    UnregisteredAccount(String),

    #[error("Local signing unavailable: {0}")]
    LocalSigningUnavailable(String),

    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Transaction batch is empty")]
    EmptyBatch,

    #[error("Transaction to {0} has no actions")]
    EmptyTransaction(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout occurred")]
    Timeout,
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
