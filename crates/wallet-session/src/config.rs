//! Client configuration

use crate::{Balance, Result, SessionError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Minimum storage balance of the wrapped-native token contract (0.00125 native)
pub const DEFAULT_MIN_STORAGE_BALANCE: Balance = Balance(1_250_000_000_000_000_000_000);

/// Network endpoint set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    /// Network identifier (`testnet`, `mainnet`, ...)
    pub network_id: String,
    /// RPC endpoint URL
    pub node_url: String,
    /// Hosted wallet URL
    pub wallet_url: String,
    /// Helper service URL
    pub helper_url: String,
    /// Block explorer URL
    pub explorer_url: String,
}

impl NetworkEndpoints {
    /// Public testnet endpoints
    pub fn testnet() -> Self {
        Self {
            network_id: "testnet".to_string(),
            node_url: "https://rpc.testnet.near.org".to_string(),
            wallet_url: "https://wallet.testnet.near.org".to_string(),
            helper_url: "https://helper.testnet.near.org".to_string(),
            explorer_url: "https://explorer.testnet.near.org".to_string(),
        }
    }

    /// Public mainnet endpoints
    pub fn mainnet() -> Self {
        Self {
            network_id: "mainnet".to_string(),
            node_url: "https://rpc.mainnet.near.org".to_string(),
            wallet_url: "https://wallet.near.org".to_string(),
            helper_url: "https://helper.mainnet.near.org".to_string(),
            explorer_url: "https://explorer.near.org".to_string(),
        }
    }
}

impl Default for NetworkEndpoints {
    fn default() -> Self {
        Self::testnet()
    }
}

/// How a reported storage total is compared against the minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BalanceComparison {
    /// Registered only when the total equals the minimum
    #[default]
    Exact,
    /// Registered when the total is at least the minimum
    AtLeast,
}

impl FromStr for BalanceComparison {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(BalanceComparison::Exact),
            "at_least" | "at-least" | "atleast" => Ok(BalanceComparison::AtLeast),
            other => Err(SessionError::InvalidConfiguration(format!(
                "unknown storage balance comparison: {other}"
            ))),
        }
    }
}

/// Trigger rule for the storage-registration workaround
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRegistrationRule {
    /// Deposit attached to `storage_deposit` and compared against the reported total
    pub minimum_balance: Balance,

    /// How the reported total is compared with `minimum_balance`
    pub comparison: BalanceComparison,

    /// Methods that fail on contracts where the caller holds no storage
    pub sensitive_methods: Vec<String>,
}

impl StorageRegistrationRule {
    /// Whether a reported storage total counts as registered
    pub fn is_registered(&self, total: Balance) -> bool {
        match self.comparison {
            BalanceComparison::Exact => total == self.minimum_balance,
            BalanceComparison::AtLeast => total >= self.minimum_balance,
        }
    }

    /// Whether calling `method_name` needs prior registration
    pub fn is_sensitive(&self, method_name: &str) -> bool {
        self.sensitive_methods.iter().any(|m| m == method_name)
    }
}

impl Default for StorageRegistrationRule {
    fn default() -> Self {
        Self {
            minimum_balance: DEFAULT_MIN_STORAGE_BALANCE,
            comparison: BalanceComparison::Exact,
            sensitive_methods: vec![
                "near_deposit".to_string(),
                "ft_transfer".to_string(),
                "ft_transfer_call".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Primary contract the delegated key is scoped to
    pub contract_id: String,

    /// Wrapped-native fungible token contract
    pub wrap_contract_id: String,

    /// Method names requested for the delegated key (empty grants any method)
    pub method_names: Vec<String>,

    /// Endpoints used when the provider reports none
    pub network: NetworkEndpoints,

    /// Storage-registration workaround settings
    pub storage_rule: StorageRegistrationRule,

    /// Upper bound for each local-signing network round trip
    pub local_signing_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            contract_id: "dev-1635836502908-29682237937904".to_string(),
            wrap_contract_id: "wrap.testnet".to_string(),
            method_names: Vec::new(),
            network: NetworkEndpoints::testnet(),
            storage_rule: StorageRegistrationRule::default(),
            local_signing_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults for missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let network_id = lookup("NETWORK_ID").unwrap_or(defaults.network.network_id.clone());
        let base = match network_id.as_str() {
            "mainnet" => NetworkEndpoints::mainnet(),
            "testnet" => NetworkEndpoints::testnet(),
            _ => NetworkEndpoints {
                network_id: network_id.clone(),
                ..defaults.network.clone()
            },
        };

        let network = NetworkEndpoints {
            node_url: lookup("NODE_URL").unwrap_or(base.node_url),
            wallet_url: lookup("WALLET_URL").unwrap_or(base.wallet_url),
            helper_url: lookup("HELPER_URL").unwrap_or(base.helper_url),
            explorer_url: lookup("EXPLORER_URL").unwrap_or(base.explorer_url),
            network_id,
        };

        let minimum_balance = match lookup("MIN_STORAGE_BALANCE") {
            Some(raw) => raw.parse().map_err(|_| {
                SessionError::InvalidConfiguration(format!("Invalid MIN_STORAGE_BALANCE: {raw}"))
            })?,
            None => defaults.storage_rule.minimum_balance,
        };

        let comparison = match lookup("STORAGE_BALANCE_COMPARISON") {
            Some(raw) => raw.parse()?,
            None => defaults.storage_rule.comparison,
        };

        let method_names = lookup("METHOD_NAMES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.method_names);

        let local_signing_timeout = match lookup("LOCAL_SIGNING_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                SessionError::InvalidConfiguration(format!(
                    "Invalid LOCAL_SIGNING_TIMEOUT_SECS: {raw}"
                ))
            })?),
            None => defaults.local_signing_timeout,
        };

        let config = ClientConfig {
            contract_id: lookup("CONTRACT_ID").unwrap_or(defaults.contract_id),
            wrap_contract_id: lookup("WRAP_CONTRACT_ID").unwrap_or(defaults.wrap_contract_id),
            method_names,
            network,
            storage_rule: StorageRegistrationRule {
                minimum_balance,
                comparison,
                ..defaults.storage_rule
            },
            local_signing_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject empty contract ids and a zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.contract_id.is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "contract id must not be empty".to_string(),
            ));
        }
        if self.wrap_contract_id.is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "wrapped token contract id must not be empty".to_string(),
            ));
        }
        if self.local_signing_timeout.is_zero() {
            return Err(SessionError::InvalidConfiguration(
                "local signing timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
