//! Session, credential and transaction data model

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Prepaid gas, in gas units
pub type Gas = u64;

/// Gas attached to function calls when the caller does not choose one (30 Tgas)
pub const DEFAULT_FUNCTION_CALL_GAS: Gas = 30_000_000_000_000;

/// Amount in the smallest native unit.
///
/// JSON carries amounts as decimal strings since they overflow `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(pub u128);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    pub fn as_u128(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u128> for Balance {
    fn from(value: u128) -> Self {
        Balance(value)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Balance {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Balance)
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One unit of on-chain work inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    FunctionCall {
        method_name: String,
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gas: Option<Gas>,
        /// Never defaulted: value-moving calls must carry their own deposit
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deposit: Option<Balance>,
    },
    Transfer {
        amount: Balance,
    },
}

impl Action {
    /// Function call without deposit
    pub fn function_call(method_name: impl Into<String>, args: serde_json::Value) -> Self {
        Action::FunctionCall {
            method_name: method_name.into(),
            args,
            gas: None,
            deposit: None,
        }
    }

    /// Function call carrying an attached deposit
    pub fn function_call_with_deposit(
        method_name: impl Into<String>,
        args: serde_json::Value,
        deposit: Balance,
    ) -> Self {
        Action::FunctionCall {
            method_name: method_name.into(),
            args,
            gas: None,
            deposit: Some(deposit),
        }
    }

    pub fn transfer(amount: Balance) -> Self {
        Action::Transfer { amount }
    }

    pub fn method_name(&self) -> Option<&str> {
        match self {
            Action::FunctionCall { method_name, .. } => Some(method_name),
            Action::Transfer { .. } => None,
        }
    }

    /// Value attached to the action, zero when none
    pub fn attached_value(&self) -> Balance {
        match self {
            Action::FunctionCall { deposit, .. } => deposit.unwrap_or(Balance::ZERO),
            Action::Transfer { amount } => *amount,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Action::FunctionCall { .. } => "FunctionCall",
            Action::Transfer { .. } => "Transfer",
        }
    }
}

/// Ordered actions against a single receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub receiver_id: String,
    pub actions: Vec<Action>,
}

impl Transaction {
    pub fn new(receiver_id: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            actions,
        }
    }

    /// A single plain value transfer, routed through `send_money` by the provider path
    pub fn as_plain_transfer(&self) -> Option<Balance> {
        match self.actions.as_slice() {
            [Action::Transfer { amount }] => Some(*amount),
            _ => None,
        }
    }
}

/// Ordered, non-empty sequence of transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatch {
    transactions: Vec<Transaction>,
}

impl TransactionBatch {
    /// Validates the batch shape: at least one transaction, each with at least one action
    pub fn new(transactions: Vec<Transaction>) -> crate::Result<Self> {
        if transactions.is_empty() {
            return Err(crate::SessionError::EmptyBatch);
        }
        if let Some(tx) = transactions.iter().find(|tx| tx.actions.is_empty()) {
            return Err(crate::SessionError::EmptyTransaction(tx.receiver_id.clone()));
        }
        Ok(Self { transactions })
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn receivers(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|tx| tx.receiver_id.clone())
            .collect()
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }
}

/// Access key material as the wallet hands it out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// Receiver and method names a delegated key may call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeEntry {
    pub receiver_id: String,
    /// Empty means any method on the receiver
    pub method_names: Vec<String>,
}

impl ScopeEntry {
    pub fn allows_method(&self, method_name: &str) -> bool {
        self.method_names.is_empty() || self.method_names.iter().any(|m| m == method_name)
    }
}

/// Delegated, scope-limited access credential bound to the session
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCredential {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    pub scope: Vec<ScopeEntry>,
}

impl DelegatedCredential {
    pub fn from_access_key(access_key: AccessKey, scope: Vec<ScopeEntry>) -> Self {
        Self {
            public_key: access_key.public_key,
            secret_key: access_key.secret_key,
            scope,
        }
    }

    pub fn is_locally_signable(&self) -> bool {
        self.secret_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    pub fn scope_for(&self, receiver_id: &str) -> Option<&ScopeEntry> {
        self.scope.iter().find(|entry| entry.receiver_id == receiver_id)
    }
}

impl fmt::Debug for DelegatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCredential")
            .field("public_key", &self.public_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    #[default]
    SignedOut,
    Authenticating,
    SignedIn,
}

/// Authenticated session identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account_id: String,
    pub status: SessionStatus,
}

/// `storage_balance_of` view result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBalance {
    pub total: Balance,
    #[serde(default)]
    pub available: Balance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_balance_serializes_as_string() {
        let value = serde_json::to_value(Balance(1_250_000_000_000_000_000_000)).unwrap();
        assert_eq!(value, json!("1250000000000000000000"));

        let back: Balance = serde_json::from_value(value).unwrap();
        assert_eq!(back.as_u128(), 1_250_000_000_000_000_000_000);
    }

    #[test]
    fn test_balance_rejects_garbage() {
        assert!(serde_json::from_value::<Balance>(json!("12abc")).is_err());
        assert!("".parse::<Balance>().is_err());
    }

    #[test]
    fn test_action_wire_shape() {
        let action = Action::function_call_with_deposit(
            "ft_transfer",
            json!({ "receiver_id": "bob.testnet", "amount": "10" }),
            Balance(1),
        );
        let value = serde_json::to_value(&action).unwrap();

        assert_eq!(value["type"], "functionCall");
        assert_eq!(value["methodName"], "ft_transfer");
        assert_eq!(value["deposit"], "1");
        assert!(value.get("gas").is_none());
    }

    #[test]
    fn test_batch_rejects_empty_shapes() {
        assert_eq!(
            TransactionBatch::new(vec![]).unwrap_err(),
            crate::SessionError::EmptyBatch
        );
        assert!(matches!(
            TransactionBatch::new(vec![Transaction::new("wrap.testnet", vec![])]),
            Err(crate::SessionError::EmptyTransaction(receiver)) if receiver == "wrap.testnet"
        ));
    }

    #[test]
    fn test_plain_transfer_detection() {
        let tx = Transaction::new("bob.testnet", vec![Action::transfer(Balance(5))]);
        assert_eq!(tx.as_plain_transfer(), Some(Balance(5)));

        let tx = Transaction::new(
            "bob.testnet",
            vec![Action::transfer(Balance(5)), Action::transfer(Balance(6))],
        );
        assert_eq!(tx.as_plain_transfer(), None);
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let credential = DelegatedCredential {
            public_key: "ed25519:pub".to_string(),
            secret_key: Some("ed25519:very-secret".to_string()),
            scope: vec![],
        };
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("very-secret"));
        assert!(credential.is_locally_signable());
    }

    #[test]
    fn test_scope_method_matching() {
        let open = ScopeEntry {
            receiver_id: "app.testnet".to_string(),
            method_names: vec![],
        };
        let narrow = ScopeEntry {
            receiver_id: "app.testnet".to_string(),
            method_names: vec!["sayHi".to_string()],
        };
        assert!(open.allows_method("anything"));
        assert!(narrow.allows_method("sayHi"));
        assert!(!narrow.allows_method("withdraw"));
    }
}
