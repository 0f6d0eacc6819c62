//! Storage-registration workaround for fungible-token contracts
//!
//! Some token contracts reject value-bearing calls from accounts that never
//! reserved storage, without running the standard registration check themselves.
//! Before such calls the client looks up the account's storage balance and, when the
//! account does not count as registered, prepends a registration-only
//! `storage_deposit` that pays the minimum balance.

use crate::config::StorageRegistrationRule;
use crate::event_stream::{Event, EventStream};
use crate::network::ViewFunction;
use crate::{Action, SessionError, StorageBalance};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const STORAGE_BALANCE_OF: &str = "storage_balance_of";
pub const STORAGE_DEPOSIT: &str = "storage_deposit";

pub struct StorageShim {
    viewer: Arc<dyn ViewFunction>,
    rule: StorageRegistrationRule,
    events: Option<Arc<EventStream>>,
}

impl StorageShim {
    pub fn new(viewer: Arc<dyn ViewFunction>, rule: StorageRegistrationRule) -> Self {
        Self {
            viewer,
            rule,
            events: None,
        }
    }

    /// Publish `RegistrationInjected` whenever a registration is prepended
    pub fn with_events(mut self, events: Arc<EventStream>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn rule(&self) -> &StorageRegistrationRule {
        &self.rule
    }

    /// Whether any action calls a method that needs prior registration
    pub fn needs_check(&self, actions: &[Action]) -> bool {
        actions
            .iter()
            .filter_map(Action::method_name)
            .any(|method| self.rule.is_sensitive(method))
    }

    /// Registration action paying the configured minimum balance
    pub fn registration_action(&self, account_id: &str) -> Action {
        Action::function_call_with_deposit(
            STORAGE_DEPOSIT,
            json!({ "account_id": account_id, "registration_only": true }),
            self.rule.minimum_balance,
        )
    }

    /// Prepend a registration action unless `account_id` already counts as
    /// registered on `token_contract_id`.
    ///
    /// A failed or malformed lookup counts as unregistered.
    pub async fn ensure_registered(
        &self,
        actions: Vec<Action>,
        token_contract_id: &str,
        account_id: &str,
    ) -> Vec<Action> {
        if self.is_registered(token_contract_id, account_id).await {
            return actions;
        }

        info!(
            "Prepending {} on {} for {}",
            STORAGE_DEPOSIT, token_contract_id, account_id
        );
        if let Some(events) = &self.events {
            events.emit(Event::RegistrationInjected {
                token_contract_id: token_contract_id.to_string(),
                account_id: account_id.to_string(),
            });
        }

        let mut prepared = Vec::with_capacity(actions.len() + 1);
        prepared.push(self.registration_action(account_id));
        prepared.extend(actions);
        prepared
    }

    async fn is_registered(&self, token_contract_id: &str, account_id: &str) -> bool {
        match self.storage_balance(token_contract_id, account_id).await {
            Ok(Some(balance)) => {
                let registered = self.rule.is_registered(balance.total);
                debug!(
                    "Storage total {} on {} for {} (registered: {})",
                    balance.total, token_contract_id, account_id, registered
                );
                registered
            }
            Ok(None) => false,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    async fn storage_balance(
        &self,
        token_contract_id: &str,
        account_id: &str,
    ) -> Result<Option<StorageBalance>, SessionError> {
        let unregistered = |reason: String| {
            SessionError::UnregisteredAccount(format!(
                "{account_id} on {token_contract_id}: {reason}"
            ))
        };

        let value = self
            .viewer
            .view(
                token_contract_id,
                STORAGE_BALANCE_OF,
                json!({ "account_id": account_id }),
            )
            .await
            .map_err(|e| unregistered(e.to_string()))?;

        match value {
            Value::Null => Ok(None),
            other => serde_json::from_value(other)
                .map(Some)
                .map_err(|e| unregistered(e.to_string())),
        }
    }
}
