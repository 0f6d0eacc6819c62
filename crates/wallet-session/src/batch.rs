//! Transaction batch compiler
//!
//! Fixed composition policies, not a planner: the caller picks the shape and the
//! order, the compiler validates it and applies the storage-registration shim.

use crate::storage::StorageShim;
use crate::{Action, Result, SessionError, Transaction, TransactionBatch};
use std::sync::Arc;
use tracing::debug;

/// Caller intent, one per supported batch shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchIntent {
    /// One action, one transaction
    Single { receiver_id: String, action: Action },

    /// Several actions in one transaction, in the given order
    Combined {
        receiver_id: String,
        actions: Vec<Action>,
    },

    /// One transaction per step against the same receiver.
    ///
    /// Steps run in the given order, so a deposit step placed before a transfer step
    /// is confirmed before the transfer relies on the deposited balance.
    Sequential {
        receiver_id: String,
        steps: Vec<Vec<Action>>,
    },
}

impl BatchIntent {
    /// Sequential intent with one step per action
    pub fn split(receiver_id: impl Into<String>, actions: Vec<Action>) -> Self {
        BatchIntent::Sequential {
            receiver_id: receiver_id.into(),
            steps: actions.into_iter().map(|action| vec![action]).collect(),
        }
    }

    pub fn receiver_id(&self) -> &str {
        match self {
            BatchIntent::Single { receiver_id, .. }
            | BatchIntent::Combined { receiver_id, .. }
            | BatchIntent::Sequential { receiver_id, .. } => receiver_id,
        }
    }
}

pub struct BatchCompiler {
    shim: Arc<StorageShim>,
}

impl BatchCompiler {
    pub fn new(shim: Arc<StorageShim>) -> Self {
        Self { shim }
    }

    /// Compile `intent` for `account_id`.
    ///
    /// Deposits are taken as given; a value-moving call without one compiles
    /// and is left for the network to reject.
    pub async fn compile(&self, intent: BatchIntent, account_id: &str) -> Result<TransactionBatch> {
        let transactions = match intent {
            BatchIntent::Single {
                receiver_id,
                action,
            } => {
                vec![self.prepare(receiver_id, vec![action], account_id).await?]
            }
            BatchIntent::Combined {
                receiver_id,
                actions,
            } => vec![self.prepare(receiver_id, actions, account_id).await?],
            BatchIntent::Sequential { receiver_id, steps } => {
                if steps.is_empty() {
                    return Err(SessionError::EmptyBatch);
                }
                let mut transactions = Vec::with_capacity(steps.len());
                for step in steps {
                    transactions.push(self.prepare(receiver_id.clone(), step, account_id).await?);
                }
                transactions
            }
        };

        debug!(
            "Compiled {} transaction(s) for {}",
            transactions.len(),
            account_id
        );
        TransactionBatch::new(transactions)
    }

    async fn prepare(
        &self,
        receiver_id: String,
        actions: Vec<Action>,
        account_id: &str,
    ) -> Result<Transaction> {
        if actions.is_empty() {
            return Err(SessionError::EmptyTransaction(receiver_id));
        }

        let actions = if self.shim.needs_check(&actions) {
            self.shim
                .ensure_registered(actions, &receiver_id, account_id)
                .await
        } else {
            actions
        };

        Ok(Transaction::new(receiver_id, actions))
    }
}
