#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use wallet_session::signer::encode_public_key;
use wallet_session::{
    AccessKey, AccessKeyView, Balance, ClientConfig, InitRequest, InitResponse, Network,
    ProviderEvent, Result, RpcInfo, SessionError, SignInRequest, SignInResponse, Transaction,
    ViewRequest, WalletClient, WalletProvider,
};

pub const CONTRACT: &str = "dev-1635836502908-29682237937904";
pub const WRAP: &str = "wrap.testnet";
pub const ALICE: &str = "alice.testnet";
pub const BOB: &str = "bob.testnet";

/// Deterministic delegated key pair: (public key, 64-byte secret)
pub fn keypair(seed: u8) -> (String, String) {
    let key = SigningKey::from_bytes(&[seed; 32]);
    let public = key.verifying_key().to_bytes();
    let mut secret = [seed; 32].to_vec();
    secret.extend_from_slice(&public);
    (
        encode_public_key(&public),
        format!("ed25519:{}", bs58::encode(secret).into_string()),
    )
}

pub fn access_key(seed: u8, with_secret: bool) -> AccessKey {
    let (public_key, secret_key) = keypair(seed);
    AccessKey {
        public_key,
        secret_key: with_secret.then_some(secret_key),
    }
}

/// What the provider submitted on the user's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
    Single(Transaction),
    Many(Vec<Transaction>),
    Money(String, Balance),
}

#[derive(Default)]
pub struct ProviderState {
    /// Returned by the silent probe
    pub existing: Option<(String, AccessKey)>,
    /// Granted by the interactive prompt; `None` means the user declines
    pub grant: Option<(String, AccessKey)>,
    pub signed_in: Option<String>,
    pub submitted: Vec<Submitted>,
    /// Storage total reported per token contract; missing means unregistered
    pub storage: Vec<(String, Balance)>,
    pub reject_submissions: Option<String>,
    pub fail_sign_out: bool,
}

/// In-memory wallet provider recording what it is asked to do
pub struct FakeProvider {
    pub state: Mutex<ProviderState>,
    events: broadcast::Sender<ProviderEvent>,
    pub prompts: AtomicUsize,
    pub probes: AtomicUsize,
    prompt_delay: Duration,
    submit_delay: Duration,
}

impl FakeProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(ProviderState::default()),
            events,
            prompts: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            prompt_delay: Duration::ZERO,
            submit_delay: Duration::ZERO,
        }
    }

    pub fn with_existing_session(self, account_id: &str, key: AccessKey) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.existing = Some((account_id.to_string(), key));
            state.signed_in = Some(account_id.to_string());
        }
        self
    }

    pub fn with_grant(self, account_id: &str, key: AccessKey) -> Self {
        self.state.lock().unwrap().grant = Some((account_id.to_string(), key));
        self
    }

    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = delay;
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn registered(self, token_contract_id: &str, total: Balance) -> Self {
        self.state
            .lock()
            .unwrap()
            .storage
            .push((token_contract_id.to_string(), total));
        self
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    fn record(&self, submitted: Submitted) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.reject_submissions {
            return Ok(json!({ "error": reason }));
        }
        state.submitted.push(submitted);
        Ok(json!({ "response": [{ "transaction": { "hash": "fakehash" } }], "error": null }))
    }
}

#[async_trait]
impl WalletProvider for FakeProvider {
    async fn init(&self, _request: InitRequest) -> Result<InitResponse> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(match &state.existing {
            Some((account_id, key)) => InitResponse {
                account_id: Some(account_id.clone()),
                access_key: Some(key.clone()),
            },
            None => InitResponse::default(),
        })
    }

    async fn request_sign_in(&self, _request: SignInRequest) -> Result<SignInResponse> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if !self.prompt_delay.is_zero() {
            tokio::time::sleep(self.prompt_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        match state.grant.clone() {
            Some((account_id, key)) => {
                state.signed_in = Some(account_id.clone());
                state.existing = Some((account_id.clone(), key.clone()));
                Ok(SignInResponse {
                    account_id: Some(account_id),
                    access_key: Some(key),
                    error: None,
                })
            }
            None => Ok(SignInResponse {
                error: Some("User rejected the request".to_string()),
                ..SignInResponse::default()
            }),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sign_out {
            return Err(SessionError::Network("extension unreachable".to_string()));
        }
        state.signed_in = None;
        state.existing = None;
        Ok(())
    }

    fn is_signed_in(&self) -> bool {
        self.state.lock().unwrap().signed_in.is_some()
    }

    fn account_id(&self) -> Option<String> {
        self.state.lock().unwrap().signed_in.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    async fn sign_and_send_transaction(&self, transaction: Transaction) -> Result<Value> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        self.record(Submitted::Single(transaction))
    }

    async fn request_sign_transactions(&self, transactions: Vec<Transaction>) -> Result<Value> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        self.record(Submitted::Many(transactions))
    }

    async fn send_money(&self, receiver_id: String, amount: Balance) -> Result<Value> {
        self.record(Submitted::Money(receiver_id, amount))
    }

    async fn view_function_call(&self, request: ViewRequest) -> Result<Value> {
        let state = self.state.lock().unwrap();
        match request.method_name.as_str() {
            "storage_balance_of" => Ok(state
                .storage
                .iter()
                .find(|(contract, _)| *contract == request.contract_id)
                .map_or(Value::Null, |(_, total)| {
                    json!({ "total": total.to_string(), "available": "0" })
                })),
            "getGreeting" => Ok(json!("Hello")),
            other => Ok(json!({ "error": format!("unknown method {other}") })),
        }
    }

    async fn get_rpc(&self) -> Result<RpcInfo> {
        Ok(RpcInfo {
            network_id: "testnet".to_string(),
            node_url: "https://rpc.provider.example".to_string(),
        })
    }
}

/// Node stand-in for the local signing path
pub struct FakeNetwork {
    pub nonce: u64,
    pub delay: Duration,
    pub broadcasts: Mutex<Vec<String>>,
    pub views: Mutex<Vec<(String, String)>>,
}

impl FakeNetwork {
    pub fn new(nonce: u64) -> Self {
        Self {
            nonce,
            delay: Duration::ZERO,
            broadcasts: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        }
    }

    /// Every call takes `delay` before answering
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn view_access_key(
        &self,
        _node_url: String,
        _account_id: String,
        _public_key: String,
    ) -> Result<AccessKeyView> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AccessKeyView {
            nonce: self.nonce,
            block_hash: bs58::encode([7u8; 32]).into_string(),
        })
    }

    async fn view_function(
        &self,
        node_url: String,
        contract_id: String,
        method_name: String,
        _args: Value,
    ) -> Result<Value> {
        self.views.lock().unwrap().push((node_url, method_name.clone()));
        match method_name.as_str() {
            "storage_balance_of" => Ok(Value::Null),
            _ => Ok(json!({ "contract": contract_id, "method": method_name })),
        }
    }

    async fn broadcast_transaction(&self, _node_url: String, signed_transaction: String) -> Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.broadcasts.lock().unwrap().push(signed_transaction);
        Ok(json!({ "status": { "SuccessValue": "" } }))
    }
}

pub fn config() -> ClientConfig {
    ClientConfig {
        contract_id: CONTRACT.to_string(),
        wrap_contract_id: WRAP.to_string(),
        local_signing_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    }
}

pub fn client(provider: &Arc<FakeProvider>) -> WalletClient {
    WalletClient::new(config(), provider.clone()).unwrap()
}

pub fn local_client(provider: &Arc<FakeProvider>, network: &Arc<FakeNetwork>) -> WalletClient {
    WalletClient::with_network(config(), provider.clone(), network.clone()).unwrap()
}

/// Wait for the next event matching `pred`, bounded so a missing event fails the test
pub async fn next_event<F>(
    receiver: &mut broadcast::Receiver<wallet_session::Event>,
    pred: F,
) -> wallet_session::Event
where
    F: Fn(&wallet_session::Event) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = receiver.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not published in time")
}
