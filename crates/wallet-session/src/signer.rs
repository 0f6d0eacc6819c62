//! Local transaction signing with a cached delegated key
//!
//! Transactions are encoded in the network's borsh layout, hashed with sha256 and
//! signed with ed25519. Keys travel as `ed25519:<base58>` strings.

use crate::types::DEFAULT_FUNCTION_CALL_GAS;
use crate::{Action, Result, SessionError, Transaction};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::BorshSerialize;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::io::{self, Write};

const ED25519_PREFIX: &str = "ed25519:";
const ED25519_KEY_TYPE: u8 = 0;

const FUNCTION_CALL_TAG: u8 = 2;
const TRANSFER_TAG: u8 = 3;

struct WirePublicKey([u8; 32]);

impl BorshSerialize for WirePublicKey {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        ED25519_KEY_TYPE.serialize(writer)?;
        writer.write_all(&self.0)
    }
}

struct WireSignature([u8; 64]);

impl BorshSerialize for WireSignature {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        ED25519_KEY_TYPE.serialize(writer)?;
        writer.write_all(&self.0)
    }
}

enum WireAction {
    FunctionCall {
        method_name: String,
        args: Vec<u8>,
        gas: u64,
        deposit: u128,
    },
    Transfer {
        deposit: u128,
    },
}

// Variant tags follow the network's action enum, which has variants this crate never emits.
impl BorshSerialize for WireAction {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            WireAction::FunctionCall {
                method_name,
                args,
                gas,
                deposit,
            } => {
                FUNCTION_CALL_TAG.serialize(writer)?;
                method_name.serialize(writer)?;
                args.serialize(writer)?;
                gas.serialize(writer)?;
                deposit.serialize(writer)
            }
            WireAction::Transfer { deposit } => {
                TRANSFER_TAG.serialize(writer)?;
                deposit.serialize(writer)
            }
        }
    }
}

impl TryFrom<&Action> for WireAction {
    type Error = SessionError;

    fn try_from(action: &Action) -> Result<Self> {
        Ok(match action {
            Action::FunctionCall {
                method_name,
                args,
                gas,
                deposit,
            } => WireAction::FunctionCall {
                method_name: method_name.clone(),
                args: serde_json::to_vec(args)?,
                gas: gas.unwrap_or(DEFAULT_FUNCTION_CALL_GAS),
                deposit: deposit.map_or(0, |d| d.as_u128()),
            },
            Action::Transfer { amount } => WireAction::Transfer {
                deposit: amount.as_u128(),
            },
        })
    }
}

#[derive(BorshSerialize)]
struct WireTransaction {
    signer_id: String,
    public_key: WirePublicKey,
    nonce: u64,
    receiver_id: String,
    block_hash: [u8; 32],
    actions: Vec<WireAction>,
}

#[derive(BorshSerialize)]
struct WireSignedTransaction {
    transaction: WireTransaction,
    signature: WireSignature,
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Transaction hash, base58
    pub hash: String,
    /// Borsh encoded signed transaction, base64
    pub encoded: String,
}

pub struct LocalSigner {
    signing_key: SigningKey,
    public_key: String,
}

impl LocalSigner {
    /// Accepts a 32-byte seed or a 64-byte seed-plus-public-key secret
    pub fn from_secret_key(secret_key: &str) -> Result<Self> {
        let encoded = secret_key.strip_prefix(ED25519_PREFIX).ok_or_else(|| {
            SessionError::InvalidKey("only ed25519 secret keys are supported".to_string())
        })?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| SessionError::InvalidKey(e.to_string()))?;

        let seed: [u8; 32] = match bytes.len() {
            32 | 64 => bytes[..32]
                .try_into()
                .map_err(|_| SessionError::InvalidKey("bad seed length".to_string()))?,
            n => {
                return Err(SessionError::InvalidKey(format!(
                    "expected 32 or 64 key bytes, got {n}"
                )))
            }
        };

        let signing_key = SigningKey::from_bytes(&seed);
        let verifying = signing_key.verifying_key().to_bytes();
        if bytes.len() == 64 && bytes[32..] != verifying {
            return Err(SessionError::InvalidKey(
                "public half does not match secret".to_string(),
            ));
        }

        Ok(Self {
            public_key: encode_public_key(&verifying),
            signing_key,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn sign_transaction(
        &self,
        signer_id: &str,
        nonce: u64,
        block_hash: &str,
        transaction: &Transaction,
    ) -> Result<SignedTransaction> {
        let block_hash: [u8; 32] = bs58::decode(block_hash)
            .into_vec()
            .map_err(|e| SessionError::Serialization(format!("block hash: {e}")))?
            .try_into()
            .map_err(|_| SessionError::Serialization("block hash must be 32 bytes".to_string()))?;

        let actions = transaction
            .actions
            .iter()
            .map(WireAction::try_from)
            .collect::<Result<Vec<_>>>()?;

        let wire = WireTransaction {
            signer_id: signer_id.to_string(),
            public_key: WirePublicKey(self.signing_key.verifying_key().to_bytes()),
            nonce,
            receiver_id: transaction.receiver_id.clone(),
            block_hash,
            actions,
        };

        let hash: [u8; 32] = Sha256::digest(wire.try_to_vec()?).into();
        let signature = self.signing_key.sign(&hash);

        let signed = WireSignedTransaction {
            transaction: wire,
            signature: WireSignature(signature.to_bytes()),
        };

        Ok(SignedTransaction {
            hash: bs58::encode(hash).into_string(),
            encoded: STANDARD.encode(signed.try_to_vec()?),
        })
    }
}

pub fn encode_public_key(bytes: &[u8; 32]) -> String {
    format!("{ED25519_PREFIX}{}", bs58::encode(bytes).into_string())
}
