//! Execution and confirmation interfaces.
//!
//! The orchestrator talks to a chain only through [`ExecutionClient`] and
//! [`ConfirmationSource`]. Two adapters exist: [`DevChain`], an in-process
//! chain that runs the token logic itself, and [`RpcClient`], a JSON-RPC
//! client for a remote node.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, RevertReason};
use crate::ledger::{InitArgs, LedgerEvent};
use crate::logic::{CallOutput, LedgerCall, LedgerQuery};
use crate::signer::{hex_bytes, SignatureError};

mod dev;
mod rpc;

pub use dev::{ContractAccount, DevChain};
pub use rpc::RpcClient;

pub type TxHash = B256;

/// What a transaction asks the chain to do.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Publish stateless logic code under a fresh address.
    DeployLogic { logic: String },
    /// Standalone token whose constructor runs the initializer.
    DeployToken { logic: String, args: InitArgs },
    DeployProxy {
        implementation: Address,
        init: Option<InitArgs>,
    },
    Call { to: Address, call: LedgerCall },
    Upgrade {
        proxy: Address,
        implementation: Address,
        setup: Option<LedgerCall>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub nonce: u64,
    pub operation: Operation,
}

impl Transaction {
    pub fn hash(&self) -> Result<TxHash, serde_json::Error> {
        let encoded = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(b"ctk-tx");
        hasher.update(&encoded);
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(B256::from(digest))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: Transaction,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Reverted(RevertReason),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from: Address,
    pub status: ExecutionStatus,
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success)
    }

    /// Splits a reverted receipt into its reason.
    pub fn into_result(self) -> Result<Receipt, RevertReason> {
        match self.status {
            ExecutionStatus::Success => Ok(self),
            ExecutionStatus::Reverted(reason) => Err(reason),
        }
    }
}

/// Address assigned to a contract created by `deployer` at `nonce`.
pub fn contract_address(deployer: Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"ctk-create");
    hasher.update(deployer.as_slice());
    hasher.update(nonce.to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Address::from_slice(&digest[12..])
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),
    #[error("no token at {0}")]
    NotAToken(Address),
    #[error("{0} is not a proxy")]
    NotAProxy(Address),
    #[error("unexpected output for {query}: {output}")]
    UnexpectedOutput { query: String, output: String },
    #[error("chain state error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl NetworkError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NetworkFailure
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        NetworkError::Transport(err.to_string())
    }
}

impl From<SignatureError> for NetworkError {
    fn from(err: SignatureError) -> Self {
        NetworkError::Rejected(err.to_string())
    }
}

/// Submits signed transactions and serves read-only calls.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    fn name(&self) -> &str;

    /// Next nonce expected from `account`.
    async fn nonce(&self, account: Address) -> Result<u64, NetworkError>;

    /// Returns once the transaction is included. A reverted transaction is a
    /// successful submission with a reverted receipt.
    async fn submit(&self, tx: SignedTransaction) -> Result<Receipt, NetworkError>;

    async fn query(&self, to: Address, query: LedgerQuery) -> Result<CallOutput, NetworkError>;

    /// Logic address currently behind `proxy`.
    async fn implementation(&self, proxy: Address) -> Result<Address, NetworkError>;
}

#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Blocks on top of (and including) the one that holds `tx`.
    async fn confirmations(&self, tx: TxHash) -> Result<u64, NetworkError>;
}
