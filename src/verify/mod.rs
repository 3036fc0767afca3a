//! Source verification on a block explorer.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::ledger::InitArgs;
use crate::logic::{StorageLayout, TokenLogic};

mod etherscan;

pub use etherscan::EtherscanVerifier;

pub const PROXY_CONTRACT: &str = "UpgradeProxy";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub address: Address,
    pub contract: String,
    pub version: u32,
    pub layout: StorageLayout,
    /// Present for standalone tokens, whose constructor takes the
    /// initializer arguments. Proxies and logic contracts carry none.
    pub constructor_args: Option<InitArgs>,
}

impl VerificationRequest {
    pub fn for_logic(address: Address, logic: &dyn TokenLogic) -> Self {
        Self {
            address,
            contract: logic.id().to_string(),
            version: logic.version(),
            layout: logic.layout(),
            constructor_args: None,
        }
    }

    /// The proxy itself: fixed code with no storage of its own.
    pub fn for_proxy(address: Address) -> Self {
        Self {
            address,
            contract: PROXY_CONTRACT.to_string(),
            version: 1,
            layout: StorageLayout::default(),
            constructor_args: None,
        }
    }

    pub fn with_constructor_args(mut self, args: InitArgs) -> Self {
        self.constructor_args = Some(args);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    AlreadyVerified,
    Failed(String),
}

impl VerificationStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, VerificationStatus::Failed(_))
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Verified => f.write_str("verified"),
            VerificationStatus::AlreadyVerified => f.write_str("already verified"),
            VerificationStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Turns a bare explorer message into a status. This is the only place a
/// reason string is inspected.
pub fn classify_reason(reason: &str) -> VerificationStatus {
    if reason.to_ascii_lowercase().contains("already verified") {
        VerificationStatus::AlreadyVerified
    } else {
        VerificationStatus::Failed(reason.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("explorer transport error: {0}")]
    Transport(String),
    #[error("explorer rejected the request: {0}")]
    Rejected(String),
    #[error("verification still pending after {0} checks")]
    Pending(u32),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl VerifierError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::VerificationFailure
    }
}

impl From<reqwest::Error> for VerifierError {
    fn from(err: reqwest::Error) -> Self {
        VerifierError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationStatus, VerifierError>;
}

/// Collapses a verifier result into a status; errors are classified by
/// their message so an "already verified" rejection still counts.
pub fn settle(result: Result<VerificationStatus, VerifierError>) -> VerificationStatus {
    match result {
        Ok(status) => status,
        Err(VerifierError::Rejected(reason)) => classify_reason(&reason),
        Err(err) => VerificationStatus::Failed(err.to_string()),
    }
}
