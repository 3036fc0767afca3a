use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure taxonomy shared by the ledger, the network adapters and the
/// orchestrator. Every module-level error maps onto exactly one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidAddress,
    AlreadyInitialized,
    InvalidCap,
    CapExceeded,
    InsufficientBalance,
    InsufficientAllowance,
    Paused,
    Unauthorized,
    LastAdmin,
    NetworkFailure,
    VerificationFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::InvalidAddress => "InvalidAddress",
            ErrorKind::AlreadyInitialized => "AlreadyInitialized",
            ErrorKind::InvalidCap => "InvalidCap",
            ErrorKind::CapExceeded => "CapExceeded",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::InsufficientAllowance => "InsufficientAllowance",
            ErrorKind::Paused => "Paused",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::LastAdmin => "LastAdmin",
            ErrorKind::NetworkFailure => "NetworkFailure",
            ErrorKind::VerificationFailure => "VerificationFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured revert carried in receipts: the kind plus the ledger's reason
/// string, preserved verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertReason {
    pub kind: ErrorKind,
    pub reason: String,
}

impl RevertReason {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}
