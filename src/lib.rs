//! ctk: capped, role-gated, upgradeable token tooling.
//!
//! - `ledger`: supply-capped balances, allowances, pause flag and roles
//! - `logic`: versioned token logic and storage layouts
//! - `proxy`: permanent storage behind a swappable logic pointer
//! - `network`: execution/confirmation interfaces, dev chain, JSON-RPC client
//! - `verify`: explorer verification
//! - `orchestrator`: deploy, wait, verify and upgrade flows
//! - `config`, `manifest`, `signer`: supporting pieces for the CLI

pub mod config;
pub mod error;
pub mod ledger;
pub mod logic;
pub mod manifest;
pub mod network;
pub mod orchestrator;
mod persist;
pub mod proxy;
pub mod signer;
pub mod verify;

pub use error::{ErrorKind, RevertReason};
