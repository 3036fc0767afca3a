//! Token logic versions.
//!
//! A logic version is stateless code executed against a [`LedgerState`] that
//! lives elsewhere (a standalone token account or an upgrade proxy). Versions
//! are addressed by a stable identifier and declare the storage layout they
//! expect, so that an upgrade can be checked for layout compatibility before
//! it is submitted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::ledger::{InitArgs, LedgerError, LedgerState, Role};

mod layout;

pub use layout::{LayoutError, StorageLayout, StorageSlot};

pub const CUSTOM_TOKEN: &str = "CustomToken";
pub const CUSTOM_TOKEN_UPGRADEABLE: &str = "CustomTokenUpgradeable";
pub const CUSTOM_TOKEN_FINAL: &str = "CustomTokenFinal";

/// State-changing entry points of the token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LedgerCall {
    Initialize(InitArgs),
    Mint { to: Address, amount: U256 },
    Burn { amount: U256 },
    BurnFrom { account: Address, amount: U256 },
    Transfer { to: Address, amount: U256 },
    Approve { spender: Address, amount: U256 },
    TransferFrom { from: Address, to: Address, amount: U256 },
    Pause,
    Unpause,
    GrantRole { role: Role, account: Address },
    RevokeRole { role: Role, account: Address },
    RenounceRole { role: Role },
}

/// Read-only entry points.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LedgerQuery {
    Name,
    Symbol,
    Decimals,
    Cap,
    TotalSupply,
    BalanceOf { account: Address },
    Allowance { owner: Address, spender: Address },
    HasRole { role: Role, account: Address },
    Paused,
    Version,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CallOutput {
    Text(String),
    Amount(U256),
    Flag(bool),
    Number(u64),
}

impl fmt::Display for CallOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutput::Text(text) => f.write_str(text),
            CallOutput::Amount(amount) => write!(f, "{amount}"),
            CallOutput::Flag(flag) => write!(f, "{flag}"),
            CallOutput::Number(n) => write!(f, "{n}"),
        }
    }
}

pub trait TokenLogic: Send + Sync {
    fn id(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Whether this code may sit behind an upgrade proxy.
    fn upgradeable(&self) -> bool;

    fn layout(&self) -> StorageLayout;

    fn execute(
        &self,
        storage: &mut LedgerState,
        caller: Address,
        call: &LedgerCall,
    ) -> Result<(), LedgerError> {
        dispatch(storage, caller, call)
    }

    fn query(&self, storage: &LedgerState, query: &LedgerQuery) -> CallOutput {
        match query {
            LedgerQuery::Version => CallOutput::Number(u64::from(self.version())),
            other => read(storage, other),
        }
    }

    /// Gate consulted by the proxy before it swaps this logic out.
    fn authorize_upgrade(&self, storage: &LedgerState, caller: Address) -> Result<(), LedgerError> {
        storage.roles().ensure(Role::Admin, caller)
    }
}

fn dispatch(storage: &mut LedgerState, caller: Address, call: &LedgerCall) -> Result<(), LedgerError> {
    match call {
        LedgerCall::Initialize(args) => storage.initialize(caller, args),
        LedgerCall::Mint { to, amount } => storage.mint(caller, *to, *amount),
        LedgerCall::Burn { amount } => storage.burn(caller, *amount),
        LedgerCall::BurnFrom { account, amount } => storage.burn_from(caller, *account, *amount),
        LedgerCall::Transfer { to, amount } => storage.transfer(caller, *to, *amount),
        LedgerCall::Approve { spender, amount } => storage.approve(caller, *spender, *amount),
        LedgerCall::TransferFrom { from, to, amount } => {
            storage.transfer_from(caller, *from, *to, *amount)
        }
        LedgerCall::Pause => storage.pause(caller),
        LedgerCall::Unpause => storage.unpause(caller),
        LedgerCall::GrantRole { role, account } => storage.grant_role(caller, *role, *account),
        LedgerCall::RevokeRole { role, account } => storage.revoke_role(caller, *role, *account),
        LedgerCall::RenounceRole { role } => storage.renounce_role(caller, *role),
    }
}

fn read(storage: &LedgerState, query: &LedgerQuery) -> CallOutput {
    match query {
        LedgerQuery::Name => CallOutput::Text(storage.name().to_string()),
        LedgerQuery::Symbol => CallOutput::Text(storage.symbol().to_string()),
        LedgerQuery::Decimals => CallOutput::Number(u64::from(storage.decimals())),
        LedgerQuery::Cap => CallOutput::Amount(storage.cap()),
        LedgerQuery::TotalSupply => CallOutput::Amount(storage.total_supply()),
        LedgerQuery::BalanceOf { account } => CallOutput::Amount(storage.balance_of(*account)),
        LedgerQuery::Allowance { owner, spender } => {
            CallOutput::Amount(storage.allowance(*owner, *spender))
        }
        LedgerQuery::HasRole { role, account } => CallOutput::Flag(storage.has_role(*role, *account)),
        LedgerQuery::Paused => CallOutput::Flag(storage.is_paused()),
        LedgerQuery::Version => CallOutput::Number(0),
    }
}

/// Layout of [`LedgerState`] as persisted by the first logic version.
pub fn ledger_layout() -> StorageLayout {
    StorageLayout::from_slots(&[
        ("initialized", "bool"),
        ("name", "string"),
        ("symbol", "string"),
        ("total_supply", "uint256"),
        ("balances", "mapping(address => uint256)"),
        ("allowances", "mapping(address => mapping(address => uint256))"),
        ("roles", "mapping(bytes32 => set(address))"),
        ("cap", "uint256"),
        ("paused", "bool"),
    ])
}

/// Non-upgradeable token whose constructor runs the initializer.
pub struct CustomToken;

impl TokenLogic for CustomToken {
    fn id(&self) -> &'static str {
        CUSTOM_TOKEN
    }

    fn version(&self) -> u32 {
        1
    }

    fn upgradeable(&self) -> bool {
        false
    }

    fn layout(&self) -> StorageLayout {
        ledger_layout()
    }
}

pub struct CustomTokenUpgradeable;

impl TokenLogic for CustomTokenUpgradeable {
    fn id(&self) -> &'static str {
        CUSTOM_TOKEN_UPGRADEABLE
    }

    fn version(&self) -> u32 {
        1
    }

    fn upgradeable(&self) -> bool {
        true
    }

    fn layout(&self) -> StorageLayout {
        ledger_layout()
    }
}

/// Second logic version; same storage, reports version 2.
pub struct CustomTokenFinal;

impl TokenLogic for CustomTokenFinal {
    fn id(&self) -> &'static str {
        CUSTOM_TOKEN_FINAL
    }

    fn version(&self) -> u32 {
        2
    }

    fn upgradeable(&self) -> bool {
        true
    }

    fn layout(&self) -> StorageLayout {
        ledger_layout()
    }
}

/// Registry of the logic versions an execution environment can run.
#[derive(Clone)]
pub struct LogicCatalog {
    entries: BTreeMap<&'static str, Arc<dyn TokenLogic>>,
}

impl LogicCatalog {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(Arc::new(CustomToken));
        catalog.register(Arc::new(CustomTokenUpgradeable));
        catalog.register(Arc::new(CustomTokenFinal));
        catalog
    }

    pub fn register(&mut self, logic: Arc<dyn TokenLogic>) {
        self.entries.insert(logic.id(), logic);
    }

    pub fn resolve(&self, id: &str) -> Option<Arc<dyn TokenLogic>> {
        self.entries.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

impl Default for LogicCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for LogicCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
