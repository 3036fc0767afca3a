//! Upgrade proxy: permanent storage plus a swappable logic pointer.
//!
//! The proxy never interprets ledger state itself. Every call is executed by
//! the logic the caller resolved from [`UpgradeProxy::implementation`], against
//! the proxy's own storage. Initialization-once is owned by the ledger's
//! `initialized` flag; the proxy's [`ProxyState`] is derived from it.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::ledger::{InitArgs, LedgerError, LedgerEvent, LedgerState};
use crate::logic::{CallOutput, LedgerCall, LedgerQuery, TokenLogic};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyState {
    Uninitialized,
    Active,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeProxy {
    implementation: Address,
    storage: LedgerState,
}

impl UpgradeProxy {
    pub fn deploy(implementation: Address) -> Self {
        Self {
            implementation,
            storage: LedgerState::new(),
        }
    }

    pub fn implementation(&self) -> Address {
        self.implementation
    }

    pub fn state(&self) -> ProxyState {
        if self.storage.is_initialized() {
            ProxyState::Active
        } else {
            ProxyState::Uninitialized
        }
    }

    pub fn storage(&self) -> &LedgerState {
        &self.storage
    }

    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        self.storage.take_events()
    }

    pub fn initialize(
        &mut self,
        logic: &dyn TokenLogic,
        caller: Address,
        args: InitArgs,
    ) -> Result<(), LedgerError> {
        self.forward(logic, caller, &LedgerCall::Initialize(args))
    }

    /// Runs `call` through `logic` against proxy storage. On failure the
    /// storage is left exactly as it was.
    pub fn forward(
        &mut self,
        logic: &dyn TokenLogic,
        caller: Address,
        call: &LedgerCall,
    ) -> Result<(), LedgerError> {
        let mut next = self.storage.clone();
        logic.execute(&mut next, caller, call)?;
        self.storage = next;
        Ok(())
    }

    pub fn query(&self, logic: &dyn TokenLogic, query: &LedgerQuery) -> CallOutput {
        logic.query(&self.storage, query)
    }

    /// Swaps the logic pointer. Authorization is decided by the `current`
    /// logic against the preserved storage. The optional `setup` call runs
    /// through the new logic; if it fails the pointer is not swapped.
    ///
    /// Layout compatibility of `next` is a precondition on the caller.
    pub fn upgrade(
        &mut self,
        current: &dyn TokenLogic,
        caller: Address,
        new_implementation: Address,
        next: &dyn TokenLogic,
        setup: Option<&LedgerCall>,
    ) -> Result<(), LedgerError> {
        current.authorize_upgrade(&self.storage, caller)?;

        let mut storage = self.storage.clone();
        if let Some(call) = setup {
            next.execute(&mut storage, caller, call)?;
        }
        storage.emit(LedgerEvent::Upgraded {
            implementation: new_implementation,
        });
        self.storage = storage;
        self.implementation = new_implementation;
        Ok(())
    }
}
