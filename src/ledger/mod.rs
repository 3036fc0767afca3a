use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RevertReason};

mod roles;

pub use roles::{Role, RoleRegistry};

/// Fixed decimal precision of the asset (1 token = 10^18 base units).
pub const DECIMALS: u8 = 18;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Initializable: contract is already initialized")]
    AlreadyInitialized,
    #[error("ERC20Capped: cap is 0")]
    InvalidCap,
    #[error("ERC20: {context} is the zero address")]
    InvalidAddress { context: &'static str },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("ERC20: cap exceeded")]
    CapExceeded { requested: U256, cap: U256 },
    #[error("ERC20: {action} amount exceeds balance")]
    InsufficientBalance {
        action: &'static str,
        available: U256,
        requested: U256,
    },
    #[error("ERC20: insufficient allowance")]
    InsufficientAllowance { available: U256, requested: U256 },
    #[error("Pausable: paused")]
    Paused,
    #[error("AccessControl: account {account} is missing role {}", .role.id())]
    Unauthorized { account: Address, role: Role },
    #[error("AccessControl: cannot remove the last admin")]
    LastAdmin,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            LedgerError::InvalidCap => ErrorKind::InvalidCap,
            LedgerError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
            LedgerError::CapExceeded { .. } => ErrorKind::CapExceeded,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            LedgerError::Paused => ErrorKind::Paused,
            LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LedgerError::LastAdmin => ErrorKind::LastAdmin,
        }
    }

    pub fn revert_reason(&self) -> RevertReason {
        RevertReason::new(self.kind(), self.to_string())
    }
}

/// Arguments of the one-time initialization call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitArgs {
    pub name: String,
    pub symbol: String,
    pub cap: U256,
    pub admin: Address,
    pub minters: Vec<Address>,
    #[serde(default)]
    pub pausers: Vec<Address>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Initialized {
        name: String,
        symbol: String,
        cap: U256,
    },
    /// `from == None` is a mint, `to == None` a burn.
    Transfer {
        from: Option<Address>,
        to: Option<Address>,
        amount: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: U256,
    },
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
    Upgraded {
        implementation: Address,
    },
}

/// Persistent token state. Field order is the storage layout of the first
/// logic version and must only ever be appended to.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    initialized: bool,
    name: String,
    symbol: String,
    total_supply: U256,
    balances: BTreeMap<Address, U256>,
    allowances: BTreeMap<Address, BTreeMap<Address, U256>>,
    roles: RoleRegistry,
    cap: U256,
    paused: bool,
    #[serde(skip)]
    journal: Vec<LedgerEvent>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn cap(&self) -> U256 {
        self.cap
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&owner)
            .and_then(|by_spender| by_spender.get(&spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn balances(&self) -> &BTreeMap<Address, U256> {
        &self.balances
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.roles.has_role(role, account)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drains the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.journal)
    }

    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        self.journal.push(event);
    }

    pub fn initialize(&mut self, caller: Address, args: &InitArgs) -> Result<(), LedgerError> {
        if self.initialized {
            return Err(LedgerError::AlreadyInitialized);
        }
        if args.cap.is_zero() {
            return Err(LedgerError::InvalidCap);
        }
        if args.name.trim().is_empty() || args.symbol.trim().is_empty() {
            return Err(LedgerError::InvalidInput(
                "token name and symbol must be non-empty".into(),
            ));
        }
        if args.admin.is_zero() {
            return Err(LedgerError::InvalidAddress { context: "admin" });
        }
        if args.minters.iter().any(|account| account.is_zero()) {
            return Err(LedgerError::InvalidAddress { context: "minter" });
        }
        if args.pausers.iter().any(|account| account.is_zero()) {
            return Err(LedgerError::InvalidAddress { context: "pauser" });
        }

        self.initialized = true;
        self.name = args.name.clone();
        self.symbol = args.symbol.clone();
        self.cap = args.cap;
        self.emit(LedgerEvent::Initialized {
            name: args.name.clone(),
            symbol: args.symbol.clone(),
            cap: args.cap,
        });

        let grants = std::iter::once((Role::Admin, args.admin))
            .chain(args.minters.iter().map(|m| (Role::Minter, *m)))
            .chain(args.pausers.iter().map(|p| (Role::Pauser, *p)));
        for (role, account) in grants {
            if self.roles.seed(role, account) {
                self.emit(LedgerEvent::RoleGranted {
                    role,
                    account,
                    sender: caller,
                });
            }
        }
        Ok(())
    }

    pub fn mint(&mut self, caller: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        self.roles.ensure(Role::Minter, caller)?;
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress { context: "mint recipient" });
        }
        self.ensure_not_paused()?;
        let new_supply = match self.total_supply.checked_add(amount) {
            Some(supply) if supply <= self.cap => supply,
            _ => {
                return Err(LedgerError::CapExceeded {
                    requested: amount,
                    cap: self.cap,
                })
            }
        };
        self.total_supply = new_supply;
        self.credit(to, amount);
        self.emit(LedgerEvent::Transfer {
            from: None,
            to: Some(to),
            amount,
        });
        Ok(())
    }

    pub fn burn(&mut self, caller: Address, amount: U256) -> Result<(), LedgerError> {
        self.ensure_not_paused()?;
        self.ensure_balance(caller, amount, "burn")?;
        self.destroy(caller, amount);
        Ok(())
    }

    pub fn burn_from(
        &mut self,
        caller: Address,
        account: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.ensure_not_paused()?;
        self.ensure_allowance(account, caller, amount)?;
        self.ensure_balance(account, amount, "burn")?;
        self.consume_allowance(account, caller, amount);
        self.destroy(account, amount);
        Ok(())
    }

    pub fn transfer(&mut self, caller: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        self.move_balance(caller, to, amount)
    }

    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if spender.is_zero() {
            return Err(LedgerError::InvalidAddress { context: "spender" });
        }
        self.allowances
            .entry(caller)
            .or_default()
            .insert(spender, amount);
        self.emit(LedgerEvent::Approval {
            owner: caller,
            spender,
            amount,
        });
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress { context: "transfer recipient" });
        }
        self.ensure_not_paused()?;
        self.ensure_allowance(from, caller, amount)?;
        self.ensure_balance(from, amount, "transfer")?;
        self.consume_allowance(from, caller, amount);
        self.move_balance(from, to, amount)
    }

    /// Pausing an already paused ledger is a no-op.
    pub fn pause(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.roles.ensure(Role::Pauser, caller)?;
        if !self.paused {
            self.paused = true;
            self.emit(LedgerEvent::Paused { account: caller });
        }
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.roles.ensure(Role::Pauser, caller)?;
        if self.paused {
            self.paused = false;
            self.emit(LedgerEvent::Unpaused { account: caller });
        }
        Ok(())
    }

    pub fn grant_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<(), LedgerError> {
        if self.roles.grant(caller, role, account)? {
            self.emit(LedgerEvent::RoleGranted {
                role,
                account,
                sender: caller,
            });
        }
        Ok(())
    }

    pub fn revoke_role(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<(), LedgerError> {
        if self.roles.revoke(caller, role, account)? {
            self.emit(LedgerEvent::RoleRevoked {
                role,
                account,
                sender: caller,
            });
        }
        Ok(())
    }

    pub fn renounce_role(&mut self, caller: Address, role: Role) -> Result<(), LedgerError> {
        if self.roles.renounce(caller, role)? {
            self.emit(LedgerEvent::RoleRevoked {
                role,
                account: caller,
                sender: caller,
            });
        }
        Ok(())
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress { context: "transfer recipient" });
        }
        self.ensure_not_paused()?;
        self.ensure_balance(from, amount, "transfer")?;
        self.debit(from, amount);
        self.credit(to, amount);
        self.emit(LedgerEvent::Transfer {
            from: Some(from),
            to: Some(to),
            amount,
        });
        Ok(())
    }

    fn destroy(&mut self, account: Address, amount: U256) {
        self.debit(account, amount);
        self.total_supply -= amount;
        self.emit(LedgerEvent::Transfer {
            from: Some(account),
            to: None,
            amount,
        });
    }

    fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn ensure_balance(
        &self,
        account: Address,
        amount: U256,
        action: &'static str,
    ) -> Result<(), LedgerError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                action,
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    fn ensure_allowance(
        &self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let available = self.allowance(owner, spender);
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    // An unlimited (max) allowance is never decremented.
    fn consume_allowance(&mut self, owner: Address, spender: Address, amount: U256) {
        if let Some(current) = self
            .allowances
            .get_mut(&owner)
            .and_then(|by_spender| by_spender.get_mut(&spender))
        {
            if *current != U256::MAX {
                *current -= amount;
            }
        }
    }

    fn credit(&mut self, account: Address, amount: U256) {
        *self.balances.entry(account).or_default() += amount;
    }

    fn debit(&mut self, account: Address, amount: U256) {
        if let Some(balance) = self.balances.get_mut(&account) {
            *balance -= amount;
            if balance.is_zero() {
                self.balances.remove(&account);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::utils::parse_ether;
    use proptest::prelude::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const MINTER1: Address = Address::repeat_byte(0x02);
    const MINTER2: Address = Address::repeat_byte(0x03);
    const HOLDER: Address = Address::repeat_byte(0x04);
    const PAUSER: Address = Address::repeat_byte(0x05);

    fn tokens(amount: &str) -> U256 {
        parse_ether(amount).unwrap()
    }

    fn init_args() -> InitArgs {
        InitArgs {
            name: "Custom Token".into(),
            symbol: "CTK".into(),
            cap: tokens("1000000"),
            admin: OWNER,
            minters: vec![MINTER1, MINTER2],
            pausers: vec![PAUSER],
        }
    }

    fn ledger() -> LedgerState {
        let mut ledger = LedgerState::new();
        ledger.initialize(OWNER, &init_args()).unwrap();
        ledger.take_events();
        ledger
    }

    fn balances_sum(ledger: &LedgerState) -> U256 {
        ledger
            .balances()
            .values()
            .fold(U256::ZERO, |acc, balance| acc + *balance)
    }

    #[test]
    fn initialize_sets_metadata_and_roles() {
        let ledger = ledger();
        assert_eq!(ledger.name(), "Custom Token");
        assert_eq!(ledger.symbol(), "CTK");
        assert_eq!(ledger.cap(), tokens("1000000"));
        assert_eq!(ledger.decimals(), 18);
        assert!(ledger.has_role(Role::Admin, OWNER));
        assert!(ledger.has_role(Role::Minter, MINTER1));
        assert!(ledger.has_role(Role::Minter, MINTER2));
        assert!(ledger.has_role(Role::Pauser, PAUSER));
        assert!(!ledger.has_role(Role::Minter, HOLDER));
    }

    #[test]
    fn second_initialize_fails_regardless_of_arguments() {
        let mut ledger = ledger();
        let mut other = init_args();
        other.name = "Other".into();
        other.cap = U256::from(1u8);
        assert_eq!(
            ledger.initialize(HOLDER, &other),
            Err(LedgerError::AlreadyInitialized)
        );
        assert_eq!(ledger.name(), "Custom Token");
    }

    #[test]
    fn initialize_rejects_zero_cap_and_zero_addresses() {
        let mut args = init_args();
        args.cap = U256::ZERO;
        assert_eq!(
            LedgerState::new().initialize(OWNER, &args),
            Err(LedgerError::InvalidCap)
        );

        let mut args = init_args();
        args.minters.push(Address::ZERO);
        let mut fresh = LedgerState::new();
        assert_eq!(
            fresh.initialize(OWNER, &args),
            Err(LedgerError::InvalidAddress { context: "minter" })
        );
        assert!(!fresh.is_initialized());
    }

    #[test]
    fn minter_can_mint() {
        let mut ledger = ledger();
        ledger.mint(MINTER1, HOLDER, tokens("500")).unwrap();
        assert_eq!(ledger.balance_of(HOLDER), tokens("500"));
        assert_eq!(ledger.total_supply(), tokens("500"));
        assert_eq!(
            ledger.take_events(),
            vec![LedgerEvent::Transfer {
                from: None,
                to: Some(HOLDER),
                amount: tokens("500"),
            }]
        );
    }

    #[test]
    fn non_minter_cannot_mint() {
        let mut ledger = ledger();
        let err = ledger.mint(HOLDER, HOLDER, tokens("500")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(ledger.total_supply(), U256::ZERO);
        assert_eq!(ledger.balance_of(HOLDER), U256::ZERO);
    }

    #[test]
    fn minting_beyond_cap_fails_without_side_effects() {
        let mut ledger = ledger();
        let cap = ledger.cap();
        ledger.mint(MINTER1, HOLDER, cap).unwrap();
        let err = ledger.mint(MINTER1, HOLDER, tokens("1")).unwrap_err();
        assert_eq!(err.to_string(), "ERC20: cap exceeded");
        assert_eq!(err.kind(), ErrorKind::CapExceeded);
        assert_eq!(ledger.total_supply(), cap);
        assert_eq!(ledger.balance_of(HOLDER), cap);
    }

    #[test]
    fn holder_can_burn_own_tokens() {
        let mut ledger = ledger();
        ledger.mint(MINTER1, HOLDER, tokens("500")).unwrap();
        ledger.burn(HOLDER, tokens("300")).unwrap();
        assert_eq!(ledger.balance_of(HOLDER), tokens("200"));
        assert_eq!(ledger.total_supply(), tokens("200"));

        let err = ledger.burn(HOLDER, tokens("201")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(ledger.total_supply(), tokens("200"));
    }

    #[test]
    fn non_admin_cannot_grant_roles() {
        let mut ledger = ledger();
        let err = ledger.grant_role(HOLDER, Role::Minter, HOLDER).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!ledger.has_role(Role::Minter, HOLDER));
    }

    #[test]
    fn revoked_minter_can_no_longer_mint() {
        let mut ledger = ledger();
        ledger.revoke_role(OWNER, Role::Minter, MINTER1).unwrap();
        assert!(!ledger.has_role(Role::Minter, MINTER1));
        assert_eq!(
            ledger.mint(MINTER1, HOLDER, tokens("1")).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn role_changes_only_emit_on_membership_change() {
        let mut ledger = ledger();
        ledger.grant_role(OWNER, Role::Minter, MINTER1).unwrap();
        ledger.revoke_role(OWNER, Role::Pauser, HOLDER).unwrap();
        assert!(ledger.take_events().is_empty());

        ledger.grant_role(OWNER, Role::Pauser, HOLDER).unwrap();
        assert_eq!(
            ledger.take_events(),
            vec![LedgerEvent::RoleGranted {
                role: Role::Pauser,
                account: HOLDER,
                sender: OWNER,
            }]
        );
    }

    #[test]
    fn pause_gates_balance_moves_but_not_role_admin() {
        let mut ledger = ledger();
        ledger.mint(MINTER1, HOLDER, tokens("10")).unwrap();
        ledger.pause(PAUSER).unwrap();
        ledger.pause(PAUSER).unwrap();
        assert!(ledger.is_paused());

        assert_eq!(ledger.mint(MINTER1, HOLDER, tokens("1")), Err(LedgerError::Paused));
        assert_eq!(ledger.burn(HOLDER, tokens("1")), Err(LedgerError::Paused));
        assert_eq!(
            ledger.transfer(HOLDER, MINTER2, tokens("1")),
            Err(LedgerError::Paused)
        );
        ledger.grant_role(OWNER, Role::Minter, HOLDER).unwrap();

        ledger.approve(HOLDER, MINTER2, tokens("5")).unwrap();
        assert_eq!(
            ledger.transfer_from(MINTER2, HOLDER, OWNER, tokens("1")),
            Err(LedgerError::Paused)
        );
        assert_eq!(
            ledger.burn_from(MINTER2, HOLDER, tokens("1")),
            Err(LedgerError::Paused)
        );
        assert_eq!(ledger.allowance(HOLDER, MINTER2), tokens("5"));
        assert_eq!(ledger.balance_of(HOLDER), tokens("10"));

        ledger.unpause(PAUSER).unwrap();
        ledger.transfer(HOLDER, MINTER2, tokens("1")).unwrap();
        assert_eq!(ledger.balance_of(MINTER2), tokens("1"));
    }

    #[test]
    fn only_pausers_toggle_pause() {
        let mut ledger = ledger();
        assert_eq!(ledger.pause(OWNER).unwrap_err().kind(), ErrorKind::Unauthorized);
        assert!(!ledger.is_paused());
    }

    #[test]
    fn unpause_when_not_paused_is_silent() {
        let mut ledger = ledger();
        ledger.unpause(PAUSER).unwrap();
        assert!(!ledger.is_paused());
        assert!(ledger.take_events().is_empty());

        ledger.pause(PAUSER).unwrap();
        ledger.unpause(PAUSER).unwrap();
        ledger.unpause(PAUSER).unwrap();
        assert_eq!(
            ledger.take_events(),
            vec![
                LedgerEvent::Paused { account: PAUSER },
                LedgerEvent::Unpaused { account: PAUSER },
            ]
        );
    }

    #[test]
    fn minting_to_zero_address_is_rejected() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.mint(MINTER1, Address::ZERO, tokens("1")),
            Err(LedgerError::InvalidAddress { context: "mint recipient" })
        );
        assert_eq!(ledger.total_supply(), U256::ZERO);
        assert!(ledger.take_events().is_empty());
    }

    #[test]
    fn allowance_flow() {
        let mut ledger = ledger();
        ledger.mint(MINTER1, HOLDER, tokens("100")).unwrap();
        ledger.approve(HOLDER, MINTER2, tokens("40")).unwrap();

        ledger
            .transfer_from(MINTER2, HOLDER, OWNER, tokens("30"))
            .unwrap();
        assert_eq!(ledger.allowance(HOLDER, MINTER2), tokens("10"));
        assert_eq!(ledger.balance_of(OWNER), tokens("30"));

        let err = ledger.burn_from(MINTER2, HOLDER, tokens("11")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
        ledger.burn_from(MINTER2, HOLDER, tokens("10")).unwrap();
        assert_eq!(ledger.total_supply(), tokens("90"));
        assert_eq!(ledger.allowance(HOLDER, MINTER2), U256::ZERO);
    }

    #[test]
    fn transfer_to_zero_address_is_rejected() {
        let mut ledger = ledger();
        ledger.mint(MINTER1, HOLDER, tokens("1")).unwrap();
        assert_eq!(
            ledger.transfer(HOLDER, Address::ZERO, tokens("1")).unwrap_err().kind(),
            ErrorKind::InvalidAddress
        );
    }

    #[derive(Clone, Debug)]
    enum Op {
        Mint(u8, u64),
        Burn(u8, u64),
        Transfer(u8, u8, u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, 0u64..600).prop_map(|(to, amount)| Op::Mint(to, amount)),
            (0u8..4, 0u64..300).prop_map(|(who, amount)| Op::Burn(who, amount)),
            (0u8..4, 0u8..4, 0u64..300).prop_map(|(from, to, amount)| Op::Transfer(from, to, amount)),
        ]
    }

    fn account(idx: u8) -> Address {
        Address::with_last_byte(0x10 + idx)
    }

    proptest! {
        #[test]
        fn supply_never_exceeds_cap_and_is_conserved(ops in prop::collection::vec(op(), 1..64)) {
            let mut ledger = LedgerState::new();
            let mut args = init_args();
            args.cap = U256::from(1_000u64);
            ledger.initialize(OWNER, &args).unwrap();

            for op in ops {
                let before = ledger.clone();
                let result = match op {
                    Op::Mint(to, amount) => ledger.mint(MINTER1, account(to), U256::from(amount)),
                    Op::Burn(who, amount) => ledger.burn(account(who), U256::from(amount)),
                    Op::Transfer(from, to, amount) => {
                        ledger.transfer(account(from), account(to), U256::from(amount))
                    }
                };
                if result.is_err() {
                    prop_assert_eq!(ledger.total_supply(), before.total_supply());
                    prop_assert_eq!(ledger.balances(), before.balances());
                }
                prop_assert!(ledger.total_supply() <= ledger.cap());
                prop_assert_eq!(balances_sum(&ledger), ledger.total_supply());
            }
        }
    }
}
