use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};

use super::LedgerError;

/// Named permission sets. `Admin` administers every role, itself included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Minter,
    Pauser,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "DEFAULT_ADMIN_ROLE",
            Role::Minter => "MINTER_ROLE",
            Role::Pauser => "PAUSER_ROLE",
        }
    }

    /// 32-byte role identifier; the admin role is the zero id.
    pub fn id(&self) -> B256 {
        match self {
            Role::Admin => B256::ZERO,
            other => keccak256(other.name().as_bytes()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRegistry {
    members: BTreeMap<Role, BTreeSet<Address>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(&account))
            .unwrap_or(false)
    }

    pub fn member_count(&self, role: Role) -> usize {
        self.members.get(&role).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn ensure(&self, role: Role, account: Address) -> Result<(), LedgerError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { account, role })
        }
    }

    /// Unchecked insert used while initializing. Returns whether membership changed.
    pub(crate) fn seed(&mut self, role: Role, account: Address) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    pub fn grant(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.ensure(Role::Admin, caller)?;
        Ok(self.seed(role, account))
    }

    pub fn revoke(
        &mut self,
        caller: Address,
        role: Role,
        account: Address,
    ) -> Result<bool, LedgerError> {
        self.ensure(Role::Admin, caller)?;
        self.remove(role, account)
    }

    pub fn renounce(&mut self, caller: Address, role: Role) -> Result<bool, LedgerError> {
        self.remove(role, caller)
    }

    fn remove(&mut self, role: Role, account: Address) -> Result<bool, LedgerError> {
        if !self.has_role(role, account) {
            return Ok(false);
        }
        if role == Role::Admin && self.member_count(Role::Admin) == 1 {
            return Err(LedgerError::LastAdmin);
        }
        let set = self.members.entry(role).or_default();
        set.remove(&account);
        if set.is_empty() {
            self.members.remove(&role);
        }
        Ok(true)
    }
}
