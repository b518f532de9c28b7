use ethnum::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::account::{Address, Signed};
use crate::permit::{self, Domain, Permit, PermitError};

pub type Amount = U256;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenError {
    #[error("balance {available} below {needed}")]
    InsufficientBalance { needed: Amount, available: Amount },
    #[error("allowance {available} below {needed}")]
    InsufficientAllowance { needed: Amount, available: Amount },
    #[error("permit rejected: {0}")]
    Permit(#[from] PermitError),
}

/// Fungible value token collaborator. The auction escrows bids and pays
/// rewards through it and never keeps balances of its own.
pub trait ValueToken: Send {
    /// Separator every permit for this token must be bound to.
    fn domain(&self) -> [u8; 32];

    fn balance_of(&self, who: &Address) -> Amount;

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Next permit nonce expected from `owner`.
    fn nonce_of(&self, owner: &Address) -> u64;

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError>;

    fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount);

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError>;

    /// Verifies a signed permit and, on success, approves its value.
    fn permit(&mut self, permit: &Signed<Permit>, now: u64) -> Result<(), TokenError>;
}

/// Balances, allowances and permit nonces held in memory.
#[derive(Debug, Clone)]
pub struct MemoryToken {
    domain: Domain,
    separator: [u8; 32],
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    nonces: HashMap<Address, u64>,
}

impl MemoryToken {
    pub fn new(name: &str, version: &str) -> Self {
        let domain = Domain { name: name.to_owned(), version: version.to_owned() };
        let separator = domain.separator();
        Self {
            domain,
            separator,
            balances: HashMap::default(),
            allowances: HashMap::default(),
            nonces: HashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.domain.name
    }

    pub fn mint(&mut self, to: &Address, amount: Amount) {
        *self.balances.entry(*to).or_insert(U256::ZERO) += amount;
    }
}

impl ValueToken for MemoryToken {
    fn domain(&self) -> [u8; 32] {
        self.separator
    }

    fn balance_of(&self, who: &Address) -> Amount {
        self.balances.get(who).copied().unwrap_or(U256::ZERO)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(U256::ZERO)
    }

    fn nonce_of(&self, owner: &Address) -> u64 {
        self.nonces.get(owner).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance { needed: amount, available });
        }
        self.balances.insert(*from, available - amount);
        *self.balances.entry(*to).or_insert(U256::ZERO) += amount;
        Ok(())
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances.insert((*owner, *spender), amount);
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(TokenError::InsufficientAllowance { needed: amount, available: allowed });
        }
        self.transfer(from, to, amount)?;
        self.allowances.insert((*from, *spender), allowed - amount);
        Ok(())
    }

    fn permit(&mut self, signed: &Signed<Permit>, now: u64) -> Result<(), TokenError> {
        let expected = self.nonce_of(&signed.msg.owner);
        permit::verify(signed, &self.separator, expected, now)?;
        self.nonces.insert(signed.msg.owner, expected + 1);
        self.approve(&signed.msg.owner, &signed.msg.spender, signed.msg.value);
        Ok(())
    }
}
