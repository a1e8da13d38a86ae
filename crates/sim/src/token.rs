//! ERC20 holdings, allowances and permit state.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimulationError};

/// Contracts a holder may approve to move its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpenderRole {
    /// The Morpho Blue singleton
    Morpho,
    /// The Permit2 contract
    Permit2,
    /// The bundler executing multicalls
    Bundler,
}

/// Allowance granted to the bundler through Permit2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permit2Allowance {
    pub amount: U256,
    /// Unix timestamp after which the allowance is void
    pub expiration: u64,
    pub nonce: U256,
}

/// A user's balance of one token, with the approvals attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub user: Address,
    pub token: Address,
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub allowances: BTreeMap<SpenderRole, U256>,
    /// `None` when the token does not support Permit2 for this user
    #[serde(default)]
    pub permit2_allowance: Option<Permit2Allowance>,
    /// `None` when the token does not implement EIP-2612
    #[serde(default)]
    pub erc2612_nonce: Option<U256>,
    /// `false` when the token blocks transfers of this holder
    #[serde(default = "default_can_transfer")]
    pub can_transfer: bool,
}

fn default_can_transfer() -> bool {
    true
}

impl Holding {
    pub fn new(user: Address, token: Address, balance: U256) -> Self {
        Self {
            user,
            token,
            balance,
            allowances: BTreeMap::new(),
            permit2_allowance: None,
            erc2612_nonce: None,
            can_transfer: true,
        }
    }

    pub fn with_allowance(mut self, role: SpenderRole, amount: U256) -> Self {
        self.allowances.insert(role, amount);
        self
    }

    pub fn allowance(&self, role: SpenderRole) -> U256 {
        self.allowances.get(&role).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, amount: U256) -> Result<(), SimError> {
        self.check_transferable()?;
        self.balance = self.balance.saturating_add(amount);
        Ok(())
    }

    pub fn debit(&mut self, amount: U256) -> Result<(), SimError> {
        self.check_transferable()?;
        self.balance = self.balance.checked_sub(amount).ok_or(
            SimulationError::InsufficientBalance {
                user: self.user,
                token: self.token,
                balance: self.balance,
                required: amount,
            },
        )?;
        Ok(())
    }

    /// Consumes `amount` of the allowance granted to `role`. An infinite
    /// (`U256::MAX`) allowance is left as is.
    pub fn spend_allowance(
        &mut self,
        role: SpenderRole,
        spender: Address,
        amount: U256,
    ) -> Result<(), SimError> {
        let allowance = self.allowance(role);
        if allowance == U256::MAX {
            return Ok(());
        }
        let remaining = allowance
            .checked_sub(amount)
            .ok_or(SimulationError::InsufficientAllowance {
                owner: self.user,
                token: self.token,
                spender,
                allowance,
                required: amount,
            })?;
        self.allowances.insert(role, remaining);
        Ok(())
    }

    fn check_transferable(&self) -> Result<(), SimError> {
        if self.can_transfer {
            Ok(())
        } else {
            Err(SimulationError::TransferPaused {
                user: self.user,
                token: self.token,
            }
            .into())
        }
    }
}

/// A wrapper token minting `rate` wrapped units per underlying unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wrapper {
    pub underlying: Address,
    /// Wrapped per underlying (WAD-scaled)
    pub rate: U256,
}
