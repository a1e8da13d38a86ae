//! MetaMorpho vault entities.
//!
//! [MetaMorpho](https://docs.morpho.org/metamorpho/overview) vaults are ERC4626
//! aggregators over one asset that allocate deposits across Morpho Blue
//! markets:
//! - **Supply Queue**: ordered markets to deposit into (first market first)
//! - **Withdraw Queue**: ordered markets to withdraw from; also the set of
//!   markets counted in the vault's total assets
//! - **Supply Caps**: maximum amount the vault may supply to each market,
//!   raised only after the vault's timelock
//! - **Public Allocator**: permissionless reallocation bounded by per-market
//!   flow caps
//!
//! The vault's allocation in a market is its [`Position`](crate::Position)
//! there; this module only holds configuration and share accounting. The
//! transitions live in [`handlers::vault`](crate::handlers::vault).

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::MarketId;
use crate::math::{mul_div, w_mul_down, zero_floor_sub, RoundingDirection};

/// Virtual assets constant for vault share calculations (1)
pub const VAULT_VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Maximum performance fee of a vault (50%)
pub const VAULT_MAX_FEE: U256 = U256::from_limbs([500_000_000_000_000_000, 0, 0, 0]);

/// Maximum number of markets in a vault queue
pub const MAX_QUEUE_LENGTH: usize = 30;

/// A timelocked value and the timestamp from which it can be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pending<T> {
    pub value: T,
    pub valid_at: u64,
}

/// Vault-level public allocator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAllocatorConfig {
    /// Admin allowed to set flow caps and fees
    pub admin: Address,
    /// Fee to use public allocator (in native token)
    pub fee: U256,
    /// Accrued fees
    pub accrued_fee: U256,
}

/// Public allocator limits of one market of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCaps {
    /// Maximum assets that can flow into this market
    pub max_in: U256,
    /// Maximum assets that can flow out of this market
    pub max_out: U256,
}

/// Represents a MetaMorpho vault state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// The vault's address, also the address of its share token
    pub address: Address,
    /// The underlying asset
    pub asset: Address,
    /// 18 minus the asset decimals
    pub decimals_offset: u8,
    pub owner: Address,
    pub curator: Address,
    pub guardian: Address,
    /// Performance fee (WAD-scaled)
    pub fee: U256,
    pub fee_recipient: Address,
    /// Timelock in seconds applied to cap increases
    pub timelock: u64,
    #[serde(default)]
    pub pending_timelock: Option<Pending<u64>>,
    #[serde(default)]
    pub pending_guardian: Option<Pending<Address>>,
    /// Total vault shares outstanding
    pub total_supply: U256,
    /// Last recorded total assets (for fee calculation)
    pub last_total_assets: U256,
    /// Ordered supply queue (markets to deposit into)
    pub supply_queue: Vec<MarketId>,
    /// Ordered withdraw queue (markets to withdraw from)
    pub withdraw_queue: Vec<MarketId>,
    #[serde(default)]
    pub public_allocator_config: Option<PublicAllocatorConfig>,
}

impl Vault {
    /// Virtual shares for this vault (10^decimals_offset)
    pub fn virtual_shares(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals_offset))
    }

    /// Convert vault shares to assets given the vault's total assets
    pub fn to_assets(&self, shares: U256, total_assets: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            shares,
            total_assets.saturating_add(VAULT_VIRTUAL_ASSETS),
            self.total_supply.saturating_add(self.virtual_shares()),
            rounding,
        )
    }

    /// Convert assets to vault shares given the vault's total assets
    pub fn to_shares(&self, assets: U256, total_assets: U256, rounding: RoundingDirection) -> U256 {
        mul_div(
            assets,
            self.total_supply.saturating_add(self.virtual_shares()),
            total_assets.saturating_add(VAULT_VIRTUAL_ASSETS),
            rounding,
        )
    }

    /// Performance fee shares owed on the interest earned since the last
    /// update, when total assets have grown to `new_total_assets`.
    pub fn accrued_fee_shares(&self, new_total_assets: U256) -> U256 {
        let total_interest = zero_floor_sub(new_total_assets, self.last_total_assets);
        if total_interest.is_zero() || self.fee.is_zero() {
            return U256::ZERO;
        }

        let fee_assets = w_mul_down(total_interest, self.fee);
        mul_div(
            fee_assets,
            self.total_supply.saturating_add(self.virtual_shares()),
            new_total_assets
                .saturating_sub(fee_assets)
                .saturating_add(VAULT_VIRTUAL_ASSETS),
            RoundingDirection::Down,
        )
    }

    pub fn is_curator(&self, account: Address) -> bool {
        account == self.owner || account == self.curator
    }
}

/// Configuration for a market within a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMarketConfig {
    pub vault: Address,
    /// The market's unique identifier
    pub market_id: MarketId,
    /// Maximum supply cap for this market
    pub cap: U256,
    #[serde(default)]
    pub pending_cap: Option<Pending<U256>>,
    /// Whether this market is in the withdraw queue
    pub enabled: bool,
    /// Timestamp from which a forced removal is allowed, zero when none is pending
    #[serde(default)]
    pub removable_at: u64,
    /// Public allocator configuration (if any)
    #[serde(default)]
    pub public_allocator_config: Option<FlowCaps>,
}

impl VaultMarketConfig {
    pub fn new(vault: Address, market_id: MarketId, cap: U256) -> Self {
        Self {
            vault,
            market_id,
            cap,
            pending_cap: None,
            enabled: true,
            removable_at: 0,
            public_allocator_config: None,
        }
    }

    pub fn with_flow_caps(mut self, max_in: U256, max_out: U256) -> Self {
        self.public_allocator_config = Some(FlowCaps { max_in, max_out });
        self
    }
}

/// A user's relation to a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultUser {
    pub vault: Address,
    pub user: Address,
    #[serde(default)]
    pub is_allocator: bool,
    /// Approval of the vault asset from the user to the vault
    #[serde(default)]
    pub allowance: U256,
}

impl VaultUser {
    pub fn new(vault: Address, user: Address, allowance: U256) -> Self {
        Self {
            vault,
            user,
            is_allocator: false,
            allowance,
        }
    }
}
