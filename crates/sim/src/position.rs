//! Positions of users in Morpho Blue markets.
//!
//! A position only stores shares and collateral; asset amounts and risk
//! figures are derived against the current [`Market`].

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{MarketId, SimError, SimulationError};
use crate::market::Market;
use crate::math::{w_div_down, w_div_up, zero_floor_sub, RoundingDirection};

/// Represents a user's position in a Morpho Blue market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// The user holding this position
    pub user: Address,
    /// The market ID
    pub market_id: MarketId,
    /// Amount of supply shares held
    #[serde(default)]
    pub supply_shares: U256,
    /// Amount of borrow shares held
    #[serde(default)]
    pub borrow_shares: U256,
    /// Amount of collateral assets held
    #[serde(default)]
    pub collateral: U256,
}

impl Position {
    pub fn new(
        user: Address,
        market_id: MarketId,
        supply_shares: U256,
        borrow_shares: U256,
        collateral: U256,
    ) -> Self {
        Self {
            user,
            market_id,
            supply_shares,
            borrow_shares,
            collateral,
        }
    }

    /// Create an empty position
    pub fn empty(user: Address, market_id: MarketId) -> Self {
        Self::new(user, market_id, U256::ZERO, U256::ZERO, U256::ZERO)
    }

    pub fn supply_assets(&self, market: &Market) -> U256 {
        market.to_supply_assets(self.supply_shares, RoundingDirection::Down)
    }

    pub fn borrow_assets(&self, market: &Market) -> U256 {
        market.to_borrow_assets(self.borrow_shares, RoundingDirection::Up)
    }

    /// Returns the collateral value in loan assets
    pub fn collateral_value(&self, market: &Market) -> Option<U256> {
        market.collateral_value(self.collateral)
    }

    /// Returns the maximum debt allowed for this position
    pub fn max_borrow_assets(&self, market: &Market) -> Option<U256> {
        market.max_borrow_assets(self.collateral)
    }

    /// Returns the additional borrowable amount
    pub fn max_borrowable_assets(&self, market: &Market) -> Option<U256> {
        let max_borrow = self.max_borrow_assets(market)?;
        Some(zero_floor_sub(max_borrow, self.borrow_assets(market)))
    }

    pub fn is_healthy(&self, market: &Market) -> Option<bool> {
        market.is_healthy(self.collateral, self.borrow_shares)
    }

    /// Fails with [`SimulationError::InsufficientCollateral`] when unhealthy, or
    /// [`SimulationError::UnknownOraclePrice`] when a debt cannot be priced.
    pub fn check_solvency(&self, market: &Market) -> Result<(), SimError> {
        match self.is_healthy(market) {
            Some(true) => Ok(()),
            Some(false) => Err(SimulationError::InsufficientCollateral {
                user: self.user,
                market_id: self.market_id,
            }
            .into()),
            None => Err(SimulationError::UnknownOraclePrice {
                market_id: self.market_id,
            }
            .into()),
        }
    }

    /// Returns the health factor (WAD-scaled)
    pub fn health_factor(&self, market: &Market) -> Option<U256> {
        market.health_factor(self.collateral, self.borrow_shares)
    }

    /// Returns the LTV (WAD-scaled)
    pub fn ltv(&self, market: &Market) -> Option<U256> {
        market.ltv(self.collateral, self.borrow_shares)
    }

    pub fn liquidation_price(&self, market: &Market) -> Option<U256> {
        market.liquidation_price(self.collateral, self.borrow_shares)
    }

    /// Returns the price variation to liquidation (WAD-scaled, negative = safe)
    pub fn price_variation_to_liquidation(&self, market: &Market) -> Option<i128> {
        let price = market.price?;
        if price.is_zero() {
            return None;
        }

        let liq_price = self.liquidation_price(market)?;

        if liq_price >= price {
            let variation = w_div_up(liq_price - price, price);
            Some(variation.saturating_to::<i128>())
        } else {
            let variation = w_div_down(price - liq_price, price);
            Some(-(variation.saturating_to::<i128>()))
        }
    }

    pub fn withdrawable_collateral(&self, market: &Market) -> Option<U256> {
        market.withdrawable_collateral(self.collateral, self.borrow_shares)
    }

    /// Supply assets that can be withdrawn given the market's liquidity
    pub fn withdrawable_supply(&self, market: &Market) -> U256 {
        self.supply_assets(market).min(market.liquidity())
    }

    pub fn is_empty(&self) -> bool {
        self.supply_shares.is_zero() && self.borrow_shares.is_zero() && self.collateral.is_zero()
    }
}
