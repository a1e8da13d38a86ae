//! Market state and operations for Morpho Blue markets.
//!
//! A Morpho Blue market is an isolated lending pool identified by its
//! [`MarketParams`]:
//! - **Supply side**: lenders deposit the loan token and earn interest
//! - **Borrow side**: borrowers post collateral and take loans
//! - **Share-based accounting**: positions are tracked via shares, not raw assets
//! - **Adaptive interest rates**: rates adjust based on utilization
//!
//! Every mutation returns a new [`Market`]; the receiver is left untouched.
//! Interest is accrued separately through [`Market::accrue_interest`], which
//! also reports the fee shares the caller must credit to the fee recipient.
//!
//! # Example
//!
//! ```rust
//! use morpho_rs_sim::{Amount, Market, MarketParams, WAD};
//! use alloy_primitives::{Address, U256};
//!
//! let params = MarketParams::new(
//!     Address::repeat_byte(1),
//!     Address::repeat_byte(2),
//!     Address::repeat_byte(3),
//!     Address::repeat_byte(4),
//!     U256::from(860_000_000_000_000_000u64),
//! );
//! let market = Market::new(params, 1000, U256::ZERO, None).with_totals(
//!     U256::from(1_000_000) * WAD,
//!     U256::from(1_000_000) * WAD,
//!     U256::from(800_000) * WAD,
//!     U256::from(800_000) * WAD,
//! );
//!
//! let supplied = market.supply(Amount::Assets(U256::from(100_000) * WAD)).unwrap();
//! assert_eq!(supplied.market.liquidity(), U256::from(300_000) * WAD);
//! ```

use alloy_primitives::{keccak256, Address, U256};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{MarketId, SimError, SimulationError};
use crate::irm::borrow_rate;
use crate::math::{
    assets_to_shares, mul_div_down, mul_div_up, rate_to_apy, shares_to_assets, w_div_down,
    w_div_up, w_mul_down, w_mul_up, w_taylor_compounded, zero_floor_sub, RoundingDirection, WAD,
};
use crate::operation::Amount;

/// Oracle price scale (1e36)
pub const ORACLE_PRICE_SCALE: U256 =
    U256::from_limbs([0xB34B_9F10_0000_0000, 0x00C0_97CE_7BC9_0715, 0, 0]);

/// Maximum market fee (25%)
pub const MAX_FEE: U256 = U256::from_limbs([250_000_000_000_000_000, 0, 0, 0]);

/// Immutable parameters of a market. Their hash is the market id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketParams {
    pub loan_token: Address,
    pub collateral_token: Address,
    pub oracle: Address,
    pub irm: Address,
    /// Liquidation LTV (WAD-scaled)
    pub lltv: U256,
}

impl MarketParams {
    pub fn new(
        loan_token: Address,
        collateral_token: Address,
        oracle: Address,
        irm: Address,
        lltv: U256,
    ) -> Self {
        Self {
            loan_token,
            collateral_token,
            oracle,
            irm,
            lltv,
        }
    }

    /// keccak256 of the ABI encoding of the five parameters.
    pub fn id(&self) -> MarketId {
        let mut encoded = [0u8; 160];
        encoded[0..32].copy_from_slice(self.loan_token.into_word().as_slice());
        encoded[32..64].copy_from_slice(self.collateral_token.into_word().as_slice());
        encoded[64..96].copy_from_slice(self.oracle.into_word().as_slice());
        encoded[96..128].copy_from_slice(self.irm.into_word().as_slice());
        encoded[128..160].copy_from_slice(&self.lltv.to_be_bytes::<32>());
        keccak256(encoded)
    }
}

/// Represents a lending market on Morpho Blue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub params: MarketParams,

    /// The amount of loan assets supplied in total on the market
    pub total_supply_assets: U256,

    /// The total supply shares representing lender positions
    pub total_supply_shares: U256,

    /// The amount of loan assets borrowed in total from the market
    pub total_borrow_assets: U256,

    /// The total borrow shares representing borrower debt
    pub total_borrow_shares: U256,

    /// The block timestamp (in seconds) when interest was last accrued
    pub last_update: u64,

    /// The protocol fee percentage (WAD-scaled, e.g., 0.1 WAD = 10%)
    pub fee: U256,

    /// If the market uses the Adaptive Curve IRM, the rate at target utilization.
    /// None for markets without an interest rate model (0% APY).
    #[serde(default)]
    pub rate_at_target: Option<U256>,

    /// Oracle price (collateral/loan, scaled by ORACLE_PRICE_SCALE)
    /// None if oracle is not set or reverts
    #[serde(default)]
    pub price: Option<U256>,
}

/// A market after a supply, withdraw, borrow or repay, with the amounts moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketUpdate {
    pub market: Market,
    pub assets: U256,
    pub shares: U256,
}

/// A market after interest accrual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualResult {
    pub market: Market,
    /// Interest added to both supply and borrow totals
    pub interest: U256,
    /// Supply shares minted to the protocol fee recipient
    pub fee_shares: U256,
}

impl Market {
    /// Creates an empty market.
    pub fn new(
        params: MarketParams,
        last_update: u64,
        fee: U256,
        rate_at_target: Option<U256>,
    ) -> Self {
        Self {
            params,
            total_supply_assets: U256::ZERO,
            total_supply_shares: U256::ZERO,
            total_borrow_assets: U256::ZERO,
            total_borrow_shares: U256::ZERO,
            last_update,
            fee,
            rate_at_target,
            price: None,
        }
    }

    pub fn with_totals(
        mut self,
        total_supply_assets: U256,
        total_supply_shares: U256,
        total_borrow_assets: U256,
        total_borrow_shares: U256,
    ) -> Self {
        self.total_supply_assets = total_supply_assets;
        self.total_supply_shares = total_supply_shares;
        self.total_borrow_assets = total_borrow_assets;
        self.total_borrow_shares = total_borrow_shares;
        self
    }

    pub fn with_price(mut self, price: U256) -> Self {
        self.price = Some(price);
        self
    }

    pub fn id(&self) -> MarketId {
        self.params.id()
    }

    /// Returns the market's current liquidity (supply - borrow)
    pub fn liquidity(&self) -> U256 {
        zero_floor_sub(self.total_supply_assets, self.total_borrow_assets)
    }

    /// Returns the market's utilization rate (WAD-scaled)
    ///
    /// Utilization = totalBorrowAssets / totalSupplyAssets
    pub fn utilization(&self) -> U256 {
        get_utilization(self.total_supply_assets, self.total_borrow_assets)
    }

    fn check_timestamp(&self, timestamp: u64) -> Result<u64, SimError> {
        if timestamp < self.last_update {
            return Err(SimulationError::InvalidInterestAccrual {
                market_id: self.id(),
                timestamp,
                last_update: self.last_update,
            }
            .into());
        }
        Ok(timestamp - self.last_update)
    }

    fn fee_exceeded(&self) -> SimError {
        SimulationError::MaxFeeExceeded {
            market_id: self.id(),
            fee: self.fee,
        }
        .into()
    }

    fn accrual_rates(&self, elapsed: u64) -> AccrualRates {
        match self.rate_at_target {
            None => AccrualRates {
                avg_borrow_rate: U256::ZERO,
                end_borrow_rate: U256::ZERO,
                end_rate_at_target: None,
            },
            Some(rate_at_target) => {
                let result = borrow_rate(self.utilization(), rate_at_target, elapsed);
                AccrualRates {
                    avg_borrow_rate: result.avg_borrow_rate,
                    end_borrow_rate: result.end_borrow_rate,
                    end_rate_at_target: Some(result.end_rate_at_target),
                }
            }
        }
    }

    /// Returns the instantaneous borrow rate at the given timestamp
    pub fn borrow_rate(&self, timestamp: u64) -> Result<U256, SimError> {
        let elapsed = self.check_timestamp(timestamp)?;
        Ok(self.accrual_rates(elapsed).end_borrow_rate)
    }

    /// Returns the average borrow rate over the period from last_update to timestamp
    pub fn avg_borrow_rate(&self, timestamp: u64) -> Result<U256, SimError> {
        let elapsed = self.check_timestamp(timestamp)?;
        Ok(self.accrual_rates(elapsed).avg_borrow_rate)
    }

    /// Supply rate = borrow_rate * utilization * (1 - fee)
    pub fn supply_rate(&self, timestamp: u64) -> Result<U256, SimError> {
        let borrow_rate = self.borrow_rate(timestamp)?;
        let kept = WAD.checked_sub(self.fee).ok_or_else(|| self.fee_exceeded())?;
        Ok(w_mul_up(w_mul_down(borrow_rate, self.utilization()), kept))
    }

    pub fn borrow_apy(&self, timestamp: u64) -> Result<f64, SimError> {
        Ok(rate_to_apy(self.borrow_rate(timestamp)?))
    }

    pub fn supply_apy(&self, timestamp: u64) -> Result<f64, SimError> {
        Ok(rate_to_apy(self.supply_rate(timestamp)?))
    }

    /// Accrues interest on the market up to the given timestamp.
    ///
    /// 1. Compute the average borrow rate over the elapsed period using the IRM
    /// 2. Interest = `total_borrow * (e^(rate * time) - 1)` (third-order Taylor)
    /// 3. Add interest to both `total_supply_assets` and `total_borrow_assets`
    /// 4. Mint fee shares: `fee_amount * shares / (total_assets - fee_amount)`
    /// 5. Move `rate_at_target` along the adaptive curve
    ///
    /// Accruing to `last_update` returns the market unchanged, so accrual is
    /// idempotent per timestamp.
    ///
    /// # Errors
    ///
    /// - [`SimulationError::InvalidInterestAccrual`] if `timestamp < last_update`
    /// - [`SimulationError::MaxFeeExceeded`] if the fee takes more than the interest
    pub fn accrue_interest(&self, timestamp: u64) -> Result<AccrualResult, SimError> {
        let elapsed = self.check_timestamp(timestamp)?;
        if elapsed == 0 {
            return Ok(AccrualResult {
                market: self.clone(),
                interest: U256::ZERO,
                fee_shares: U256::ZERO,
            });
        }

        let rates = self.accrual_rates(elapsed);

        let interest = w_mul_down(
            self.total_borrow_assets,
            w_taylor_compounded(rates.avg_borrow_rate, U256::from(elapsed)),
        );

        let mut market = self.clone();
        market.total_supply_assets = market.total_supply_assets.saturating_add(interest);
        market.total_borrow_assets = market.total_borrow_assets.saturating_add(interest);

        let fee_amount = w_mul_down(interest, self.fee);
        let supply_before_fee = market
            .total_supply_assets
            .checked_sub(fee_amount)
            .ok_or_else(|| self.fee_exceeded())?;
        let fee_shares = assets_to_shares(
            fee_amount,
            supply_before_fee,
            market.total_supply_shares,
            RoundingDirection::Down,
        );
        market.total_supply_shares += fee_shares;
        market.last_update = timestamp;
        market.rate_at_target = rates.end_rate_at_target.or(self.rate_at_target);

        trace!(
            market_id = %self.id(),
            elapsed,
            %interest,
            %fee_shares,
            "accrued market interest"
        );

        Ok(AccrualResult {
            market,
            interest,
            fee_shares,
        })
    }

    /// Supplies loan assets. Shares round down when `assets` are given, assets
    /// round up when `shares` are given.
    pub fn supply(&self, amount: Amount) -> Result<MarketUpdate, SimError> {
        let (assets, shares) = resolve(
            amount,
            |assets| self.to_supply_shares(assets, RoundingDirection::Down),
            |shares| self.to_supply_assets(shares, RoundingDirection::Up),
        )?;

        let mut market = self.clone();
        market.total_supply_assets += assets;
        market.total_supply_shares += shares;

        Ok(MarketUpdate {
            market,
            assets,
            shares,
        })
    }

    /// Withdraws loan assets; fails when the remaining supply no longer covers
    /// the borrows.
    pub fn withdraw(&self, amount: Amount) -> Result<MarketUpdate, SimError> {
        let (assets, shares) = resolve(
            amount,
            |assets| self.to_supply_shares(assets, RoundingDirection::Up),
            |shares| self.to_supply_assets(shares, RoundingDirection::Down),
        )?;

        let mut market = self.clone();
        market.total_supply_shares = market
            .total_supply_shares
            .checked_sub(shares)
            .ok_or_else(|| self.insufficient_liquidity())?;
        market.total_supply_assets = market
            .total_supply_assets
            .checked_sub(assets)
            .ok_or_else(|| self.insufficient_liquidity())?;

        if market.total_borrow_assets > market.total_supply_assets {
            return Err(self.insufficient_liquidity());
        }

        Ok(MarketUpdate {
            market,
            assets,
            shares,
        })
    }

    /// Borrows loan assets. Only market totals are checked here; position
    /// solvency is checked by the sequencer.
    pub fn borrow(&self, amount: Amount) -> Result<MarketUpdate, SimError> {
        let (assets, shares) = resolve(
            amount,
            |assets| self.to_borrow_shares(assets, RoundingDirection::Up),
            |shares| self.to_borrow_assets(shares, RoundingDirection::Down),
        )?;

        let mut market = self.clone();
        market.total_borrow_assets += assets;
        market.total_borrow_shares += shares;

        if market.total_borrow_assets > market.total_supply_assets {
            return Err(self.insufficient_liquidity());
        }

        Ok(MarketUpdate {
            market,
            assets,
            shares,
        })
    }

    /// Repays debt. Total borrow assets are floored at zero since rounding can
    /// leave them slightly below the sum of individual debts.
    pub fn repay(&self, amount: Amount) -> Result<MarketUpdate, SimError> {
        let (assets, shares) = resolve(
            amount,
            |assets| self.to_borrow_shares(assets, RoundingDirection::Down),
            |shares| self.to_borrow_assets(shares, RoundingDirection::Up),
        )?;

        let mut market = self.clone();
        market.total_borrow_shares = market.total_borrow_shares.saturating_sub(shares);
        market.total_borrow_assets = zero_floor_sub(market.total_borrow_assets, assets);

        Ok(MarketUpdate {
            market,
            assets,
            shares,
        })
    }

    fn insufficient_liquidity(&self) -> SimError {
        SimulationError::InsufficientLiquidity {
            market_id: self.id(),
        }
        .into()
    }

    /// Convert supply shares to assets
    pub fn to_supply_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        shares_to_assets(
            shares,
            self.total_supply_assets,
            self.total_supply_shares,
            rounding,
        )
    }

    /// Convert assets to supply shares
    pub fn to_supply_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        assets_to_shares(
            assets,
            self.total_supply_assets,
            self.total_supply_shares,
            rounding,
        )
    }

    /// Convert borrow shares to assets
    pub fn to_borrow_assets(&self, shares: U256, rounding: RoundingDirection) -> U256 {
        shares_to_assets(
            shares,
            self.total_borrow_assets,
            self.total_borrow_shares,
            rounding,
        )
    }

    /// Convert assets to borrow shares
    pub fn to_borrow_shares(&self, assets: U256, rounding: RoundingDirection) -> U256 {
        assets_to_shares(
            assets,
            self.total_borrow_assets,
            self.total_borrow_shares,
            rounding,
        )
    }

    // ==================== Utilization Targeting ====================

    /// Returns the smallest volume to supply until the market reaches the target utilization
    pub fn supply_to_utilization(&self, target_utilization: U256) -> U256 {
        get_supply_to_utilization(
            self.total_supply_assets,
            self.total_borrow_assets,
            target_utilization,
        )
    }

    /// Returns the amount to withdraw until the market reaches the target utilization
    pub fn withdraw_to_utilization(&self, target_utilization: U256) -> U256 {
        get_withdraw_to_utilization(
            self.total_supply_assets,
            self.total_borrow_assets,
            target_utilization,
        )
    }

    /// Returns the amount to borrow until the market reaches the target utilization
    pub fn borrow_to_utilization(&self, target_utilization: U256) -> U256 {
        get_borrow_to_utilization(
            self.total_supply_assets,
            self.total_borrow_assets,
            target_utilization,
        )
    }

    /// Returns the smallest volume to repay until the market reaches the target utilization
    pub fn repay_to_utilization(&self, target_utilization: U256) -> U256 {
        get_repay_to_utilization(
            self.total_supply_assets,
            self.total_borrow_assets,
            target_utilization,
        )
    }

    // ==================== Collateral Calculations ====================

    /// Returns the value of collateral in loan assets
    pub fn collateral_value(&self, collateral: U256) -> Option<U256> {
        self.price
            .map(|price| mul_div_down(collateral, price, ORACLE_PRICE_SCALE))
    }

    /// Returns the maximum debt allowed given a certain amount of collateral
    pub fn max_borrow_assets(&self, collateral: U256) -> Option<U256> {
        self.collateral_value(collateral)
            .map(|value| w_mul_down(value, self.params.lltv))
    }

    /// Check if a position is healthy; `None` when the price is unknown.
    pub fn is_healthy(&self, collateral: U256, borrow_shares: U256) -> Option<bool> {
        if borrow_shares.is_zero() {
            return Some(true);
        }
        let max_borrow = self.max_borrow_assets(collateral)?;
        let current_borrow = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        Some(max_borrow >= current_borrow)
    }

    /// Returns the health factor of a position (WAD-scaled)
    pub fn health_factor(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        if borrow_assets.is_zero() {
            return Some(U256::MAX);
        }

        let max_borrow = self.max_borrow_assets(collateral)?;
        Some(w_div_down(max_borrow, borrow_assets))
    }

    /// Returns the LTV of a position (WAD-scaled)
    pub fn ltv(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        if borrow_shares.is_zero() {
            return Some(U256::ZERO);
        }

        let collateral_value = self.collateral_value(collateral)?;
        if collateral_value.is_zero() {
            return Some(U256::MAX);
        }

        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        Some(w_div_up(borrow_assets, collateral_value))
    }

    /// Returns the liquidation price of a position
    pub fn liquidation_price(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        if borrow_shares.is_zero() || self.total_borrow_shares.is_zero() {
            return None;
        }

        let collateral_power = w_mul_down(collateral, self.params.lltv);
        if collateral_power.is_zero() {
            return Some(U256::MAX);
        }

        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        Some(mul_div_up(borrow_assets, ORACLE_PRICE_SCALE, collateral_power))
    }

    /// Returns the amount of collateral that can be withdrawn while staying healthy
    pub fn withdrawable_collateral(&self, collateral: U256, borrow_shares: U256) -> Option<U256> {
        let price = self.price?;
        if price.is_zero() {
            return Some(U256::ZERO);
        }
        if self.params.lltv.is_zero() {
            return Some(if borrow_shares.is_zero() {
                collateral
            } else {
                U256::ZERO
            });
        }

        let borrow_assets = self.to_borrow_assets(borrow_shares, RoundingDirection::Up);
        let required_collateral = w_div_up(
            mul_div_up(borrow_assets, ORACLE_PRICE_SCALE, price),
            self.params.lltv,
        );

        Some(zero_floor_sub(collateral, required_collateral))
    }
}

/// Splits a dual-mode amount into `(assets, shares)`.
fn resolve(
    amount: Amount,
    to_shares: impl FnOnce(U256) -> U256,
    to_assets: impl FnOnce(U256) -> U256,
) -> Result<(U256, U256), SimError> {
    match amount {
        Amount::Assets(assets) if assets.is_zero() => Err(SimulationError::ZeroAmount.into()),
        Amount::Shares(shares) if shares.is_zero() => Err(SimulationError::ZeroAmount.into()),
        Amount::Assets(assets) => Ok((assets, to_shares(assets))),
        Amount::Shares(shares) => Ok((to_assets(shares), shares)),
    }
}

struct AccrualRates {
    avg_borrow_rate: U256,
    end_borrow_rate: U256,
    end_rate_at_target: Option<U256>,
}

// ==================== Utility Functions ====================

/// Calculate the utilization rate (WAD-scaled)
pub fn get_utilization(total_supply_assets: U256, total_borrow_assets: U256) -> U256 {
    if total_supply_assets.is_zero() {
        if total_borrow_assets > U256::ZERO {
            return U256::MAX;
        }
        return U256::ZERO;
    }
    w_div_down(total_borrow_assets, total_supply_assets)
}

/// Returns the smallest volume to supply until the market reaches the target utilization
pub fn get_supply_to_utilization(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    target_utilization: U256,
) -> U256 {
    if target_utilization.is_zero() {
        if get_utilization(total_supply_assets, total_borrow_assets).is_zero() {
            return U256::ZERO;
        }
        return U256::MAX;
    }

    zero_floor_sub(
        w_div_up(total_borrow_assets, target_utilization),
        total_supply_assets,
    )
}

/// Returns the amount to withdraw until the market reaches the target utilization
pub fn get_withdraw_to_utilization(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    target_utilization: U256,
) -> U256 {
    if target_utilization.is_zero() {
        if total_borrow_assets.is_zero() {
            return total_supply_assets;
        }
        return U256::ZERO;
    }

    zero_floor_sub(
        total_supply_assets,
        w_div_up(total_borrow_assets, target_utilization),
    )
}

/// Returns the amount to borrow until the market reaches the target utilization
pub fn get_borrow_to_utilization(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    target_utilization: U256,
) -> U256 {
    zero_floor_sub(
        w_mul_down(total_supply_assets, target_utilization),
        total_borrow_assets,
    )
}

/// Returns the smallest volume to repay until the market reaches the target utilization
pub fn get_repay_to_utilization(
    total_supply_assets: U256,
    total_borrow_assets: U256,
    target_utilization: U256,
) -> U256 {
    zero_floor_sub(
        total_borrow_assets,
        w_mul_down(total_supply_assets, target_utilization),
    )
}
