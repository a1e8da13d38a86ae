//! Fixed-point arithmetic used by Morpho Blue and MetaMorpho.
//!
//! All quantities are unsigned 256-bit integers. Rates and ratios are scaled by
//! [`WAD`] (1e18). Every division takes an explicit [`RoundingDirection`]; the
//! protocol rounds against the user, so callers pick `Down` when crediting a
//! user and `Up` when debiting one.
//!
//! Intermediate products are computed on 512 bits, so `x * y` never overflows
//! before the division.

use alloy_primitives::{U256, U512};
use serde::{Deserialize, Serialize};

/// 1e18, the fixed-point unit.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Seconds in a 365-day year.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Virtual shares added to share totals in share/asset conversions.
pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Virtual assets added to asset totals in share/asset conversions.
pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Direction in which a division result is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingDirection {
    /// Toward zero (floor).
    Down,
    /// Away from zero (ceil).
    Up,
}

fn widen(x: U256) -> U512 {
    let l = x.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(x: U512) -> Option<U256> {
    let l = x.as_limbs();
    if l[4..].iter().any(|limb| *limb != 0) {
        return None;
    }
    Some(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

/// Computes `x * y / d` rounded in the given direction.
///
/// Returns `None` when `d` is zero or the quotient does not fit in 256 bits.
pub fn checked_mul_div(x: U256, y: U256, d: U256, rounding: RoundingDirection) -> Option<U256> {
    if d.is_zero() {
        return None;
    }

    let product = widen(x) * widen(y);
    let divisor = widen(d);
    let quotient = product / divisor;

    let quotient = match rounding {
        RoundingDirection::Down => quotient,
        RoundingDirection::Up if (product % divisor).is_zero() => quotient,
        RoundingDirection::Up => quotient + U512::from_limbs([1, 0, 0, 0, 0, 0, 0, 0]),
    };

    narrow(quotient)
}

/// Computes `x * y / d` rounded in the given direction.
///
/// Saturates at `U256::MAX` when `d` is zero or the quotient overflows. Every
/// conversion in this crate divides by a total that carries a virtual offset,
/// so the saturating branch is only reachable with degenerate inputs.
pub fn mul_div(x: U256, y: U256, d: U256, rounding: RoundingDirection) -> U256 {
    checked_mul_div(x, y, d, rounding).unwrap_or(U256::MAX)
}

/// `x * y / d` rounded down.
pub fn mul_div_down(x: U256, y: U256, d: U256) -> U256 {
    mul_div(x, y, d, RoundingDirection::Down)
}

/// `x * y / d` rounded up.
pub fn mul_div_up(x: U256, y: U256, d: U256) -> U256 {
    mul_div(x, y, d, RoundingDirection::Up)
}

/// `x * y / WAD` rounded down.
pub fn w_mul_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, y, WAD)
}

/// `x * y / WAD` rounded up.
pub fn w_mul_up(x: U256, y: U256) -> U256 {
    mul_div_up(x, y, WAD)
}

/// `x * WAD / y` rounded down.
pub fn w_div_down(x: U256, y: U256) -> U256 {
    mul_div_down(x, WAD, y)
}

/// `x * WAD / y` rounded up.
pub fn w_div_up(x: U256, y: U256) -> U256 {
    mul_div_up(x, WAD, y)
}

/// Third-order Taylor expansion of `e^(x * n) - 1`, used to compound a
/// per-second rate `x` over `n` seconds.
pub fn w_taylor_compounded(x: U256, n: U256) -> U256 {
    let first_term = x.saturating_mul(n);
    let second_term = mul_div_down(first_term, first_term, WAD * U256::from(2));
    let third_term = mul_div_down(second_term, first_term, WAD * U256::from(3));

    first_term
        .saturating_add(second_term)
        .saturating_add(third_term)
}

/// `x - y`, or zero when `y > x`.
pub fn zero_floor_sub(x: U256, y: U256) -> U256 {
    x.saturating_sub(y)
}

/// Converts assets to shares with the virtual offset applied to both totals.
pub fn assets_to_shares(
    assets: U256,
    total_assets: U256,
    total_shares: U256,
    rounding: RoundingDirection,
) -> U256 {
    mul_div(
        assets,
        total_shares.saturating_add(VIRTUAL_SHARES),
        total_assets.saturating_add(VIRTUAL_ASSETS),
        rounding,
    )
}

/// Converts shares to assets with the virtual offset applied to both totals.
pub fn shares_to_assets(
    shares: U256,
    total_assets: U256,
    total_shares: U256,
    rounding: RoundingDirection,
) -> U256 {
    mul_div(
        shares,
        total_assets.saturating_add(VIRTUAL_ASSETS),
        total_shares.saturating_add(VIRTUAL_SHARES),
        rounding,
    )
}

/// Lossy conversion of a WAD-scaled value to `f64` (1e18 -> 1.0).
pub fn rate_to_f64(value: U256) -> f64 {
    let whole: f64 = (value / WAD).saturating_to::<u128>() as f64;
    let fraction: f64 = (value % WAD).saturating_to::<u128>() as f64 / 1e18;
    whole + fraction
}

/// Continuously compounded APY of a WAD-scaled per-second rate.
pub fn rate_to_apy(rate_per_second: U256) -> f64 {
    (rate_to_f64(rate_per_second) * SECONDS_PER_YEAR as f64).exp_m1()
}
