//! Adaptive Curve interest rate model.
//!
//! Morpho Blue markets created with the Adaptive Curve IRM store a single piece
//! of rate state: the *rate at target*, the per-second borrow rate paid when
//! utilization sits exactly at [`TARGET_UTILIZATION`]. Two mechanisms act on it:
//!
//! - **Curve**: the instantaneous rate is `rate_at_target` scaled by a
//!   piecewise-linear function of the utilization error, steeper above target
//!   (x4 at 100% utilization) than below (x0.25 at 0%).
//! - **Adaptation**: while utilization stays off target, `rate_at_target`
//!   drifts exponentially at [`ADJUSTMENT_SPEED`] per unit of error, bounded by
//!   [`MIN_RATE_AT_TARGET`] and [`MAX_RATE_AT_TARGET`].
//!
//! Interest accrued over an interval uses the trapezoidal average of the rate
//! at the start, middle and end of the interval.
//!
//! Signed quantities (utilization error, linear adaptation) are WAD-scaled
//! `i128`; rates are `U256`.
//!
//! ```rust
//! use morpho_rs_sim::irm::{borrow_rate, INITIAL_RATE_AT_TARGET, TARGET_UTILIZATION};
//!
//! let at_target = borrow_rate(TARGET_UTILIZATION, INITIAL_RATE_AT_TARGET, 0);
//! assert_eq!(at_target.end_borrow_rate, INITIAL_RATE_AT_TARGET);
//! ```

use alloy_primitives::U256;

use crate::math::{w_mul_down, WAD};

const WAD_I128: i128 = 1_000_000_000_000_000_000;

/// Rate multiplier at 100% utilization (4.0).
pub const CURVE_STEEPNESS: U256 = U256::from_limbs([4_000_000_000_000_000_000, 0, 0, 0]);

/// Utilization the model steers toward (90%).
pub const TARGET_UTILIZATION: U256 = U256::from_limbs([900_000_000_000_000_000, 0, 0, 0]);

/// Rate at target used on a market's first interaction (4% per year).
pub const INITIAL_RATE_AT_TARGET: U256 = U256::from_limbs([1_268_391_679, 0, 0, 0]);

/// Adaptation speed of the rate at target (50 per year, per unit of error).
pub const ADJUSTMENT_SPEED: U256 = U256::from_limbs([15_854_895_991, 0, 0, 0]);

/// Lower bound of the rate at target (0.1% per year).
pub const MIN_RATE_AT_TARGET: U256 = U256::from_limbs([31_709_791, 0, 0, 0]);

/// Upper bound of the rate at target (200% per year).
pub const MAX_RATE_AT_TARGET: U256 = U256::from_limbs([63_419_583_967, 0, 0, 0]);

/// ln(2), WAD-scaled.
pub const LN_2_INT: i128 = 693_147_180_559_945_309;

/// ln(1e-18), WAD-scaled.
pub const LN_WEI_INT: i128 = -41_446_531_673_892_822_312;

/// Above this input `w_exp` is clipped to [`WEXP_UPPER_VALUE`].
pub const WEXP_UPPER_BOUND: i128 = 93_859_467_695_000_404_319;

/// `w_exp(WEXP_UPPER_BOUND)`, 57716089161558943949701069502944508345128422502756744429568.
pub const WEXP_UPPER_VALUE: U256 =
    U256::from_limbs([0, 0, 0x31D8_1650_C7D8_8B80, 0x0000_0000_0000_0009]);

/// Outcome of a rate computation over an elapsed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowRate {
    /// Average per-second borrow rate over the interval, used for accrual.
    pub avg_borrow_rate: U256,
    /// Per-second borrow rate at the end of the interval.
    pub end_borrow_rate: U256,
    /// Rate at target at the end of the interval.
    pub end_rate_at_target: U256,
}

/// WAD-scaled approximation of `e^x`.
///
/// `x` is split as `q * ln(2) + r` with `|r| <= ln(2) / 2`; `e^r` uses a
/// second-order Taylor polynomial and `2^q` a shift.
pub fn w_exp(x: i128) -> U256 {
    if x < LN_WEI_INT {
        return U256::ZERO;
    }
    if x >= WEXP_UPPER_BOUND {
        return WEXP_UPPER_VALUE;
    }

    let rounding_adjustment = if x < 0 { -(LN_2_INT / 2) } else { LN_2_INT / 2 };
    let q = (x + rounding_adjustment) / LN_2_INT;
    let r = x - q * LN_2_INT;

    let exp_r = U256::from((WAD_I128 + r + (r * r) / WAD_I128 / 2).unsigned_abs());

    if q >= 0 {
        exp_r << (q as usize)
    } else {
        exp_r >> (q.unsigned_abs() as usize)
    }
}

/// Signed, WAD-scaled distance between `utilization` and the target,
/// normalized to `[-1, 1]`.
pub fn utilization_error(utilization: U256) -> i128 {
    let utilization = utilization.min(WAD).saturating_to::<i128>();
    let target = TARGET_UTILIZATION.saturating_to::<i128>();

    let norm_factor = if utilization > target {
        WAD_I128 - target
    } else {
        target
    };

    (utilization - target) * WAD_I128 / norm_factor
}

/// Applies the curve to `rate_at_target` for the given utilization error.
pub fn curve(rate_at_target: U256, err: i128) -> U256 {
    let steepness = CURVE_STEEPNESS.saturating_to::<i128>();
    let coeff = if err < 0 {
        WAD_I128 - WAD_I128 * WAD_I128 / steepness
    } else {
        steepness - WAD_I128
    };

    let factor = coeff * err / WAD_I128 + WAD_I128;
    w_mul_down(rate_at_target, U256::from(factor.unsigned_abs()))
}

/// Rate at target after a (signed, WAD-scaled) linear adaptation, bounded by
/// the model's min and max.
pub fn new_rate_at_target(start_rate_at_target: U256, linear_adaptation: i128) -> U256 {
    let rate = w_mul_down(start_rate_at_target, w_exp(linear_adaptation));
    rate.clamp(MIN_RATE_AT_TARGET, MAX_RATE_AT_TARGET)
}

/// Computes the borrow rates of a market held at `utilization` for `elapsed`
/// seconds, starting from `start_rate_at_target`.
///
/// A zero `start_rate_at_target` marks a market that never accrued; it starts
/// at [`INITIAL_RATE_AT_TARGET`].
pub fn borrow_rate(utilization: U256, start_rate_at_target: U256, elapsed: u64) -> BorrowRate {
    let err = utilization_error(utilization);

    let (avg_rate_at_target, end_rate_at_target) = if start_rate_at_target.is_zero() {
        (INITIAL_RATE_AT_TARGET, INITIAL_RATE_AT_TARGET)
    } else {
        let speed = ADJUSTMENT_SPEED.saturating_to::<i128>() * err / WAD_I128;
        let linear_adaptation = speed.saturating_mul(i128::from(elapsed));

        if linear_adaptation == 0 {
            (start_rate_at_target, start_rate_at_target)
        } else {
            let end = new_rate_at_target(start_rate_at_target, linear_adaptation);
            let mid = new_rate_at_target(start_rate_at_target, linear_adaptation / 2);
            let avg = (start_rate_at_target + end + mid * U256::from(2)) / U256::from(4);
            (avg, end)
        }
    };

    BorrowRate {
        avg_borrow_rate: curve(avg_rate_at_target, err),
        end_borrow_rate: curve(end_rate_at_target, err),
        end_rate_at_target,
    }
}
