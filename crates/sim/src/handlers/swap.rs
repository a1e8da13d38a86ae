//! Third-party swaps settled at their quoted amounts.
//!
//! The aggregator itself is not modelled: the sender pays the source token
//! and the receiver gets the destination token, both out of thin air on the
//! other side. Token conservation therefore does not hold across a swap.

use alloy_primitives::{Address, Bytes, U256};

use crate::error::{SimError, SimulationError};
use crate::operation::{SwapAction, SwapOffsets};
use crate::state::SimulationState;

pub(crate) fn apply(
    state: &mut SimulationState,
    sender: Address,
    action: &SwapAction,
) -> Result<(), SimError> {
    match action {
        SwapAction::Sell {
            src_token,
            dst_token,
            amount_in,
            quoted_out,
            min_out,
            receiver,
            calldata,
            offsets,
        } => {
            check_offsets(calldata, offsets)?;
            if amount_in.is_zero() {
                return Err(SimulationError::ZeroAmount.into());
            }
            if quoted_out < min_out {
                return Err(SimulationError::SlippageExceeded {
                    quoted: *quoted_out,
                    limit: *min_out,
                }
                .into());
            }
            settle(state, sender, *receiver, *src_token, *amount_in, *dst_token, *quoted_out)
        }
        SwapAction::Buy {
            src_token,
            dst_token,
            amount_out,
            quoted_in,
            max_in,
            receiver,
            calldata,
            offsets,
        } => {
            check_offsets(calldata, offsets)?;
            if amount_out.is_zero() {
                return Err(SimulationError::ZeroAmount.into());
            }
            if quoted_in > max_in {
                return Err(SimulationError::SlippageExceeded {
                    quoted: *quoted_in,
                    limit: *max_in,
                }
                .into());
            }
            settle(state, sender, *receiver, *src_token, *quoted_in, *dst_token, *amount_out)
        }
    }
}

/// Every amount word must fit in the calldata. Empty calldata carries no
/// words and is not checked.
fn check_offsets(calldata: &Bytes, offsets: &SwapOffsets) -> Result<(), SimError> {
    if calldata.is_empty() {
        return Ok(());
    }
    let len = calldata.len();
    for offset in [offsets.exact_amount, offsets.limit_amount, offsets.quoted_amount] {
        if offset.checked_add(32).map_or(true, |end| end > len) {
            return Err(SimulationError::InvalidSwapOffset { offset, len }.into());
        }
    }
    Ok(())
}

fn settle(
    state: &mut SimulationState,
    sender: Address,
    receiver: Address,
    src_token: Address,
    amount_in: U256,
    dst_token: Address,
    amount_out: U256,
) -> Result<(), SimError> {
    let mut source = state.get_holding(sender, src_token)?.clone();
    source.debit(amount_in)?;
    state.set_holding(source);

    let mut destination = state.get_holding(receiver, dst_token)?.clone();
    destination.credit(amount_out)?;
    state.set_holding(destination);
    Ok(())
}
