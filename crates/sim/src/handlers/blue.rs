//! Morpho Blue transitions.
//!
//! Every market action accrues the market to the state timestamp first.
//! Supply, repay and collateral supply run their callback before pulling the
//! tokens from the sender, and flash loans run it between lending the tokens
//! out and pulling them back, so callbacks can fund the operation that
//! triggered them.

use alloy_primitives::Address;

use crate::error::{MarketId, SimError, SimulationError};
use crate::handlers::transfer;
use crate::market::{Market, MarketUpdate};
use crate::operation::{Amount, BlueAction};
use crate::sequencer::Context;
use crate::state::SimulationState;

pub(crate) fn apply(
    state: &mut SimulationState,
    sender: Address,
    action: &BlueAction,
    ctx: &Context,
) -> Result<(), SimError> {
    let morpho = state.global.addresses.morpho;

    match action {
        BlueAction::Supply {
            market_id,
            amount,
            on_behalf,
            callback,
        } => {
            let update = supply(state, *market_id, *amount, *on_behalf)?;
            ctx.run_callback(state, callback.as_ref())?;
            transfer(
                state,
                update.market.params.loan_token,
                sender,
                morpho,
                update.assets,
                morpho,
            )
        }
        BlueAction::Withdraw {
            market_id,
            amount,
            on_behalf,
            receiver,
        } => {
            authorize(state, sender, *on_behalf)?;
            let update = withdraw(state, *market_id, *amount, *on_behalf)?;
            transfer(
                state,
                update.market.params.loan_token,
                morpho,
                *receiver,
                update.assets,
                morpho,
            )
        }
        BlueAction::Borrow {
            market_id,
            amount,
            on_behalf,
            receiver,
        } => {
            authorize(state, sender, *on_behalf)?;
            let market = prepare_market(state, *market_id)?;
            let update = market.borrow(*amount)?;

            let mut position = state.get_position(*on_behalf, *market_id)?.clone();
            position.borrow_shares += update.shares;
            state.set_position(position);
            state.markets.insert(*market_id, update.market.clone());

            transfer(
                state,
                update.market.params.loan_token,
                morpho,
                *receiver,
                update.assets,
                morpho,
            )
        }
        BlueAction::Repay {
            market_id,
            amount,
            on_behalf,
            callback,
        } => {
            let market = prepare_market(state, *market_id)?;
            let update = market.repay(*amount)?;

            let mut position = state.get_position(*on_behalf, *market_id)?.clone();
            position.borrow_shares = position.borrow_shares.checked_sub(update.shares).ok_or(
                SimulationError::InsufficientPosition {
                    user: *on_behalf,
                    market_id: *market_id,
                },
            )?;
            state.set_position(position);
            state.markets.insert(*market_id, update.market.clone());

            ctx.run_callback(state, callback.as_ref())?;
            transfer(
                state,
                update.market.params.loan_token,
                sender,
                morpho,
                update.assets,
                morpho,
            )
        }
        BlueAction::SupplyCollateral {
            market_id,
            assets,
            on_behalf,
            callback,
        } => {
            if assets.is_zero() {
                return Err(SimulationError::ZeroAmount.into());
            }
            let collateral_token = require_enabled(state, *market_id)?.params.collateral_token;

            let mut position = state.get_position(*on_behalf, *market_id)?.clone();
            position.collateral += *assets;
            state.set_position(position);

            ctx.run_callback(state, callback.as_ref())?;
            transfer(state, collateral_token, sender, morpho, *assets, morpho)
        }
        BlueAction::WithdrawCollateral {
            market_id,
            assets,
            on_behalf,
            receiver,
        } => {
            if assets.is_zero() {
                return Err(SimulationError::ZeroAmount.into());
            }
            authorize(state, sender, *on_behalf)?;
            let market = prepare_market(state, *market_id)?;

            let mut position = state.get_position(*on_behalf, *market_id)?.clone();
            position.collateral = position.collateral.checked_sub(*assets).ok_or(
                SimulationError::InsufficientPosition {
                    user: *on_behalf,
                    market_id: *market_id,
                },
            )?;
            state.set_position(position);

            transfer(
                state,
                market.params.collateral_token,
                morpho,
                *receiver,
                *assets,
                morpho,
            )
        }
        BlueAction::FlashLoan {
            token,
            assets,
            callback,
        } => {
            if assets.is_zero() {
                return Err(SimulationError::ZeroAmount.into());
            }
            transfer(state, *token, morpho, sender, *assets, morpho)?;
            ctx.run_callback(state, callback.as_ref())?;
            transfer(state, *token, sender, morpho, *assets, morpho)
        }
        BlueAction::AccrueInterest { market_id } => {
            let timestamp = state.timestamp;
            state.accrue_market_mut(*market_id, timestamp)
        }
        BlueAction::SetAuthorization {
            authorized,
            is_authorized,
        } => {
            let mut user = state.get_user(sender)?.clone();
            if *is_authorized {
                user.authorizations.insert(*authorized);
            } else {
                user.authorizations.remove(authorized);
            }
            state.set_user(user);
            Ok(())
        }
    }
}

/// Supply accounting: mints shares to `on_behalf` and grows the market.
/// Moving the tokens is left to the caller.
pub(crate) fn supply(
    state: &mut SimulationState,
    market_id: MarketId,
    amount: Amount,
    on_behalf: Address,
) -> Result<MarketUpdate, SimError> {
    let market = prepare_market(state, market_id)?;
    let update = market.supply(amount)?;

    let mut position = state.get_position(on_behalf, market_id)?.clone();
    position.supply_shares += update.shares;
    state.set_position(position);
    state.markets.insert(market_id, update.market.clone());

    Ok(update)
}

/// Withdraw accounting: burns shares of `on_behalf` and shrinks the market.
/// Moving the tokens is left to the caller.
pub(crate) fn withdraw(
    state: &mut SimulationState,
    market_id: MarketId,
    amount: Amount,
    on_behalf: Address,
) -> Result<MarketUpdate, SimError> {
    let market = prepare_market(state, market_id)?;
    let update = market.withdraw(amount)?;

    let mut position = state.get_position(on_behalf, market_id)?.clone();
    position.supply_shares = position.supply_shares.checked_sub(update.shares).ok_or(
        SimulationError::InsufficientPosition {
            user: on_behalf,
            market_id,
        },
    )?;
    state.set_position(position);
    state.markets.insert(market_id, update.market.clone());

    Ok(update)
}

/// Fails unless `operator` manages the positions of `on_behalf`.
fn authorize(state: &SimulationState, operator: Address, on_behalf: Address) -> Result<(), SimError> {
    if operator == on_behalf || state.get_user(on_behalf)?.is_authorized(operator) {
        return Ok(());
    }
    Err(SimulationError::Unauthorized {
        operator,
        on_behalf,
    }
    .into())
}

fn require_enabled(state: &SimulationState, market_id: MarketId) -> Result<&Market, SimError> {
    if !state.is_market_enabled(market_id)? {
        return Err(SimulationError::MarketNotEnabled { market_id }.into());
    }
    Ok(state.get_market(market_id)?)
}

/// Checks the market is enabled and accrues it to the state timestamp.
fn prepare_market(state: &mut SimulationState, market_id: MarketId) -> Result<Market, SimError> {
    require_enabled(state, market_id)?;
    let timestamp = state.timestamp;
    state.accrue_market_mut(market_id, timestamp)?;
    Ok(state.get_market(market_id)?.clone())
}
