//! State transitions, one per action.
//!
//! Handlers mutate a scratch copy of the state owned by the sequencer; on
//! error the scratch copy is dropped, so a failed operation never leaks a
//! partial update.

pub mod blue;
pub mod erc20;
pub mod swap;
pub mod vault;

use alloy_primitives::{Address, U256};

use crate::error::{SimError, SimulationError, UnknownDataError};
use crate::operation::{Action, Operation};
use crate::sequencer::Context;
use crate::state::SimulationState;
use crate::token::Holding;

/// Applies one operation to `state` in place.
pub(crate) fn apply(
    state: &mut SimulationState,
    operation: &Operation,
    ctx: &Context,
) -> Result<(), SimError> {
    match &operation.action {
        Action::Blue(action) => blue::apply(state, operation.sender, action, ctx),
        Action::Vault(action) => vault::apply(state, operation.sender, action),
        Action::Erc20(action) => erc20::apply(state, operation.sender, action),
        Action::Swap(action) => swap::apply(state, operation.sender, action),
    }
}

/// Moves `amount` of `token` from `from` to `to`. When `mover` is not the
/// holder it must hold an allowance: a vault spends the holder's vault
/// allowance of its asset, protocol contracts spend the allowance of their
/// role.
pub(crate) fn transfer(
    state: &mut SimulationState,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
    mover: Address,
) -> Result<(), SimError> {
    let mut source = state.get_holding(from, token)?.clone();
    if mover != from {
        spend_allowance(state, &mut source, mover, amount)?;
    }
    source.debit(amount)?;
    state.set_holding(source);

    let mut destination = state.get_holding(to, token)?.clone();
    destination.credit(amount)?;
    state.set_holding(destination);
    Ok(())
}

/// Consumes `amount` of the allowance `holding.user` granted to `spender`.
pub(crate) fn spend_allowance(
    state: &mut SimulationState,
    holding: &mut Holding,
    spender: Address,
    amount: U256,
) -> Result<(), SimError> {
    if let Some(vault) = state.vaults.get(&spender) {
        if vault.asset == holding.token {
            let mut vault_user = state.get_vault_user(spender, holding.user)?.clone();
            if vault_user.allowance != U256::MAX {
                vault_user.allowance = vault_user.allowance.checked_sub(amount).ok_or(
                    SimulationError::InsufficientAllowance {
                        owner: holding.user,
                        token: holding.token,
                        spender,
                        allowance: vault_user.allowance,
                        required: amount,
                    },
                )?;
                state.set_vault_user(vault_user);
            }
            return Ok(());
        }
    }

    let role = state
        .global
        .spender_role(spender)
        .ok_or(UnknownDataError::Allowance {
            owner: holding.user,
            token: holding.token,
            spender,
        })?;
    holding.spend_allowance(role, spender, amount)
}

/// Sets the allowance `owner` grants to `spender` on `token`.
pub(crate) fn set_allowance(
    state: &mut SimulationState,
    owner: Address,
    token: Address,
    spender: Address,
    amount: U256,
) -> Result<(), SimError> {
    if let Some(vault) = state.vaults.get(&spender) {
        if vault.asset == token {
            let mut vault_user = state.get_vault_user(spender, owner)?.clone();
            vault_user.allowance = amount;
            state.set_vault_user(vault_user);
            return Ok(());
        }
    }

    let role = state
        .global
        .spender_role(spender)
        .ok_or(UnknownDataError::Allowance {
            owner,
            token,
            spender,
        })?;
    let mut holding = state.get_holding(owner, token)?.clone();
    holding.allowances.insert(role, amount);
    state.set_holding(holding);
    Ok(())
}
