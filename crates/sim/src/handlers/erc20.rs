//! Token transitions: transfers, approvals, signed permits and wrappers.

use alloy_primitives::{Address, U256};

use crate::error::{SimError, SimulationError, UnknownDataError};
use crate::handlers::{set_allowance, transfer};
use crate::math::{w_div_down, w_mul_down};
use crate::operation::Erc20Action;
use crate::state::SimulationState;
use crate::token::Permit2Allowance;

pub(crate) fn apply(
    state: &mut SimulationState,
    sender: Address,
    action: &Erc20Action,
) -> Result<(), SimError> {
    match action {
        Erc20Action::Transfer {
            token,
            from,
            to,
            amount,
        } => transfer(state, *token, *from, *to, *amount, sender),
        Erc20Action::Approve {
            token,
            spender,
            amount,
        } => set_allowance(state, sender, *token, *spender, *amount),
        Erc20Action::Permit {
            owner,
            token,
            spender,
            amount,
            nonce,
            deadline,
        } => permit(state, *owner, *token, *spender, *amount, *nonce, *deadline),
        Erc20Action::Permit2 {
            owner,
            token,
            amount,
            expiration,
            nonce,
        } => permit2(state, *owner, *token, *amount, *expiration, *nonce),
        Erc20Action::Transfer2 {
            token,
            from,
            to,
            amount,
        } => transfer2(state, sender, *token, *from, *to, *amount),
        Erc20Action::Wrap {
            token,
            amount,
            receiver,
        } => wrap(state, sender, *token, *amount, *receiver),
        Erc20Action::Unwrap {
            token,
            amount,
            receiver,
        } => unwrap(state, sender, *token, *amount, *receiver),
    }
}

/// EIP-2612: consumes the owner's nonce and sets the allowance.
fn permit(
    state: &mut SimulationState,
    owner: Address,
    token: Address,
    spender: Address,
    amount: U256,
    nonce: U256,
    deadline: u64,
) -> Result<(), SimError> {
    let mut holding = state.get_holding(owner, token)?.clone();
    let expected = holding
        .erc2612_nonce
        .ok_or(UnknownDataError::PermitData { user: owner, token })?;
    if nonce != expected {
        return Err(SimulationError::InvalidNonce {
            user: owner,
            token,
            expected,
            got: nonce,
        }
        .into());
    }
    if deadline < state.timestamp {
        return Err(SimulationError::ExpiredSignature {
            user: owner,
            token,
            deadline,
            timestamp: state.timestamp,
        }
        .into());
    }

    let next = expected
        .checked_add(U256::from(1))
        .ok_or(SimulationError::NonceOverflow { user: owner, token })?;
    holding.erc2612_nonce = Some(next);
    state.set_holding(holding);
    set_allowance(state, owner, token, spender, amount)
}

/// Signed Permit2 allowance to the bundler.
fn permit2(
    state: &mut SimulationState,
    owner: Address,
    token: Address,
    amount: U256,
    expiration: u64,
    nonce: U256,
) -> Result<(), SimError> {
    let mut holding = state.get_holding(owner, token)?.clone();
    let current = holding
        .permit2_allowance
        .ok_or(UnknownDataError::PermitData { user: owner, token })?;
    if nonce != current.nonce {
        return Err(SimulationError::InvalidNonce {
            user: owner,
            token,
            expected: current.nonce,
            got: nonce,
        }
        .into());
    }
    if expiration < state.timestamp {
        return Err(SimulationError::ExpiredSignature {
            user: owner,
            token,
            deadline: expiration,
            timestamp: state.timestamp,
        }
        .into());
    }

    let next = current
        .nonce
        .checked_add(U256::from(1))
        .ok_or(SimulationError::NonceOverflow { user: owner, token })?;
    holding.permit2_allowance = Some(Permit2Allowance {
        amount,
        expiration,
        nonce: next,
    });
    state.set_holding(holding);
    Ok(())
}

/// Pull by the bundler through Permit2. Spends both the Permit2 allowance
/// and the holder's approval of the Permit2 contract.
fn transfer2(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<(), SimError> {
    let addresses = state.global.addresses;
    let mut holding = state.get_holding(from, token)?.clone();
    let mut allowance = holding
        .permit2_allowance
        .ok_or(UnknownDataError::PermitData { user: from, token })?;

    if sender != addresses.bundler {
        return Err(SimulationError::InsufficientAllowance {
            owner: from,
            token,
            spender: sender,
            allowance: U256::ZERO,
            required: amount,
        }
        .into());
    }
    if allowance.expiration < state.timestamp {
        return Err(SimulationError::ExpiredSignature {
            user: from,
            token,
            deadline: allowance.expiration,
            timestamp: state.timestamp,
        }
        .into());
    }
    if allowance.amount < amount {
        return Err(SimulationError::InsufficientAllowance {
            owner: from,
            token,
            spender: sender,
            allowance: allowance.amount,
            required: amount,
        }
        .into());
    }

    if allowance.amount != U256::MAX {
        allowance.amount -= amount;
    }
    holding.permit2_allowance = Some(allowance);
    state.set_holding(holding);
    transfer(state, token, from, to, amount, addresses.permit2)
}

/// Deposits underlying into the wrapper and mints `amount * rate` wrapped.
fn wrap(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    amount: U256,
    receiver: Address,
) -> Result<(), SimError> {
    if amount.is_zero() {
        return Err(SimulationError::ZeroAmount.into());
    }
    let wrapper = *state.get_wrapper(token)?;
    transfer(state, wrapper.underlying, sender, token, amount, sender)?;

    let mut holding = state.get_holding(receiver, token)?.clone();
    holding.credit(w_mul_down(amount, wrapper.rate))?;
    state.set_holding(holding);
    Ok(())
}

/// Burns wrapped tokens and releases `amount / rate` underlying.
fn unwrap(
    state: &mut SimulationState,
    sender: Address,
    token: Address,
    amount: U256,
    receiver: Address,
) -> Result<(), SimError> {
    if amount.is_zero() {
        return Err(SimulationError::ZeroAmount.into());
    }
    let wrapper = *state.get_wrapper(token)?;

    let mut holding = state.get_holding(sender, token)?.clone();
    holding.debit(amount)?;
    state.set_holding(holding);

    let underlying = w_div_down(amount, wrapper.rate);
    transfer(state, wrapper.underlying, token, receiver, underlying, token)
}
