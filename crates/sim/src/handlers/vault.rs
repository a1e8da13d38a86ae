//! MetaMorpho vault transitions.
//!
//! A vault's allocation in a market is its Morpho Blue position there, so
//! deposits, withdrawals and reallocations go through the same supply and
//! withdraw accounting as direct Blue operations, with the vault as the
//! position owner.
//!
//! Every operation starts by accruing the vault: its withdraw-queue markets
//! are accrued to the state timestamp and the performance fee is minted.

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::error::{MarketId, SimError, SimulationError};
use crate::handlers::{blue, spend_allowance, transfer};
use crate::math::{zero_floor_sub, RoundingDirection};
use crate::operation::{Amount, MarketAllocation, VaultAction, Withdrawal};
use crate::state::SimulationState;
use crate::vault::{Pending, Vault, MAX_QUEUE_LENGTH};

pub(crate) fn apply(
    state: &mut SimulationState,
    sender: Address,
    action: &VaultAction,
) -> Result<(), SimError> {
    match action {
        VaultAction::Deposit {
            vault,
            amount,
            receiver,
        } => deposit(state, sender, *vault, *amount, *receiver),
        VaultAction::Withdraw {
            vault,
            amount,
            owner,
            receiver,
        } => withdraw(state, sender, *vault, *amount, *owner, *receiver),
        VaultAction::AccrueInterest { vault } => {
            let timestamp = state.timestamp;
            state.accrue_vault_mut(*vault, timestamp).map(|_| ())
        }
        VaultAction::Reallocate { vault, allocations } => {
            require_allocator(state, *vault, sender)?;
            reallocate(state, *vault, allocations)
        }
        VaultAction::PublicReallocate {
            vault,
            withdrawals,
            supply_market_id,
        } => public_reallocate(state, *vault, withdrawals, *supply_market_id),
        VaultAction::SubmitCap {
            vault,
            market_id,
            cap,
        } => submit_cap(state, sender, *vault, *market_id, *cap),
        VaultAction::AcceptCap { vault, market_id } => accept_cap(state, *vault, *market_id),
        VaultAction::SetSupplyQueue {
            vault,
            supply_queue,
        } => set_supply_queue(state, sender, *vault, supply_queue),
        VaultAction::UpdateWithdrawQueue { vault, indexes } => {
            update_withdraw_queue(state, sender, *vault, indexes)
        }
    }
}

fn deposit(
    state: &mut SimulationState,
    sender: Address,
    vault_address: Address,
    amount: Amount,
    receiver: Address,
) -> Result<(), SimError> {
    if amount.is_zero() {
        return Err(SimulationError::ZeroAmount.into());
    }
    let timestamp = state.timestamp;
    let total_assets = state.accrue_vault_mut(vault_address, timestamp)?;
    let mut vault = state.get_vault(vault_address)?.clone();

    let (assets, shares) = match amount {
        Amount::Assets(assets) => (
            assets,
            vault.to_shares(assets, total_assets, RoundingDirection::Down),
        ),
        Amount::Shares(shares) => (
            vault.to_assets(shares, total_assets, RoundingDirection::Up),
            shares,
        ),
    };

    transfer(state, vault.asset, sender, vault.address, assets, vault.address)?;
    supply_to_markets(state, &vault, assets)?;

    let mut holding = state.get_holding(receiver, vault.address)?.clone();
    holding.credit(shares)?;
    state.set_holding(holding);

    vault.total_supply += shares;
    vault.last_total_assets = total_assets.saturating_add(assets);
    state.set_vault(vault);
    Ok(())
}

fn withdraw(
    state: &mut SimulationState,
    sender: Address,
    vault_address: Address,
    amount: Amount,
    owner: Address,
    receiver: Address,
) -> Result<(), SimError> {
    if amount.is_zero() {
        return Err(SimulationError::ZeroAmount.into());
    }
    let timestamp = state.timestamp;
    let total_assets = state.accrue_vault_mut(vault_address, timestamp)?;
    let mut vault = state.get_vault(vault_address)?.clone();

    let (assets, shares) = match amount {
        Amount::Assets(assets) => (
            assets,
            vault.to_shares(assets, total_assets, RoundingDirection::Up),
        ),
        Amount::Shares(shares) => (
            vault.to_assets(shares, total_assets, RoundingDirection::Down),
            shares,
        ),
    };

    let mut holding = state.get_holding(owner, vault.address)?.clone();
    if sender != owner {
        spend_allowance(state, &mut holding, sender, shares)?;
    }
    holding.debit(shares)?;
    state.set_holding(holding);

    withdraw_from_markets(state, &vault, assets)?;
    transfer(state, vault.asset, vault.address, receiver, assets, vault.address)?;

    vault.total_supply = vault.total_supply.saturating_sub(shares);
    vault.last_total_assets = zero_floor_sub(total_assets, assets);
    state.set_vault(vault);
    Ok(())
}

/// Supplies `assets` through the supply queue, each market up to its cap.
fn supply_to_markets(state: &mut SimulationState, vault: &Vault, assets: U256) -> Result<(), SimError> {
    let mut remaining = assets;

    for market_id in &vault.supply_queue {
        if remaining.is_zero() {
            break;
        }
        let cap = state.get_vault_market_config(vault.address, *market_id)?.cap;
        if cap.is_zero() {
            continue;
        }

        let supplied = state.vault_supply_assets(vault.address, *market_id)?;
        let to_supply = zero_floor_sub(cap, supplied).min(remaining);
        if to_supply.is_zero() {
            continue;
        }

        supply_from_vault(state, vault, *market_id, to_supply)?;
        remaining -= to_supply;
    }

    if !remaining.is_zero() {
        return Err(SimulationError::AllCapsReached {
            vault: vault.address,
            remaining,
        }
        .into());
    }
    Ok(())
}

/// Withdraws `assets` through the withdraw queue, each market up to the
/// vault's supply and the market's liquidity.
fn withdraw_from_markets(
    state: &mut SimulationState,
    vault: &Vault,
    assets: U256,
) -> Result<(), SimError> {
    let mut remaining = assets;

    for market_id in &vault.withdraw_queue {
        if remaining.is_zero() {
            break;
        }
        let liquidity = state.get_market(*market_id)?.liquidity();
        let supplied = state.vault_supply_assets(vault.address, *market_id)?;
        let to_withdraw = supplied.min(liquidity).min(remaining);
        if to_withdraw.is_zero() {
            continue;
        }

        withdraw_to_vault(state, vault, *market_id, Amount::Assets(to_withdraw))?;
        remaining -= to_withdraw;
    }

    if !remaining.is_zero() {
        return Err(SimulationError::NotEnoughLiquidity {
            vault: vault.address,
            remaining,
        }
        .into());
    }
    Ok(())
}

fn supply_from_vault(
    state: &mut SimulationState,
    vault: &Vault,
    market_id: MarketId,
    assets: U256,
) -> Result<U256, SimError> {
    let update = blue::supply(state, market_id, Amount::Assets(assets), vault.address)?;
    let morpho = state.global.addresses.morpho;
    transfer(state, vault.asset, vault.address, morpho, update.assets, vault.address)?;
    Ok(update.assets)
}

fn withdraw_to_vault(
    state: &mut SimulationState,
    vault: &Vault,
    market_id: MarketId,
    amount: Amount,
) -> Result<U256, SimError> {
    let update = blue::withdraw(state, market_id, amount, vault.address)?;
    let morpho = state.global.addresses.morpho;
    transfer(state, vault.asset, morpho, vault.address, update.assets, morpho)?;
    Ok(update.assets)
}

/// Moves the vault's supply to the target allocations, withdrawals first in
/// the order given. A target of `U256::MAX` supplies whatever is left.
fn reallocate(
    state: &mut SimulationState,
    vault_address: Address,
    allocations: &[MarketAllocation],
) -> Result<(), SimError> {
    let timestamp = state.timestamp;
    state.accrue_vault_mut(vault_address, timestamp)?;
    let vault = state.get_vault(vault_address)?.clone();

    let mut total_supplied = U256::ZERO;
    let mut total_withdrawn = U256::ZERO;

    for allocation in allocations {
        let market_id = allocation.market_id;
        let config = state.get_vault_market_config(vault.address, market_id)?.clone();
        let supply_shares = state.get_position(vault.address, market_id)?.supply_shares;
        let supplied = state.vault_supply_assets(vault.address, market_id)?;

        if allocation.assets < supplied {
            if !config.enabled {
                return Err(SimulationError::VaultMarketNotEnabled {
                    vault: vault.address,
                    market_id,
                }
                .into());
            }
            // Emptying a market burns every share so no dust is left behind
            let amount = if allocation.assets.is_zero() {
                Amount::Shares(supply_shares)
            } else {
                Amount::Assets(supplied - allocation.assets)
            };
            total_withdrawn += withdraw_to_vault(state, &vault, market_id, amount)?;
        } else {
            let to_supply = if allocation.assets == U256::MAX {
                zero_floor_sub(total_withdrawn, total_supplied)
            } else {
                allocation.assets - supplied
            };
            if to_supply.is_zero() {
                continue;
            }
            if config.cap.is_zero() {
                return Err(SimulationError::UnauthorizedMarket {
                    vault: vault.address,
                    market_id,
                }
                .into());
            }
            if supplied.saturating_add(to_supply) > config.cap {
                return Err(SimulationError::SupplyCapExceeded {
                    vault: vault.address,
                    market_id,
                    cap: config.cap,
                }
                .into());
            }
            total_supplied += supply_from_vault(state, &vault, market_id, to_supply)?;
        }
    }

    if total_withdrawn != total_supplied {
        return Err(SimulationError::InconsistentReallocation {
            vault: vault.address,
            supplied: total_supplied,
            withdrawn: total_withdrawn,
        }
        .into());
    }

    debug!(vault = %vault.address, moved = %total_supplied, "reallocated vault supply");
    Ok(())
}

/// Permissionless reallocation into `supply_market_id`, bounded by the flow
/// caps of every market involved.
fn public_reallocate(
    state: &mut SimulationState,
    vault_address: Address,
    withdrawals: &[Withdrawal],
    supply_market_id: MarketId,
) -> Result<(), SimError> {
    let timestamp = state.timestamp;
    state.accrue_vault_mut(vault_address, timestamp)?;
    let vault = state.get_vault(vault_address)?;
    let mut allocator = vault
        .public_allocator_config
        .ok_or(SimulationError::PublicAllocatorNotConfigured {
            vault: vault_address,
        })?;

    if withdrawals.is_empty() {
        return Err(SimulationError::EmptyWithdrawals {
            vault: vault_address,
        }
        .into());
    }

    let mut supply_config = state
        .get_vault_market_config(vault_address, supply_market_id)?
        .clone();
    if !supply_config.enabled {
        return Err(SimulationError::VaultMarketNotEnabled {
            vault: vault_address,
            market_id: supply_market_id,
        }
        .into());
    }
    let mut supply_flow = supply_config.public_allocator_config.ok_or(
        SimulationError::PublicAllocatorNotConfigured {
            vault: vault_address,
        },
    )?;

    let mut allocations = Vec::with_capacity(withdrawals.len() + 1);
    let mut total_withdrawn = U256::ZERO;
    let mut previous: Option<MarketId> = None;

    for withdrawal in withdrawals {
        let market_id = withdrawal.market_id;
        if previous.is_some_and(|previous| market_id <= previous) {
            return Err(SimulationError::WithdrawalsNotSorted {
                vault: vault_address,
            }
            .into());
        }
        previous = Some(market_id);

        if market_id == supply_market_id {
            return Err(SimulationError::DepositMarketInWithdrawals {
                vault: vault_address,
                market_id,
            }
            .into());
        }
        if withdrawal.amount.is_zero() {
            return Err(SimulationError::ZeroAmount.into());
        }

        let mut config = state.get_vault_market_config(vault_address, market_id)?.clone();
        if !config.enabled {
            return Err(SimulationError::VaultMarketNotEnabled {
                vault: vault_address,
                market_id,
            }
            .into());
        }
        let mut flow = config.public_allocator_config.ok_or(
            SimulationError::PublicAllocatorNotConfigured {
                vault: vault_address,
            },
        )?;

        if withdrawal.amount > flow.max_out {
            return Err(SimulationError::MaxOutflowExceeded {
                vault: vault_address,
                market_id,
            }
            .into());
        }
        let supplied = state.vault_supply_assets(vault_address, market_id)?;
        if withdrawal.amount > supplied {
            return Err(SimulationError::NotEnoughSupply {
                vault: vault_address,
                market_id,
            }
            .into());
        }

        flow.max_in = flow.max_in.saturating_add(withdrawal.amount);
        flow.max_out -= withdrawal.amount;
        config.public_allocator_config = Some(flow);
        state.set_vault_market_config(config);

        allocations.push(MarketAllocation {
            market_id,
            assets: supplied - withdrawal.amount,
        });
        total_withdrawn += withdrawal.amount;
    }

    if total_withdrawn > supply_flow.max_in {
        return Err(SimulationError::MaxInflowExceeded {
            vault: vault_address,
            market_id: supply_market_id,
        }
        .into());
    }
    supply_flow.max_in -= total_withdrawn;
    supply_flow.max_out = supply_flow.max_out.saturating_add(total_withdrawn);
    supply_config.public_allocator_config = Some(supply_flow);
    state.set_vault_market_config(supply_config);

    allocations.push(MarketAllocation {
        market_id: supply_market_id,
        assets: U256::MAX,
    });
    reallocate(state, vault_address, &allocations)?;

    allocator.accrued_fee = allocator.accrued_fee.saturating_add(allocator.fee);
    let mut vault = state.get_vault(vault_address)?.clone();
    vault.public_allocator_config = Some(allocator);
    state.set_vault(vault);
    Ok(())
}

/// Lowers a cap at once; a higher cap waits for the vault's timelock. Fails
/// while another cap or the market's removal is pending.
fn submit_cap(
    state: &mut SimulationState,
    sender: Address,
    vault_address: Address,
    market_id: MarketId,
    cap: U256,
) -> Result<(), SimError> {
    let vault = state.get_vault(vault_address)?;
    if !vault.is_curator(sender) {
        return Err(SimulationError::NotCuratorRole {
            vault: vault_address,
            sender,
        }
        .into());
    }
    let timelock = vault.timelock;
    if state.get_market(market_id)?.params.loan_token != vault.asset {
        return Err(SimulationError::InconsistentAsset {
            vault: vault_address,
            market_id,
        }
        .into());
    }

    let mut config = state.get_vault_market_config(vault_address, market_id)?.clone();
    if config.pending_cap.is_some() {
        return Err(SimulationError::AlreadyPending {
            vault: vault_address,
            market_id,
        }
        .into());
    }
    if config.removable_at != 0 {
        return Err(SimulationError::PendingRemoval {
            vault: vault_address,
            market_id,
        }
        .into());
    }
    if cap == config.cap {
        return Err(SimulationError::AlreadySet {
            vault: vault_address,
            market_id,
        }
        .into());
    }

    if cap < config.cap {
        config.cap = cap;
    } else {
        config.pending_cap = Some(Pending {
            value: cap,
            valid_at: state.timestamp.saturating_add(timelock),
        });
    }
    state.set_vault_market_config(config);
    Ok(())
}

/// Applies a pending cap once its timelock elapsed. A market getting its first
/// non-zero cap joins the end of the withdraw queue.
fn accept_cap(
    state: &mut SimulationState,
    vault_address: Address,
    market_id: MarketId,
) -> Result<(), SimError> {
    let mut config = state.get_vault_market_config(vault_address, market_id)?.clone();
    let pending = config
        .pending_cap
        .ok_or(SimulationError::NoPendingValue {
            vault: vault_address,
            market_id,
        })?;
    if pending.valid_at > state.timestamp {
        return Err(SimulationError::TimelockNotElapsed {
            vault: vault_address,
            valid_at: pending.valid_at,
            timestamp: state.timestamp,
        }
        .into());
    }

    config.cap = pending.value;
    config.pending_cap = None;

    if !pending.value.is_zero() && !config.enabled {
        let mut vault = state.get_vault(vault_address)?.clone();
        if vault.withdraw_queue.len() >= MAX_QUEUE_LENGTH {
            return Err(SimulationError::MaxQueueLengthExceeded {
                vault: vault_address,
                max: MAX_QUEUE_LENGTH,
            }
            .into());
        }

        let timestamp = state.timestamp;
        state.accrue_market_mut(market_id, timestamp)?;
        let supplied = state.vault_supply_assets(vault_address, market_id)?;

        config.enabled = true;
        config.removable_at = 0;
        vault.withdraw_queue.push(market_id);
        vault.last_total_assets = vault.last_total_assets.saturating_add(supplied);
        state.set_vault(vault);
    }

    state.set_vault_market_config(config);
    Ok(())
}

fn set_supply_queue(
    state: &mut SimulationState,
    sender: Address,
    vault_address: Address,
    supply_queue: &[MarketId],
) -> Result<(), SimError> {
    require_allocator(state, vault_address, sender)?;
    if supply_queue.len() > MAX_QUEUE_LENGTH {
        return Err(SimulationError::MaxQueueLengthExceeded {
            vault: vault_address,
            max: MAX_QUEUE_LENGTH,
        }
        .into());
    }
    for market_id in supply_queue {
        if state
            .get_vault_market_config(vault_address, *market_id)?
            .cap
            .is_zero()
        {
            return Err(SimulationError::UnauthorizedMarket {
                vault: vault_address,
                market_id: *market_id,
            }
            .into());
        }
    }

    let mut vault = state.get_vault(vault_address)?.clone();
    vault.supply_queue = supply_queue.to_vec();
    state.set_vault(vault);
    Ok(())
}

/// Rebuilds the withdraw queue from `indexes` into the current queue. Markets
/// left out are disabled; they need a zero cap with nothing pending, and no
/// remaining supply unless their forced removal is due.
fn update_withdraw_queue(
    state: &mut SimulationState,
    sender: Address,
    vault_address: Address,
    indexes: &[usize],
) -> Result<(), SimError> {
    require_allocator(state, vault_address, sender)?;
    let mut vault = state.get_vault(vault_address)?.clone();

    let mut seen = BTreeSet::new();
    let mut queue = Vec::with_capacity(indexes.len());
    for &index in indexes {
        let market_id = *vault
            .withdraw_queue
            .get(index)
            .ok_or(SimulationError::InvalidQueueIndex {
                vault: vault_address,
                index,
            })?;
        if !seen.insert(index) {
            return Err(SimulationError::DuplicateMarket {
                vault: vault_address,
                market_id,
            }
            .into());
        }
        queue.push(market_id);
    }

    for (index, market_id) in vault.withdraw_queue.iter().enumerate() {
        if seen.contains(&index) {
            continue;
        }
        let mut config = state.get_vault_market_config(vault_address, *market_id)?.clone();
        if !config.cap.is_zero() || config.pending_cap.is_some() {
            return Err(SimulationError::InvalidMarketRemoval {
                vault: vault_address,
                market_id: *market_id,
            }
            .into());
        }

        if !state
            .get_position(vault_address, *market_id)?
            .supply_shares
            .is_zero()
        {
            if config.removable_at == 0 {
                return Err(SimulationError::InvalidMarketRemoval {
                    vault: vault_address,
                    market_id: *market_id,
                }
                .into());
            }
            if config.removable_at > state.timestamp {
                return Err(SimulationError::TimelockNotElapsed {
                    vault: vault_address,
                    valid_at: config.removable_at,
                    timestamp: state.timestamp,
                }
                .into());
            }
        }

        config.enabled = false;
        config.removable_at = 0;
        state.set_vault_market_config(config);
    }

    vault.withdraw_queue = queue;
    state.set_vault(vault);
    Ok(())
}

/// Owner, curator or a registered allocator.
fn require_allocator(
    state: &SimulationState,
    vault_address: Address,
    sender: Address,
) -> Result<(), SimError> {
    let vault = state.get_vault(vault_address)?;
    if vault.is_curator(sender) || state.get_vault_user(vault_address, sender)?.is_allocator {
        return Ok(());
    }
    Err(SimulationError::NotAllocatorRole {
        vault: vault_address,
        sender,
    }
    .into())
}
