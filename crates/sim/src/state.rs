//! The simulation state: one immutable snapshot of every loaded entity.
//!
//! Entity tables are [`EntityMap`]s, persistent ordered maps whose values are
//! `Arc`-shared. Cloning a [`SimulationState`] copies a handful of pointers;
//! writing one entity copies only the tree nodes on its path, so every other
//! entity stays pointer-equal across snapshots.
//!
//! Accessors never default a missing entity: they fail with the
//! [`UnknownDataError`] naming the missing key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use im::OrdMap;
use serde::{Deserialize, Serialize};

use crate::error::{MarketId, SimError, SnapshotError, UnknownDataError};
use crate::market::{Market, MAX_FEE};
use crate::position::Position;
use crate::token::{Holding, SpenderRole, Wrapper};
use crate::vault::{Vault, VaultMarketConfig, VaultUser, VAULT_MAX_FEE};

/// Persistent ordered map of shared entities.
pub struct EntityMap<K, V> {
    entries: OrdMap<K, Arc<V>>,
}

impl<K: Ord + Clone, V> Clone for EntityMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K: Ord + Clone, V> Default for EntityMap<K, V> {
    fn default() -> Self {
        Self {
            entries: OrdMap::new(),
        }
    }
}

impl<K: Ord + Clone + fmt::Debug, V: fmt::Debug> fmt::Debug for EntityMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: Ord + Clone, V: PartialEq> PartialEq for EntityMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries.ptr_eq(&other.entries) || self.entries == other.entries
    }
}

impl<K: Ord + Clone, V> EntityMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(Arc::as_ref)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Replaces the entry. Only the nodes on the key's path are copied when
    /// the tree is shared.
    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, Arc::new(value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when both maps share the same root.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.entries.ptr_eq(&other.entries)
    }

    /// True when `key` maps to the same allocation in both maps (or is absent
    /// from both).
    pub fn entity_ptr_eq(&self, other: &Self, key: &K) -> bool {
        match (self.entries.get(key), other.entries.get(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Keys of entries written since `previous`.
    pub fn changed_since<'a>(&'a self, previous: &'a Self) -> impl Iterator<Item = &'a K> + 'a {
        let shared = self.ptr_eq(previous);
        self.entries
            .keys()
            .filter(move |key| !shared && !self.entity_ptr_eq(previous, key))
    }
}

/// Addresses of the protocol contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolAddresses {
    pub morpho: Address,
    pub permit2: Address,
    pub bundler: Address,
    pub public_allocator: Address,
}

/// Protocol-wide parameters of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalParameters {
    pub addresses: ProtocolAddresses,
    /// Recipient of Morpho Blue fee shares
    pub fee_recipient: Address,
    #[serde(default)]
    pub enabled_irms: BTreeSet<Address>,
    #[serde(default)]
    pub enabled_lltvs: BTreeSet<U256>,
    #[serde(default)]
    pub wrappers: BTreeMap<Address, Wrapper>,
}

impl GlobalParameters {
    /// The approval slot used when `spender` moves a holder's tokens.
    pub fn spender_role(&self, spender: Address) -> Option<SpenderRole> {
        if spender == self.addresses.morpho {
            Some(SpenderRole::Morpho)
        } else if spender == self.addresses.permit2 {
            Some(SpenderRole::Permit2)
        } else if spender == self.addresses.bundler {
            Some(SpenderRole::Bundler)
        } else {
            None
        }
    }

    pub fn role_address(&self, role: SpenderRole) -> Address {
        match role {
            SpenderRole::Morpho => self.addresses.morpho,
            SpenderRole::Permit2 => self.addresses.permit2,
            SpenderRole::Bundler => self.addresses.bundler,
        }
    }
}

/// A Morpho Blue account and the operators it authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub address: Address,
    #[serde(default)]
    pub authorizations: BTreeSet<Address>,
}

impl User {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            authorizations: BTreeSet::new(),
        }
    }

    pub fn is_authorized(&self, operator: Address) -> bool {
        operator == self.address || self.authorizations.contains(&operator)
    }
}

/// Serializable form of a [`SimulationState`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub chain_id: u64,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub global: GlobalParameters,
    #[serde(default)]
    pub markets: Vec<Market>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub vaults: Vec<Vault>,
    #[serde(default)]
    pub vault_market_configs: Vec<VaultMarketConfig>,
    #[serde(default)]
    pub vault_users: Vec<VaultUser>,
}

/// Every loaded entity at one block.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub chain_id: u64,
    pub block_number: u64,
    /// Timestamp operations accrue interest to
    pub timestamp: u64,
    pub global: Arc<GlobalParameters>,
    pub markets: EntityMap<MarketId, Market>,
    pub positions: EntityMap<(Address, MarketId), Position>,
    pub holdings: EntityMap<(Address, Address), Holding>,
    pub users: EntityMap<Address, User>,
    pub vaults: EntityMap<Address, Vault>,
    pub vault_market_configs: EntityMap<(Address, MarketId), VaultMarketConfig>,
    pub vault_users: EntityMap<(Address, Address), VaultUser>,
}

fn insert_unique<K: Ord + Clone + fmt::Debug, V>(
    map: &mut EntityMap<K, V>,
    entity: &'static str,
    key: K,
    value: V,
) -> Result<(), SnapshotError> {
    if map.contains_key(&key) {
        return Err(SnapshotError::Duplicate {
            entity,
            key: format!("{key:?}"),
        });
    }
    map.insert(key, value);
    Ok(())
}

impl SimulationState {
    /// An empty state at the given block.
    pub fn new(chain_id: u64, block_number: u64, timestamp: u64, global: GlobalParameters) -> Self {
        Self {
            chain_id,
            block_number,
            timestamp,
            global: Arc::new(global),
            markets: EntityMap::new(),
            positions: EntityMap::new(),
            holdings: EntityMap::new(),
            users: EntityMap::new(),
            vaults: EntityMap::new(),
            vault_market_configs: EntityMap::new(),
            vault_users: EntityMap::new(),
        }
    }

    /// Builds a state from a snapshot, rejecting duplicate keys, fees above
    /// the protocol maximums and positions on markets absent from the snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        let mut state = Self::new(
            snapshot.chain_id,
            snapshot.block_number,
            snapshot.block_timestamp,
            snapshot.global,
        );

        for market in snapshot.markets {
            if market.fee > MAX_FEE {
                return Err(SnapshotError::MarketFeeTooHigh {
                    market_id: market.id(),
                    fee: market.fee,
                    max: MAX_FEE,
                });
            }
            insert_unique(&mut state.markets, "market", market.id(), market)?;
        }
        for position in snapshot.positions {
            if !state.markets.contains_key(&position.market_id) {
                return Err(SnapshotError::DanglingPosition {
                    user: position.user,
                    market_id: position.market_id,
                });
            }
            let key = (position.user, position.market_id);
            insert_unique(&mut state.positions, "position", key, position)?;
        }
        for holding in snapshot.holdings {
            let key = (holding.user, holding.token);
            insert_unique(&mut state.holdings, "holding", key, holding)?;
        }
        for user in snapshot.users {
            insert_unique(&mut state.users, "user", user.address, user)?;
        }
        for vault in snapshot.vaults {
            if vault.fee > VAULT_MAX_FEE {
                return Err(SnapshotError::VaultFeeTooHigh {
                    vault: vault.address,
                    fee: vault.fee,
                    max: VAULT_MAX_FEE,
                });
            }
            insert_unique(&mut state.vaults, "vault", vault.address, vault)?;
        }
        for config in snapshot.vault_market_configs {
            let key = (config.vault, config.market_id);
            insert_unique(&mut state.vault_market_configs, "vault market config", key, config)?;
        }
        for vault_user in snapshot.vault_users {
            let key = (vault_user.vault, vault_user.user);
            insert_unique(&mut state.vault_users, "vault user", key, vault_user)?;
        }

        Ok(state)
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            chain_id: self.chain_id,
            block_number: self.block_number,
            block_timestamp: self.timestamp,
            global: self.global.as_ref().clone(),
            markets: self.markets.values().cloned().collect(),
            positions: self.positions.values().cloned().collect(),
            holdings: self.holdings.values().cloned().collect(),
            users: self.users.values().cloned().collect(),
            vaults: self.vaults.values().cloned().collect(),
            vault_market_configs: self.vault_market_configs.values().cloned().collect(),
            vault_users: self.vault_users.values().cloned().collect(),
        }
    }

    /// Moves the clock forward; nothing is accrued until an operation runs.
    pub fn with_block(mut self, block_number: u64, timestamp: u64) -> Self {
        self.block_number = block_number;
        self.timestamp = timestamp;
        self
    }

    // ==================== Accessors ====================

    pub fn get_market(&self, market_id: MarketId) -> Result<&Market, UnknownDataError> {
        self.markets
            .get(&market_id)
            .ok_or(UnknownDataError::Market { market_id })
    }

    pub fn get_position(
        &self,
        user: Address,
        market_id: MarketId,
    ) -> Result<&Position, UnknownDataError> {
        self.positions
            .get(&(user, market_id))
            .ok_or(UnknownDataError::Position { user, market_id })
    }

    pub fn get_holding(&self, user: Address, token: Address) -> Result<&Holding, UnknownDataError> {
        self.holdings
            .get(&(user, token))
            .ok_or(UnknownDataError::Holding { user, token })
    }

    pub fn get_user(&self, user: Address) -> Result<&User, UnknownDataError> {
        self.users.get(&user).ok_or(UnknownDataError::User { user })
    }

    pub fn get_vault(&self, vault: Address) -> Result<&Vault, UnknownDataError> {
        self.vaults.get(&vault).ok_or(UnknownDataError::Vault { vault })
    }

    pub fn get_vault_market_config(
        &self,
        vault: Address,
        market_id: MarketId,
    ) -> Result<&VaultMarketConfig, UnknownDataError> {
        self.vault_market_configs
            .get(&(vault, market_id))
            .ok_or(UnknownDataError::VaultMarketConfig { vault, market_id })
    }

    pub fn get_vault_user(
        &self,
        vault: Address,
        user: Address,
    ) -> Result<&VaultUser, UnknownDataError> {
        self.vault_users
            .get(&(vault, user))
            .ok_or(UnknownDataError::VaultUser { vault, user })
    }

    pub fn get_wrapper(&self, token: Address) -> Result<&Wrapper, UnknownDataError> {
        self.global
            .wrappers
            .get(&token)
            .ok_or(UnknownDataError::Wrapper { token })
    }

    // ==================== Writers ====================

    pub fn set_market(&mut self, market: Market) {
        self.markets.insert(market.id(), market);
    }

    pub fn set_position(&mut self, position: Position) {
        self.positions
            .insert((position.user, position.market_id), position);
    }

    pub fn set_holding(&mut self, holding: Holding) {
        self.holdings.insert((holding.user, holding.token), holding);
    }

    pub fn set_user(&mut self, user: User) {
        self.users.insert(user.address, user);
    }

    pub fn set_vault(&mut self, vault: Vault) {
        self.vaults.insert(vault.address, vault);
    }

    pub fn set_vault_market_config(&mut self, config: VaultMarketConfig) {
        self.vault_market_configs
            .insert((config.vault, config.market_id), config);
    }

    pub fn set_vault_user(&mut self, vault_user: VaultUser) {
        self.vault_users
            .insert((vault_user.vault, vault_user.user), vault_user);
    }

    // ==================== Derived views ====================

    /// A market is enabled when both its IRM and its LLTV are enabled.
    pub fn is_market_enabled(&self, market_id: MarketId) -> Result<bool, UnknownDataError> {
        let market = self.get_market(market_id)?;
        Ok(self.global.enabled_irms.contains(&market.params.irm)
            && self.global.enabled_lltvs.contains(&market.params.lltv))
    }

    /// `None` when a debt cannot be priced.
    pub fn is_healthy(&self, user: Address, market_id: MarketId) -> Result<Option<bool>, SimError> {
        let market = self.get_market(market_id)?;
        let position = self.get_position(user, market_id)?;
        Ok(position.is_healthy(market))
    }

    /// Assets the vault supplies to one market.
    pub fn vault_supply_assets(&self, vault: Address, market_id: MarketId) -> Result<U256, SimError> {
        let market = self.get_market(market_id)?;
        let position = self.get_position(vault, market_id)?;
        Ok(position.supply_assets(market))
    }

    /// Sum of the vault's supply over its withdraw queue.
    pub fn vault_total_assets(&self, vault: Address) -> Result<U256, SimError> {
        let vault = self.get_vault(vault)?;
        vault
            .withdraw_queue
            .iter()
            .try_fold(U256::ZERO, |total, market_id| {
                Ok(total.saturating_add(self.vault_supply_assets(vault.address, *market_id)?))
            })
    }

    /// Vault markets, in withdraw queue order, with their configs.
    pub fn vault_markets(
        &self,
        vault: Address,
    ) -> Result<Vec<(&Market, &VaultMarketConfig)>, UnknownDataError> {
        let vault = self.get_vault(vault)?;
        vault
            .withdraw_queue
            .iter()
            .map(|market_id| {
                Ok((
                    self.get_market(*market_id)?,
                    self.get_vault_market_config(vault.address, *market_id)?,
                ))
            })
            .collect()
    }

    pub fn positions_of(&self, user: Address) -> impl Iterator<Item = &Position> {
        self.positions
            .iter()
            .filter(move |((owner, _), _)| *owner == user)
            .map(|(_, position)| position)
    }

    /// Total balance of a token across every loaded holding.
    pub fn token_supply(&self, token: Address) -> U256 {
        self.holdings
            .values()
            .filter(|holding| holding.token == token)
            .fold(U256::ZERO, |total, holding| total.saturating_add(holding.balance))
    }

    // ==================== Accrual ====================

    /// Returns a new state with one market accrued to `timestamp`.
    pub fn accrue_interest(&self, market_id: MarketId, timestamp: u64) -> Result<Self, SimError> {
        let mut state = self.clone();
        state.accrue_market_mut(market_id, timestamp)?;
        Ok(state)
    }

    /// Returns a new state with every market accrued to `timestamp`.
    pub fn accrue_all(&self, timestamp: u64) -> Result<Self, SimError> {
        let mut state = self.clone();
        let ids: Vec<MarketId> = state.markets.keys().copied().collect();
        for market_id in ids {
            state.accrue_market_mut(market_id, timestamp)?;
        }
        Ok(state)
    }

    /// Returns a new state with a vault's markets and fee accrued to `timestamp`.
    pub fn accrue_vault(&self, vault: Address, timestamp: u64) -> Result<Self, SimError> {
        let mut state = self.clone();
        state.accrue_vault_mut(vault, timestamp)?;
        Ok(state)
    }

    /// Accrues a market in place and credits fee shares to the fee recipient.
    /// Nothing is written when no time elapsed.
    pub(crate) fn accrue_market_mut(
        &mut self,
        market_id: MarketId,
        timestamp: u64,
    ) -> Result<(), SimError> {
        let market = self.get_market(market_id)?;
        if market.last_update == timestamp {
            return Ok(());
        }
        let accrual = market.accrue_interest(timestamp)?;

        if !accrual.fee_shares.is_zero() {
            let mut recipient = self
                .get_position(self.global.fee_recipient, market_id)?
                .clone();
            recipient.supply_shares += accrual.fee_shares;
            self.set_position(recipient);
        }
        self.markets.insert(market_id, accrual.market);
        Ok(())
    }

    /// Accrues the vault's markets, then mints the performance fee. Returns
    /// the vault's new total assets.
    pub(crate) fn accrue_vault_mut(
        &mut self,
        vault_address: Address,
        timestamp: u64,
    ) -> Result<U256, SimError> {
        let queue = self.get_vault(vault_address)?.withdraw_queue.clone();
        for market_id in queue {
            self.accrue_market_mut(market_id, timestamp)?;
        }

        let total_assets = self.vault_total_assets(vault_address)?;
        let vault = self.get_vault(vault_address)?;
        if vault.last_total_assets == total_assets {
            return Ok(total_assets);
        }

        let fee_shares = vault.accrued_fee_shares(total_assets);
        let mut vault = vault.clone();
        if !fee_shares.is_zero() {
            let mut recipient = self
                .get_holding(vault.fee_recipient, vault.address)?
                .clone();
            recipient.credit(fee_shares)?;
            self.set_holding(recipient);
            vault.total_supply += fee_shares;
        }
        vault.last_total_assets = total_assets;
        self.set_vault(vault);

        Ok(total_assets)
    }
}
