//! Public reallocation planning.
//!
//! Given a market short on liquidity, the [`ReallocationPlanner`] looks for
//! vaults supplying to it that expose a public allocator, and pulls their
//! supply out of sibling markets that have liquidity to spare under their
//! utilization target. Each vault contributes through a single
//! `PublicReallocate`, executed through the [`Sequencer`] so the plan is
//! validated against the exact same rules as any other operation.

use std::cmp::min;
use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MarketId, SimError};
use crate::math::zero_floor_sub;
use crate::operation::{Operation, VaultAction, Withdrawal};
use crate::sequencer::Sequencer;
use crate::state::SimulationState;

/// Default utilization target (92%)
pub const DEFAULT_MAX_UTILIZATION: U256 = U256::from_limbs([920_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Utilization target of markets without an override (WAD-scaled)
    pub default_max_utilization: U256,
    /// Per-market utilization targets
    pub max_utilization: BTreeMap<MarketId, U256>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_max_utilization: DEFAULT_MAX_UTILIZATION,
            max_utilization: BTreeMap::new(),
        }
    }
}

impl PlannerConfig {
    pub fn max_utilization(&self, market_id: MarketId) -> U256 {
        self.max_utilization
            .get(&market_id)
            .copied()
            .unwrap_or(self.default_max_utilization)
    }
}

/// Liquidity wanted in a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReallocationRequest {
    pub market_id: MarketId,
    pub shortfall: U256,
}

impl ReallocationRequest {
    pub fn new(market_id: MarketId, shortfall: U256) -> Self {
        Self {
            market_id,
            shortfall,
        }
    }

    /// Supply the market lacks for `borrow_assets` to be borrowed while
    /// staying under its utilization target.
    pub fn for_borrow(
        state: &SimulationState,
        market_id: MarketId,
        borrow_assets: U256,
        config: &PlannerConfig,
    ) -> Result<Self, SimError> {
        let mut market = state
            .get_market(market_id)?
            .accrue_interest(state.timestamp)?
            .market;
        market.total_borrow_assets = market.total_borrow_assets.saturating_add(borrow_assets);

        let shortfall = market.supply_to_utilization(config.max_utilization(market_id));
        Ok(Self::new(market_id, shortfall))
    }
}

/// Assets one vault moves out of one source market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedWithdrawal {
    pub vault: Address,
    pub market_id: MarketId,
    pub assets: U256,
}

#[derive(Debug, Clone)]
pub struct ReallocationPlan {
    /// Withdrawals in vault then withdraw-queue order
    pub withdrawals: Vec<PlannedWithdrawal>,
    /// One `PublicReallocate` per contributing vault
    pub operations: Vec<Operation>,
    /// State after every operation of the plan
    pub state: SimulationState,
    /// Total moved into the target market
    pub reallocated: U256,
    /// Part of the shortfall no vault could cover
    pub unfilled: U256,
}

#[derive(Debug, Clone, Default)]
pub struct ReallocationPlanner {
    config: PlannerConfig,
    sequencer: Sequencer,
}

impl ReallocationPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            sequencer: Sequencer::default(),
        }
    }

    pub fn with_sequencer(mut self, sequencer: Sequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans and applies the reallocations covering `request`.
    ///
    /// Vaults are visited in ascending address order and their sources in
    /// withdraw-queue order. A shortfall that cannot be covered is reported in
    /// [`ReallocationPlan::unfilled`]; an operation rejected by the sequencer
    /// fails the whole plan.
    pub fn plan(
        &self,
        state: &SimulationState,
        request: &ReallocationRequest,
    ) -> Result<ReallocationPlan, SimError> {
        let target = request.market_id;
        state.get_market(target)?;

        let sender = state.global.addresses.public_allocator;
        let mut current = state.clone();
        let mut remaining = request.shortfall;
        let mut withdrawals = Vec::new();
        let mut operations = Vec::new();

        let vaults: Vec<Address> = state.vaults.keys().copied().collect();
        for vault in vaults {
            if remaining.is_zero() {
                break;
            }

            let planned = self.plan_vault(&current, vault, target, remaining)?;
            if planned.is_empty() {
                continue;
            }

            let mut sorted: Vec<Withdrawal> = planned
                .iter()
                .map(|withdrawal| Withdrawal {
                    market_id: withdrawal.market_id,
                    amount: withdrawal.assets,
                })
                .collect();
            sorted.sort_by_key(|withdrawal| withdrawal.market_id);

            let operation = Operation::vault(
                sender,
                VaultAction::PublicReallocate {
                    vault,
                    withdrawals: sorted,
                    supply_market_id: target,
                },
            );
            current = self
                .sequencer
                .run(&current, std::slice::from_ref(&operation))?;

            let moved = planned
                .iter()
                .fold(U256::ZERO, |total, withdrawal| total + withdrawal.assets);
            debug!(%vault, %moved, sources = planned.len(), "planned public reallocation");

            remaining -= moved;
            withdrawals.extend(planned);
            operations.push(operation);
        }

        let reallocated = request.shortfall - remaining;
        info!(
            market_id = %target,
            shortfall = %request.shortfall,
            %reallocated,
            unfilled = %remaining,
            "reallocation plan ready"
        );

        Ok(ReallocationPlan {
            withdrawals,
            operations,
            state: current,
            reallocated,
            unfilled: remaining,
        })
    }

    /// Sources one vault can draw from for `target`, up to `wanted`. Empty
    /// when the vault cannot supply the target through its public allocator.
    fn plan_vault(
        &self,
        state: &SimulationState,
        vault_address: Address,
        target: MarketId,
        wanted: U256,
    ) -> Result<Vec<PlannedWithdrawal>, SimError> {
        let vault = state.get_vault(vault_address)?;
        if vault.public_allocator_config.is_none() || !vault.withdraw_queue.contains(&target) {
            return Ok(Vec::new());
        }

        let target_config = state.get_vault_market_config(vault_address, target)?;
        let Some(target_flow) = target_config.public_allocator_config else {
            return Ok(Vec::new());
        };
        if !target_config.enabled {
            return Ok(Vec::new());
        }

        let target_market = state
            .get_market(target)?
            .accrue_interest(state.timestamp)?
            .market;
        let target_supply = state
            .get_position(vault_address, target)?
            .supply_assets(&target_market);
        let mut inflow = target_flow
            .max_in
            .min(zero_floor_sub(target_config.cap, target_supply));
        let mut remaining = wanted;
        let mut planned = Vec::new();

        for source in &vault.withdraw_queue {
            if remaining.is_zero() || inflow.is_zero() {
                break;
            }
            if *source == target {
                continue;
            }

            let config = state.get_vault_market_config(vault_address, *source)?;
            let Some(flow) = config.public_allocator_config else {
                continue;
            };
            if !config.enabled {
                continue;
            }

            let market = state
                .get_market(*source)?
                .accrue_interest(state.timestamp)?
                .market;
            let spare = market.borrow_to_utilization(self.config.max_utilization(*source));
            let supplied = state
                .get_position(vault_address, *source)?
                .supply_assets(&market);

            let assets = [flow.max_out, inflow, supplied, remaining]
                .into_iter()
                .fold(spare, min);
            if assets.is_zero() {
                continue;
            }

            planned.push(PlannedWithdrawal {
                vault: vault_address,
                market_id: *source,
                assets,
            });
            inflow -= assets;
            remaining -= assets;
        }

        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use crate::market::{Market, MarketParams};
    use crate::math::WAD;
    use crate::position::Position;
    use crate::state::{GlobalParameters, ProtocolAddresses};
    use crate::token::Holding;
    use crate::vault::{PublicAllocatorConfig, Vault, VaultMarketConfig};

    const ASSET: Address = Address::repeat_byte(0x11);
    const IRM: Address = Address::repeat_byte(0x44);
    const MORPHO: Address = Address::repeat_byte(0x4D);
    const PUBLIC_ALLOCATOR: Address = Address::repeat_byte(0x9A);
    const VAULT: Address = Address::repeat_byte(0x5A);
    const OTHER_VAULT: Address = Address::repeat_byte(0x5B);

    fn wad(value: u64) -> U256 {
        U256::from(value) * WAD
    }

    fn lltv() -> U256 {
        U256::from(860_000_000_000_000_000u64)
    }

    fn create_test_market(id: u8, total_supply: u64, total_borrow: u64) -> Market {
        let params = MarketParams::new(
            ASSET,
            Address::repeat_byte(id),
            Address::repeat_byte(id.wrapping_add(1)),
            IRM,
            lltv(),
        );
        Market::new(params, 1000, U256::ZERO, None).with_totals(
            wad(total_supply),
            wad(total_supply),
            wad(total_borrow),
            wad(total_borrow),
        )
    }

    fn create_test_vault(address: Address, queue: Vec<MarketId>) -> Vault {
        Vault {
            address,
            asset: ASSET,
            decimals_offset: 0,
            owner: Address::repeat_byte(0x01),
            curator: Address::repeat_byte(0x02),
            guardian: Address::ZERO,
            fee: U256::ZERO,
            fee_recipient: Address::repeat_byte(0xFE),
            timelock: 86_400,
            pending_timelock: None,
            pending_guardian: None,
            total_supply: U256::ZERO,
            last_total_assets: U256::ZERO,
            supply_queue: queue.clone(),
            withdraw_queue: queue,
            public_allocator_config: Some(PublicAllocatorConfig {
                admin: Address::repeat_byte(0x01),
                fee: U256::ZERO,
                accrued_fee: U256::ZERO,
            }),
        }
    }

    /// Target X is fully borrowed. The vault supplies 500 to X and 600 to Y,
    /// which has 400 to spare at 92% utilization.
    fn create_test_state() -> (SimulationState, MarketId, MarketId) {
        let global = GlobalParameters {
            addresses: ProtocolAddresses {
                morpho: MORPHO,
                public_allocator: PUBLIC_ALLOCATOR,
                ..Default::default()
            },
            enabled_irms: [IRM].into_iter().collect(),
            enabled_lltvs: [lltv()].into_iter().collect(),
            ..Default::default()
        };
        let mut state = SimulationState::new(1, 1, 1000, global);

        let x = create_test_market(0xA0, 1_000, 1_000);
        let y = create_test_market(0xB0, 1_000, 520);
        let (x_id, y_id) = (x.id(), y.id());
        state.set_market(x);
        state.set_market(y);

        state.set_position(Position::new(VAULT, x_id, wad(500), U256::ZERO, U256::ZERO));
        state.set_position(Position::new(VAULT, y_id, wad(600), U256::ZERO, U256::ZERO));
        state.set_vault_market_config(
            VaultMarketConfig::new(VAULT, x_id, wad(1_000)).with_flow_caps(wad(1_000), wad(300)),
        );
        state.set_vault_market_config(
            VaultMarketConfig::new(VAULT, y_id, wad(1_000)).with_flow_caps(wad(0), wad(300)),
        );
        let mut vault = create_test_vault(VAULT, vec![x_id, y_id]);
        vault.total_supply = wad(1_100);
        vault.last_total_assets = wad(1_100);
        state.set_vault(vault);

        state.set_holding(Holding::new(VAULT, ASSET, U256::ZERO));
        state.set_holding(Holding::new(MORPHO, ASSET, wad(10_000)));
        (state, x_id, y_id)
    }

    /// A second vault supplying 200 to Y, able to move up to 100 into X.
    fn add_other_vault(state: &mut SimulationState, x_id: MarketId, y_id: MarketId) {
        state.set_position(Position::empty(OTHER_VAULT, x_id));
        state.set_position(Position::new(OTHER_VAULT, y_id, wad(200), U256::ZERO, U256::ZERO));
        state.set_vault_market_config(
            VaultMarketConfig::new(OTHER_VAULT, x_id, wad(1_000)).with_flow_caps(wad(100), wad(0)),
        );
        state.set_vault_market_config(
            VaultMarketConfig::new(OTHER_VAULT, y_id, wad(1_000)).with_flow_caps(wad(0), wad(500)),
        );
        let mut vault = create_test_vault(OTHER_VAULT, vec![x_id, y_id]);
        vault.total_supply = wad(200);
        vault.last_total_assets = wad(200);
        state.set_vault(vault);
        state.set_holding(Holding::new(OTHER_VAULT, ASSET, U256::ZERO));
    }

    #[test]
    fn test_single_withdrawal_covers_shortfall() {
        let (state, x_id, y_id) = create_test_state();
        let plan = ReallocationPlanner::default()
            .plan(&state, &ReallocationRequest::new(x_id, wad(250)))
            .unwrap();

        assert_eq!(
            plan.withdrawals,
            vec![PlannedWithdrawal {
                vault: VAULT,
                market_id: y_id,
                assets: wad(250)
            }]
        );
        assert_eq!(plan.reallocated, wad(250));
        assert_eq!(plan.unfilled, U256::ZERO);
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].sender, PUBLIC_ALLOCATOR);

        assert_eq!(plan.state.get_market(x_id).unwrap().liquidity(), wad(250));
        assert_eq!(plan.state.vault_supply_assets(VAULT, x_id).unwrap(), wad(750));
        assert_eq!(plan.state.vault_supply_assets(VAULT, y_id).unwrap(), wad(350));
    }

    #[test]
    fn test_max_out_bounds_the_plan() {
        let (state, x_id, _) = create_test_state();
        let plan = ReallocationPlanner::default()
            .plan(&state, &ReallocationRequest::new(x_id, wad(500)))
            .unwrap();

        assert_eq!(plan.reallocated, wad(300));
        assert_eq!(plan.unfilled, wad(200));
    }

    #[test]
    fn test_utilization_override() {
        let (state, x_id, y_id) = create_test_state();
        let config = PlannerConfig {
            max_utilization: [(y_id, U256::from(600_000_000_000_000_000u64))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let plan = ReallocationPlanner::new(config)
            .plan(&state, &ReallocationRequest::new(x_id, wad(250)))
            .unwrap();

        // 60% of 1000 minus 520 borrowed
        assert_eq!(plan.reallocated, wad(80));
        assert_eq!(plan.unfilled, wad(170));
    }

    #[test]
    fn test_vaults_in_address_order() {
        let (mut state, x_id, y_id) = create_test_state();
        add_other_vault(&mut state, x_id, y_id);
        // Drain the first vault's outflow so the second one has to contribute
        let mut config = state.get_vault_market_config(VAULT, y_id).unwrap().clone();
        config = config.with_flow_caps(wad(0), wad(200));
        state.set_vault_market_config(config);

        let plan = ReallocationPlanner::default()
            .plan(&state, &ReallocationRequest::new(x_id, wad(250)))
            .unwrap();

        assert_eq!(
            plan.withdrawals,
            vec![
                PlannedWithdrawal {
                    vault: VAULT,
                    market_id: y_id,
                    assets: wad(200)
                },
                PlannedWithdrawal {
                    vault: OTHER_VAULT,
                    market_id: y_id,
                    assets: wad(50)
                },
            ]
        );
        assert_eq!(plan.operations.len(), 2);
        assert_eq!(plan.state.get_market(x_id).unwrap().liquidity(), wad(250));
    }

    #[test]
    fn test_per_vault_conservation() {
        let (mut state, x_id, y_id) = create_test_state();
        add_other_vault(&mut state, x_id, y_id);
        let plan = ReallocationPlanner::default()
            .plan(&state, &ReallocationRequest::new(x_id, wad(1_000)))
            .unwrap();

        for vault in [VAULT, OTHER_VAULT] {
            let withdrawn = plan
                .withdrawals
                .iter()
                .filter(|withdrawal| withdrawal.vault == vault)
                .fold(U256::ZERO, |total, withdrawal| total + withdrawal.assets);
            let supplied_before = state.vault_supply_assets(vault, x_id).unwrap();
            let supplied_after = plan.state.vault_supply_assets(vault, x_id).unwrap();
            assert_eq!(supplied_after - supplied_before, withdrawn);
        }
        assert_eq!(plan.reallocated + plan.unfilled, wad(1_000));
    }

    #[test]
    fn test_vault_without_public_allocator_is_skipped() {
        let (mut state, x_id, _) = create_test_state();
        let mut vault = state.get_vault(VAULT).unwrap().clone();
        vault.public_allocator_config = None;
        state.set_vault(vault);

        let plan = ReallocationPlanner::default()
            .plan(&state, &ReallocationRequest::new(x_id, wad(250)))
            .unwrap();
        assert!(plan.withdrawals.is_empty());
        assert_eq!(plan.unfilled, wad(250));
        assert_eq!(plan.state, state);
    }

    #[test]
    fn test_plan_fails_when_target_disabled() {
        let (mut state, x_id, _) = create_test_state();
        let mut global = (*state.global).clone();
        global.enabled_irms.clear();
        state.global = global.into();

        let error = ReallocationPlanner::default()
            .plan(&state, &ReallocationRequest::new(x_id, wad(250)))
            .unwrap_err();
        assert!(matches!(
            error.as_simulation(),
            Some(SimulationError::MarketNotEnabled { .. })
        ));
    }

    #[test]
    fn test_request_for_borrow() {
        let (state, x_id, y_id) = create_test_state();
        let config = PlannerConfig::default();

        // Y can lend 400 more before reaching 92%
        let request = ReallocationRequest::for_borrow(&state, y_id, wad(400), &config).unwrap();
        assert_eq!(request.shortfall, U256::ZERO);

        let request = ReallocationRequest::for_borrow(&state, x_id, wad(100), &config).unwrap();
        let expected = create_test_market(0xA0, 1_000, 1_100).supply_to_utilization(DEFAULT_MAX_UTILIZATION);
        assert_eq!(request.shortfall, expected);
        assert!(request.shortfall > wad(100));
    }

    #[test]
    fn test_config_from_json() {
        let config: PlannerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_max_utilization, DEFAULT_MAX_UTILIZATION);
        assert_eq!(config.max_utilization(MarketId::ZERO), DEFAULT_MAX_UTILIZATION);
    }
}
