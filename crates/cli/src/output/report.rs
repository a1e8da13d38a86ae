//! Serializable views of simulation results, shared by the table and JSON
//! outputs.

use alloy_primitives::{Address, U256};
use morpho_rs_sim::{
    Market, MarketId, MarketParams, Operation, PlannedWithdrawal, Position, ReallocationPlan,
    ReallocationRequest, SimError, SimulationState,
};
use serde::Serialize;

/// Totals of one market.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub market_id: MarketId,
    pub total_supply_assets: U256,
    pub total_borrow_assets: U256,
    pub liquidity: U256,
    /// WAD-scaled
    pub utilization: U256,
}

impl From<&Market> for MarketSummary {
    fn from(market: &Market) -> Self {
        Self {
            market_id: market.id(),
            total_supply_assets: market.total_supply_assets,
            total_borrow_assets: market.total_borrow_assets,
            liquidity: market.liquidity(),
            utilization: market.utilization(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketDelta {
    pub index: usize,
    pub operation: &'static str,
    pub market_id: MarketId,
    pub supply_before: U256,
    pub supply_after: U256,
    pub borrow_before: U256,
    pub borrow_after: U256,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionDelta {
    pub index: usize,
    pub operation: &'static str,
    pub user: Address,
    pub market_id: MarketId,
    pub supply_shares_before: U256,
    pub supply_shares_after: U256,
    pub borrow_shares_before: U256,
    pub borrow_shares_after: U256,
    pub collateral_before: U256,
    pub collateral_after: U256,
}

/// Market and position changes, operation by operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub markets: Vec<MarketDelta>,
    pub positions: Vec<PositionDelta>,
}

pub fn simulation_report(
    initial: &SimulationState,
    steps: &[SimulationState],
    operations: &[Operation],
) -> SimulationReport {
    let mut report = SimulationReport::default();
    let mut previous = initial;

    for (index, (state, operation)) in steps.iter().zip(operations).enumerate() {
        let kind = operation.kind();

        for market_id in state.markets.changed_since(&previous.markets) {
            let Some(after) = state.markets.get(market_id) else {
                continue;
            };
            let (supply_before, borrow_before) = previous
                .markets
                .get(market_id)
                .map_or((U256::ZERO, U256::ZERO), |before| {
                    (before.total_supply_assets, before.total_borrow_assets)
                });
            report.markets.push(MarketDelta {
                index,
                operation: kind,
                market_id: *market_id,
                supply_before,
                supply_after: after.total_supply_assets,
                borrow_before,
                borrow_after: after.total_borrow_assets,
            });
        }

        for key in state.positions.changed_since(&previous.positions) {
            let Some(after) = state.positions.get(key) else {
                continue;
            };
            let before = previous.positions.get(key);
            let field = |f: fn(&Position) -> U256| before.map_or(U256::ZERO, f);
            report.positions.push(PositionDelta {
                index,
                operation: kind,
                user: after.user,
                market_id: after.market_id,
                supply_shares_before: field(|p| p.supply_shares),
                supply_shares_after: after.supply_shares,
                borrow_shares_before: field(|p| p.borrow_shares),
                borrow_shares_after: after.borrow_shares,
                collateral_before: field(|p| p.collateral),
                collateral_after: after.collateral,
            });
        }

        previous = state;
    }

    report
}

/// Every market after one operation.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub index: usize,
    pub operation: &'static str,
    pub markets: Vec<MarketSummary>,
}

pub fn step_summaries(
    initial: &SimulationState,
    steps: &[SimulationState],
    operations: &[Operation],
) -> Vec<StepSummary> {
    let summarize = |state: &SimulationState| -> Vec<MarketSummary> {
        state.markets.values().map(MarketSummary::from).collect()
    };

    let mut summaries = vec![StepSummary {
        index: 0,
        operation: "Initial",
        markets: summarize(initial),
    }];
    summaries.extend(
        steps
            .iter()
            .zip(operations)
            .enumerate()
            .map(|(index, (state, operation))| StepSummary {
                index: index + 1,
                operation: operation.kind(),
                markets: summarize(state),
            }),
    );
    summaries
}

/// A failed simulation: where it failed and why.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Index of the failing operation at each callback level, outermost first
    pub path: Vec<usize>,
    /// Kind of the operation at each level of `path`
    pub operations: Vec<&'static str>,
    pub error: String,
}

impl FailureReport {
    pub fn new(error: &SimError) -> Self {
        let mut operations = Vec::new();
        let mut current = error;
        while let SimError::Operation {
            operation, source, ..
        } = current
        {
            operations.push(operation.kind());
            current = source;
        }

        Self {
            path: error.operation_path(),
            operations,
            error: error.root_cause().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub market_id: MarketId,
    pub shortfall: U256,
    pub reallocated: U256,
    pub unfilled: U256,
    pub withdrawals: Vec<PlannedWithdrawal>,
    pub operations: Vec<Operation>,
    /// The target market once the plan is applied
    pub target: Option<MarketSummary>,
}

impl PlanReport {
    pub fn new(request: &ReallocationRequest, plan: &ReallocationPlan) -> Self {
        Self {
            market_id: request.market_id,
            shortfall: request.shortfall,
            reallocated: plan.reallocated,
            unfilled: plan.unfilled,
            withdrawals: plan.withdrawals.clone(),
            operations: plan.operations.clone(),
            target: plan
                .state
                .get_market(request.market_id)
                .ok()
                .map(MarketSummary::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketAccrual {
    pub market_id: MarketId,
    pub supply_before: U256,
    pub supply_after: U256,
    pub borrow_before: U256,
    pub borrow_after: U256,
    pub interest: U256,
    pub rate_at_target: Option<U256>,
    pub borrow_apy: f64,
}

pub fn accrual_report(
    before: &SimulationState,
    after: &SimulationState,
    timestamp: u64,
) -> Result<Vec<MarketAccrual>, SimError> {
    after
        .markets
        .values()
        .map(|market| -> Result<MarketAccrual, SimError> {
            let previous = before.get_market(market.id())?;
            Ok(MarketAccrual {
                market_id: market.id(),
                supply_before: previous.total_supply_assets,
                supply_after: market.total_supply_assets,
                borrow_before: previous.total_borrow_assets,
                borrow_after: market.total_borrow_assets,
                interest: market
                    .total_borrow_assets
                    .saturating_sub(previous.total_borrow_assets),
                rate_at_target: market.rate_at_target,
                borrow_apy: market.borrow_apy(timestamp)?,
            })
        })
        .collect()
}

/// A vault supplying to the market.
#[derive(Debug, Clone, Serialize)]
pub struct VaultAllocation {
    pub vault: Address,
    pub cap: U256,
    pub supply_assets: U256,
    pub max_in: Option<U256>,
    pub max_out: Option<U256>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketDetail {
    pub params: MarketParams,
    #[serde(flatten)]
    pub summary: MarketSummary,
    pub total_supply_shares: U256,
    pub total_borrow_shares: U256,
    pub fee: U256,
    pub last_update: u64,
    pub rate_at_target: Option<U256>,
    pub price: Option<U256>,
    pub borrow_apy: f64,
    pub supply_apy: f64,
    pub positions: usize,
    pub vaults: Vec<VaultAllocation>,
}

impl MarketDetail {
    pub fn new(state: &SimulationState, market_id: MarketId) -> Result<Self, SimError> {
        let market = state.get_market(market_id)?;
        let timestamp = state.timestamp.max(market.last_update);

        let vaults = state
            .vault_market_configs
            .values()
            .filter(|config| config.market_id == market_id)
            .map(|config| VaultAllocation {
                vault: config.vault,
                cap: config.cap,
                supply_assets: state
                    .get_position(config.vault, market_id)
                    .map_or(U256::ZERO, |position| position.supply_assets(market)),
                max_in: config.public_allocator_config.map(|flow| flow.max_in),
                max_out: config.public_allocator_config.map(|flow| flow.max_out),
            })
            .collect();

        Ok(Self {
            params: market.params,
            summary: MarketSummary::from(market),
            total_supply_shares: market.total_supply_shares,
            total_borrow_shares: market.total_borrow_shares,
            fee: market.fee,
            last_update: market.last_update,
            rate_at_target: market.rate_at_target,
            price: market.price,
            borrow_apy: market.borrow_apy(timestamp)?,
            supply_apy: market.supply_apy(timestamp)?,
            positions: state
                .positions
                .values()
                .filter(|position| position.market_id == market_id && !position.is_empty())
                .count(),
            vaults,
        })
    }
}
