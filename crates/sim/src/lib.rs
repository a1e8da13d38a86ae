//! Morpho Simulation Engine
//!
//! This crate previews the effect of Morpho Blue and MetaMorpho operations
//! on an in-memory snapshot of protocol state, before anything is sent
//! on-chain.
//!
//! # Overview
//!
//! - [`math`] and [`irm`]: fixed-point arithmetic with explicit rounding, and
//!   the Adaptive Curve interest rate model
//! - [`market`], [`position`], [`vault`], [`token`]: protocol entities
//! - [`state`]: the [`SimulationState`], a copy-on-write set of entity tables
//! - [`operation`]: the operations that can be simulated
//! - [`sequencer`]: applies operation lists, including nested callbacks
//! - [`planner`]: plans public reallocations to relieve a liquidity shortfall
//!
//! # Example
//!
//! ```
//! use alloy_primitives::{Address, U256};
//! use morpho_rs_sim::{
//!     Amount, BlueAction, GlobalParameters, Holding, Market, MarketParams, Operation, Position,
//!     ProtocolAddresses, Sequencer, SimulationState, SpenderRole, WAD,
//! };
//!
//! let (loan, morpho, alice) = (
//!     Address::repeat_byte(0x11),
//!     Address::repeat_byte(0x4D),
//!     Address::repeat_byte(0xA1),
//! );
//! let irm = Address::repeat_byte(0x44);
//! let lltv = U256::from(860_000_000_000_000_000u64);
//!
//! let params = MarketParams::new(loan, Address::repeat_byte(0x22), Address::ZERO, irm, lltv);
//! let market = Market::new(params, 1_700_000_000, U256::ZERO, None);
//! let market_id = market.id();
//!
//! let global = GlobalParameters {
//!     addresses: ProtocolAddresses { morpho, ..Default::default() },
//!     enabled_irms: [irm].into_iter().collect(),
//!     enabled_lltvs: [lltv].into_iter().collect(),
//!     ..Default::default()
//! };
//! let mut state = SimulationState::new(1, 1, 1_700_000_000, global);
//! state.set_market(market);
//! state.set_position(Position::empty(alice, market_id));
//! state.set_holding(
//!     Holding::new(alice, loan, U256::from(100) * WAD).with_allowance(SpenderRole::Morpho, U256::MAX),
//! );
//! state.set_holding(Holding::new(morpho, loan, U256::ZERO));
//!
//! let supply = Operation::blue(
//!     alice,
//!     BlueAction::Supply {
//!         market_id,
//!         amount: Amount::Assets(U256::from(40) * WAD),
//!         on_behalf: alice,
//!         callback: None,
//!     },
//! );
//! let after = Sequencer::default().run(&state, &[supply]).unwrap();
//!
//! assert_eq!(after.get_market(market_id).unwrap().liquidity(), U256::from(40) * WAD);
//! assert_eq!(after.get_holding(alice, loan).unwrap().balance, U256::from(60) * WAD);
//! ```

pub mod error;
pub mod handlers;
pub mod irm;
pub mod market;
pub mod math;
pub mod operation;
pub mod planner;
pub mod position;
pub mod sequencer;
pub mod state;
pub mod token;
pub mod vault;

// Re-export commonly used types
pub use error::{MarketId, SimError, SimulationError, SnapshotError, UnknownDataError};

// Market exports
pub use market::{AccrualResult, Market, MarketParams, MarketUpdate, MAX_FEE, ORACLE_PRICE_SCALE};

// Math exports
pub use math::{RoundingDirection, SECONDS_PER_YEAR, WAD};

// Entity exports
pub use position::Position;
pub use token::{Holding, Permit2Allowance, SpenderRole, Wrapper};
pub use vault::{
    FlowCaps, Pending, PublicAllocatorConfig, Vault, VaultMarketConfig, VaultUser,
    MAX_QUEUE_LENGTH, VAULT_MAX_FEE,
};

// State exports
pub use state::{EntityMap, GlobalParameters, ProtocolAddresses, SimulationState, Snapshot, User};

// Operation exports
pub use operation::{
    Action, Amount, BlueAction, Callback, Erc20Action, MarketAllocation, Operation, SwapAction,
    SwapOffsets, VaultAction, Withdrawal,
};

// Execution exports
pub use planner::{
    PlannedWithdrawal, PlannerConfig, ReallocationPlan, ReallocationPlanner, ReallocationRequest,
    DEFAULT_MAX_UTILIZATION,
};
pub use sequencer::{Sequencer, SequencerConfig, DEFAULT_MAX_CALLBACK_DEPTH};

// IRM exports
pub use irm::{
    ADJUSTMENT_SPEED, CURVE_STEEPNESS, INITIAL_RATE_AT_TARGET, MAX_RATE_AT_TARGET,
    MIN_RATE_AT_TARGET, TARGET_UTILIZATION,
};
