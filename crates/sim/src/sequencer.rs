//! Ordered application of operations.
//!
//! The [`Sequencer`] applies a list of operations one after the other. An
//! operation carrying a callback runs it mid-flight: the handler applies its
//! direct effect, the callback's operations are applied to that intermediate
//! state through a nested [`Context`], and the handler then completes. This
//! models the reentrant composition of a bundler transaction (flash loans,
//! leverage loops) without any concurrency.
//!
//! Each operation is all-or-nothing: handlers work on a copy of the state
//! that is only kept when the whole operation, callbacks included, succeeds.
//!
//! # Example
//!
//! ```
//! use morpho_rs_sim::{GlobalParameters, Sequencer, SimulationState};
//!
//! let state = SimulationState::new(1, 1, 1_700_000_000, GlobalParameters::default());
//! let after = Sequencer::default().run(&state, &[]).unwrap();
//! assert_eq!(after, state);
//! ```

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MarketId, SimError, SimulationError};
use crate::handlers;
use crate::operation::{Callback, Operation};
use crate::state::SimulationState;

/// Default bound on callback nesting
pub const DEFAULT_MAX_CALLBACK_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Callbacks nested deeper than this fail with `CallbackDepthExceeded`
    pub max_callback_depth: usize,
    /// Check every position made riskier by a top-level operation
    pub check_solvency: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_callback_depth: DEFAULT_MAX_CALLBACK_DEPTH,
            check_solvency: true,
        }
    }
}

/// Applies operation lists to simulation states.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    config: SequencerConfig,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Applies `operations` in order and returns the final state. The input
    /// state is left untouched.
    pub fn run(
        &self,
        state: &SimulationState,
        operations: &[Operation],
    ) -> Result<SimulationState, SimError> {
        self.root().apply_all(state, operations, None)
    }

    /// Like [`Sequencer::run`], returning the state after each operation.
    pub fn run_steps(
        &self,
        state: &SimulationState,
        operations: &[Operation],
    ) -> Result<Vec<SimulationState>, SimError> {
        let mut steps = Vec::with_capacity(operations.len());
        self.root().apply_all(state, operations, Some(&mut steps))?;
        Ok(steps)
    }

    fn root(&self) -> Context {
        Context {
            config: self.config,
            depth: 0,
        }
    }
}

/// Nesting level an operation runs at.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    config: SequencerConfig,
    depth: usize,
}

impl Context {
    fn apply_all(
        &self,
        state: &SimulationState,
        operations: &[Operation],
        mut steps: Option<&mut Vec<SimulationState>>,
    ) -> Result<SimulationState, SimError> {
        let mut current = state.clone();

        for (index, operation) in operations.iter().enumerate() {
            debug!(index, kind = operation.kind(), depth = self.depth, "applying operation");

            match self.apply_one(&current, operation) {
                Ok(next) => current = next,
                Err(error) if operation.skip_revert => {
                    debug!(index, %error, "operation reverted, skipping");
                }
                Err(error) => {
                    return Err(SimError::Operation {
                        index,
                        operation: Box::new(operation.clone()),
                        source: Box::new(error),
                    })
                }
            }

            if let Some(steps) = steps.as_deref_mut() {
                steps.push(current.clone());
            }
        }

        Ok(current)
    }

    fn apply_one(
        &self,
        state: &SimulationState,
        operation: &Operation,
    ) -> Result<SimulationState, SimError> {
        let mut next = state.clone();
        handlers::apply(&mut next, operation, self)?;

        if self.depth == 0 && self.config.check_solvency {
            check_solvency(state, &next)?;
        }
        Ok(next)
    }

    /// Resolves `callback` against the in-flight state and applies its
    /// operations one level deeper.
    pub(crate) fn run_callback(
        &self,
        state: &mut SimulationState,
        callback: Option<&Callback>,
    ) -> Result<(), SimError> {
        let Some(callback) = callback else {
            return Ok(());
        };

        let depth = self.depth + 1;
        if depth > self.config.max_callback_depth {
            return Err(SimulationError::CallbackDepthExceeded {
                max_depth: self.config.max_callback_depth,
            }
            .into());
        }

        let operations = callback.resolve(state)?;
        let nested = Context {
            config: self.config,
            depth,
        };
        *state = nested.apply_all(state, &operations, None)?;
        Ok(())
    }
}

/// Checks the positions whose debt grew or whose collateral shrank between
/// `previous` and `next`.
fn check_solvency(previous: &SimulationState, next: &SimulationState) -> Result<(), SimError> {
    let riskier: Vec<(Address, MarketId)> = next
        .positions
        .changed_since(&previous.positions)
        .copied()
        .filter(|key| {
            let Some(position) = next.positions.get(key) else {
                return false;
            };
            match previous.positions.get(key) {
                Some(before) => {
                    position.borrow_shares > before.borrow_shares
                        || position.collateral < before.collateral
                }
                None => !position.borrow_shares.is_zero(),
            }
        })
        .collect();

    for (user, market_id) in riskier {
        let market = next.get_market(market_id)?;
        next.get_position(user, market_id)?.check_solvency(market)?;
    }
    Ok(())
}
