//! Operation descriptors accepted by the sequencer.
//!
//! An [`Operation`] pairs a sender with an [`Action`]. Actions are grouped by
//! protocol layer, and only the Blue actions that call back into the sender
//! (supply, repay, collateral supply and flash loans) carry a [`Callback`].
//!
//! On the wire an operation looks like:
//!
//! ```json
//! {
//!   "sender": "0x...",
//!   "action": {
//!     "protocol": "Blue",
//!     "op": { "type": "Supply", "market_id": "0x...", "amount": { "assets": "0x64" }, "on_behalf": "0x..." }
//!   },
//!   "skip_revert": false
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MarketId, SimError, SimulationError};
use crate::state::SimulationState;

/// Exactly one of an asset or a share quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Amount {
    Assets(U256),
    Shares(U256),
}

impl Amount {
    pub fn is_zero(&self) -> bool {
        match self {
            Amount::Assets(value) | Amount::Shares(value) => value.is_zero(),
        }
    }
}

/// Operations produced from the state at the point a callback runs.
pub type CallbackFn = dyn Fn(&SimulationState) -> Result<Vec<Operation>, SimError> + Send + Sync;

/// Operations executed while the calling operation is in flight.
#[derive(Clone)]
pub enum Callback {
    /// Fixed operations, known up front
    Static(Vec<Operation>),
    /// Operations computed from the intermediate state. Cannot be serialized.
    Dynamic(Arc<CallbackFn>),
}

impl Callback {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&SimulationState) -> Result<Vec<Operation>, SimError> + Send + Sync + 'static,
    {
        Callback::Dynamic(Arc::new(f))
    }

    /// Operations to run against `state`.
    pub fn resolve(&self, state: &SimulationState) -> Result<Vec<Operation>, SimError> {
        match self {
            Callback::Static(operations) => Ok(operations.clone()),
            Callback::Dynamic(f) => f(state),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Static(operations) => f.debug_tuple("Static").field(operations).finish(),
            Callback::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callback::Static(a), Callback::Static(b)) => a == b,
            (Callback::Dynamic(a), Callback::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for Callback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Callback::Static(operations) => operations.serialize(serializer),
            Callback::Dynamic(_) => Err(serde::ser::Error::custom(
                SimulationError::DynamicCallback,
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Callback {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Operation>::deserialize(deserializer).map(Callback::Static)
    }
}

/// Morpho Blue actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlueAction {
    Supply {
        market_id: MarketId,
        amount: Amount,
        on_behalf: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback: Option<Callback>,
    },
    Withdraw {
        market_id: MarketId,
        amount: Amount,
        on_behalf: Address,
        receiver: Address,
    },
    Borrow {
        market_id: MarketId,
        amount: Amount,
        on_behalf: Address,
        receiver: Address,
    },
    Repay {
        market_id: MarketId,
        amount: Amount,
        on_behalf: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback: Option<Callback>,
    },
    SupplyCollateral {
        market_id: MarketId,
        assets: U256,
        on_behalf: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback: Option<Callback>,
    },
    WithdrawCollateral {
        market_id: MarketId,
        assets: U256,
        on_behalf: Address,
        receiver: Address,
    },
    FlashLoan {
        token: Address,
        assets: U256,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback: Option<Callback>,
    },
    AccrueInterest {
        market_id: MarketId,
    },
    SetAuthorization {
        authorized: Address,
        is_authorized: bool,
    },
}

/// Target supply of a vault in one market; `U256::MAX` takes whatever the
/// withdrawals left over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAllocation {
    pub market_id: MarketId,
    pub assets: U256,
}

/// Assets pulled out of one market by a public reallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub market_id: MarketId,
    pub amount: U256,
}

/// MetaMorpho vault actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultAction {
    /// `Assets` is an ERC4626 deposit, `Shares` a mint
    Deposit {
        vault: Address,
        amount: Amount,
        receiver: Address,
    },
    /// `Assets` is an ERC4626 withdraw, `Shares` a redeem
    Withdraw {
        vault: Address,
        amount: Amount,
        owner: Address,
        receiver: Address,
    },
    AccrueInterest {
        vault: Address,
    },
    Reallocate {
        vault: Address,
        allocations: Vec<MarketAllocation>,
    },
    PublicReallocate {
        vault: Address,
        withdrawals: Vec<Withdrawal>,
        supply_market_id: MarketId,
    },
    SubmitCap {
        vault: Address,
        market_id: MarketId,
        cap: U256,
    },
    AcceptCap {
        vault: Address,
        market_id: MarketId,
    },
    SetSupplyQueue {
        vault: Address,
        supply_queue: Vec<MarketId>,
    },
    /// Rebuilds the withdraw queue from indexes into the current one; markets
    /// left out are removed
    UpdateWithdrawQueue {
        vault: Address,
        indexes: Vec<usize>,
    },
}

/// ERC20, permit and wrapper actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Erc20Action {
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    /// EIP-2612 signed approval
    Permit {
        owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
        nonce: U256,
        deadline: u64,
    },
    /// Permit2 signed allowance to the bundler
    Permit2 {
        owner: Address,
        token: Address,
        amount: U256,
        expiration: u64,
        nonce: U256,
    },
    /// Transfer pulled through Permit2
    Transfer2 {
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    Wrap {
        token: Address,
        amount: U256,
        receiver: Address,
    },
    Unwrap {
        token: Address,
        amount: U256,
        receiver: Address,
    },
}

/// Byte offsets of the 32-byte amount words inside swap calldata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwapOffsets {
    pub exact_amount: usize,
    pub limit_amount: usize,
    pub quoted_amount: usize,
}

/// Third-party swaps executed on a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SwapAction {
    /// Exact input
    Sell {
        src_token: Address,
        dst_token: Address,
        amount_in: U256,
        quoted_out: U256,
        min_out: U256,
        receiver: Address,
        #[serde(default)]
        calldata: Bytes,
        #[serde(default)]
        offsets: SwapOffsets,
    },
    /// Exact output
    Buy {
        src_token: Address,
        dst_token: Address,
        amount_out: U256,
        quoted_in: U256,
        max_in: U256,
        receiver: Address,
        #[serde(default)]
        calldata: Bytes,
        #[serde(default)]
        offsets: SwapOffsets,
    },
}

/// An action, tagged by the protocol layer it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", content = "op")]
pub enum Action {
    Blue(BlueAction),
    Vault(VaultAction),
    Erc20(Erc20Action),
    Swap(SwapAction),
}

/// An action performed by `sender`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub sender: Address,
    pub action: Action,
    /// Leave the state unchanged and continue when the action fails
    #[serde(default)]
    pub skip_revert: bool,
}

impl Operation {
    pub fn new(sender: Address, action: Action) -> Self {
        Self {
            sender,
            action,
            skip_revert: false,
        }
    }

    pub fn blue(sender: Address, action: BlueAction) -> Self {
        Self::new(sender, Action::Blue(action))
    }

    pub fn vault(sender: Address, action: VaultAction) -> Self {
        Self::new(sender, Action::Vault(action))
    }

    pub fn erc20(sender: Address, action: Erc20Action) -> Self {
        Self::new(sender, Action::Erc20(action))
    }

    pub fn swap(sender: Address, action: SwapAction) -> Self {
        Self::new(sender, Action::Swap(action))
    }

    pub fn with_skip_revert(mut self) -> Self {
        self.skip_revert = true;
        self
    }

    /// `Layer.Action` name, e.g. `Blue.Supply`.
    pub fn kind(&self) -> &'static str {
        match &self.action {
            Action::Blue(action) => match action {
                BlueAction::Supply { .. } => "Blue.Supply",
                BlueAction::Withdraw { .. } => "Blue.Withdraw",
                BlueAction::Borrow { .. } => "Blue.Borrow",
                BlueAction::Repay { .. } => "Blue.Repay",
                BlueAction::SupplyCollateral { .. } => "Blue.SupplyCollateral",
                BlueAction::WithdrawCollateral { .. } => "Blue.WithdrawCollateral",
                BlueAction::FlashLoan { .. } => "Blue.FlashLoan",
                BlueAction::AccrueInterest { .. } => "Blue.AccrueInterest",
                BlueAction::SetAuthorization { .. } => "Blue.SetAuthorization",
            },
            Action::Vault(action) => match action {
                VaultAction::Deposit { .. } => "MetaMorpho.Deposit",
                VaultAction::Withdraw { .. } => "MetaMorpho.Withdraw",
                VaultAction::AccrueInterest { .. } => "MetaMorpho.AccrueInterest",
                VaultAction::Reallocate { .. } => "MetaMorpho.Reallocate",
                VaultAction::PublicReallocate { .. } => "MetaMorpho.PublicReallocate",
                VaultAction::SubmitCap { .. } => "MetaMorpho.SubmitCap",
                VaultAction::AcceptCap { .. } => "MetaMorpho.AcceptCap",
                VaultAction::SetSupplyQueue { .. } => "MetaMorpho.SetSupplyQueue",
                VaultAction::UpdateWithdrawQueue { .. } => "MetaMorpho.UpdateWithdrawQueue",
            },
            Action::Erc20(action) => match action {
                Erc20Action::Transfer { .. } => "Erc20.Transfer",
                Erc20Action::Approve { .. } => "Erc20.Approve",
                Erc20Action::Permit { .. } => "Erc20.Permit",
                Erc20Action::Permit2 { .. } => "Erc20.Permit2",
                Erc20Action::Transfer2 { .. } => "Erc20.Transfer2",
                Erc20Action::Wrap { .. } => "Erc20.Wrap",
                Erc20Action::Unwrap { .. } => "Erc20.Unwrap",
            },
            Action::Swap(action) => match action {
                SwapAction::Sell { .. } => "Swap.Sell",
                SwapAction::Buy { .. } => "Swap.Buy",
            },
        }
    }

    /// The contract the action is addressed to, when it is not a singleton.
    pub fn acted_on(&self) -> Option<Address> {
        match &self.action {
            Action::Blue(_) => None,
            Action::Vault(
                VaultAction::Deposit { vault, .. }
                | VaultAction::Withdraw { vault, .. }
                | VaultAction::AccrueInterest { vault }
                | VaultAction::Reallocate { vault, .. }
                | VaultAction::PublicReallocate { vault, .. }
                | VaultAction::SubmitCap { vault, .. }
                | VaultAction::AcceptCap { vault, .. }
                | VaultAction::SetSupplyQueue { vault, .. }
                | VaultAction::UpdateWithdrawQueue { vault, .. },
            ) => Some(*vault),
            Action::Erc20(
                Erc20Action::Transfer { token, .. }
                | Erc20Action::Approve { token, .. }
                | Erc20Action::Permit { token, .. }
                | Erc20Action::Permit2 { token, .. }
                | Erc20Action::Transfer2 { token, .. }
                | Erc20Action::Wrap { token, .. }
                | Erc20Action::Unwrap { token, .. },
            ) => Some(*token),
            Action::Swap(_) => None,
        }
    }

    pub fn callback(&self) -> Option<&Callback> {
        match &self.action {
            Action::Blue(
                BlueAction::Supply { callback, .. }
                | BlueAction::Repay { callback, .. }
                | BlueAction::SupplyCollateral { callback, .. }
                | BlueAction::FlashLoan { callback, .. },
            ) => callback.as_ref(),
            _ => None,
        }
    }
}
