//! Error types for the simulation library.
//!
//! Failures come in two families. [`UnknownDataError`] means the loaded
//! snapshot lacks an entity an operation needs: the snapshot is incomplete, the
//! operation may be fine. [`SimulationError`] means the operation breaks a
//! protocol rule against a complete snapshot. [`SimError`] carries either, and
//! the sequencer wraps it with the failing operation and its index.

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

use crate::operation::Operation;

/// Type alias for a 32-byte market ID
pub type MarketId = B256;

/// The snapshot lacks an entity required by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownDataError {
    #[error("Unknown market {market_id}")]
    Market { market_id: MarketId },

    #[error("Unknown position of user {user} in market {market_id}")]
    Position { user: Address, market_id: MarketId },

    #[error("Unknown holding of user {user} for token {token}")]
    Holding { user: Address, token: Address },

    #[error("Unknown user {user}")]
    User { user: Address },

    #[error("Unknown vault {vault}")]
    Vault { vault: Address },

    #[error("Unknown config of market {market_id} in vault {vault}")]
    VaultMarketConfig { vault: Address, market_id: MarketId },

    #[error("Unknown user {user} of vault {vault}")]
    VaultUser { vault: Address, user: Address },

    #[error("Unknown allowance of {owner} to spender {spender} for token {token}")]
    Allowance {
        owner: Address,
        token: Address,
        spender: Address,
    },

    #[error("Unknown permit data of user {user} for token {token}")]
    PermitData { user: Address, token: Address },

    #[error("Token {token} is not a known wrapper")]
    Wrapper { token: Address },
}

/// An operation violates a protocol rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// Balance too low for a debit
    #[error("Insufficient balance of {user} for token {token}: has {balance}, needs {required}")]
    InsufficientBalance {
        user: Address,
        token: Address,
        balance: U256,
        required: U256,
    },

    /// Allowance too low for a third-party debit
    #[error("Insufficient allowance of {owner} to {spender} for token {token}: has {allowance}, needs {required}")]
    InsufficientAllowance {
        owner: Address,
        token: Address,
        spender: Address,
        allowance: U256,
        required: U256,
    },

    #[error("Invalid nonce for {user} on token {token}: expected {expected}, got {got}")]
    InvalidNonce {
        user: Address,
        token: Address,
        expected: U256,
        got: U256,
    },

    #[error("Nonce of {user} on token {token} cannot advance")]
    NonceOverflow { user: Address, token: Address },

    #[error("Signature of {user} for token {token} expired at {deadline} (timestamp {timestamp})")]
    ExpiredSignature {
        user: Address,
        token: Address,
        deadline: u64,
        timestamp: u64,
    },

    /// The token refuses transfers from or to this holder
    #[error("Transfers of token {token} are paused for {user}")]
    TransferPaused { user: Address, token: Address },

    #[error("Market {market_id} is not enabled")]
    MarketNotEnabled { market_id: MarketId },

    /// Borrow would exceed supply
    #[error("Insufficient liquidity in market {market_id}")]
    InsufficientLiquidity { market_id: MarketId },

    /// Insufficient position for operation
    #[error("Insufficient position for user {user} in market {market_id}")]
    InsufficientPosition { user: Address, market_id: MarketId },

    /// Insufficient collateral for the position's debt
    #[error("Insufficient collateral for user {user} in market {market_id}")]
    InsufficientCollateral { user: Address, market_id: MarketId },

    #[error("Oracle price unknown for market {market_id}")]
    UnknownOraclePrice { market_id: MarketId },

    #[error("Zero amount")]
    ZeroAmount,

    #[error("{operator} is not authorized to manage positions of {on_behalf}")]
    Unauthorized { operator: Address, on_behalf: Address },

    /// Interest accrual was attempted with a timestamp before the last update
    #[error("Invalid interest accrual on market {market_id}: timestamp {timestamp} is before last update {last_update}")]
    InvalidInterestAccrual {
        market_id: MarketId,
        timestamp: u64,
        last_update: u64,
    },

    #[error("Fee {fee} of market {market_id} exceeds the maximum")]
    MaxFeeExceeded { market_id: MarketId, fee: U256 },

    /// All supply caps have been reached during a vault deposit
    #[error("All caps reached for vault {vault}: {remaining} assets could not be deposited")]
    AllCapsReached { vault: Address, remaining: U256 },

    /// Not enough liquidity for a vault withdrawal
    #[error("Not enough liquidity for vault {vault}: {remaining} assets could not be withdrawn")]
    NotEnoughLiquidity { vault: Address, remaining: U256 },

    #[error("Supply cap exceeded for market {market_id} in vault {vault}: cap is {cap}")]
    SupplyCapExceeded {
        vault: Address,
        market_id: MarketId,
        cap: U256,
    },

    /// Supply into a market with a zero cap
    #[error("Unauthorized market {market_id} in vault {vault}")]
    UnauthorizedMarket { vault: Address, market_id: MarketId },

    #[error("Market {market_id} not enabled in vault {vault}")]
    VaultMarketNotEnabled { vault: Address, market_id: MarketId },

    /// Total supplied differs from total withdrawn
    #[error("Inconsistent reallocation in vault {vault}: supplied {supplied}, withdrawn {withdrawn}")]
    InconsistentReallocation {
        vault: Address,
        supplied: U256,
        withdrawn: U256,
    },

    #[error("Public allocator not configured for vault {vault}")]
    PublicAllocatorNotConfigured { vault: Address },

    #[error("Empty withdrawals list for vault {vault}")]
    EmptyWithdrawals { vault: Address },

    #[error("Withdrawals not sorted for vault {vault}")]
    WithdrawalsNotSorted { vault: Address },

    #[error("Deposit market {market_id} included in withdrawals for vault {vault}")]
    DepositMarketInWithdrawals { vault: Address, market_id: MarketId },

    #[error("Max inflow exceeded for market {market_id} in vault {vault}")]
    MaxInflowExceeded { vault: Address, market_id: MarketId },

    #[error("Max outflow exceeded for market {market_id} in vault {vault}")]
    MaxOutflowExceeded { vault: Address, market_id: MarketId },

    /// Withdrawal larger than the vault's supply in the market
    #[error("Vault {vault} does not supply enough to market {market_id}")]
    NotEnoughSupply { vault: Address, market_id: MarketId },

    #[error("{sender} is not an allocator of vault {vault}")]
    NotAllocatorRole { vault: Address, sender: Address },

    #[error("{sender} is not the curator of vault {vault}")]
    NotCuratorRole { vault: Address, sender: Address },

    #[error("Cap of market {market_id} in vault {vault} is already set")]
    AlreadySet { vault: Address, market_id: MarketId },

    #[error("A cap of market {market_id} in vault {vault} is already pending")]
    AlreadyPending { vault: Address, market_id: MarketId },

    #[error("Market {market_id} of vault {vault} is pending removal")]
    PendingRemoval { vault: Address, market_id: MarketId },

    #[error("Loan token of market {market_id} is not the asset of vault {vault}")]
    InconsistentAsset { vault: Address, market_id: MarketId },

    #[error("No pending cap for market {market_id} in vault {vault}")]
    NoPendingValue { vault: Address, market_id: MarketId },

    #[error("Timelock of vault {vault} not elapsed: valid at {valid_at}, timestamp {timestamp}")]
    TimelockNotElapsed {
        vault: Address,
        valid_at: u64,
        timestamp: u64,
    },

    #[error("Market {market_id} cannot be removed from vault {vault}")]
    InvalidMarketRemoval { vault: Address, market_id: MarketId },

    #[error("Market {market_id} appears twice in the queue of vault {vault}")]
    DuplicateMarket { vault: Address, market_id: MarketId },

    #[error("Queue index {index} out of bounds for vault {vault}")]
    InvalidQueueIndex { vault: Address, index: usize },

    #[error("Queue of vault {vault} exceeds {max} markets")]
    MaxQueueLengthExceeded { vault: Address, max: usize },

    #[error("Callback nesting exceeds the maximum depth of {max_depth}")]
    CallbackDepthExceeded { max_depth: usize },

    #[error("Swap calldata offset {offset} out of bounds ({len} bytes)")]
    InvalidSwapOffset { offset: usize, len: usize },

    #[error("Swap quote {quoted} breaks the limit {limit}")]
    SlippageExceeded { quoted: U256, limit: U256 },

    /// A dynamic callback cannot be encoded
    #[error("Dynamic callbacks cannot be serialized")]
    DynamicCallback,
}

/// Errors returned by every state transition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    UnknownData(#[from] UnknownDataError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// An operation of a sequence failed; nested once per callback level
    #[error("Operation {index} ({}) failed: {source}", operation.kind())]
    Operation {
        index: usize,
        operation: Box<Operation>,
        source: Box<SimError>,
    },
}

impl SimError {
    /// Strips the positional wrappers added by the sequencer.
    pub fn root_cause(&self) -> &SimError {
        let mut error = self;
        while let SimError::Operation { source, .. } = error {
            error = source;
        }
        error
    }

    /// Index path of the failing operation, outermost first.
    pub fn operation_path(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut error = self;
        while let SimError::Operation { index, source, .. } = error {
            path.push(*index);
            error = source;
        }
        path
    }

    /// The protocol rule violated, if any.
    pub fn as_simulation(&self) -> Option<&SimulationError> {
        match self.root_cause() {
            SimError::Simulation(error) => Some(error),
            _ => None,
        }
    }

    /// The missing entity, if any.
    pub fn as_unknown_data(&self) -> Option<&UnknownDataError> {
        match self.root_cause() {
            SimError::UnknownData(error) => Some(error),
            _ => None,
        }
    }
}

/// A snapshot cannot be turned into a simulation state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("Duplicate {entity} entry: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Position of {user} references unknown market {market_id}")]
    DanglingPosition { user: Address, market_id: MarketId },

    #[error("Fee {fee} of market {market_id} exceeds the maximum of {max}")]
    MarketFeeTooHigh {
        market_id: MarketId,
        fee: U256,
        max: U256,
    },

    #[error("Performance fee {fee} of vault {vault} exceeds the maximum of {max}")]
    VaultFeeTooHigh { vault: Address, fee: U256, max: U256 },
}
