//! Shared fixtures for the simulation integration tests.

#![allow(dead_code)]

use alloy_primitives::{Address, U256};
use morpho_rs_sim::{
    GlobalParameters, Holding, Market, MarketId, MarketParams, Position, ProtocolAddresses,
    PublicAllocatorConfig, SimulationState, SpenderRole, User, Vault, VaultMarketConfig, VaultUser,
    ORACLE_PRICE_SCALE, WAD,
};

pub const LOAN: Address = Address::repeat_byte(0x11);
pub const COLLATERAL: Address = Address::repeat_byte(0x22);
pub const IRM: Address = Address::repeat_byte(0x44);
pub const DISABLED_IRM: Address = Address::repeat_byte(0x45);

pub const MORPHO: Address = Address::repeat_byte(0x4D);
pub const PERMIT2: Address = Address::repeat_byte(0x42);
pub const BUNDLER: Address = Address::repeat_byte(0xBD);
pub const PUBLIC_ALLOCATOR: Address = Address::repeat_byte(0x9A);
pub const FEE_RECIPIENT: Address = Address::repeat_byte(0xFE);

pub const ALICE: Address = Address::repeat_byte(0xA1);
pub const BOB: Address = Address::repeat_byte(0xB0);
pub const BORROWER: Address = Address::repeat_byte(0xB1);
pub const VAULT: Address = Address::repeat_byte(0x5A);

pub const TIMESTAMP: u64 = 1_700_000_000;

pub fn wad(value: u64) -> U256 {
    U256::from(value) * WAD
}

pub fn lltv() -> U256 {
    U256::from(860_000_000_000_000_000u64)
}

/// A market lending LOAN against COLLATERAL at a 1:1 price, with one share
/// per asset on both sides.
pub fn market(oracle: u8, irm: Address, total_supply: u64, total_borrow: u64) -> Market {
    let params = MarketParams::new(LOAN, COLLATERAL, Address::repeat_byte(oracle), irm, lltv());
    Market::new(params, TIMESTAMP, U256::ZERO, None)
        .with_totals(
            wad(total_supply),
            wad(total_supply),
            wad(total_borrow),
            wad(total_borrow),
        )
        .with_price(ORACLE_PRICE_SCALE)
}

pub fn global() -> GlobalParameters {
    GlobalParameters {
        addresses: ProtocolAddresses {
            morpho: MORPHO,
            permit2: PERMIT2,
            bundler: BUNDLER,
            public_allocator: PUBLIC_ALLOCATOR,
        },
        fee_recipient: FEE_RECIPIENT,
        enabled_irms: [IRM].into_iter().collect(),
        enabled_lltvs: [lltv()].into_iter().collect(),
        ..Default::default()
    }
}

/// Protocol state with three enabled markets and one disabled market.
///
/// - A: 1000 supplied by Bob, 900 borrowed by the borrower
/// - B: 1000 supplied by Bob, nothing borrowed
/// - C: 500 supplied by Bob, untouched by most scenarios
/// - D: uses an IRM that is not enabled
///
/// Alice holds no loan tokens and 1000 collateral in B.
pub struct Fixture {
    pub state: SimulationState,
    pub a: MarketId,
    pub b: MarketId,
    pub c: MarketId,
    pub d: MarketId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut state = SimulationState::new(1, 18_000_000, TIMESTAMP, global());

        let markets = [
            market(0x33, IRM, 1_000, 900),
            market(0x34, IRM, 1_000, 0),
            market(0x35, IRM, 500, 0),
            market(0x36, DISABLED_IRM, 1_000, 0),
        ];
        let ids: Vec<MarketId> = markets.iter().map(Market::id).collect();
        for market in markets {
            let id = market.id();
            let supplied = market.total_supply_assets;
            state.set_market(market);
            state.set_position(Position::new(BOB, id, supplied, U256::ZERO, U256::ZERO));
            for user in [ALICE, BORROWER, FEE_RECIPIENT] {
                state.set_position(Position::empty(user, id));
            }
        }
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

        state.set_position(Position::new(BORROWER, a, U256::ZERO, wad(900), wad(2_000)));
        state.set_position(Position::new(ALICE, b, U256::ZERO, U256::ZERO, wad(1_000)));

        for user in [ALICE, BOB, BORROWER] {
            state.set_user(User::new(user));
        }

        // Morpho holds every unborrowed loan token and all collateral
        state.set_holding(Holding::new(MORPHO, LOAN, wad(100 + 1_000 + 500 + 1_000)));
        state.set_holding(Holding::new(MORPHO, COLLATERAL, wad(3_000)));
        for (user, loan, collateral) in [
            (ALICE, 0, 0),
            (BOB, 5_000, 0),
            (BORROWER, 1_000, 0),
            (BUNDLER, 0, 0),
        ] {
            state.set_holding(
                Holding::new(user, LOAN, wad(loan)).with_allowance(SpenderRole::Morpho, U256::MAX),
            );
            state.set_holding(
                Holding::new(user, COLLATERAL, wad(collateral))
                    .with_allowance(SpenderRole::Morpho, U256::MAX),
            );
        }

        Self { state, a, b, c, d }
    }
}

/// Target X is fully borrowed; the vault supplies 500 to X (cap 1000) and
/// 600 to Y, which has 400 to spare at 92% utilization and a 300 outflow cap.
pub struct VaultFixture {
    pub state: SimulationState,
    pub x: MarketId,
    pub y: MarketId,
}

impl VaultFixture {
    pub fn new() -> Self {
        let mut state = SimulationState::new(1, 18_000_000, TIMESTAMP, global());

        let x = market(0x33, IRM, 1_000, 1_000);
        let y = market(0x34, IRM, 1_000, 520);
        let (x_id, y_id) = (x.id(), y.id());
        state.set_market(x);
        state.set_market(y);

        state.set_position(Position::new(VAULT, x_id, wad(500), U256::ZERO, U256::ZERO));
        state.set_position(Position::new(VAULT, y_id, wad(600), U256::ZERO, U256::ZERO));
        state.set_vault_market_config(
            VaultMarketConfig::new(VAULT, x_id, wad(1_000)).with_flow_caps(wad(1_000), wad(300)),
        );
        state.set_vault_market_config(
            VaultMarketConfig::new(VAULT, y_id, wad(1_000)).with_flow_caps(U256::ZERO, wad(300)),
        );
        state.set_vault(Vault {
            address: VAULT,
            asset: LOAN,
            decimals_offset: 0,
            owner: ALICE,
            curator: ALICE,
            guardian: Address::ZERO,
            fee: U256::ZERO,
            fee_recipient: FEE_RECIPIENT,
            timelock: 86_400,
            pending_timelock: None,
            pending_guardian: None,
            total_supply: wad(1_100),
            last_total_assets: wad(1_100),
            supply_queue: vec![x_id, y_id],
            withdraw_queue: vec![x_id, y_id],
            public_allocator_config: Some(PublicAllocatorConfig {
                admin: ALICE,
                fee: U256::ZERO,
                accrued_fee: U256::ZERO,
            }),
        });

        state.set_holding(Holding::new(VAULT, LOAN, U256::ZERO));
        state.set_holding(Holding::new(MORPHO, LOAN, wad(480)));
        Self {
            state,
            x: x_id,
            y: y_id,
        }
    }
}

/// One interest-bearing market at arbitrary share prices, part of whose
/// supply belongs to a vault with a performance fee.
///
/// Bob owns the rest of the supply and all of the vault shares, the borrower
/// owes all of the debt against ample collateral, and Alice, Bob and the
/// borrower hold plenty of loan tokens.
#[derive(Debug, Clone)]
pub struct PricedMarket {
    pub market: Market,
    /// Supply shares of the vault, at most the market's total
    pub vault_shares: U256,
    pub vault_fee: U256,
    /// Vault shares outstanding per asset, in thousandths
    pub vault_shares_per_mille: u64,
}

impl PricedMarket {
    pub fn id(&self) -> MarketId {
        self.market.id()
    }

    pub fn state(&self) -> SimulationState {
        let market = &self.market;
        let id = market.id();
        let mut state = SimulationState::new(1, 18_000_000, TIMESTAMP, global());
        state.set_market(market.clone());

        let collateral = market.total_supply_assets * U256::from(4) + WAD;
        state.set_position(Position::new(
            BOB,
            id,
            market.total_supply_shares - self.vault_shares,
            U256::ZERO,
            U256::ZERO,
        ));
        state.set_position(Position::new(VAULT, id, self.vault_shares, U256::ZERO, U256::ZERO));
        state.set_position(Position::new(
            BORROWER,
            id,
            U256::ZERO,
            market.total_borrow_shares,
            collateral,
        ));
        for user in [ALICE, FEE_RECIPIENT] {
            state.set_position(Position::empty(user, id));
        }
        for user in [ALICE, BOB, BORROWER] {
            state.set_user(User::new(user));
        }

        state.set_holding(Holding::new(MORPHO, LOAN, market.liquidity()));
        state.set_holding(Holding::new(MORPHO, COLLATERAL, collateral));
        state.set_holding(Holding::new(VAULT, LOAN, U256::ZERO));
        for user in [ALICE, BOB, BORROWER] {
            state.set_holding(
                Holding::new(user, LOAN, wad(1_000_000_000_000))
                    .with_allowance(SpenderRole::Morpho, U256::MAX),
            );
            state.set_vault_user(VaultUser::new(VAULT, user, U256::MAX));
        }

        let total_assets = state.vault_supply_assets(VAULT, id).unwrap();
        let total_supply =
            total_assets * U256::from(self.vault_shares_per_mille) / U256::from(1_000);
        state.set_holding(Holding::new(BOB, VAULT, total_supply));
        for user in [ALICE, FEE_RECIPIENT] {
            state.set_holding(Holding::new(user, VAULT, U256::ZERO));
        }
        state.set_vault_market_config(VaultMarketConfig::new(VAULT, id, U256::MAX));
        state.set_vault(Vault {
            address: VAULT,
            asset: LOAN,
            decimals_offset: 0,
            owner: ALICE,
            curator: ALICE,
            guardian: Address::ZERO,
            fee: self.vault_fee,
            fee_recipient: FEE_RECIPIENT,
            timelock: 86_400,
            pending_timelock: None,
            pending_guardian: None,
            total_supply,
            last_total_assets: total_assets,
            supply_queue: vec![id],
            withdraw_queue: vec![id],
            public_allocator_config: None,
        });

        state
    }
}
