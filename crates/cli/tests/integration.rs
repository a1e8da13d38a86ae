//! Integration tests for the Morpho simulator CLI.
//!
//! These tests run the `morpho-sim` binary against the JSON snapshot and
//! operation fixtures in `tests/fixtures/`.
//!
//! # Test Categories
//!
//! - **Simulate tests**: operation files, steps, failures, callback depth
//! - **Reallocate tests**: shortfall and borrow driven plans
//! - **Market tests**: market detail and interest accrual
//! - **CLI validation tests**: Argument parsing, help text, error handling
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p morpho-rs-cli --test integration
//! ```

mod integration {
    pub mod helpers;
    pub mod simulate_tests;
    pub mod reallocate_tests;
    pub mod market_tests;
    pub mod cli_validation_tests;
}
