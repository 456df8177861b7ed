//! Environment overrides applied by `TransactionCoordinator::open`
//!
//! Kept as a single test in its own binary: it mutates process environment.

use txcoord_core::Error;
use txcoord_engine::config::{ENV_RECLAMATION_INTERVAL_MS, ENV_SHORT_TIMEOUT_MS};
use txcoord_engine::{CoordinatorConfig, TransactionCoordinator};

#[test]
fn open_applies_env_overrides() {
    std::env::set_var(ENV_SHORT_TIMEOUT_MS, "1234");
    std::env::set_var(ENV_RECLAMATION_INTERVAL_MS, "25");
    let coordinator = TransactionCoordinator::open(CoordinatorConfig::for_testing()).unwrap();
    assert_eq!(coordinator.config().short_timeout_ms, 1234);
    assert_eq!(coordinator.config().reclamation_interval_ms, 25);

    std::env::set_var(ENV_SHORT_TIMEOUT_MS, "soon");
    let result = TransactionCoordinator::open(CoordinatorConfig::for_testing());
    assert!(matches!(result, Err(Error::InvalidConfig(_))));

    std::env::remove_var(ENV_SHORT_TIMEOUT_MS);
    std::env::remove_var(ENV_RECLAMATION_INTERVAL_MS);
    let coordinator = TransactionCoordinator::open(CoordinatorConfig::for_testing()).unwrap();
    assert_eq!(
        coordinator.config().short_timeout_ms,
        CoordinatorConfig::for_testing().short_timeout_ms
    );
}
