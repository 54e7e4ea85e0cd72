//! Operator surface of the bounty engine: configuration file and
//! environment handling, logging setup, ledger inspection and the stress
//! simulation behind the `bountyd` binary.

pub mod config;
pub mod inspect;
pub mod logging;
pub mod simulate;

pub use config::{LedgerSettings, LoggingConfig, NodeConfig};
pub use inspect::{inspect_ledger, LedgerSummary};
pub use simulate::{SimulationParams, SimulationReport};
