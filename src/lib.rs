//! vendsync - vending-platform synchronization engine
//!
//! Pulls terminal and transaction data for every vending-machine owner from
//! the vending platform's API, reconciles it into local storage idempotently,
//! and manages the lifecycle of each owner's API credential.

pub mod config;
pub mod crypto;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod sync;
pub mod test_utils;
pub mod upstream;
pub mod utils;
