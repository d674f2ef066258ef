pub mod auth;
pub mod backfill;
pub mod config;
pub mod export;
pub mod http;
pub mod ledger;
pub mod metrics_server;
pub mod observability;
pub mod photos;
pub mod registry;

pub use http::{router, AppState};
pub use ledger::{LedgerError, ReadingLedger};
