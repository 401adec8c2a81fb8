pub mod api;
pub mod indexer;
pub mod items;
pub mod metrics;
pub mod models;
pub mod notifier;
pub mod payment;
pub mod utils;
pub mod verifier;
