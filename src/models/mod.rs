pub mod abi;
pub mod common;
pub mod errors;
pub mod events;
pub mod item;
pub mod payment;
pub mod verification;
