//! Card ledger: stamps, rewards and redeem codes.

pub mod barcode;
pub mod card;
pub mod codes;
pub mod events;
pub mod ledger;
pub mod redemption;
pub mod service;
pub mod stamps;
pub mod store;

pub use card::{Card, CodeStatus, Meta, Purpose, RedeemCode};
pub use service::{LoyaltyError, LoyaltyService};
