pub mod client;
pub mod ids;
pub mod notify;
pub mod sync;

pub use client::{HttpWalletBackend, WalletBackend, WalletError};
pub use ids::WalletIds;
pub use sync::{BatchReport, SyncOutcome, WalletObjectSynchronizer};
