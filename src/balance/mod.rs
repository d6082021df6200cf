pub mod poller;

pub use poller::{BalancePoller, BalanceStore};
