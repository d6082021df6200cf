//! Multi-chain swap quoting and execution.
//!
//! The crate is organized around one [`adapters::ChainAdapter`] per
//! supported chain, looked up through an [`adapters::AdapterRegistry`].
//! Above the adapters sit the interactive pieces: a debounced
//! [`quote_engine::QuoteEngine`], a [`wallet::WalletResolver`] that picks
//! the signing wallet for the active chain, an idempotent
//! [`trustline::TrustlineProvisioner`] for issued assets on the ledger
//! chain, a staged [`execution::SwapExecutor`], and a best-effort
//! [`balance::BalancePoller`].

pub mod adapters;
pub mod balance;
pub mod config;
pub mod error;
pub mod execution;
pub mod quote_engine;
pub mod tokens;
pub mod trustline;
pub mod types;
pub mod wallet;

pub use adapters::{AdapterRegistry, ChainAdapter};
pub use balance::{BalancePoller, BalanceStore};
pub use config::TradeConfig;
pub use error::{TradeError, TradeResult};
pub use execution::{SwapExecutor, SwapOutcome, SwapStage};
pub use quote_engine::{QuoteEngine, QuoteEvent};
pub use tokens::TokenRegistry;
pub use trustline::{TrustlineOutcome, TrustlineProvisioner};
pub use types::{Chain, Quote, QuoteRequest, SlippagePct, Token, TradeContext};
pub use wallet::{WalletResolver, WalletSigner};
