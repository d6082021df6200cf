use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::Chain;

/// Runtime configuration for the trade core
#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// XRPL JSON-RPC endpoint
    pub ledger_rpc_url: String,
    /// Swap-aggregator API base URL
    pub aggregator_url: String,
    /// EVM JSON-RPC endpoints
    pub ethereum_rpc_url: String,
    pub bnb_rpc_url: String,
    pub polygon_rpc_url: String,
    pub base_rpc_url: String,
    /// Quote debounce window in milliseconds
    pub quote_debounce_ms: u64,
    /// Balance refresh interval in seconds
    pub balance_poll_secs: u64,
    /// Whether a missing trustline is provisioned automatically before a swap
    pub auto_trustline: bool,
    /// Ceiling limit used when establishing a trustline
    pub trustline_limit: Decimal,
    /// Seconds to wait for a settlement signal before reporting a timeout
    pub confirm_timeout_secs: u64,
}

impl TradeConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            ledger_rpc_url: std::env::var("LEDGER_RPC_URL")
                .unwrap_or_else(|_| "https://xrplcluster.com".to_string()),
            aggregator_url: std::env::var("AGGREGATOR_URL")
                .unwrap_or_else(|_| "https://open-api.openocean.finance/v4".to_string()),
            ethereum_rpc_url: std::env::var("ETHEREUM_RPC_URL")
                .unwrap_or_else(|_| "https://eth.llamarpc.com".to_string()),
            bnb_rpc_url: std::env::var("BNB_RPC_URL")
                .unwrap_or_else(|_| "https://bsc-dataseed.binance.org".to_string()),
            polygon_rpc_url: std::env::var("POLYGON_RPC_URL")
                .unwrap_or_else(|_| "https://polygon-rpc.com".to_string()),
            base_rpc_url: std::env::var("BASE_RPC_URL")
                .unwrap_or_else(|_| "https://mainnet.base.org".to_string()),
            quote_debounce_ms: std::env::var("QUOTE_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(800),
            balance_poll_secs: std::env::var("BALANCE_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            auto_trustline: std::env::var("AUTO_TRUSTLINE")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            trustline_limit: dec!(1_000_000_000),
            confirm_timeout_secs: std::env::var("CONFIRM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        })
    }

    pub fn evm_rpc_url(&self, chain: Chain) -> Option<&str> {
        match chain {
            Chain::Ethereum => Some(&self.ethereum_rpc_url),
            Chain::BnbChain => Some(&self.bnb_rpc_url),
            Chain::Polygon => Some(&self.polygon_rpc_url),
            Chain::Base => Some(&self.base_rpc_url),
            Chain::Xrpl => None,
        }
    }
}
