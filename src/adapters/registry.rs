use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::adapters::aggregator::AggregatorAdapter;
use crate::adapters::ledger::{LedgerAdapter, LedgerRpcClient};
use crate::adapters::traits::ChainAdapter;
use crate::config::TradeConfig;
use crate::types::Chain;

/// Fixed chain -> adapter table, built once at startup. Provider branching
/// happens here and nowhere else.
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build the standard table from configuration: the ledger adapter for
    /// XRPL and one aggregator adapter per EVM chain.
    pub fn from_config(config: &TradeConfig) -> Self {
        let mut registry = Self::new();
        let http = reqwest::Client::new();

        let ledger_client = Arc::new(LedgerRpcClient::new(
            config.ledger_rpc_url.clone(),
            http.clone(),
        ));
        registry.register(Arc::new(LedgerAdapter::new(
            ledger_client,
            config.confirm_timeout_secs,
        )));

        for chain in Chain::all() {
            if let Some(rpc_url) = config.evm_rpc_url(chain) {
                registry.register(Arc::new(AggregatorAdapter::new(
                    chain,
                    config.aggregator_url.clone(),
                    rpc_url.to_string(),
                    http.clone(),
                    config.confirm_timeout_secs,
                )));
            }
        }

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        info!(chain = ?adapter.chain(), "registering chain adapter");
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: Chain) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain).cloned()
    }

    pub fn supports(&self, chain: Chain) -> bool {
        self.adapters.contains_key(&chain)
    }

    pub fn registered_chains(&self) -> Vec<Chain> {
        self.adapters.keys().copied().collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
