use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::adapters::AdapterRegistry;
use crate::tokens::TokenRegistry;
use crate::types::{Chain, TokenBalance, WalletBinding};

/// Latest known balances per (chain, address). Readers always see the most
/// recent successful snapshot; a failed poll never blanks an entry.
#[derive(Default)]
pub struct BalanceStore {
    snapshots: RwLock<HashMap<(Chain, String), Vec<TokenBalance>>>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balances(&self, chain: Chain, address: &str) -> Option<Vec<TokenBalance>> {
        self.snapshots
            .read()
            .get(&(chain, address.to_string()))
            .cloned()
    }

    fn store(&self, chain: Chain, address: &str, balances: Vec<TokenBalance>) {
        self.snapshots
            .write()
            .insert((chain, address.to_string()), balances);
    }
}

/// Periodically refreshes balances for whichever wallet binding is current.
/// Strictly best effort: a failed cycle logs and leaves the last snapshot
/// in place, and never surfaces an error to the trade flow.
pub struct BalancePoller {
    adapters: Arc<AdapterRegistry>,
    tokens: Arc<TokenRegistry>,
    store: Arc<BalanceStore>,
    interval: Duration,
}

impl BalancePoller {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        tokens: Arc<TokenRegistry>,
        store: Arc<BalanceStore>,
        interval: Duration,
    ) -> Self {
        Self {
            adapters,
            tokens,
            store,
            interval,
        }
    }

    /// Spawn the poll loop. It refreshes immediately whenever the binding
    /// changes and then on every interval tick while a wallet is bound.
    pub fn start(self, mut binding_rx: watch::Receiver<Option<WalletBinding>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = binding_rx.changed() => {
                        if changed.is_err() {
                            debug!("wallet binding channel closed, stopping balance poller");
                            return;
                        }
                        let binding = binding_rx.borrow_and_update().clone();
                        if let Some(binding) = binding {
                            self.refresh(&binding).await;
                        }
                        ticker.reset();
                    }
                    _ = ticker.tick() => {
                        let binding = binding_rx.borrow().clone();
                        if let Some(binding) = binding {
                            self.refresh(&binding).await;
                        }
                    }
                }
            }
        })
    }

    async fn refresh(&self, binding: &WalletBinding) {
        let Some(adapter) = self.adapters.get(binding.chain) else {
            return;
        };
        let tracked = self.tokens.tokens_for(binding.chain);
        match adapter.balances(&binding.address, tracked).await {
            Ok(balances) => {
                debug!(chain = ?binding.chain, address = %binding.address, count = balances.len(), "balances refreshed");
                self.store.store(binding.chain, &binding.address, balances);
            }
            Err(error) => {
                warn!(chain = ?binding.chain, address = %binding.address, %error, "balance poll failed, keeping last snapshot");
            }
        }
    }
}
