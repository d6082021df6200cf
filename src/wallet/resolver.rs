use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::types::{Chain, ChainFamily, WalletBinding, WalletKind};

/// Custodial session wallet state. Signing material is usable only while
/// the session is both authenticated and unlocked.
pub trait CustodialSession: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn is_unlocked(&self) -> bool;
    fn address_for(&self, chain: Chain) -> Option<String>;
}

/// Externally injected wallets, connected out-of-band per chain family
pub trait InjectedWalletProvider: Send + Sync {
    fn connected_address(&self, family: ChainFamily) -> Option<String>;
}

/// Maps the active chain to a signing surface.
///
/// Resolution order: an authenticated custodial session wins, even when
/// locked (the binding then carries `can_sign = false`, a state distinct
/// from having no wallet); otherwise an injected wallet bound to the chain
/// family; otherwise nothing. Each resolution is published on a watch
/// channel so background consumers see wallet/chain changes immediately;
/// re-resolution is last-write-wins.
pub struct WalletResolver {
    session: Arc<dyn CustodialSession>,
    injected: Arc<dyn InjectedWalletProvider>,
    binding_tx: watch::Sender<Option<WalletBinding>>,
}

impl WalletResolver {
    pub fn new(
        session: Arc<dyn CustodialSession>,
        injected: Arc<dyn InjectedWalletProvider>,
    ) -> Self {
        let (binding_tx, _) = watch::channel(None);
        Self {
            session,
            injected,
            binding_tx,
        }
    }

    /// Re-resolve the binding for `chain`. Call on chain switch, on
    /// external-wallet connect/disconnect, and on session changes.
    pub fn resolve(&self, chain: Chain) -> Option<WalletBinding> {
        let binding = self.resolve_inner(chain);
        debug!(?chain, resolved = binding.is_some(), "wallet re-resolved");
        self.binding_tx.send_replace(binding.clone());
        binding
    }

    fn resolve_inner(&self, chain: Chain) -> Option<WalletBinding> {
        if self.session.is_authenticated() {
            if let Some(address) = self.session.address_for(chain) {
                return Some(WalletBinding {
                    chain,
                    kind: WalletKind::Custodial,
                    address,
                    can_sign: self.session.is_unlocked(),
                });
            }
        }

        self.injected
            .connected_address(chain.family())
            .map(|address| WalletBinding {
                chain,
                kind: WalletKind::External,
                address,
                can_sign: true,
            })
    }

    /// Subscribe to binding changes (used by the balance poller)
    pub fn subscribe(&self) -> watch::Receiver<Option<WalletBinding>> {
        self.binding_tx.subscribe()
    }
}
