use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapters::AdapterRegistry;
use crate::error::{SignError, TradeError};
use crate::trustline::TrustlineProvisioner;
use crate::types::{AssetId, ChainFamily, Settlement, SwapIntent, TradeContext};
use crate::wallet::WalletSigner;

/// Stages of one execution run, in order. Failures carry the stage they
/// were produced at so the caller can render stage-appropriate guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStage {
    Validating,
    TrustlineCheck,
    TrustlineSubmit,
    BuildingExecution,
    Signing,
    Submitting,
    Confirming,
}

impl std::fmt::Display for SwapStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwapStage::Validating => "validating",
            SwapStage::TrustlineCheck => "trustline check",
            SwapStage::TrustlineSubmit => "trustline submit",
            SwapStage::BuildingExecution => "building execution",
            SwapStage::Signing => "signing",
            SwapStage::Submitting => "submitting",
            SwapStage::Confirming => "confirming",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("swap failed while {stage}: {reason}")]
pub struct SwapFailure {
    pub stage: SwapStage,
    #[source]
    pub reason: TradeError,
}

impl SwapFailure {
    fn at(stage: SwapStage, reason: TradeError) -> SwapFailure {
        SwapFailure { stage, reason }
    }

    /// Whether the failure came from the user declining to sign. Distinct
    /// from wallet unavailability; neither is retryable.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self.reason, TradeError::Sign(SignError::Rejected))
    }
}

/// Terminal outcome of one SwapIntent. The intent is consumed either way;
/// a retry starts from a fresh intent built on current inputs.
#[derive(Debug)]
pub enum SwapOutcome {
    Settled(Settlement),
    Failed(SwapFailure),
}

/// Release-on-drop membership in the per-wallet in-flight set
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    address: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.address);
    }
}

/// Sequences trustline provisioning, plan construction, signing,
/// submission and confirmation as one transactional unit from the
/// caller's perspective. Once past validation a run is not cancellable;
/// it reaches Settled or Failed.
pub struct SwapExecutor {
    registry: Arc<AdapterRegistry>,
    provisioner: Arc<TrustlineProvisioner>,
    signer: Arc<dyn WalletSigner>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SwapExecutor {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        provisioner: Arc<TrustlineProvisioner>,
        signer: Arc<dyn WalletSigner>,
    ) -> Self {
        Self {
            registry,
            provisioner,
            signer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[instrument(skip(self, ctx, intent), fields(intent_id = %intent.id, chain = ?intent.chain))]
    pub async fn submit(&self, ctx: &TradeContext, intent: SwapIntent) -> SwapOutcome {
        match self.run(ctx, &intent).await {
            Ok(settlement) => {
                info!(tx_ref = %settlement.tx_ref.0, "swap settled");
                SwapOutcome::Settled(settlement)
            }
            Err(failure) => {
                warn!(stage = %failure.stage, reason = %failure.reason, "swap failed");
                SwapOutcome::Failed(failure)
            }
        }
    }

    async fn run(&self, ctx: &TradeContext, intent: &SwapIntent) -> Result<Settlement, SwapFailure> {
        // Validating: local checks only, nothing leaves the process
        if intent.amount <= Decimal::ZERO {
            return Err(SwapFailure::at(
                SwapStage::Validating,
                TradeError::InvalidInput("amount must be positive".to_string()),
            ));
        }
        if intent.from_token == intent.to_token {
            return Err(SwapFailure::at(
                SwapStage::Validating,
                TradeError::InvalidInput("source and destination tokens are the same".to_string()),
            ));
        }
        let wallet = ctx
            .wallet
            .as_ref()
            .filter(|w| w.address == intent.wallet.address)
            .ok_or_else(|| {
                SwapFailure::at(SwapStage::Validating, TradeError::NoWallet(intent.chain))
            })?;
        if !wallet.can_sign {
            return Err(SwapFailure::at(
                SwapStage::Validating,
                TradeError::WalletLocked,
            ));
        }

        // One run per wallet binding; a concurrent submit is rejected, not
        // queued
        let _guard = {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(wallet.address.clone()) {
                return Err(SwapFailure::at(
                    SwapStage::Validating,
                    TradeError::SwapInFlight,
                ));
            }
            InFlightGuard {
                in_flight: self.in_flight.clone(),
                address: wallet.address.clone(),
            }
        };

        let adapter = self.registry.get(intent.chain).ok_or_else(|| {
            SwapFailure::at(SwapStage::Validating, TradeError::UnsupportedChain(intent.chain))
        })?;

        // Trustline stages: ledger chain, issued destination, auto flag on.
        // With the flag off a missing line surfaces from the build step.
        if intent.chain.family() == ChainFamily::Ledger && ctx.auto_trustline {
            if let AssetId::Issued { currency, issuer } = &intent.to_token.asset {
                let present = self
                    .provisioner
                    .has_trustline(&wallet.address, currency, issuer)
                    .await
                    .map_err(|e| SwapFailure::at(SwapStage::TrustlineCheck, e.into()))?;
                if !present {
                    self.provisioner
                        .ensure(wallet, currency, issuer)
                        .await
                        .map_err(|e| SwapFailure::at(SwapStage::TrustlineSubmit, e.into()))?;
                }
            }
        }

        let plan = adapter
            .build_execution(intent)
            .await
            .map_err(|e| SwapFailure::at(SwapStage::BuildingExecution, e.into()))?;

        let signed = self
            .signer
            .sign(wallet, &plan)
            .await
            .map_err(|e| SwapFailure::at(SwapStage::Signing, e.into()))?;

        let tx_ref = adapter
            .submit(&signed)
            .await
            .map_err(|e| SwapFailure::at(SwapStage::Submitting, e.into()))?;

        let confirmation = adapter
            .confirm(&tx_ref)
            .await
            .map_err(|e| SwapFailure::at(SwapStage::Confirming, e.into()))?;

        Ok(Settlement {
            tx_ref: confirmation.tx_ref,
            from_amount: intent.amount,
            to_amount: intent.minimum_received,
        })
    }
}
