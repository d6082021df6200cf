//! Trustline provisioning for the ledger-native chain.
//!
//! A wallet must hold an explicit trust relationship for a `(currency,
//! issuer)` pair before it can receive that asset, so the executor runs
//! this step ahead of any swap whose destination is an issued asset.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use crate::adapters::traits::{ExecutionPlan, SignedPayload};
use crate::error::TrustlineError;
use crate::types::WalletBinding;
use crate::wallet::WalletSigner;

/// Result of submitting a trust-establishing transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustlineSubmitOutcome {
    Applied,
    /// The relationship was already in place; normalized to success
    AlreadyExists,
    Rejected {
        code: String,
        message: String,
    },
}

/// Boundary to the ledger node for trustline queries and signed submits
#[async_trait]
pub trait TrustlineGateway: Send + Sync {
    async fn trustline_exists(
        &self,
        account: &str,
        currency: &str,
        issuer: &str,
    ) -> Result<bool, TrustlineError>;

    async fn submit_signed(&self, tx_blob: &str) -> Result<TrustlineSubmitOutcome, TrustlineError>;
}

/// Terminal state of one `ensure` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustlineOutcome {
    AlreadyPresent,
    Created,
}

pub struct TrustlineProvisioner {
    gateway: Arc<dyn TrustlineGateway>,
    signer: Arc<dyn WalletSigner>,
    limit: Decimal,
}

impl TrustlineProvisioner {
    pub fn new(
        gateway: Arc<dyn TrustlineGateway>,
        signer: Arc<dyn WalletSigner>,
        limit: Decimal,
    ) -> Self {
        Self {
            gateway,
            signer,
            limit,
        }
    }

    pub async fn has_trustline(
        &self,
        account: &str,
        currency: &str,
        issuer: &str,
    ) -> Result<bool, TrustlineError> {
        self.gateway
            .trustline_exists(account, currency, issuer)
            .await
    }

    /// Idempotently make sure `wallet` trusts `(currency, issuer)`.
    /// An already-existing relationship is success, whether detected by
    /// the query or reported by the node on submit.
    pub async fn ensure(
        &self,
        wallet: &WalletBinding,
        currency: &str,
        issuer: &str,
    ) -> Result<TrustlineOutcome, TrustlineError> {
        if self
            .gateway
            .trustline_exists(&wallet.address, currency, issuer)
            .await?
        {
            return Ok(TrustlineOutcome::AlreadyPresent);
        }

        let tx_json = json!({
            "TransactionType": "TrustSet",
            "Account": wallet.address,
            "LimitAmount": {
                "currency": currency,
                "issuer": issuer,
                "value": self.limit.normalize().to_string(),
            },
        });

        let signed = self
            .signer
            .sign(wallet, &ExecutionPlan::Ledger { tx_json })
            .await?;
        let blob = match signed {
            SignedPayload::LedgerBlob(blob) => blob,
            SignedPayload::ContractTx(_) => {
                return Err(TrustlineError::Submit(
                    "signer returned a contract payload for a ledger transaction".to_string(),
                ))
            }
        };

        match self.gateway.submit_signed(&blob).await? {
            TrustlineSubmitOutcome::Applied => {
                info!(%currency, %issuer, account = %wallet.address, "trustline established");
                Ok(TrustlineOutcome::Created)
            }
            TrustlineSubmitOutcome::AlreadyExists => Ok(TrustlineOutcome::AlreadyPresent),
            TrustlineSubmitOutcome::Rejected { code, message } => {
                Err(TrustlineError::Submit(format!("{code}: {message}")))
            }
        }
    }
}
