use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BalanceError, ExecutionError, QuoteError, SubmitError};
use crate::types::{Chain, Quote, QuoteRequest, SwapIntent, Token, TokenBalance, TxRef};

/// A transaction ready to be signed by the resolved wallet.
///
/// Ledger plans carry the full transaction JSON in rippled form; contract
/// plans carry the provider-supplied payload for the EVM wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPlan {
    Ledger {
        tx_json: serde_json::Value,
    },
    Contract {
        to: String,
        calldata: Vec<u8>,
        value: u128,
        gas_estimate: u64,
    },
}

/// Signed bytes handed back by the wallet, opaque to the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedPayload {
    /// Hex-encoded signed transaction blob for the ledger chain
    LedgerBlob(String),
    /// RLP-encoded signed transaction for an EVM chain
    ContractTx(Vec<u8>),
}

/// Settlement signal observed for a submitted transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_ref: TxRef,
    pub confirmed: bool,
}

/// Per-chain-family strategy behind quoting, plan construction, submission
/// and balance reads. Exactly one adapter serves each chain, selected via
/// the registry's fixed table.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError>;

    async fn build_execution(&self, intent: &SwapIntent) -> Result<ExecutionPlan, ExecutionError>;

    async fn submit(&self, signed: &SignedPayload) -> Result<TxRef, SubmitError>;

    /// Bounded wait for the chain-appropriate settlement signal. Callers
    /// wanting longer tracking poll on their own schedule.
    async fn confirm(&self, tx_ref: &TxRef) -> Result<Confirmation, SubmitError>;

    /// Native balance plus held amounts for each tracked token
    async fn balances(
        &self,
        address: &str,
        tracked: &[Token],
    ) -> Result<Vec<TokenBalance>, BalanceError>;
}
