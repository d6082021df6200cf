use crate::types::Chain;
use thiserror::Error;

/// Top-level error type for the trade core
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("trustline error: {0}")]
    Trustline(#[from] TrustlineError),

    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    #[error("submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("wallet is locked; unlock it to sign")]
    WalletLocked,

    #[error("no wallet available for chain {0:?}")]
    NoWallet(Chain),

    #[error("another swap is already in flight for this wallet")]
    SwapInFlight,

    #[error("unsupported chain: {0:?}")]
    UnsupportedChain(Chain),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Quote-request errors, discriminated so retry policy is a property of
/// the error kind rather than of string matching at call sites.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("no liquidity available for this pair")]
    NoLiquidity,

    #[error("invalid pair: {0}")]
    InvalidPair(String),

    #[error("rate limited by quote provider")]
    RateLimited,

    #[error("quote provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl QuoteError {
    /// Transient errors are eligible for a silent retry on the next
    /// debounce cycle; all others are terminal for the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QuoteError::RateLimited | QuoteError::ProviderUnavailable(_)
        )
    }
}

/// Errors raised while building an execution plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("missing trustline for {currency} issued by {issuer}")]
    MissingTrustline { currency: String, issuer: String },

    #[error("no route for swap: {0}")]
    NoRoute(String),

    #[error("quote expired before execution")]
    QuoteExpired,

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("execution provider unavailable: {0}")]
    Provider(String),
}

/// Trustline query/submit errors (already-exists is normalized to success
/// by the provisioner and never surfaces here)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustlineError {
    #[error("trustline query failed: {0}")]
    Query(String),

    #[error("trustline setup failed: {0}")]
    Submit(String),

    #[error("trustline signing failed: {0}")]
    Sign(#[from] SignError),
}

/// Signing errors; user rejection and wallet unavailability are distinct,
/// non-retryable failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("signature rejected by user")]
    Rejected,

    #[error("signing wallet unavailable: {0}")]
    Unavailable(String),
}

/// Submission/confirmation errors; never silently retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("transaction rejected on chain: {0}")]
    Rejected(String),

    #[error("confirmation timed out")]
    ConfirmationTimeout,
}

/// Balance-query errors; the poller treats these as best-effort and keeps
/// the last-known snapshot
#[derive(Error, Debug, Clone)]
pub enum BalanceError {
    #[error("balance provider unavailable: {0}")]
    Provider(String),
}

impl From<anyhow::Error> for TradeError {
    fn from(error: anyhow::Error) -> Self {
        TradeError::Internal(format!("{error:?}"))
    }
}

impl From<rust_decimal::Error> for TradeError {
    fn from(error: rust_decimal::Error) -> Self {
        TradeError::InvalidInput(format!("decimal conversion error: {error}"))
    }
}

/// Result type alias for the trade core
pub type TradeResult<T> = Result<T, TradeError>;
