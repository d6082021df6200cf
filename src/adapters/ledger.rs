use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::adapters::traits::{ChainAdapter, Confirmation, ExecutionPlan, SignedPayload};
use crate::error::{BalanceError, ExecutionError, QuoteError, SubmitError, TrustlineError};
use crate::trustline::{TrustlineGateway, TrustlineSubmitOutcome};
use crate::types::{
    AssetId, Chain, Quote, QuoteRequest, SwapIntent, Token, TokenBalance, TxRef,
};

/// tfPartialPayment: deliver as much as possible up to Amount, bounded
/// below by DeliverMin
const TF_PARTIAL_PAYMENT: u64 = 0x0002_0000;

/// Errors from the ledger JSON-RPC node, split so each caller maps them
/// into its own typed error
#[derive(Debug)]
pub(crate) enum RpcError {
    RateLimited,
    Transport(String),
    Node { code: String, message: String },
}

impl RpcError {
    fn to_quote_error(&self) -> QuoteError {
        match self {
            RpcError::RateLimited => QuoteError::RateLimited,
            RpcError::Transport(msg) => QuoteError::ProviderUnavailable(msg.clone()),
            RpcError::Node { code, message } => {
                if code == "srcCurMalformed" || code == "dstAmtMalformed" || code == "badMarket" {
                    QuoteError::InvalidPair(message.clone())
                } else {
                    QuoteError::ProviderUnavailable(format!("{code}: {message}"))
                }
            }
        }
    }

    fn detail(&self) -> String {
        match self {
            RpcError::RateLimited => "rate limited".to_string(),
            RpcError::Transport(msg) => msg.clone(),
            RpcError::Node { code, message } => format!("{code}: {message}"),
        }
    }
}

/// Thin JSON-RPC client for a rippled-compatible node
pub struct LedgerRpcClient {
    rpc_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrustLine {
    pub currency: String,
    /// Counterparty account, the issuer for lines this wallet holds
    pub account: String,
    pub balance: String,
}

/// Offer amounts come as either a drops string (native) or a currency object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum LedgerAmount {
    Drops(String),
    Issued {
        currency: String,
        issuer: String,
        value: String,
    },
}

impl LedgerAmount {
    pub(crate) fn to_decimal(&self) -> Option<Decimal> {
        match self {
            LedgerAmount::Drops(drops) => {
                let drops: Decimal = drops.parse().ok()?;
                Some(drops / Decimal::from(1_000_000u64))
            }
            LedgerAmount::Issued { value, .. } => value.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookOffer {
    #[serde(rename = "TakerGets")]
    pub taker_gets: LedgerAmount,
    #[serde(rename = "TakerPays")]
    pub taker_pays: LedgerAmount,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub engine_result: String,
    pub engine_result_message: String,
    pub tx_hash: Option<String>,
}

impl LedgerRpcClient {
    pub fn new(rpc_url: String, http: reqwest::Client) -> Self {
        Self { rpc_url, http }
    }

    pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({ "method": method, "params": [params] });
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("ledger rpc request failed: {e}")))?;

        if response.status().as_u16() == 429 {
            return Err(RpcError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(RpcError::Transport(format!(
                "ledger rpc returned status {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("ledger rpc response unreadable: {e}")))?;
        let result = payload
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Transport("ledger rpc response missing result".to_string()))?;

        if result.get("status").and_then(Value::as_str) == Some("error") {
            let code = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = result
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("ledger node error")
                .to_string();
            return Err(RpcError::Node { code, message });
        }

        Ok(result)
    }

    pub(crate) async fn account_lines(&self, account: &str) -> Result<Vec<TrustLine>, RpcError> {
        let result = self
            .call("account_lines", json!({ "account": account }))
            .await?;
        let lines = result.get("lines").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(lines)
            .map_err(|e| RpcError::Transport(format!("malformed account_lines: {e}")))
    }

    /// Native balance in drops
    pub(crate) async fn account_balance(&self, account: &str) -> Result<Decimal, RpcError> {
        let result = self
            .call("account_info", json!({ "account": account, "ledger_index": "validated" }))
            .await?;
        let drops = result
            .pointer("/account_data/Balance")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| RpcError::Transport("account_info missing Balance".to_string()))?;
        Ok(drops / Decimal::from(1_000_000u64))
    }

    pub(crate) async fn book_offers(
        &self,
        taker_pays: Value,
        taker_gets: Value,
    ) -> Result<Vec<BookOffer>, RpcError> {
        let result = self
            .call(
                "book_offers",
                json!({ "taker_pays": taker_pays, "taker_gets": taker_gets, "limit": 60 }),
            )
            .await?;
        let offers = result.get("offers").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(offers)
            .map_err(|e| RpcError::Transport(format!("malformed book_offers: {e}")))
    }

    pub(crate) async fn submit_blob(&self, tx_blob: &str) -> Result<SubmitOutcome, RpcError> {
        let result = self.call("submit", json!({ "tx_blob": tx_blob })).await?;
        Ok(SubmitOutcome {
            engine_result: result
                .get("engine_result")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            engine_result_message: result
                .get("engine_result_message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            tx_hash: result
                .pointer("/tx_json/hash")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Whether a transaction has been included in a validated ledger
    pub(crate) async fn tx_validated(&self, tx_hash: &str) -> Result<bool, RpcError> {
        match self.call("tx", json!({ "transaction": tx_hash })).await {
            Ok(result) => Ok(result
                .get("validated")
                .and_then(Value::as_bool)
                .unwrap_or(false)),
            // txnNotFound just means not yet validated
            Err(RpcError::Node { code, .. }) if code == "txnNotFound" => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Asset in book_offers form: {"currency": "XRP"} for native,
/// {"currency", "issuer"} for issued assets
fn book_asset(token: &Token) -> Result<Value, QuoteError> {
    match &token.asset {
        AssetId::LedgerNative => Ok(json!({ "currency": "XRP" })),
        AssetId::Issued { currency, issuer } => {
            Ok(json!({ "currency": currency, "issuer": issuer }))
        }
        _ => Err(QuoteError::InvalidPair(format!(
            "{} is not a ledger asset",
            token.symbol
        ))),
    }
}

/// Amount in transaction form: drops string for native, currency
/// object for issued assets
fn tx_amount(token: &Token, amount: Decimal) -> Result<Value, ExecutionError> {
    match &token.asset {
        AssetId::LedgerNative => {
            let drops = token
                .to_base_units(amount)
                .map_err(|e| ExecutionError::InvalidIntent(e.to_string()))?;
            Ok(json!(drops.to_string()))
        }
        AssetId::Issued { currency, issuer } => Ok(json!({
            "currency": currency,
            "issuer": issuer,
            "value": amount.normalize().to_string(),
        })),
        _ => Err(ExecutionError::InvalidIntent(format!(
            "{} is not a ledger asset",
            token.symbol
        ))),
    }
}

#[async_trait]
impl TrustlineGateway for LedgerRpcClient {
    async fn trustline_exists(
        &self,
        account: &str,
        currency: &str,
        issuer: &str,
    ) -> Result<bool, TrustlineError> {
        let lines = self
            .account_lines(account)
            .await
            .map_err(|e| TrustlineError::Query(e.detail()))?;
        Ok(lines
            .iter()
            .any(|line| line.currency == currency && line.account == issuer))
    }

    async fn submit_signed(&self, tx_blob: &str) -> Result<TrustlineSubmitOutcome, TrustlineError> {
        let outcome = self
            .submit_blob(tx_blob)
            .await
            .map_err(|e| TrustlineError::Submit(e.detail()))?;

        // tecDUPLICATE and a no-op TrustSet both mean the relationship is
        // already in place, which counts as success
        let code = outcome.engine_result.as_str();
        if code.starts_with("tes") {
            Ok(TrustlineSubmitOutcome::Applied)
        } else if code == "tecDUPLICATE" || code == "tecNO_LINE_REDUNDANT" {
            Ok(TrustlineSubmitOutcome::AlreadyExists)
        } else {
            Ok(TrustlineSubmitOutcome::Rejected {
                code: outcome.engine_result,
                message: outcome.engine_result_message,
            })
        }
    }
}

/// Adapter for the ledger-native chain: quotes against the on-ledger order
/// book and builds self-payment swap plans.
pub struct LedgerAdapter {
    client: Arc<LedgerRpcClient>,
    confirm_timeout: Duration,
}

impl LedgerAdapter {
    pub fn new(client: Arc<LedgerRpcClient>, confirm_timeout_secs: u64) -> Self {
        Self {
            client,
            confirm_timeout: Duration::from_secs(confirm_timeout_secs),
        }
    }

    pub fn client(&self) -> Arc<LedgerRpcClient> {
        self.client.clone()
    }

    /// Walk quality-sorted offers until the input amount is filled.
    /// Returns (output amount, price impact %).
    fn fill_from_book(
        offers: &[BookOffer],
        amount_in: Decimal,
    ) -> Result<(Decimal, Decimal), QuoteError> {
        if amount_in <= Decimal::ZERO {
            return Err(QuoteError::InvalidPair(
                "amount must be positive".to_string(),
            ));
        }
        let mut remaining = amount_in;
        let mut total_out = Decimal::ZERO;
        let mut spot_rate: Option<Decimal> = None;

        for offer in offers {
            let offer_out = offer.taker_gets.to_decimal().unwrap_or(Decimal::ZERO);
            let offer_in = offer.taker_pays.to_decimal().unwrap_or(Decimal::ZERO);
            if offer_out <= Decimal::ZERO || offer_in <= Decimal::ZERO {
                continue;
            }

            let rate = offer_out / offer_in;
            if spot_rate.is_none() {
                spot_rate = Some(rate);
            }

            let take_in = remaining.min(offer_in);
            total_out += take_in * rate;
            remaining -= take_in;
            if remaining <= Decimal::ZERO {
                break;
            }
        }

        if remaining > Decimal::ZERO {
            return Err(QuoteError::NoLiquidity);
        }

        let spot = spot_rate.ok_or(QuoteError::NoLiquidity)?;
        let effective = total_out / amount_in;
        let impact = ((spot - effective) / spot * Decimal::from(100)).max(Decimal::ZERO);
        Ok((total_out, impact))
    }
}

#[async_trait]
impl ChainAdapter for LedgerAdapter {
    fn chain(&self) -> Chain {
        Chain::Xrpl
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let taker_pays = book_asset(&request.from_token)?;
        let taker_gets = book_asset(&request.to_token)?;

        let offers = self
            .client
            .book_offers(taker_pays, taker_gets)
            .await
            .map_err(|e| e.to_quote_error())?;
        if offers.is_empty() {
            return Err(QuoteError::NoLiquidity);
        }

        let (to_amount, impact) = Self::fill_from_book(&offers, request.amount)?;
        debug!(
            from = %request.from_token.symbol,
            to = %request.to_token.symbol,
            %to_amount,
            "ledger order book quote"
        );

        Ok(Quote::new(
            request.from_token.clone(),
            request.to_token.clone(),
            request.amount,
            to_amount,
            request.slippage,
            impact,
            vec!["XRPL order book".to_string()],
            None,
        ))
    }

    async fn build_execution(&self, intent: &SwapIntent) -> Result<ExecutionPlan, ExecutionError> {
        // A missing trustline at this point means auto-provisioning is off
        // or was skipped; fail before anything is signed.
        if let AssetId::Issued { currency, issuer } = &intent.to_token.asset {
            let exists = self
                .client
                .trustline_exists(&intent.wallet.address, currency, issuer)
                .await
                .map_err(|e| ExecutionError::Provider(e.to_string()))?;
            if !exists {
                return Err(ExecutionError::MissingTrustline {
                    currency: currency.clone(),
                    issuer: issuer.clone(),
                });
            }
        }

        // Swap as a partial self-payment: spend at most SendMax of the
        // source asset to deliver at least DeliverMin of the destination.
        // Amount is the delivery ceiling, so it targets the quoted output
        // rather than the slippage floor.
        let tx_json = json!({
            "TransactionType": "Payment",
            "Account": intent.wallet.address,
            "Destination": intent.wallet.address,
            "Amount": tx_amount(&intent.to_token, intent.to_amount)?,
            "DeliverMin": tx_amount(&intent.to_token, intent.minimum_received)?,
            "SendMax": tx_amount(&intent.from_token, intent.amount)?,
            "Flags": TF_PARTIAL_PAYMENT,
        });

        Ok(ExecutionPlan::Ledger { tx_json })
    }

    async fn submit(&self, signed: &SignedPayload) -> Result<TxRef, SubmitError> {
        let blob = match signed {
            SignedPayload::LedgerBlob(blob) => blob,
            SignedPayload::ContractTx(_) => {
                return Err(SubmitError::Submission(
                    "contract payload submitted to ledger adapter".to_string(),
                ))
            }
        };

        let outcome = self
            .client
            .submit_blob(blob)
            .await
            .map_err(|e| SubmitError::Submission(e.detail()))?;

        if !outcome.engine_result.starts_with("tes") {
            return Err(SubmitError::Rejected(format!(
                "{}: {}",
                outcome.engine_result, outcome.engine_result_message
            )));
        }

        let hash = outcome
            .tx_hash
            .ok_or_else(|| SubmitError::Submission("submit response missing tx hash".to_string()))?;
        info!(tx_hash = %hash, "ledger transaction submitted");
        Ok(TxRef(hash))
    }

    async fn confirm(&self, tx_ref: &TxRef) -> Result<Confirmation, SubmitError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            match self.client.tx_validated(&tx_ref.0).await {
                Ok(true) => {
                    return Ok(Confirmation {
                        tx_ref: tx_ref.clone(),
                        confirmed: true,
                    })
                }
                Ok(false) => {}
                Err(e) => debug!(error = %e.detail(), "confirmation poll failed, retrying"),
            }
            if Instant::now() >= deadline {
                return Err(SubmitError::ConfirmationTimeout);
            }
            sleep(Duration::from_secs(2)).await;
        }
    }

    async fn balances(
        &self,
        address: &str,
        tracked: &[Token],
    ) -> Result<Vec<TokenBalance>, BalanceError> {
        let native = self
            .client
            .account_balance(address)
            .await
            .map_err(|e| BalanceError::Provider(e.detail()))?;
        let lines = self
            .client
            .account_lines(address)
            .await
            .map_err(|e| BalanceError::Provider(e.detail()))?;

        let mut balances = Vec::new();
        for token in tracked {
            match &token.asset {
                AssetId::LedgerNative => balances.push(TokenBalance {
                    token: token.clone(),
                    amount: native,
                }),
                AssetId::Issued { currency, issuer } => {
                    let held = lines
                        .iter()
                        .find(|line| &line.currency == currency && &line.account == issuer)
                        .and_then(|line| line.balance.parse::<Decimal>().ok())
                        .unwrap_or(Decimal::ZERO);
                    balances.push(TokenBalance {
                        token: token.clone(),
                        amount: held,
                    });
                }
                _ => {}
            }
        }
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenRegistry;
    use crate::types::{SlippagePct, WalletBinding, WalletKind};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn offer(gets: LedgerAmount, pays: LedgerAmount) -> BookOffer {
        BookOffer {
            taker_gets: gets,
            taker_pays: pays,
        }
    }

    fn issued(value: &str) -> LedgerAmount {
        LedgerAmount::Issued {
            currency: "USD".to_string(),
            issuer: "rIssuer".to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn ledger_amounts_parse_drops_and_issued_values() {
        let drops = LedgerAmount::Drops("2500000".to_string());
        assert_eq!(drops.to_decimal(), Some(dec!(2.5)));

        let iou = issued("12.75");
        assert_eq!(iou.to_decimal(), Some(dec!(12.75)));
    }

    #[test]
    fn book_fill_walks_offers_in_order() {
        // Best offer: 50 USD for 20 XRP (rate 2.5); next: 100 USD for 50 XRP (rate 2.0)
        let offers = vec![
            offer(issued("50"), LedgerAmount::Drops("20000000".to_string())),
            offer(issued("100"), LedgerAmount::Drops("50000000".to_string())),
        ];

        // 30 XRP in: 20 at 2.5 + 10 at 2.0 = 70 USD
        let (out, impact) = LedgerAdapter::fill_from_book(&offers, dec!(30)).unwrap();
        assert_eq!(out, dec!(70));
        // spot 2.5, effective 70/30 ~ 2.333 -> positive impact
        assert!(impact > Decimal::ZERO);
    }

    #[test]
    fn book_fill_rejects_non_positive_amounts() {
        let offers = vec![offer(issued("50"), LedgerAmount::Drops("20000000".to_string()))];
        assert!(matches!(
            LedgerAdapter::fill_from_book(&offers, Decimal::ZERO),
            Err(QuoteError::InvalidPair(_))
        ));
        assert!(matches!(
            LedgerAdapter::fill_from_book(&offers, dec!(-1)),
            Err(QuoteError::InvalidPair(_))
        ));
    }

    #[test]
    fn book_fill_reports_no_liquidity_when_depth_runs_out() {
        let offers = vec![offer(issued("50"), LedgerAmount::Drops("20000000".to_string()))];
        let err = LedgerAdapter::fill_from_book(&offers, dec!(100)).unwrap_err();
        assert_eq!(err, QuoteError::NoLiquidity);
    }

    #[test]
    fn single_offer_fill_has_zero_impact() {
        let offers = vec![offer(issued("50"), LedgerAmount::Drops("20000000".to_string()))];
        let (out, impact) = LedgerAdapter::fill_from_book(&offers, dec!(10)).unwrap();
        assert_eq!(out, dec!(25));
        assert_eq!(impact, Decimal::ZERO);
    }

    #[tokio::test]
    async fn payment_plan_delivers_up_to_the_quoted_amount_not_the_floor() {
        let client = Arc::new(LedgerRpcClient::new(
            "http://unreachable.invalid".to_string(),
            reqwest::Client::new(),
        ));
        let adapter = LedgerAdapter::new(client, 1);

        let tokens = TokenRegistry::with_defaults();
        let slippage = SlippagePct::default();
        // 10 USD in, quoted 25 XRP out, 0.5% slippage floor of 24.875 XRP
        let intent = SwapIntent {
            id: Uuid::new_v4(),
            chain: Chain::Xrpl,
            from_token: tokens.by_symbol(Chain::Xrpl, "USD").unwrap().clone(),
            to_token: tokens.native(Chain::Xrpl).clone(),
            amount: dec!(10),
            to_amount: dec!(25),
            minimum_received: dec!(25) * slippage.min_received_factor(),
            slippage,
            wallet: WalletBinding {
                chain: Chain::Xrpl,
                kind: WalletKind::Custodial,
                address: "rUser".to_string(),
                can_sign: true,
            },
            created_at: Utc::now(),
        };

        let plan = adapter.build_execution(&intent).await.unwrap();
        let ExecutionPlan::Ledger { tx_json } = plan else {
            panic!("expected a ledger plan");
        };
        // ceiling at the quoted rate, floor at minimum received
        assert_eq!(tx_json["Amount"], "25000000");
        assert_eq!(tx_json["DeliverMin"], "24875000");
        assert_eq!(tx_json["SendMax"]["value"], "10");
        assert_eq!(tx_json["Flags"], TF_PARTIAL_PAYMENT);
    }
}
