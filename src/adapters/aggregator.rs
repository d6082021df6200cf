use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::adapters::traits::{ChainAdapter, Confirmation, ExecutionPlan, SignedPayload};
use crate::error::{BalanceError, ExecutionError, QuoteError, SubmitError};
use crate::types::{AssetId, Chain, Quote, QuoteRequest, SwapIntent, Token, TokenBalance, TxRef};

/// ERC-20 balanceOf(address) selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

#[derive(Debug, Deserialize)]
struct AggregatorEnvelope<T> {
    code: Option<i64>,
    #[serde(rename = "errorMsg", alias = "message")]
    error_msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AggregatorQuoteData {
    /// Output amount in base units of the destination token
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "priceImpact")]
    price_impact: Option<String>,
    #[serde(rename = "estimatedGas")]
    estimated_gas: Option<Value>,
    #[serde(rename = "dexes", default)]
    dexes: Vec<AggregatorDex>,
}

#[derive(Debug, Deserialize)]
struct AggregatorDex {
    #[serde(rename = "dexName", alias = "name")]
    dex_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregatorSwapData {
    to: String,
    data: String,
    value: Option<String>,
    #[serde(rename = "estimatedGas")]
    estimated_gas: Option<Value>,
}

fn gas_to_u64(value: &Option<Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse a provider price-impact string such as "0.32%" leniently
fn parse_impact(raw: &Option<String>) -> Decimal {
    raw.as_deref()
        .map(|s| s.trim_end_matches('%'))
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO)
}

/// Map an aggregator-level error code/message onto the typed quote errors.
/// This is the single place provider wording is interpreted.
fn classify_provider_error(code: Option<i64>, message: &str) -> QuoteError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("no route") || lowered.contains("insufficient liquidity") {
        QuoteError::NoLiquidity
    } else if lowered.contains("unsupported") || lowered.contains("invalid token") {
        QuoteError::InvalidPair(message.to_string())
    } else {
        QuoteError::ProviderUnavailable(format!(
            "aggregator error {}: {message}",
            code.unwrap_or(-1)
        ))
    }
}

/// Adapter for account/contract chains served by the external
/// swap-aggregator API. One instance per chain.
pub struct AggregatorAdapter {
    chain: Chain,
    chain_code: &'static str,
    aggregator_url: String,
    rpc_url: String,
    http: reqwest::Client,
    confirm_timeout: Duration,
}

impl AggregatorAdapter {
    /// Panics if `chain` is not served by the aggregator; the registry
    /// only builds these for chains with an aggregator code.
    pub fn new(
        chain: Chain,
        aggregator_url: String,
        rpc_url: String,
        http: reqwest::Client,
        confirm_timeout_secs: u64,
    ) -> Self {
        let chain_code = chain
            .aggregator_code()
            .unwrap_or_else(|| panic!("aggregator does not serve {chain:?}"));
        Self {
            chain,
            chain_code,
            aggregator_url,
            rpc_url,
            http,
            confirm_timeout: Duration::from_secs(confirm_timeout_secs),
        }
    }

    async fn fetch_aggregator<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, QuoteError> {
        let url = format!("{}/{}/{}", self.aggregator_url, self.chain_code, path);
        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| QuoteError::ProviderUnavailable(format!("aggregator request failed: {e}")))?;

        match response.status().as_u16() {
            429 => return Err(QuoteError::RateLimited),
            s if s >= 500 => {
                return Err(QuoteError::ProviderUnavailable(format!(
                    "aggregator returned status {s}"
                )))
            }
            _ => {}
        }

        let envelope: AggregatorEnvelope<T> = response
            .json()
            .await
            .map_err(|e| QuoteError::ProviderUnavailable(format!("aggregator response unreadable: {e}")))?;

        match envelope.code {
            Some(200) | None => envelope.data.ok_or_else(|| {
                QuoteError::ProviderUnavailable("aggregator response missing data".to_string())
            }),
            code => Err(classify_provider_error(
                code,
                envelope.error_msg.as_deref().unwrap_or("unknown error"),
            )),
        }
    }

    async fn eth_rpc(&self, method: &str, params: Value) -> Result<Value, SubmitError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmitError::Submission(format!("rpc request failed: {e}")))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SubmitError::Submission(format!("rpc response unreadable: {e}")))?;

        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error");
            return Err(SubmitError::Rejected(message.to_string()));
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn erc20_balance(&self, token: &Token, address: &str) -> Result<Decimal, BalanceError> {
        let contract = token.contract_address().ok_or_else(|| {
            BalanceError::Provider(format!("{} has no contract address", token.symbol))
        })?;
        let holder = address.trim_start_matches("0x");
        let calldata = format!("0x{BALANCE_OF_SELECTOR}{:0>64}", holder.to_ascii_lowercase());

        let result = self
            .eth_rpc(
                "eth_call",
                json!([{ "to": contract, "data": calldata }, "latest"]),
            )
            .await
            .map_err(|e| BalanceError::Provider(e.to_string()))?;

        let raw = result.as_str().unwrap_or("0x0");
        let units = u128::from_str_radix(raw.trim_start_matches("0x"), 16)
            .map_err(|e| BalanceError::Provider(format!("bad balanceOf result {raw}: {e}")))?;
        token
            .from_base_units(units)
            .map_err(|e| BalanceError::Provider(e.to_string()))
    }

    async fn native_balance(&self, address: &str) -> Result<u128, BalanceError> {
        let result = self
            .eth_rpc("eth_getBalance", json!([address, "latest"]))
            .await
            .map_err(|e| BalanceError::Provider(e.to_string()))?;
        let raw = result.as_str().unwrap_or("0x0");
        u128::from_str_radix(raw.trim_start_matches("0x"), 16)
            .map_err(|e| BalanceError::Provider(format!("bad balance result {raw}: {e}")))
    }
}

#[async_trait]
impl ChainAdapter for AggregatorAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let from_address = request.from_token.contract_address().ok_or_else(|| {
            QuoteError::InvalidPair(format!("{} is not a contract asset", request.from_token.symbol))
        })?;
        let to_address = request.to_token.contract_address().ok_or_else(|| {
            QuoteError::InvalidPair(format!("{} is not a contract asset", request.to_token.symbol))
        })?;

        // Amounts cross the wire in base units, scaled by the token's
        // immutable decimals
        let amount_units = request
            .from_token
            .to_base_units(request.amount)
            .map_err(|e| QuoteError::InvalidPair(e.to_string()))?;

        let data: AggregatorQuoteData = self
            .fetch_aggregator(
                "quote",
                &[
                    ("inTokenAddress", from_address.to_string()),
                    ("outTokenAddress", to_address.to_string()),
                    ("amount", amount_units.to_string()),
                    ("slippage", request.slippage.value().to_string()),
                ],
            )
            .await?;

        let out_units: u128 = data.out_amount.parse().map_err(|_| {
            QuoteError::ProviderUnavailable(format!("bad outAmount {}", data.out_amount))
        })?;
        let to_amount = request
            .to_token
            .from_base_units(out_units)
            .map_err(|e| QuoteError::InvalidPair(e.to_string()))?;
        if to_amount <= Decimal::ZERO {
            return Err(QuoteError::NoLiquidity);
        }

        let route: Vec<String> = data
            .dexes
            .iter()
            .filter_map(|d| d.dex_name.clone())
            .collect();
        let fee = match gas_to_u64(&data.estimated_gas) {
            0 => None,
            gas => Some(format!("~{gas} gas")),
        };

        debug!(chain = ?self.chain, %to_amount, "aggregator quote");

        Ok(Quote::new(
            request.from_token.clone(),
            request.to_token.clone(),
            request.amount,
            to_amount,
            request.slippage,
            parse_impact(&data.price_impact),
            route,
            fee,
        ))
    }

    async fn build_execution(&self, intent: &SwapIntent) -> Result<ExecutionPlan, ExecutionError> {
        if matches!(intent.from_token.asset, AssetId::LedgerNative | AssetId::Issued { .. }) {
            return Err(ExecutionError::InvalidIntent(
                "ledger asset routed to aggregator adapter".to_string(),
            ));
        }

        let amount_units = intent
            .from_token
            .to_base_units(intent.amount)
            .map_err(|e| ExecutionError::InvalidIntent(e.to_string()))?;

        let data: AggregatorSwapData = self
            .fetch_aggregator(
                "swap",
                &[
                    (
                        "inTokenAddress",
                        intent.from_token.contract_address().unwrap_or_default().to_string(),
                    ),
                    (
                        "outTokenAddress",
                        intent.to_token.contract_address().unwrap_or_default().to_string(),
                    ),
                    ("amount", amount_units.to_string()),
                    ("slippage", intent.slippage.value().to_string()),
                    ("account", intent.wallet.address.clone()),
                ],
            )
            .await
            .map_err(|e| match e {
                QuoteError::NoLiquidity => ExecutionError::NoRoute("no route for swap".to_string()),
                QuoteError::InvalidPair(m) => ExecutionError::InvalidIntent(m),
                other => ExecutionError::Provider(other.to_string()),
            })?;

        let calldata = hex::decode(data.data.trim_start_matches("0x"))
            .map_err(|e| ExecutionError::Provider(format!("bad calldata from provider: {e}")))?;
        let value = data
            .value
            .as_deref()
            .map(|v| {
                if let Some(hex_value) = v.strip_prefix("0x") {
                    u128::from_str_radix(hex_value, 16)
                } else {
                    v.parse()
                }
            })
            .transpose()
            .map_err(|e| ExecutionError::Provider(format!("bad value from provider: {e}")))?
            .unwrap_or(0);

        Ok(ExecutionPlan::Contract {
            to: data.to,
            calldata,
            value,
            gas_estimate: gas_to_u64(&data.estimated_gas),
        })
    }

    async fn submit(&self, signed: &SignedPayload) -> Result<TxRef, SubmitError> {
        let raw = match signed {
            SignedPayload::ContractTx(raw) => raw,
            SignedPayload::LedgerBlob(_) => {
                return Err(SubmitError::Submission(
                    "ledger payload submitted to aggregator adapter".to_string(),
                ))
            }
        };

        let result = self
            .eth_rpc(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        let hash = result
            .as_str()
            .ok_or_else(|| SubmitError::Submission("rpc returned no transaction hash".to_string()))?
            .to_string();
        info!(chain = ?self.chain, tx_hash = %hash, "transaction submitted");
        Ok(TxRef(hash))
    }

    async fn confirm(&self, tx_ref: &TxRef) -> Result<Confirmation, SubmitError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            let receipt = self
                .eth_rpc("eth_getTransactionReceipt", json!([tx_ref.0]))
                .await?;
            if let Some(status) = receipt.get("status").and_then(Value::as_str) {
                if status == "0x1" {
                    return Ok(Confirmation {
                        tx_ref: tx_ref.clone(),
                        confirmed: true,
                    });
                }
                return Err(SubmitError::Rejected("transaction reverted".to_string()));
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
        let mut balances = Vec::new();
        for token in tracked {
            let amount = match &token.asset {
                AssetId::EvmNative => {
                    let units = self.native_balance(address).await?;
                    token
                        .from_base_units(units)
                        .map_err(|e| BalanceError::Provider(e.to_string()))?
                }
                AssetId::Contract { .. } => self.erc20_balance(token, address).await?,
                _ => continue,
            };
            balances.push(TokenBalance {
                token: token.clone(),
                amount,
            });
        }
        Ok(balances)
    }
}
