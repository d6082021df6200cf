use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TradeError, TradeResult};

/// Sentinel contract address denoting the native asset on EVM chains
pub const EVM_NATIVE_SENTINEL: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Supported chains. Each maps to exactly one adapter variant in the
/// registry and one native token in the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Xrpl,
    Ethereum,
    BnbChain,
    Polygon,
    Base,
}

/// Structural family a chain belongs to; determines adapter variant and
/// which wallet kinds can serve it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Ledger,
    Evm,
}

impl Chain {
    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Xrpl => ChainFamily::Ledger,
            Chain::Ethereum | Chain::BnbChain | Chain::Polygon | Chain::Base => ChainFamily::Evm,
        }
    }

    /// Chain code used by the swap-aggregator API; `None` for chains it
    /// does not serve.
    pub fn aggregator_code(&self) -> Option<&'static str> {
        match self {
            Chain::Xrpl => None,
            Chain::Ethereum => Some("eth"),
            Chain::BnbChain => Some("bsc"),
            Chain::Polygon => Some("polygon"),
            Chain::Base => Some("base"),
        }
    }

    /// Numeric EVM chain id; `None` for the ledger chain.
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Chain::Xrpl => None,
            Chain::Ethereum => Some(1),
            Chain::BnbChain => Some(56),
            Chain::Polygon => Some(137),
            Chain::Base => Some(8453),
        }
    }

    pub fn all() -> [Chain; 5] {
        [
            Chain::Xrpl,
            Chain::Ethereum,
            Chain::BnbChain,
            Chain::Polygon,
            Chain::Base,
        ]
    }
}

/// Chain-level asset identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssetId {
    /// XRP itself
    LedgerNative,
    /// An issued asset on the ledger chain, identified by (currency, issuer)
    Issued { currency: String, issuer: String },
    /// An ERC-20 contract on an EVM chain
    Contract { address: String },
    /// The EVM chain's native asset, wire-encoded as the sentinel address
    EvmNative,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Token {
    pub chain: Chain,
    pub symbol: String,
    pub display_name: String,
    pub asset: AssetId,
    pub decimals: u8,
    pub logo_url: Option<String>,
}

impl Token {
    pub fn is_native(&self) -> bool {
        matches!(self.asset, AssetId::LedgerNative | AssetId::EvmNative)
    }

    /// Issuer account for issued ledger assets; `None` for everything else
    pub fn issuer(&self) -> Option<&str> {
        match &self.asset {
            AssetId::Issued { issuer, .. } => Some(issuer),
            _ => None,
        }
    }

    pub fn currency(&self) -> Option<&str> {
        match &self.asset {
            AssetId::Issued { currency, .. } => Some(currency),
            AssetId::LedgerNative => Some("XRP"),
            _ => None,
        }
    }

    /// Address sent to contract-chain providers; native assets use the
    /// reserved sentinel.
    pub fn contract_address(&self) -> Option<&str> {
        match &self.asset {
            AssetId::Contract { address } => Some(address),
            AssetId::EvmNative => Some(EVM_NATIVE_SENTINEL),
            _ => None,
        }
    }

    fn base_unit_factor(&self) -> TradeResult<Decimal> {
        10u128
            .checked_pow(self.decimals as u32)
            .and_then(Decimal::from_u128)
            .ok_or_else(|| {
                TradeError::InvalidInput(format!(
                    "{} decimals exceed base-unit scaling range",
                    self.decimals
                ))
            })
    }

    /// Scale a display amount into base units (`amount * 10^decimals`).
    /// Fractional dust below one base unit is truncated.
    pub fn to_base_units(&self, amount: Decimal) -> TradeResult<u128> {
        if amount.is_sign_negative() {
            return Err(TradeError::InvalidInput(
                "amount must not be negative".to_string(),
            ));
        }
        let scaled = amount.checked_mul(self.base_unit_factor()?).ok_or_else(|| {
            TradeError::InvalidInput(format!("amount {amount} overflows base-unit scaling"))
        })?;
        scaled.trunc().to_u128().ok_or_else(|| {
            TradeError::InvalidInput(format!("amount {amount} does not fit in base units"))
        })
    }

    /// Descale base units back into a display amount
    pub fn from_base_units(&self, units: u128) -> TradeResult<Decimal> {
        let value = Decimal::from_u128(units).ok_or_else(|| {
            TradeError::InvalidInput(format!("{units} base units exceed the representable range"))
        })?;
        Ok(value / self.base_unit_factor()?)
    }
}

/// Bounded slippage percentage applied uniformly to every quote request
/// until changed. The bounds are policy, not a chain invariant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlippagePct(Decimal);

impl SlippagePct {
    pub const MIN: Decimal = dec!(0.1);
    pub const MAX: Decimal = dec!(5.0);

    pub fn new(value: Decimal) -> TradeResult<Self> {
        if value < Self::MIN || value > Self::MAX {
            return Err(TradeError::InvalidInput(format!(
                "slippage {value}% outside allowed range {}..={}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The multiplier applied to a quoted output to get the minimum
    /// acceptable output, `1 - pct/100`.
    pub fn min_received_factor(&self) -> Decimal {
        Decimal::ONE - self.0 / Decimal::from(100)
    }
}

impl Default for SlippagePct {
    fn default() -> Self {
        Self(dec!(0.5))
    }
}

/// Inputs for one quote request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from_token: Token,
    pub to_token: Token,
    pub amount: Decimal,
    pub slippage: SlippagePct,
}

/// A normalized exchange quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub from_token: Token,
    pub to_token: Token,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    /// Computed once at construction from `to_amount` and the slippage
    /// setting; never recomputed from a stale `to_amount`.
    pub minimum_received: Decimal,
    pub price_impact_pct: Decimal,
    pub route: Vec<String>,
    pub fee: Option<String>,
    pub slippage_pct: Decimal,
    pub as_of: DateTime<Utc>,
}

impl Quote {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from_token: Token,
        to_token: Token,
        from_amount: Decimal,
        to_amount: Decimal,
        slippage: SlippagePct,
        price_impact_pct: Decimal,
        route: Vec<String>,
        fee: Option<String>,
    ) -> Self {
        let minimum_received = to_amount * slippage.min_received_factor();
        Self {
            from_token,
            to_token,
            from_amount,
            to_amount,
            minimum_received,
            price_impact_pct,
            route,
            fee,
            slippage_pct: slippage.value(),
            as_of: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalletKind {
    Custodial,
    External,
}

/// The signing surface bound to the active chain. Re-resolved on chain
/// switch and wallet/session state changes; never cached across a switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletBinding {
    pub chain: Chain,
    pub kind: WalletKind,
    pub address: String,
    pub can_sign: bool,
}

/// Explicit context threaded into engine/executor calls instead of
/// ambient process-wide state.
#[derive(Debug, Clone)]
pub struct TradeContext {
    pub chain: Chain,
    pub wallet: Option<WalletBinding>,
    pub slippage: SlippagePct,
    pub auto_trustline: bool,
}

/// One submit action. Immutable; produces exactly one outcome and is then
/// discarded. A retry builds a fresh intent from current inputs.
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub id: Uuid,
    pub chain: Chain,
    pub from_token: Token,
    pub to_token: Token,
    pub amount: Decimal,
    /// Output at the quoted rate; execution may deliver up to this much
    pub to_amount: Decimal,
    /// Slippage floor; execution delivering less than this fails
    pub minimum_received: Decimal,
    pub slippage: SlippagePct,
    pub wallet: WalletBinding,
    pub created_at: DateTime<Utc>,
}

impl SwapIntent {
    pub fn from_quote(quote: &Quote, wallet: WalletBinding) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain: quote.from_token.chain,
            from_token: quote.from_token.clone(),
            to_token: quote.to_token.clone(),
            amount: quote.from_amount,
            to_amount: quote.to_amount,
            minimum_received: quote.minimum_received,
            slippage: SlippagePct::new(quote.slippage_pct).unwrap_or_default(),
            wallet,
            created_at: Utc::now(),
        }
    }
}

/// Reference to a submitted transaction (hash or ledger tx id)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxRef(pub String);

/// Terminal settlement report for one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub tx_ref: TxRef,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
}

/// Balance of a single held token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBalance {
    pub token: Token,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenRegistry;

    #[test]
    fn slippage_bounds_are_enforced() {
        assert!(SlippagePct::new(dec!(0.1)).is_ok());
        assert!(SlippagePct::new(dec!(5.0)).is_ok());
        assert!(SlippagePct::new(dec!(0.05)).is_err());
        assert!(SlippagePct::new(dec!(5.1)).is_err());
        assert_eq!(SlippagePct::default().value(), dec!(0.5));
    }

    #[test]
    fn minimum_received_uses_slippage_factor() {
        let registry = TokenRegistry::with_defaults();
        let xrp = registry.native(Chain::Xrpl);
        let usd = registry.by_symbol(Chain::Xrpl, "USD").unwrap();

        let slippage = SlippagePct::new(dec!(0.5)).unwrap();
        let quote = Quote::new(
            xrp.clone(),
            usd.clone(),
            dec!(10),
            dec!(24.8),
            slippage,
            dec!(0.12),
            vec!["XRPL-DEX".to_string()],
            None,
        );

        // minimum_received = to_amount * (1 - 0.5/100)
        assert_eq!(quote.minimum_received, dec!(24.8) * dec!(0.995));
    }

    #[test]
    fn base_unit_scaling_round_trips() {
        let registry = TokenRegistry::with_defaults();
        let xrp = registry.native(Chain::Xrpl);
        assert_eq!(xrp.decimals, 6);
        assert_eq!(xrp.to_base_units(dec!(10)).unwrap(), 10_000_000);
        assert_eq!(xrp.from_base_units(10_000_000).unwrap(), dec!(10));

        let usdc = registry.by_symbol(Chain::Ethereum, "USDC").unwrap();
        assert_eq!(usdc.to_base_units(dec!(1.25)).unwrap(), 1_250_000);

        // sub-unit dust truncates rather than rounding up
        assert_eq!(xrp.to_base_units(dec!(0.0000019)).unwrap(), 1);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let registry = TokenRegistry::with_defaults();
        let xrp = registry.native(Chain::Xrpl);
        assert!(xrp.to_base_units(dec!(-1)).is_err());
    }

    #[test]
    fn oversized_decimals_error_instead_of_panicking() {
        let token = Token {
            chain: Chain::Ethereum,
            symbol: "ODD".to_string(),
            display_name: "Oddball".to_string(),
            asset: AssetId::Contract {
                address: "0x0000000000000000000000000000000000000001".to_string(),
            },
            decimals: 40,
            logo_url: None,
        };
        assert!(token.to_base_units(dec!(1)).is_err());
        assert!(token.from_base_units(1).is_err());
    }

    #[test]
    fn native_tokens_use_the_sentinel_address() {
        let registry = TokenRegistry::with_defaults();
        let eth = registry.native(Chain::Ethereum);
        assert_eq!(eth.contract_address(), Some(EVM_NATIVE_SENTINEL));
        assert!(eth.issuer().is_none());

        let xrp = registry.native(Chain::Xrpl);
        assert!(xrp.contract_address().is_none());
        assert_eq!(xrp.currency(), Some("XRP"));
    }

    #[test]
    fn chain_families_split_ledger_from_evm() {
        assert_eq!(Chain::Xrpl.family(), ChainFamily::Ledger);
        for chain in [Chain::Ethereum, Chain::BnbChain, Chain::Polygon, Chain::Base] {
            assert_eq!(chain.family(), ChainFamily::Evm);
            assert!(chain.aggregator_code().is_some());
            assert!(chain.evm_chain_id().is_some());
        }
        assert!(Chain::Xrpl.aggregator_code().is_none());
    }
}
