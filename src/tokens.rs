use std::collections::HashMap;

use crate::types::{AssetId, Chain, Token};

fn token(
    chain: Chain,
    symbol: &str,
    display_name: &str,
    asset: AssetId,
    decimals: u8,
) -> Token {
    Token {
        chain,
        symbol: symbol.to_string(),
        display_name: display_name.to_string(),
        asset,
        decimals,
        logo_url: None,
    }
}

/// Catalog of tradable tokens per chain. Built once at startup; the UI
/// layer may extend it with user-added tokens before handing it out.
pub struct TokenRegistry {
    tokens: HashMap<Chain, Vec<Token>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
        }
    }

    /// Registry preloaded with the native token and the usual majors on
    /// every supported chain.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.extend(
            Chain::Xrpl,
            vec![
                token(Chain::Xrpl, "XRP", "XRP", AssetId::LedgerNative, 6),
                token(
                    Chain::Xrpl,
                    "USD",
                    "US Dollar (GateHub)",
                    AssetId::Issued {
                        currency: "USD".to_string(),
                        issuer: "rhub8VRN55s94qWKDv6jmDy1pUykJzF3wq".to_string(),
                    },
                    15,
                ),
                token(
                    Chain::Xrpl,
                    "EUR",
                    "Euro (GateHub)",
                    AssetId::Issued {
                        currency: "EUR".to_string(),
                        issuer: "rhub8VRN55s94qWKDv6jmDy1pUykJzF3wq".to_string(),
                    },
                    15,
                ),
            ],
        );

        registry.extend(
            Chain::Ethereum,
            vec![
                token(Chain::Ethereum, "ETH", "Ether", AssetId::EvmNative, 18),
                token(
                    Chain::Ethereum,
                    "USDC",
                    "USD Coin",
                    AssetId::Contract {
                        address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
                    },
                    6,
                ),
                token(
                    Chain::Ethereum,
                    "USDT",
                    "Tether USD",
                    AssetId::Contract {
                        address: "0xdac17f958d2ee523a2206206994597c13d831ec7".to_string(),
                    },
                    6,
                ),
                token(
                    Chain::Ethereum,
                    "WBTC",
                    "Wrapped BTC",
                    AssetId::Contract {
                        address: "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599".to_string(),
                    },
                    8,
                ),
            ],
        );

        registry.extend(
            Chain::BnbChain,
            vec![
                token(Chain::BnbChain, "BNB", "BNB", AssetId::EvmNative, 18),
                token(
                    Chain::BnbChain,
                    "USDT",
                    "Tether USD",
                    AssetId::Contract {
                        address: "0x55d398326f99059ff775485246999027b3197955".to_string(),
                    },
                    18,
                ),
            ],
        );

        registry.extend(
            Chain::Polygon,
            vec![
                token(Chain::Polygon, "POL", "Polygon", AssetId::EvmNative, 18),
                token(
                    Chain::Polygon,
                    "USDC",
                    "USD Coin",
                    AssetId::Contract {
                        address: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359".to_string(),
                    },
                    6,
                ),
            ],
        );

        registry.extend(
            Chain::Base,
            vec![
                token(Chain::Base, "ETH", "Ether", AssetId::EvmNative, 18),
                token(
                    Chain::Base,
                    "USDC",
                    "USD Coin",
                    AssetId::Contract {
                        address: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913".to_string(),
                    },
                    6,
                ),
            ],
        );

        registry
    }

    pub fn extend(&mut self, chain: Chain, tokens: Vec<Token>) {
        self.tokens.entry(chain).or_default().extend(tokens);
    }

    pub fn tokens_for(&self, chain: Chain) -> &[Token] {
        self.tokens.get(&chain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The chain's native token. Every supported chain has one; a chain
    /// missing from the registry is a construction bug.
    pub fn native(&self, chain: Chain) -> &Token {
        self.tokens_for(chain)
            .iter()
            .find(|t| t.is_native())
            .unwrap_or_else(|| panic!("no native token registered for {chain:?}"))
    }

    pub fn by_symbol(&self, chain: Chain, symbol: &str) -> Option<&Token> {
        self.tokens_for(chain)
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_chain_has_a_native_token() {
        let registry = TokenRegistry::with_defaults();
        for chain in Chain::all() {
            let native = registry.native(chain);
            assert!(native.is_native());
            assert_eq!(native.chain, chain);
        }
    }

    #[test]
    fn symbol_lookup_is_case_insensitive() {
        let registry = TokenRegistry::with_defaults();
        assert!(registry.by_symbol(Chain::Ethereum, "usdc").is_some());
        assert!(registry.by_symbol(Chain::Ethereum, "DOGE").is_none());
    }
}
