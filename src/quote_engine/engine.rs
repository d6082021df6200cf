use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::AdapterRegistry;
use crate::error::QuoteError;
use crate::types::{Chain, Quote, QuoteRequest, SlippagePct, Token};

/// Event stream surfaced to the caller. There is at most one live quote:
/// every event either replaces it or clears it.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    Quote(Quote),
    /// Quote cleared; `notice` carries a user-visible message when the
    /// failure warrants one and is `None` for silent clears
    Cleared { notice: Option<String> },
}

/// Input tuple a request was issued for, used to suppress repeated
/// provider-unavailable notices for the same tuple
#[derive(Debug, Clone, PartialEq)]
struct InputKey {
    chain: Chain,
    from: Token,
    to: Token,
    amount: Decimal,
    slippage: SlippagePct,
}

struct EngineState {
    chain: Chain,
    from_token: Option<Token>,
    to_token: Option<Token>,
    amount: Decimal,
    slippage: SlippagePct,
    /// Bumped on every input mutation; a task holding a stale generation
    /// neither issues a request nor applies a response
    generation: u64,
    /// Last tuple for which a provider-unavailable notice was surfaced
    unavailable_notified: Option<InputKey>,
}

impl EngineState {
    fn key(&self) -> Option<InputKey> {
        let from = self.from_token.clone()?;
        let to = self.to_token.clone()?;
        if self.amount <= Decimal::ZERO {
            return None;
        }
        Some(InputKey {
            chain: self.chain,
            from,
            to,
            amount: self.amount,
            slippage: self.slippage,
        })
    }
}

/// Keeps exactly one quote live per current input tuple.
///
/// Any input mutation restarts the debounce window; a request is issued
/// only once the window elapses quietly, and a response is applied only if
/// its input tuple is still current (last input wins, never last response).
pub struct QuoteEngine {
    registry: Arc<AdapterRegistry>,
    state: Arc<Mutex<EngineState>>,
    events: mpsc::UnboundedSender<QuoteEvent>,
    debounce: Duration,
}

impl QuoteEngine {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        chain: Chain,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<QuoteEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            registry,
            state: Arc::new(Mutex::new(EngineState {
                chain,
                from_token: None,
                to_token: None,
                amount: Decimal::ZERO,
                slippage: SlippagePct::default(),
                generation: 0,
                unavailable_notified: None,
            })),
            events,
            debounce,
        };
        (engine, rx)
    }

    pub fn set_chain(&self, chain: Chain) {
        self.mutate(|s| {
            s.chain = chain;
            // tokens belong to a chain; a switch invalidates the pair
            s.from_token = None;
            s.to_token = None;
        });
    }

    pub fn set_pair(&self, from_token: Token, to_token: Token) {
        self.mutate(|s| {
            s.from_token = Some(from_token);
            s.to_token = Some(to_token);
        });
    }

    pub fn set_amount(&self, amount: Decimal) {
        self.mutate(|s| s.amount = amount);
    }

    pub fn set_slippage(&self, slippage: SlippagePct) {
        self.mutate(|s| s.slippage = slippage);
    }

    /// Re-quote the current tuple through a fresh debounce cycle. This is
    /// the retry path after a silently cleared rate limit.
    pub fn refresh(&self) {
        self.mutate(|_| {});
    }

    fn mutate(&self, apply: impl FnOnce(&mut EngineState)) {
        let (generation, key) = {
            let mut state = self.state.lock();
            apply(&mut state);
            state.generation += 1;
            (state.generation, state.key())
        };

        // Zero/invalid amount or a missing token short-circuits to "no
        // quote" without any network activity
        let Some(key) = key else {
            let _ = self.events.send(QuoteEvent::Cleared { notice: None });
            return;
        };

        let registry = self.registry.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            // A newer mutation owns the window now
            if state.lock().generation != generation {
                return;
            }

            let Some(adapter) = registry.get(key.chain) else {
                let _ = events.send(QuoteEvent::Cleared {
                    notice: Some(format!("chain {:?} is not supported", key.chain)),
                });
                return;
            };

            let request = QuoteRequest {
                from_token: key.from.clone(),
                to_token: key.to.clone(),
                amount: key.amount,
                slippage: key.slippage,
            };
            let result = adapter.quote(&request).await;

            let mut state = state.lock();
            if state.generation != generation {
                debug!("discarding quote response for superseded inputs");
                return;
            }

            let event = match result {
                Ok(quote) => {
                    state.unavailable_notified = None;
                    QuoteEvent::Quote(quote)
                }
                // Suppressed from the user; the next natural debounce
                // cycle or an explicit refresh retries
                Err(QuoteError::RateLimited) => QuoteEvent::Cleared { notice: None },
                Err(QuoteError::NoLiquidity) => QuoteEvent::Cleared {
                    notice: Some("No liquidity available for this pair".to_string()),
                },
                Err(QuoteError::InvalidPair(message)) => QuoteEvent::Cleared {
                    notice: Some(message),
                },
                Err(QuoteError::ProviderUnavailable(message)) => {
                    // Surface once per distinct input tuple, not on every
                    // retry for the same one
                    let repeat = state.unavailable_notified.as_ref() == Some(&key);
                    state.unavailable_notified = Some(key);
                    QuoteEvent::Cleared {
                        notice: (!repeat).then_some(message),
                    }
                }
            };
            let _ = events.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::traits::{ChainAdapter, Confirmation, ExecutionPlan, SignedPayload};
    use crate::error::{BalanceError, ExecutionError, SubmitError};
    use crate::tokens::TokenRegistry;
    use crate::types::{SwapIntent, TokenBalance, TxRef};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter whose quote responses are scripted per call
    struct ScriptedAdapter {
        chain: Chain,
        calls: AtomicUsize,
        requested_amounts: Mutex<Vec<Decimal>>,
        script: Mutex<Vec<Result<Decimal, QuoteError>>>,
        delay: Duration,
    }

    impl ScriptedAdapter {
        fn new(chain: Chain, script: Vec<Result<Decimal, QuoteError>>) -> Self {
            Self {
                chain,
                calls: AtomicUsize::new(0),
                requested_amounts: Mutex::new(Vec::new()),
                script: Mutex::new(script),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ChainAdapter for ScriptedAdapter {
        fn chain(&self) -> Chain {
            self.chain
        }

        async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_amounts.lock().push(request.amount);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut script = self.script.lock();
                if script.is_empty() {
                    Ok(request.amount * dec!(2))
                } else {
                    script.remove(0)
                }
            };
            next.map(|to_amount| {
                Quote::new(
                    request.from_token.clone(),
                    request.to_token.clone(),
                    request.amount,
                    to_amount,
                    request.slippage,
                    Decimal::ZERO,
                    vec![],
                    None,
                )
            })
        }

        async fn build_execution(
            &self,
            _intent: &SwapIntent,
        ) -> Result<ExecutionPlan, ExecutionError> {
            unimplemented!("not exercised by quote tests")
        }

        async fn submit(&self, _signed: &SignedPayload) -> Result<TxRef, SubmitError> {
            unimplemented!("not exercised by quote tests")
        }

        async fn confirm(&self, _tx_ref: &TxRef) -> Result<Confirmation, SubmitError> {
            unimplemented!("not exercised by quote tests")
        }

        async fn balances(
            &self,
            _address: &str,
            _tracked: &[Token],
        ) -> Result<Vec<TokenBalance>, BalanceError> {
            Ok(vec![])
        }
    }

    fn engine_with(
        adapter: Arc<ScriptedAdapter>,
    ) -> (QuoteEngine, mpsc::UnboundedReceiver<QuoteEvent>) {
        let mut registry = AdapterRegistry::new();
        registry.register(adapter);
        let (engine, rx) = QuoteEngine::new(
            Arc::new(registry),
            Chain::Ethereum,
            Duration::from_millis(800),
        );

        let tokens = TokenRegistry::with_defaults();
        engine.set_pair(
            tokens.native(Chain::Ethereum).clone(),
            tokens.by_symbol(Chain::Ethereum, "USDC").unwrap().clone(),
        );
        (engine, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<QuoteEvent>) -> Vec<QuoteEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_inside_the_window_issue_one_request_for_the_final_amount() {
        let adapter = Arc::new(ScriptedAdapter::new(Chain::Ethereum, vec![]));
        let (engine, mut rx) = engine_with(adapter.clone());
        drain(&mut rx); // set_pair with zero amount emits a clear

        engine.set_amount(dec!(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.set_amount(dec!(2));
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*adapter.requested_amounts.lock(), vec![dec!(2)]);

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(QuoteEvent::Quote(q)) if q.from_amount == dec!(2)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_response_for_superseded_inputs_is_discarded() {
        let mut adapter = ScriptedAdapter::new(Chain::Ethereum, vec![]);
        adapter.delay = Duration::from_millis(1000);
        let adapter = Arc::new(adapter);
        let (engine, mut rx) = engine_with(adapter.clone());
        drain(&mut rx);

        engine.set_amount(dec!(1));
        // first request goes out at t=800 and stays in flight until t=1800
        tokio::time::sleep(Duration::from_millis(900)).await;
        engine.set_amount(dec!(2));
        tokio::time::sleep(Duration::from_millis(3000)).await;

        // both requests were issued, but only the current tuple's response
        // is applied
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
        let quotes: Vec<Decimal> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                QuoteEvent::Quote(q) => Some(q.from_amount),
                _ => None,
            })
            .collect();
        assert_eq!(quotes, vec![dec!(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_amount_clears_without_a_network_call() {
        let adapter = Arc::new(ScriptedAdapter::new(Chain::Ethereum, vec![]));
        let (engine, mut rx) = engine_with(adapter.clone());
        drain(&mut rx);

        engine.set_amount(Decimal::ZERO);
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            drain(&mut rx),
            vec![QuoteEvent::Cleared { notice: None }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_clears_silently_and_a_refresh_replaces_the_quote() {
        let adapter = Arc::new(ScriptedAdapter::new(
            Chain::Ethereum,
            vec![Err(QuoteError::RateLimited), Ok(dec!(42))],
        ));
        let (engine, mut rx) = engine_with(adapter.clone());
        drain(&mut rx);

        engine.set_amount(dec!(5));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(
            drain(&mut rx),
            vec![QuoteEvent::Cleared { notice: None }]
        );

        // same inputs, next debounce cycle
        engine.refresh();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [QuoteEvent::Quote(q)] if q.to_amount == dec!(42)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn no_liquidity_surfaces_a_user_visible_notice() {
        let adapter = Arc::new(ScriptedAdapter::new(
            Chain::Ethereum,
            vec![Err(QuoteError::NoLiquidity)],
        ));
        let (engine, mut rx) = engine_with(adapter);
        drain(&mut rx);

        engine.set_amount(dec!(5));
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [QuoteEvent::Cleared { notice: Some(_) }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_unavailable_is_surfaced_once_per_tuple() {
        let adapter = Arc::new(ScriptedAdapter::new(
            Chain::Ethereum,
            vec![
                Err(QuoteError::ProviderUnavailable("down".to_string())),
                Err(QuoteError::ProviderUnavailable("down".to_string())),
            ],
        ));
        let (engine, mut rx) = engine_with(adapter);
        drain(&mut rx);

        engine.set_amount(dec!(5));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        engine.refresh();
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                QuoteEvent::Cleared {
                    notice: Some("down".to_string())
                },
                QuoteEvent::Cleared { notice: None },
            ]
        );
    }
}
