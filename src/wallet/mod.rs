pub mod resolver;

pub use resolver::{CustodialSession, InjectedWalletProvider, WalletResolver};

use async_trait::async_trait;

use crate::adapters::traits::{ExecutionPlan, SignedPayload};
use crate::error::SignError;
use crate::types::WalletBinding;

/// Signing capability behind the resolved wallet. Custody and key material
/// live entirely on the other side of this trait.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign(
        &self,
        wallet: &WalletBinding,
        plan: &ExecutionPlan,
    ) -> Result<SignedPayload, SignError>;
}
