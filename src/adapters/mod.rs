pub mod aggregator;
pub mod ledger;
pub mod registry;
pub mod traits;

pub use registry::AdapterRegistry;
pub use traits::{ChainAdapter, Confirmation, ExecutionPlan, SignedPayload};
