pub mod executor;

pub use executor::{SwapExecutor, SwapFailure, SwapOutcome, SwapStage};
