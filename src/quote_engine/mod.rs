pub mod engine;

pub use engine::{QuoteEngine, QuoteEvent};
