pub mod cli;
pub mod core;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod strategy;
pub mod submitter;
pub mod types;
pub mod utils;


// Re-export commonly used item
pub use error::{AggregatorError, AggregatorResult};
