// Recompute pipeline: cursor -> prefetch -> office/rate caches -> calculator -> writer
pub mod calculator;
pub mod driver;
pub mod models;
pub mod office_cache;
pub mod prefetch;
pub mod rate_cache;
pub mod scanner;
pub mod writer;

pub use driver::{PassOutcome, TableDriver};
