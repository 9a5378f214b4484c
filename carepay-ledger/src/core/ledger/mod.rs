pub mod idempotency;
pub mod transaction_engine;
