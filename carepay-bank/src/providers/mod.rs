pub mod http;
pub mod monnify;
pub mod payload;
pub mod paystack;
pub mod token_cache;
pub mod traits;

pub use monnify::{MonnifyConfig, MonnifyProvider};
pub use paystack::{PaystackConfig, PaystackProvider};
