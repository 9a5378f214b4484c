pub mod error;
pub mod money;
pub mod payment;
pub mod utils;

pub use error::{CarePayError, Result};
pub use money::Amount;
