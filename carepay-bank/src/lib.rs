pub mod error;
pub mod providers;
pub mod registry;
pub mod signature;

pub use error::ProviderError;
pub use providers::traits::PaymentProvider;
pub use registry::ProviderRegistry;
pub use signature::WebhookVerifier;
