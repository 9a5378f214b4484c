pub mod builder;
pub mod janitor;
