pub mod api;
pub mod core;
pub mod domain;
pub mod notion;
pub mod security;
pub mod telegram;

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
