pub mod client;
pub mod updates;

pub use client::Client;
