pub mod coordinator;
pub mod errors;
pub mod filename;
pub mod http_client;
pub mod instructions;
pub mod session;

pub use streamcatch_core::core::events;
