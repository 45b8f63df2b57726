pub mod config;
pub mod error;

pub use config::Config;
pub use error::*;

/// Identity of the user a conversation (and every tool call in it) acts for.
pub type UserId = i64;
