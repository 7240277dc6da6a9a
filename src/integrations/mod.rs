//! External collaborators: prose summaries and report publishing

pub mod config;
pub mod publisher;
pub mod retry;
pub mod summarizer;

pub use config::*;
pub use publisher::*;
pub use retry::*;
pub use summarizer::*;
