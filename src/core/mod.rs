//! # Core
//!
//! Conversation state and the ambient pieces around it. Knows nothing
//! about terminals; the binary is one adapter on top.
//!
//! ## Modules
//!
//! - [`session`]: `Conversation` and its streaming `ReplyStream`
//! - [`config`]: `~/.chatter/config.toml` and override resolution
//! - [`credentials`]: where API keys come from

pub mod config;
pub mod credentials;
pub mod session;

pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use session::{Conversation, ReplyStream};
