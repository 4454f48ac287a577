//! Multi-tenant chat-bot gateway.
//!
//! Several bot identities share one process. Each listens on its own platform
//! connection, decides whether a message is addressed to it, rebuilds the
//! conversation from a shared reply-chain memory, asks a generation backend
//! for a reply and posts it back.

pub mod backend;
pub mod chat;
pub mod comms;
pub mod config;
pub mod error;
pub mod logger;
pub mod memory;
pub mod runtime;
pub mod supervisor;
pub mod worker;
