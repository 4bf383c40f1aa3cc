//! Shared cookie store — one snapshot per account, kept in a chat bot's
//! pinned message.

pub mod client;
pub mod retry;

pub use client::{PinnedStore, SharedStore};
pub use retry::RetryPolicy;
