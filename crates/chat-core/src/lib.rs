//! chathub core - shared types for the real-time chat hub
//!
//! This crate provides the domain types shared between the daemon
//! (chatd), the wire protocol and the terminal client:
//! - `id` - type-safe user and chat identifiers
//! - `store` - the persistence gateway the hub consumes
//! - `memory` - an in-process implementation of that gateway
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod id;
pub mod memory;
pub mod store;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use id::{ChatId, UserId};
pub use memory::{ChatSeed, MemoryStore, StoredMessage};
pub use store::{ChatStore, StoreError};
