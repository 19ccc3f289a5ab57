//! # cachet
//!
//! A client for memcached-compatible binary-protocol key-value caches:
//! - One TCP connection, pipelined requests correlated by sequence number
//! - Synchronous gets and batched asynchronous runs
//! - Quiet/verbose miss policy, per connection and per call
//! - Extended retrieval: value, flags, and CAS token
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Client Facade                           │
//! │              get / set / delete / run(..)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ enqueue
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Run (batcher)                             │
//! │        seqno assignment + pending-request table              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ frames
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Transport Session                           │
//! │          buffered writes / framed reads (TCP)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                    network
//! ```
//!
//! Responses come back in whatever order the server produces them; the run's
//! dispatcher matches each to its pending request by sequence number and
//! applies the miss policy that was in effect when the request was issued.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod session;
pub mod run;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CachetError, Result};
pub use config::ClientConfig;

pub use client::{Client, Entry};
pub use run::{DeleteOptions, ErrorAction, ErrorHandler, Fetched, GetOptions, Run, SetOptions};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cachet
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
