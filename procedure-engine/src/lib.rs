//! # Polymesh procedure engine
//!
//! Turns high level operations (reserve a ticker, create an asset, ...) into
//! authorized, ordered queues of chain transactions, runs them, and resolves the
//! values the operations produce from the emitted events.
//!
//! ```text
//! Procedure ──prepare──▶ TransactionQueue ──run──▶ PolymeshTransaction(s) ──▶ ChainClient
//!     │                         │                              │
//!     └── authorization ────────┘                              └── receipts ──▶ resolvers
//! ```

/// Error handling module.
///
/// Defines the engine's error taxonomy using the `snafu` crate, together with the
/// failures a chain client can report.
pub mod error;

/// Chain client seam: calls, submission progress and storage reads.
pub mod chain;

/// Submission through `subxt`, with nonce tracking and retries.
pub mod subxt_client;

/// Per-account nonce sequencing.
pub mod sequencer;

/// Cryptographic signer module.
///
/// Provides functionality for loading signing keys from disk.
pub mod signer;

/// Connection settings.
pub mod config;

/// Finalized transaction receipts and their events.
pub mod receipt;

/// Readers for dynamically decoded values.
pub mod values;

/// Values known only once a transaction has run.
pub mod post_transaction_value;

/// A single unit of submission and its lifecycle.
pub mod transaction;

/// Atomic groups of calls.
pub mod batch;

/// Ordered execution of prepared transactions.
pub mod queue;

/// Authorization of procedures against signer grants and roles.
pub mod authorization;

/// Entity layer backed by chain storage.
pub mod entities;

/// Procedures and the queue builder they prepare into.
pub mod procedure;

/// Built-in procedures.
pub mod procedures;

#[cfg(test)]
mod mock;

pub use authorization::{Actor, EntityLayer, ProcedureAuthorization, Verdict};
pub use chain::{ChainClient, ExtrinsicCall};
pub use entities::ChainEntities;
pub use error::{Error, ErrorCode, Result};
pub use post_transaction_value::{PostTransactionValue, ReturnValue};
pub use procedure::{Context, Procedure, QueueBuilder};
pub use queue::{QueueStatus, TransactionQueue};
pub use transaction::{PolymeshTransaction, TransactionSpec, TransactionStatus};
