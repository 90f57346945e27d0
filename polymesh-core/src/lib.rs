//! # Polymesh core types
//!
//! Chain-facing domain types shared by the procedure engine: entity identifiers,
//! transaction tags, the permission grants an account can hold, the roles an
//! identity can satisfy and fee amounts.
//!
//! Nothing in this crate performs I/O.

/// Entity identifiers (tickers, asset ids, identities, portfolios, venues).
pub mod identifiers;

/// Transaction tags naming the runtime calls the engine can emit.
pub mod tags;

/// Permission grants held by signing keys and the scopes procedures require.
pub mod permissions;

/// Roles checked against dynamic chain state.
pub mod roles;

/// Protocol and network fee amounts.
pub mod fees;

pub use fees::{Balance, Fees};
pub use identifiers::{AccountKey, AssetId, IdentifierError, IdentityId, PortfolioId, Ticker, VenueId};
pub use permissions::{Permissions, Scope, SectionPermissions, TransactionPermissions};
pub use roles::Role;
pub use tags::{TagOrModule, TxModule, TxTag};
