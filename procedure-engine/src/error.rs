use serde::Serialize;
use snafu::Snafu;

use crate::authorization::DenialReason;

/// Flat classification of [`Error`], for callers that branch on the kind of failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    /// Malformed or out-of-range user input.
    ValidationError,
    /// A required on-chain precondition does not hold.
    UnmetPrerequisite,
    /// The requested mutation would not change anything.
    NoDataChange,
    /// The operation would exceed a chain-enforced cap.
    LimitExceeded,
    /// The target has dependents preventing the operation.
    EntityInUse,
    /// The signer cannot pay for the operation.
    InsufficientBalance,
    /// The signer lacks permissions or roles.
    NotAuthorized,
    /// A referenced on-chain entity does not exist.
    DataUnavailable,
    /// The off-chain indexer failed.
    MiddlewareError,
    /// An internal invariant was violated.
    FatalError,
    /// Something that should not happen happened.
    UnexpectedError,
    /// Catch-all.
    General,
    /// The transaction was included but the runtime rejected it.
    TransactionFailed,
    /// The signer declined to sign.
    TransactionRejected,
    /// A previous critical transaction failed, so this one never ran.
    TransactionAborted,
    /// The chain client failed.
    ChainError,
    /// Keys or configuration could not be loaded.
    ConfigError,
}

/// Errors raised by the procedure engine.
///
/// Business rule violations (`Validation` to `InsufficientBalance`) and `NotAuthorized`
/// are raised before anything is submitted. The `Transaction*` variants describe the
/// terminal outcome of a submitted transaction.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Malformed or out-of-range user input.
    #[snafu(display("Validation error: {message}"))]
    Validation {
        /// Human readable description.
        message: String,
    },

    /// A required on-chain precondition does not hold.
    #[snafu(display("Unmet prerequisite: {message}"))]
    UnmetPrerequisite {
        /// Human readable description.
        message: String,
    },

    /// The requested mutation would be a no-op.
    #[snafu(display("No data change: {message}"))]
    NoDataChange {
        /// Human readable description.
        message: String,
    },

    /// The operation would exceed a chain-enforced cap.
    #[snafu(display("Limit exceeded: {message}"))]
    LimitExceeded {
        /// Human readable description.
        message: String,
    },

    /// The target has dependents preventing the operation.
    #[snafu(display("Entity in use: {message}"))]
    EntityInUse {
        /// Human readable description.
        message: String,
    },

    /// The signer cannot pay for the operation.
    #[snafu(display("Insufficient balance: {message}"))]
    InsufficientBalance {
        /// Human readable description.
        message: String,
    },

    /// The signer does not hold what the procedure requires.
    #[snafu(display("Not authorized: {}", join_reasons(reasons)))]
    NotAuthorized {
        /// Every unmet requirement.
        reasons: Vec<DenialReason>,
    },

    /// A referenced on-chain entity does not exist.
    #[snafu(display("Data unavailable: {message}"))]
    DataUnavailable {
        /// Human readable description.
        message: String,
    },

    /// The off-chain indexer failed.
    #[snafu(display("Middleware error: {message}"))]
    Middleware {
        /// Human readable description.
        message: String,
    },

    /// An internal invariant was violated.
    #[snafu(display("Fatal error: {message}"))]
    Fatal {
        /// Human readable description.
        message: String,
    },

    /// Something that should not happen happened.
    #[snafu(display("Unexpected error: {message}"))]
    Unexpected {
        /// Human readable description.
        message: String,
    },

    /// Catch-all.
    #[snafu(display("{message}"))]
    General {
        /// Human readable description.
        message: String,
    },

    /// The transaction was included in a block but its execution failed.
    #[snafu(display("Transaction {tag} failed: {message}"))]
    TransactionFailed {
        /// Tag of the failed transaction.
        tag: String,
        /// Dispatch error reported by the runtime.
        message: String,
    },

    /// The signer declined to sign the transaction.
    #[snafu(display("Transaction {tag} was rejected by the signer: {reason}"))]
    TransactionRejected {
        /// Tag of the rejected transaction.
        tag: String,
        /// Reason given by the signer.
        reason: String,
    },

    /// The transaction was never submitted because a critical predecessor failed.
    #[snafu(display("Transaction {tag} was aborted"))]
    TransactionAborted {
        /// Tag of the aborted transaction.
        tag: String,
    },

    /// The chain client failed.
    #[snafu(display("Chain client error: {source}"))]
    Chain {
        /// The underlying chain client error.
        source: ChainError,
    },

    /// Error when reading a signing key from a file.
    #[snafu(display("Failed to read signing key from file '{}': {}", path, source))]
    KeyFileRead {
        /// The path of the key file that could not be read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Error when parsing a signing key seed from a hexadecimal string.
    #[snafu(display("Failed to parse signing key as hex: {}", source))]
    KeyParse {
        /// The underlying hex parsing error.
        source: hex::FromHexError,
    },

    /// The parsed seed length is invalid; sr25519 seeds are exactly 32 bytes.
    #[snafu(display("Invalid key length: expected 32 bytes, got {}", length))]
    InvalidKeyLength {
        /// The actual length of the provided key.
        length: usize,
    },

    /// Error when failing to create a keypair from a seed or secret URI.
    #[snafu(display("Failed to create keypair: {message}"))]
    KeypairCreation {
        /// Description of the failure.
        message: String,
    },

    /// Error when building the RPC client.
    #[snafu(display("Error building RPC client for '{url}': {message}"))]
    RpcClientBuild {
        /// Node URL.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// Error when attempting to connect to the chain.
    #[snafu(display("Error connecting to chain: {source}"))]
    ChainConnection {
        /// The underlying error from the `subxt` library.
        source: subxt::Error,
    },
}

fn join_reasons(reasons: &[DenialReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// The flat classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation { .. } => ErrorCode::ValidationError,
            Error::UnmetPrerequisite { .. } => ErrorCode::UnmetPrerequisite,
            Error::NoDataChange { .. } => ErrorCode::NoDataChange,
            Error::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            Error::EntityInUse { .. } => ErrorCode::EntityInUse,
            Error::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            Error::NotAuthorized { .. } => ErrorCode::NotAuthorized,
            Error::DataUnavailable { .. } => ErrorCode::DataUnavailable,
            Error::Middleware { .. } => ErrorCode::MiddlewareError,
            Error::Fatal { .. } => ErrorCode::FatalError,
            Error::Unexpected { .. } => ErrorCode::UnexpectedError,
            Error::General { .. } => ErrorCode::General,
            Error::TransactionFailed { .. } => ErrorCode::TransactionFailed,
            Error::TransactionRejected { .. } => ErrorCode::TransactionRejected,
            Error::TransactionAborted { .. } => ErrorCode::TransactionAborted,
            Error::Chain { .. } => ErrorCode::ChainError,
            Error::KeyFileRead { .. }
            | Error::KeyParse { .. }
            | Error::InvalidKeyLength { .. }
            | Error::KeypairCreation { .. }
            | Error::RpcClientBuild { .. }
            | Error::ChainConnection { .. } => ErrorCode::ConfigError,
        }
    }

    /// Whether the error was raised before anything reached the chain.
    ///
    /// Pre-submission errors come from validation and authorization; the rest describe
    /// the outcome of a submitted transaction or a transport failure.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::ValidationError
                | ErrorCode::UnmetPrerequisite
                | ErrorCode::NoDataChange
                | ErrorCode::LimitExceeded
                | ErrorCode::EntityInUse
                | ErrorCode::InsufficientBalance
                | ErrorCode::NotAuthorized
                | ErrorCode::DataUnavailable
        )
    }
}

/// Errors reported by a [`crate::chain::ChainClient`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ChainError {
    /// Error from the `subxt` client.
    #[snafu(display("Subxt error: {source}"))]
    Subxt {
        /// The underlying error from the `subxt` library.
        source: subxt::Error,
    },

    /// The signer declined to sign.
    #[snafu(display("Signature rejected: {reason}"))]
    SignatureRejected {
        /// Reason given by the signer.
        reason: String,
    },

    /// The transaction was dropped from the pool.
    #[snafu(display("Transaction dropped: {message}"))]
    Dropped {
        /// Message from the node.
        message: String,
    },

    /// The node considers the transaction invalid.
    #[snafu(display("Transaction invalid: {message}"))]
    Invalid {
        /// Message from the node.
        message: String,
    },

    /// The status subscription ended before the transaction was finalized.
    #[snafu(display("Transaction status subscription ended before finalization"))]
    StreamEnded,

    /// A storage value or event did not have the expected shape.
    #[snafu(display("Failed to decode {what}: {message}"))]
    Decode {
        /// What was being decoded.
        what: String,
        /// Description of the mismatch.
        message: String,
    },

    /// Any other transport failure.
    #[snafu(display("Chain client failure: {message}"))]
    Other {
        /// Description of the failure.
        message: String,
    },
}

/// Type alias for results that return a `Result<T, Error>`, simplifying error handling.
pub type Result<T, E = Error> = std::result::Result<T, E>;
