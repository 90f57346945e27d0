//! A single extrinsic (or an atomic batch of them) and its lifecycle.
//!
//! Status only moves forward:
//!
//! ```text
//! Idle -> Unapproved -> Running -> Succeeded | Failed | Aborted | Rejected
//! ```
//!
//! Terminal states never change again. Attempting to move a terminal transaction is a
//! programming error and is reported as [`Error::Fatal`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use futures::StreamExt;
use log::{error, info, warn};
use polymesh_core::{Fees, TxTag};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::batch::TransactionBatch;
use crate::chain::{ChainClient, ExtrinsicCall, SubmissionEvent, Value};
use crate::error::{ChainError, Error, Result};
use crate::queue::QueueEvent;
use crate::receipt::TransactionReceipt;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identifier of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionStatus {
    /// Not submitted yet.
    Idle,
    /// Waiting for the signer.
    Unapproved,
    /// Submitted and waiting for finality.
    Running,
    /// Finalized without a dispatch error.
    Succeeded,
    /// Finalized with a dispatch error, or lost by the node.
    Failed,
    /// Never submitted because a critical predecessor failed.
    Aborted,
    /// The signer declined to sign.
    Rejected,
}

impl TransactionStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        self.stage() == 3
    }

    fn stage(self) -> u8 {
        match self {
            TransactionStatus::Idle => 0,
            TransactionStatus::Unapproved => 1,
            TransactionStatus::Running => 2,
            TransactionStatus::Succeeded
            | TransactionStatus::Failed
            | TransactionStatus::Aborted
            | TransactionStatus::Rejected => 3,
        }
    }
}

/// A call argument, either known now or taken from a value resolved earlier in the queue.
pub enum TxArg {
    /// Known when the transaction is added.
    Value(Value),
    /// Encoded right before signing.
    Deferred {
        /// Returns `None` while the source value is not resolved.
        compute: Box<dyn Fn() -> Option<Value> + Send + Sync>,
        /// Same shape as the real argument; only used to estimate fees before it resolves.
        placeholder: Value,
    },
}

impl TxArg {
    /// An argument computed right before signing, estimated with `placeholder` until then.
    pub fn deferred(
        placeholder: Value,
        compute: impl Fn() -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        TxArg::Deferred {
            compute: Box::new(compute),
            placeholder,
        }
    }

    pub(crate) fn materialize(&self) -> Result<Value> {
        match self {
            TxArg::Value(value) => Ok(value.clone()),
            TxArg::Deferred { compute, .. } => compute().ok_or_else(|| Error::Unexpected {
                message: "a deferred argument was used before its transaction resolved".into(),
            }),
        }
    }

    /// The argument as far as it is known, for fee estimation.
    pub(crate) fn estimate(&self) -> Value {
        match self {
            TxArg::Value(value) => value.clone(),
            TxArg::Deferred {
                compute,
                placeholder,
            } => compute().unwrap_or_else(|| placeholder.clone()),
        }
    }
}

impl From<Value> for TxArg {
    fn from(value: Value) -> Self {
        TxArg::Value(value)
    }
}

impl fmt::Debug for TxArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxArg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            TxArg::Deferred { placeholder, .. } => {
                f.debug_struct("Deferred").field("placeholder", placeholder).finish()
            }
        }
    }
}

/// Describes one call to add to a queue.
#[derive(Debug)]
pub struct TransactionSpec {
    /// The call.
    pub tag: TxTag,
    /// Positional call arguments.
    pub args: Vec<TxArg>,
    /// Fees known up front; estimated through the chain client otherwise.
    pub fee: Option<Fees>,
    /// How many times the protocol fee is charged, for calls that pay per item.
    pub fee_multiplier: Option<u32>,
    /// Whether a failure aborts the rest of the queue.
    pub is_critical: bool,
}

impl TransactionSpec {
    /// A critical call with `args`.
    pub fn new<A: Into<TxArg>>(tag: TxTag, args: impl IntoIterator<Item = A>) -> Self {
        Self {
            tag,
            args: args.into_iter().map(Into::into).collect(),
            fee: None,
            fee_multiplier: None,
            is_critical: true,
        }
    }

    /// Marks the call as optional: its failure does not abort the queue.
    pub fn non_critical(mut self) -> Self {
        self.is_critical = false;
        self
    }

    /// Sets fees known up front.
    pub fn with_fee(mut self, fee: Fees) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Charges the protocol fee `multiplier` times.
    pub fn with_fee_multiplier(mut self, multiplier: u32) -> Self {
        self.fee_multiplier = Some(multiplier);
        self
    }

    pub(crate) fn materialize(&self) -> Result<(TxTag, Vec<Value>)> {
        let args = self
            .args
            .iter()
            .map(TxArg::materialize)
            .collect::<Result<Vec<_>>>()?;
        Ok((self.tag, args))
    }

    /// Fees of this call, estimating through `client` when not known up front.
    pub(crate) async fn fees(&self, client: &dyn ChainClient) -> Result<Fees> {
        let fees = match self.fee {
            Some(fee) => fee,
            None => {
                let args = self.args.iter().map(TxArg::estimate).collect();
                client
                    .estimate_fee(&ExtrinsicCall::Single {
                        tag: self.tag,
                        args,
                    })
                    .await
                    .map_err(|source| Error::Chain { source })?
            }
        };
        Ok(match self.fee_multiplier {
            Some(multiplier) => fees.with_protocol_multiplier(multiplier),
            None => fees,
        })
    }
}

/// What a transaction submits.
#[derive(Debug)]
pub(crate) enum Payload {
    Single(TransactionSpec),
    Batch(TransactionBatch),
}

/// A call (or batch of calls) with its status machine.
pub struct PolymeshTransaction {
    id: TransactionId,
    payload: Payload,
    status: watch::Sender<TransactionStatus>,
    receipt: OnceLock<TransactionReceipt>,
    events: broadcast::Sender<QueueEvent>,
}

impl fmt::Debug for PolymeshTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymeshTransaction")
            .field("id", &self.id)
            .field("tags", &self.tags())
            .field("status", &self.status())
            .finish()
    }
}

impl PolymeshTransaction {
    pub(crate) fn new(payload: Payload, events: broadcast::Sender<QueueEvent>) -> Self {
        let (status, _) = watch::channel(TransactionStatus::Idle);
        Self {
            id: TransactionId::next(),
            payload,
            status,
            receipt: OnceLock::new(),
            events,
        }
    }

    /// Identifier of this transaction.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Every call dispatched by this transaction, in order.
    pub fn tags(&self) -> Vec<TxTag> {
        match &self.payload {
            Payload::Single(spec) => vec![spec.tag],
            Payload::Batch(batch) => batch.tags(),
        }
    }

    /// Whether this is a batch.
    pub fn is_batch(&self) -> bool {
        matches!(self.payload, Payload::Batch(_))
    }

    /// Whether a failure aborts the rest of the queue.
    pub fn is_critical(&self) -> bool {
        match &self.payload {
            Payload::Single(spec) => spec.is_critical,
            Payload::Batch(batch) => batch.is_critical(),
        }
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<TransactionStatus> {
        self.status.subscribe()
    }

    /// The receipt, once finalized.
    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        self.receipt.get()
    }

    /// Fees of this transaction.
    pub async fn fees(&self, client: &dyn ChainClient) -> Result<Fees> {
        match &self.payload {
            Payload::Single(spec) => spec.fees(client).await,
            Payload::Batch(batch) => batch.fees(client).await,
        }
    }

    fn describe(&self) -> String {
        self.tags()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Moves to `next`, refusing to leave a terminal state or to go backwards.
    pub(crate) fn transition(&self, next: TransactionStatus) -> Result<()> {
        let mut refused = None;
        self.status.send_if_modified(|current| {
            if current.is_terminal() || next.stage() <= current.stage() {
                refused = Some(*current);
                false
            } else {
                *current = next;
                true
            }
        });

        if let Some(current) = refused {
            error!(
                "❌ Transaction {} cannot move from {:?} to {:?}",
                self.id, current, next
            );
            return Err(Error::Fatal {
                message: format!(
                    "transaction {} cannot move from {current:?} to {next:?}",
                    self.id
                ),
            });
        }

        let _ = self.events.send(QueueEvent {
            transaction: self.id,
            status: next,
        });
        Ok(())
    }

    /// Marks the transaction as never submitted.
    pub(crate) fn abort(&self) -> Result<()> {
        warn!("⏭️ Aborting transaction {} ({})", self.id, self.describe());
        self.transition(TransactionStatus::Aborted)
    }

    fn failed_with(&self, err: Error) -> Result<TransactionReceipt> {
        self.transition(TransactionStatus::Failed)?;
        Err(err)
    }

    /// Signs, submits and waits for finality.
    ///
    /// Resolves once a terminal state is reached; returns an error unless the transaction
    /// succeeded.
    pub async fn run(&self, client: &dyn ChainClient) -> Result<TransactionReceipt> {
        if self.status() == TransactionStatus::Aborted {
            return Err(Error::TransactionAborted {
                tag: self.describe(),
            });
        }
        self.transition(TransactionStatus::Unapproved)?;

        let call = match &self.payload {
            Payload::Single(spec) => spec
                .materialize()
                .map(|(tag, args)| ExtrinsicCall::Single { tag, args }),
            Payload::Batch(batch) => batch.to_call(),
        };
        let call = match call {
            Ok(call) => call,
            Err(err) => return self.failed_with(err),
        };
        let tag = call.tag().to_string();

        info!("✍️ Requesting signature for {} ({})", self.id, self.describe());
        let mut progress = match client.submit(call).await {
            Ok(progress) => progress,
            Err(ChainError::SignatureRejected { reason }) => {
                warn!("🚫 Signer rejected transaction {}: {}", self.id, reason);
                self.transition(TransactionStatus::Rejected)?;
                return Err(Error::TransactionRejected { tag, reason });
            }
            Err(source) => return self.failed_with(Error::Chain { source }),
        };

        while let Some(event) = progress.next().await {
            match event {
                Ok(SubmissionEvent::Submitted { hash }) => {
                    info!("📡 Transaction {} submitted as {:?}", self.id, hash);
                    self.transition(TransactionStatus::Running)?;
                }
                Ok(SubmissionEvent::InBlock { block_hash }) => {
                    info!("📦 Transaction {} is in best block {:?}", self.id, block_hash);
                }
                Ok(SubmissionEvent::Finalized(receipt)) => {
                    info!(
                        "✅ Transaction {} finalized in block {:?}",
                        self.id, receipt.block_hash
                    );
                    let dispatch_error = receipt.dispatch_error.clone();
                    let _ = self.receipt.set(receipt.clone());
                    return match dispatch_error {
                        None => {
                            self.transition(TransactionStatus::Succeeded)?;
                            Ok(receipt)
                        }
                        Some(message) => {
                            error!("❌ Transaction {} failed on chain: {}", self.id, message);
                            self.failed_with(Error::TransactionFailed { tag, message })
                        }
                    };
                }
                Err(source) => {
                    error!("❌ Error while watching transaction {}: {}", self.id, source);
                    return self.failed_with(Error::Chain { source });
                }
            }
        }

        self.failed_with(Error::Chain {
            source: ChainError::StreamEnded,
        })
    }
}
