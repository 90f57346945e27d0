//! The seam between the engine and the chain client that encodes, signs and submits
//! extrinsics.
//!
//! The engine never talks to a node directly; it hands [`ExtrinsicCall`]s to a
//! [`ChainClient`] and consumes the resulting [`SubmissionEvent`] stream. The
//! production implementation is [`crate::subxt_client::SubxtChainClient`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use polymesh_core::tags::utility;
use polymesh_core::{AccountKey, Fees, TxTag};
use subxt::utils::H256;

pub use subxt::dynamic::Value;

use crate::error::ChainError;
use crate::receipt::TransactionReceipt;

/// A runtime call ready to be encoded.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtrinsicCall {
    /// One call.
    Single {
        /// The call.
        tag: TxTag,
        /// Positional call arguments.
        args: Vec<Value>,
    },
    /// Several calls dispatched atomically through `Utility.batch_all`.
    BatchAll(Vec<(TxTag, Vec<Value>)>),
}

impl ExtrinsicCall {
    /// The outer call that will be signed.
    pub fn tag(&self) -> TxTag {
        match self {
            ExtrinsicCall::Single { tag, .. } => *tag,
            ExtrinsicCall::BatchAll(_) => utility::BATCH_ALL,
        }
    }

    /// Every call dispatched by this extrinsic, in order.
    pub fn dispatched_tags(&self) -> Vec<TxTag> {
        match self {
            ExtrinsicCall::Single { tag, .. } => vec![*tag],
            ExtrinsicCall::BatchAll(calls) => calls.iter().map(|(tag, _)| *tag).collect(),
        }
    }

    /// Pallet of the outer call.
    pub fn pallet_name(&self) -> &'static str {
        self.tag().pallet_name()
    }

    /// Name of the outer call.
    pub fn call_name(&self) -> &'static str {
        self.tag().call
    }

    /// Arguments of the outer call. Batched calls are wrapped as `RuntimeCall` variants.
    pub fn call_args(&self) -> Vec<Value> {
        match self {
            ExtrinsicCall::Single { args, .. } => args.clone(),
            ExtrinsicCall::BatchAll(calls) => {
                let calls = calls
                    .iter()
                    .map(|(tag, args)| runtime_call(tag, args.clone()))
                    .collect::<Vec<_>>();
                vec![Value::unnamed_composite(calls)]
            }
        }
    }
}

/// Encodes a call as the `RuntimeCall` enum expected by `Utility` batches.
fn runtime_call(tag: &TxTag, args: Vec<Value>) -> Value {
    Value::unnamed_variant(
        tag.pallet_name(),
        [Value::unnamed_variant(tag.call, args)],
    )
}

/// Progress of a submitted extrinsic.
#[derive(Clone, Debug)]
pub enum SubmissionEvent {
    /// The extrinsic was signed and accepted by the node.
    Submitted {
        /// Extrinsic hash.
        hash: H256,
    },
    /// The extrinsic was included in a best block, which may still be retracted.
    InBlock {
        /// Hash of the including block.
        block_hash: H256,
    },
    /// The extrinsic was finalized. The receipt tells whether its dispatch succeeded.
    Finalized(TransactionReceipt),
}

/// Stream of [`SubmissionEvent`]s ending with [`SubmissionEvent::Finalized`] or an error.
pub type SubmissionStream = BoxStream<'static, Result<SubmissionEvent, ChainError>>;

/// A client able to sign and submit extrinsics on behalf of one signing account.
///
/// Implementations own the account nonce and must submit in call order.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The account that signs every submission.
    fn signer(&self) -> AccountKey;

    /// Signs and submits `call`, returning the stream of its lifecycle events.
    ///
    /// Returns [`ChainError::SignatureRejected`] when the signer declines.
    async fn submit(&self, call: ExtrinsicCall) -> Result<SubmissionStream, ChainError>;

    /// Reads a storage entry at the latest block.
    async fn query_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value>, ChainError>;

    /// Estimates the fees `call` would cost.
    async fn estimate_fee(&self, call: &ExtrinsicCall) -> Result<Fees, ChainError>;
}
