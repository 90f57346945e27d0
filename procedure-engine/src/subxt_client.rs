//! [`ChainClient`] over a `subxt` online client, with dynamic (metadata driven) payloads.
use std::fmt;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use polymesh_core::tags::asset;
use polymesh_core::{AccountKey, Fees, TxTag};
use snafu::ResultExt;
use subxt::config::polkadot::PolkadotExtrinsicParamsBuilder as Params;
use subxt::ext::scale_value::ValueDef;
use subxt::tx::{TxInBlock, TxProgress, TxStatus};
use subxt::utils::H256;
use subxt::{OnlineClient, PolkadotConfig};
use subxt_signer::sr25519::Keypair;
use tokio::time::{sleep, Duration};

use crate::chain::{ChainClient, ExtrinsicCall, SubmissionEvent, SubmissionStream, Value};
use crate::error::{ChainError, SubxtSnafu};
use crate::receipt::{DecodedEvent, TransactionReceipt};
use crate::sequencer::NonceSequencer;
use crate::values;

/// Default number of resubmissions after a failed submission.
pub const DEFAULT_MAX_RETRIES: usize = 3;

type Client = OnlineClient<PolkadotConfig>;

/// Signs with a local sr25519 keypair and submits through a `subxt` client.
#[derive(Clone, Debug)]
pub struct SubxtChainClient {
    client: Client,
    signer: Keypair,
    sequencer: NonceSequencer,
    max_retries: usize,
}

impl SubxtChainClient {
    /// Creates a client signing with `signer`.
    pub fn new(client: Client, signer: Keypair) -> Self {
        Self {
            client,
            signer,
            sequencer: NonceSequencer::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets how many times a failed submission is retried.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Shares a sequencer with other clients signing with the same keys.
    pub fn with_sequencer(mut self, sequencer: NonceSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// The underlying `subxt` client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn fetch_nonce(&self) -> Result<u64, ChainError> {
        let account_id = self.signer.public_key().to_account_id();
        self.client
            .tx()
            .account_nonce(&account_id)
            .await
            .context(SubxtSnafu)
    }

    async fn protocol_fee(&self, tag: &TxTag) -> Result<u128, ChainError> {
        let Some(op) = protocol_op(tag) else {
            return Ok(0);
        };
        let base_fee = self
            .query_storage("ProtocolFee", "BaseFees", vec![Value::unnamed_variant(op, [])])
            .await?;
        Ok(base_fee.as_ref().and_then(values::as_u128).unwrap_or_default())
    }
}

/// The protocol fee operation charged by a call, if any.
fn protocol_op(tag: &TxTag) -> Option<&'static str> {
    match *tag {
        asset::REGISTER_TICKER => Some("AssetRegisterTicker"),
        asset::CREATE_ASSET => Some("AssetCreateAsset"),
        asset::ADD_DOCUMENTS => Some("AssetAddDocuments"),
        asset::ISSUE => Some("AssetIssue"),
        _ => None,
    }
}

#[async_trait]
impl ChainClient for SubxtChainClient {
    fn signer(&self) -> AccountKey {
        AccountKey(self.signer.public_key().0)
    }

    async fn submit(&self, call: ExtrinsicCall) -> Result<SubmissionStream, ChainError> {
        let tag = call.tag();
        let payload = subxt::dynamic::tx(call.pallet_name(), call.call_name(), call.call_args());
        let mut slot = self.sequencer.acquire(self.signer()).await;

        for attempt in 0..=self.max_retries {
            let nonce = match slot.nonce() {
                Some(nonce) => nonce,
                None => {
                    let nonce = self.fetch_nonce().await?;
                    slot.reset(nonce);
                    nonce
                }
            };
            let tx_params = Params::new().nonce(nonce).build();

            match self
                .client
                .tx()
                .sign_and_submit_then_watch(&payload, &self.signer, tx_params)
                .await
            {
                Ok(progress) => {
                    slot.commit();
                    info!(
                        "✅ Submitted {} with nonce {} on attempt {}",
                        tag,
                        nonce,
                        attempt + 1
                    );
                    return Ok(watch(progress));
                }
                Err(err) if attempt < self.max_retries => {
                    let err_str = err.to_string();
                    if is_stale_nonce_error(&err_str) {
                        warn!(
                            "🔁 Nonce likely stale (attempt {}): {}",
                            attempt + 1,
                            err_str
                        );
                        slot.invalidate();
                    } else {
                        if is_background_disconnect(&err_str) {
                            warn!(
                                "🔌 Connection dropped (attempt {}): {}. Waiting for reconnection...",
                                attempt + 1,
                                err_str
                            );
                            slot.invalidate();
                        } else {
                            warn!(
                                "⚠️ Transient failure (attempt {}): {}. Retrying...",
                                attempt + 1,
                                err_str
                            );
                        }
                        sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                    }
                }
                Err(err) => {
                    error!(
                        "❌ Giving up on {} after {} attempts: {}",
                        tag,
                        self.max_retries + 1,
                        err
                    );
                    return Err(ChainError::Subxt { source: err });
                }
            }
        }

        Err(ChainError::Other {
            message: "exceeded retry limit".into(),
        })
    }

    async fn query_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value>, ChainError> {
        let address = subxt::dynamic::storage(pallet, entry, keys);
        let thunk = self
            .client
            .storage()
            .at_latest()
            .await
            .context(SubxtSnafu)?
            .fetch(&address)
            .await
            .context(SubxtSnafu)?;

        match thunk {
            Some(thunk) => {
                let value = thunk
                    .to_value()
                    .map_err(|e| decode_failure(format!("{pallet}.{entry}"), e))?;
                Ok(Some(value.remove_context()))
            }
            None => Ok(None),
        }
    }

    async fn estimate_fee(&self, call: &ExtrinsicCall) -> Result<Fees, ChainError> {
        let payload = subxt::dynamic::tx(call.pallet_name(), call.call_name(), call.call_args());
        let gas = self
            .client
            .tx()
            .create_signed(&payload, &self.signer, Params::new().build())
            .await
            .context(SubxtSnafu)?
            .partial_fee_estimate()
            .await
            .context(SubxtSnafu)?;

        let mut protocol = 0u128;
        for tag in call.dispatched_tags() {
            protocol = protocol.saturating_add(self.protocol_fee(&tag).await?);
        }
        debug!("Estimated fees of {}: protocol {}, gas {}", call.tag(), protocol, gas);
        Ok(Fees::new(protocol, gas))
    }
}

/// Turns the progress of a submitted extrinsic into a [`SubmissionStream`].
fn watch(progress: TxProgress<PolkadotConfig, Client>) -> SubmissionStream {
    Box::pin(progress_events(progress))
}

fn progress_events(
    mut progress: TxProgress<PolkadotConfig, Client>,
) -> impl Stream<Item = Result<SubmissionEvent, ChainError>> + Send {
    let hash = progress.extrinsic_hash();
    try_stream! {
        yield SubmissionEvent::Submitted { hash };

        let mut finalized = false;
        while let Some(status) = progress.next().await {
            match status.context(SubxtSnafu)? {
                TxStatus::Validated => debug!("📄 Transaction {:?} has been validated.", hash),
                TxStatus::Broadcasted { num_peers } => {
                    info!("📡 Transaction {:?} broadcasted to {} peers.", hash, num_peers);
                }
                TxStatus::NoLongerInBestBlock => {
                    warn!("⚠️ Transaction {:?} is no longer in the best block.", hash);
                }
                TxStatus::InBestBlock(details) => {
                    yield SubmissionEvent::InBlock {
                        block_hash: details.block_hash(),
                    };
                }
                TxStatus::InFinalizedBlock(details) => {
                    let receipt = receipt_of(hash, details).await?;
                    yield SubmissionEvent::Finalized(receipt);
                    finalized = true;
                    break;
                }
                TxStatus::Error { message } => Err::<(), _>(ChainError::Other { message })?,
                TxStatus::Dropped { message } => Err::<(), _>(ChainError::Dropped { message })?,
                TxStatus::Invalid { message } => Err::<(), _>(ChainError::Invalid { message })?,
            }
        }

        if !finalized {
            Err::<(), _>(ChainError::StreamEnded)?;
        }
    }
}

/// Decodes the events of a finalized extrinsic.
/// A value read from the node could not be decoded against the metadata.
fn decode_failure(what: String, source: impl fmt::Display) -> ChainError {
    ChainError::Decode {
        what,
        message: source.to_string(),
    }
}

async fn receipt_of(
    tx_hash: H256,
    details: TxInBlock<PolkadotConfig, Client>,
) -> Result<TransactionReceipt, ChainError> {
    let block_hash = details.block_hash();
    let events = details.fetch_events().await.context(SubxtSnafu)?;

    let mut decoded = Vec::new();
    let mut dispatch_error = None;
    for event in events.iter() {
        let event = event.context(SubxtSnafu)?;
        let composite = event.field_values().map_err(|e| {
            decode_failure(format!("{}.{}", event.pallet_name(), event.variant_name()), e)
        })?;
        let fields = Value {
            value: ValueDef::Composite(composite),
            context: Default::default(),
        }
        .remove_context();

        if event.pallet_name() == "System" && event.variant_name() == "ExtrinsicFailed" {
            error!("❌ Extrinsic {:?} failed: {}", tx_hash, fields);
            dispatch_error = Some(fields.to_string());
        }
        decoded.push(DecodedEvent {
            pallet: event.pallet_name().to_string(),
            variant: event.variant_name().to_string(),
            fields,
        });
    }

    Ok(TransactionReceipt {
        tx_hash,
        block_hash,
        events: decoded,
        dispatch_error,
    })
}

fn is_stale_nonce_error(err: &str) -> bool {
    err.contains("Priority is too low")
        || err.contains("Transaction is outdated")
        || err.contains("Stale")
}

fn is_background_disconnect(err: &str) -> bool {
    err.contains("background task closed")
        || err.contains("connection closed")
        || err.contains("restart required")
}

#[cfg(test)]
mod tests {
    use polymesh_core::tags::settlement;

    use super::*;

    #[test]
    fn submission_errors_are_classified() {
        assert!(is_stale_nonce_error("Invalid Transaction: Transaction is outdated"));
        assert!(is_stale_nonce_error("Priority is too low: (1 vs 1)"));
        assert!(!is_stale_nonce_error("Inability to pay some fees"));
        assert!(is_background_disconnect("RPC error: background task closed"));
        assert!(!is_background_disconnect("Transaction is outdated"));
    }

    #[test]
    fn only_charged_calls_have_a_protocol_op() {
        assert_eq!(protocol_op(&asset::REGISTER_TICKER), Some("AssetRegisterTicker"));
        assert_eq!(protocol_op(&asset::ADD_DOCUMENTS), Some("AssetAddDocuments"));
        assert_eq!(protocol_op(&settlement::CREATE_VENUE), None);
        assert_eq!(protocol_op(&asset::RENAME_ASSET), None);
    }

    #[test]
    fn undecodable_values_name_what_was_read() {
        let err = decode_failure("Asset.AssetNames".into(), "type 12 not found");
        assert!(matches!(&err, ChainError::Decode { what, .. } if what == "Asset.AssetNames"));
        assert_eq!(
            err.to_string(),
            "Failed to decode Asset.AssetNames: type 12 not found"
        );
    }
}
