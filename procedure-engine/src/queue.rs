//! The ordered list of transactions a prepared procedure hands back to its caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use log::{error, info, warn};
use polymesh_core::Fees;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::authorization::ProcedureAuthorization;
use crate::chain::ChainClient;
use crate::error::Result;
use crate::post_transaction_value::{PendingResolution, ReturnValue};
use crate::transaction::{PolymeshTransaction, TransactionId, TransactionStatus};

/// Capacity of the status change channel. Slow subscribers miss the oldest events.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Lifecycle of a whole queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum QueueStatus {
    /// Not started.
    Idle,
    /// Transactions are being submitted.
    Running,
    /// Every critical transaction succeeded and the return value is available.
    Succeeded,
    /// A critical transaction failed, or the return value could not be produced.
    Failed,
}

/// A status change of one transaction of a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QueueEvent {
    /// The transaction that changed.
    pub transaction: TransactionId,
    /// Its new status.
    pub status: TransactionStatus,
}

/// Pending resolvers keyed by the transaction whose receipt they read.
pub(crate) type Resolutions = HashMap<TransactionId, Vec<Box<dyn PendingResolution>>>;

/// The output of preparing a procedure, before it is bound to a chain client.
pub(crate) struct Prepared<T> {
    pub(crate) transactions: Vec<PolymeshTransaction>,
    pub(crate) resolutions: Resolutions,
    pub(crate) authorization: ProcedureAuthorization,
    pub(crate) return_value: ReturnValue<T>,
    pub(crate) events: broadcast::Sender<QueueEvent>,
}

/// Transactions of a prepared procedure, run sequentially in insertion order.
///
/// Dropping the queue before [`TransactionQueue::run`] submits nothing.
pub struct TransactionQueue<T> {
    transactions: Vec<Arc<PolymeshTransaction>>,
    resolutions: Resolutions,
    authorization: ProcedureAuthorization,
    return_value: ReturnValue<T>,
    client: Arc<dyn ChainClient>,
    events: broadcast::Sender<QueueEvent>,
    status: watch::Sender<QueueStatus>,
}

impl<T> fmt::Debug for TransactionQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionQueue")
            .field("transactions", &self.transactions)
            .field("authorization", &self.authorization)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> TransactionQueue<T> {
    pub(crate) fn new(prepared: Prepared<T>, client: Arc<dyn ChainClient>) -> Self {
        let (status, _) = watch::channel(QueueStatus::Idle);
        Self {
            transactions: prepared.transactions.into_iter().map(Arc::new).collect(),
            resolutions: prepared.resolutions,
            authorization: prepared.authorization,
            return_value: prepared.return_value,
            client,
            events: prepared.events,
            status,
        }
    }

    /// The transactions, in execution order.
    pub fn transactions(&self) -> &[Arc<PolymeshTransaction>] {
        &self.transactions
    }

    /// What the procedure required from its signer, nested procedures included.
    pub fn authorization(&self) -> &ProcedureAuthorization {
        &self.authorization
    }

    /// Current status of the queue.
    pub fn status(&self) -> QueueStatus {
        *self.status.borrow()
    }

    /// Subscribes to the status of the queue.
    pub fn subscribe(&self) -> watch::Receiver<QueueStatus> {
        self.status.subscribe()
    }

    /// Subscribes to status changes of every transaction of the queue.
    pub fn on_status_change(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Estimated fees of every transaction, before anything is submitted.
    pub async fn total_fees(&self) -> Result<Fees> {
        let client = self.client.as_ref();
        let fees = try_join_all(self.transactions.iter().map(|tx| tx.fees(client))).await?;
        Ok(fees.into_iter().sum())
    }

    /// Runs every transaction in order and produces the procedure's return value.
    ///
    /// A failed critical transaction aborts every later one and fails the queue. A failed
    /// non-critical transaction is skipped. Resolvers only run against the receipt of the
    /// transaction they are bound to, right after it succeeds.
    pub async fn run(self) -> Result<T> {
        let TransactionQueue {
            transactions,
            mut resolutions,
            return_value,
            client,
            status,
            ..
        } = self;

        status.send_replace(QueueStatus::Running);
        info!("🚀 Running queue of {} transaction(s)", transactions.len());

        for (index, tx) in transactions.iter().enumerate() {
            let outcome = match tx.run(client.as_ref()).await {
                Ok(receipt) => resolutions
                    .remove(&tx.id())
                    .unwrap_or_default()
                    .iter()
                    .try_for_each(|pending| pending.resolve(&receipt)),
                Err(err) if !tx.is_critical() => {
                    warn!(
                        "⚠️ Non-critical transaction {} failed, continuing: {}",
                        tx.id(),
                        err
                    );
                    Ok(())
                }
                Err(err) => Err(err),
            };

            if let Err(err) = outcome {
                error!("❌ Queue failed at transaction {}: {}", tx.id(), err);
                for rest in &transactions[index + 1..] {
                    rest.abort()?;
                }
                status.send_replace(QueueStatus::Failed);
                return Err(err);
            }
        }

        match return_value.into_value() {
            Ok(value) => {
                status.send_replace(QueueStatus::Succeeded);
                info!("✅ Queue succeeded");
                Ok(value)
            }
            Err(err) => {
                status.send_replace(QueueStatus::Failed);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use polymesh_core::tags::{asset, settlement};

    use super::*;
    use crate::chain::{ExtrinsicCall, Value};
    use crate::error::Error;
    use crate::mock::{context, init_logger, MockChain, MockEntities, Outcome};
    use crate::procedure::QueueBuilder;
    use crate::receipt::DecodedEvent;
    use crate::transaction::TransactionSpec;
    use crate::values;

    fn drain(events: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test]
    async fn critical_failures_abort_the_rest_of_the_queue() {
        init_logger();
        let chain = MockChain::new().with_outcome(
            asset::CREATE_ASSET,
            Outcome::DispatchError("Asset.TickerAlreadyRegistered".into()),
        );
        let ctx = context(chain.clone(), MockEntities::full());
        let mut builder = QueueBuilder::root(&ctx);
        builder.add_transaction(TransactionSpec::new(asset::REGISTER_TICKER, [Value::u128(1)]));
        builder.add_transaction(TransactionSpec::new(asset::CREATE_ASSET, [Value::u128(2)]));
        builder.add_transaction(TransactionSpec::new(asset::ISSUE, [Value::u128(3)]));
        let queue = builder.into_queue(ReturnValue::Ready(()));
        let mut events = queue.on_status_change();
        let status = queue.subscribe();
        let txs = queue.transactions().to_vec();

        let err = queue.run().await.unwrap_err();
        assert_eq!(*status.borrow(), QueueStatus::Failed);
        assert!(matches!(err, Error::TransactionFailed { .. }));
        assert_eq!(txs[0].status(), TransactionStatus::Succeeded);
        assert_eq!(txs[1].status(), TransactionStatus::Failed);
        assert_eq!(txs[2].status(), TransactionStatus::Aborted);

        let third = drain(&mut events)
            .into_iter()
            .filter(|event| event.transaction == txs[2].id())
            .map(|event| event.status)
            .collect::<Vec<_>>();
        assert_eq!(third, vec![TransactionStatus::Aborted]);
        assert_eq!(chain.submitted().len(), 2);
    }

    #[tokio::test]
    async fn non_critical_failures_do_not_stop_the_queue() {
        let chain = MockChain::new().with_outcome(asset::ADD_DOCUMENTS, Outcome::Dropped);
        let ctx = context(chain.clone(), MockEntities::full());
        let mut builder = QueueBuilder::root(&ctx);
        builder.add_transaction(TransactionSpec::new(asset::ADD_DOCUMENTS, [Value::u128(1)]).non_critical());
        builder.add_transaction(TransactionSpec::new(asset::ISSUE, [Value::u128(2)]));
        let queue = builder.into_queue(ReturnValue::Ready("done"));
        let txs = queue.transactions().to_vec();
        let status = queue.subscribe();

        assert_eq!(queue.run().await.unwrap(), "done");
        assert_eq!(txs[0].status(), TransactionStatus::Failed);
        assert_eq!(txs[1].status(), TransactionStatus::Succeeded);
        assert_eq!(*status.borrow(), QueueStatus::Succeeded);
    }

    #[tokio::test]
    async fn resolvers_only_read_their_own_receipt() {
        let chain = MockChain::new()
            .with_events(
                settlement::CREATE_VENUE,
                vec![DecodedEvent::new("Settlement", "VenueCreated", [Value::u128(0), Value::u128(7)])],
            )
            .with_events(
                asset::ISSUE,
                vec![DecodedEvent::new("Settlement", "VenueCreated", [Value::u128(0), Value::u128(99)])],
            );
        let ctx = context(chain, MockEntities::full());
        let mut builder = QueueBuilder::root(&ctx);
        let venue = builder.add_transaction_with_resolver(
            TransactionSpec::new(settlement::CREATE_VENUE, Vec::<Value>::new()),
            |receipt| {
                receipt
                    .find_event("Settlement", "VenueCreated")
                    .and_then(|event| event.field_at(1))
                    .and_then(values::as_u64)
                    .ok_or_else(|| Error::Unexpected {
                        message: "no venue".into(),
                    })
            },
        );
        builder.add_transaction(TransactionSpec::new(asset::ISSUE, [Value::u128(1)]));
        let queue = builder.into_queue(venue.clone().into());

        assert!(venue.value().is_none());
        assert_eq!(queue.run().await.unwrap(), 7);
        assert_eq!(venue.value(), Some(&7));
    }

    #[tokio::test]
    async fn total_fees_sum_every_transaction() {
        let chain = MockChain::new().with_fee(Fees::new(0, 5));
        let ctx = context(chain.clone(), MockEntities::full());
        let mut builder = QueueBuilder::root(&ctx);
        builder.add_transaction(
            TransactionSpec::new(asset::REGISTER_TICKER, [Value::u128(1)]).with_fee(Fees::new(2_500, 10)),
        );
        builder.add_transaction(TransactionSpec::new(asset::CREATE_ASSET, [Value::u128(2)]));
        let queue = builder.into_queue(ReturnValue::Ready(()));

        assert_eq!(queue.total_fees().await.unwrap(), Fees::new(2_500, 15));
        assert!(chain.submitted().is_empty());
        assert_eq!(queue.status(), QueueStatus::Idle);
    }

    #[tokio::test]
    async fn total_fees_cover_arguments_resolved_later() {
        let chain = MockChain::new()
            .with_fee(Fees::new(3, 1))
            .with_events(
                settlement::CREATE_VENUE,
                vec![DecodedEvent::new("Settlement", "VenueCreated", [Value::u128(0), Value::u128(7)])],
            );
        let ctx = context(chain.clone(), MockEntities::full());
        let mut builder = QueueBuilder::root(&ctx);
        let venue = builder.add_transaction_with_resolver(
            TransactionSpec::new(settlement::CREATE_VENUE, Vec::<Value>::new()),
            |receipt| {
                receipt
                    .find_event("Settlement", "VenueCreated")
                    .and_then(|event| event.field_at(1))
                    .and_then(values::as_u64)
                    .ok_or_else(|| Error::Unexpected {
                        message: "no venue".into(),
                    })
            },
        );
        let venue_arg = || venue.to_arg(Value::u128(0), |id| Value::u128(u128::from(*id)));
        builder
            .add_batch_transaction(
                [
                    TransactionSpec::new(asset::ISSUE, [venue_arg()]),
                    TransactionSpec::new(asset::ADD_DOCUMENTS, [venue_arg()]).with_fee_multiplier(2),
                ]
                .into_iter()
                .collect(),
            )
            .unwrap();
        let queue = builder.into_queue(venue.clone().into());
        assert!(format!("{queue:?}").starts_with("TransactionQueue"));

        assert_eq!(queue.total_fees().await.unwrap(), Fees::new(12, 3));
        assert!(!venue.is_resolved());

        assert_eq!(queue.run().await.unwrap(), 7);
        match &chain.submitted()[1] {
            ExtrinsicCall::BatchAll(calls) => {
                assert_eq!(calls[0].1, vec![Value::u128(7)]);
                assert_eq!(calls[1].1, vec![Value::u128(7)]);
            }
            other => panic!("expected a batch, got {other:?}"),
        }
    }
}
