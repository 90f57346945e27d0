//! Values that only exist once a specific transaction has been finalized.
//!
//! A [`PostTransactionValue`] is created when a procedure adds a transaction with a
//! resolver. The queue keeps the resolver next to the owning transaction's id and runs
//! it exactly once, against that transaction's receipt, when the transaction succeeds.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::chain::Value;
use crate::error::{Error, Result};
use crate::receipt::TransactionReceipt;
use crate::transaction::{TransactionId, TxArg};

/// Extracts a typed result from a finalized receipt. Must be a pure function of the receipt.
pub type Resolver<T> = Box<dyn Fn(&TransactionReceipt) -> Result<T> + Send + Sync>;

/// A value produced by the resolver bound to one transaction.
///
/// Clones share the same slot; the value is written once and never changes afterwards.
pub struct PostTransactionValue<T> {
    transaction: TransactionId,
    slot: Arc<OnceLock<T>>,
}

impl<T> Clone for PostTransactionValue<T> {
    fn clone(&self) -> Self {
        Self {
            transaction: self.transaction,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PostTransactionValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostTransactionValue")
            .field("transaction", &self.transaction)
            .field("value", &self.slot.get())
            .finish()
    }
}

impl<T> PostTransactionValue<T> {
    pub(crate) fn new(transaction: TransactionId) -> Self {
        Self {
            transaction,
            slot: Arc::new(OnceLock::new()),
        }
    }

    /// The transaction whose receipt produces this value.
    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    /// The value, once the bound transaction has succeeded and its resolver has run.
    pub fn value(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Whether the value is available.
    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }

    fn set(&self, value: T) -> Result<()> {
        self.slot.set(value).map_err(|_| Error::Fatal {
            message: format!(
                "value bound to transaction {} was resolved twice",
                self.transaction
            ),
        })
    }
}

impl<T: Send + Sync + 'static> PostTransactionValue<T> {
    /// Uses this value as an argument of a later transaction in the same queue.
    ///
    /// The argument is encoded right before that transaction is signed. Fees estimated
    /// before then use `placeholder`, which must have the same shape as the encoded value.
    pub fn to_arg(
        &self,
        placeholder: Value,
        encode: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> TxArg {
        let value = self.clone();
        TxArg::deferred(placeholder, move || value.value().map(&encode))
    }
}

/// A resolver waiting for the receipt of its transaction, with the value type erased.
pub(crate) trait PendingResolution: Send + Sync {
    /// Runs the resolver and stores its output.
    fn resolve(&self, receipt: &TransactionReceipt) -> Result<()>;
}

/// A typed resolver paired with the slot it fills.
pub(crate) struct Resolution<T> {
    target: PostTransactionValue<T>,
    resolver: Resolver<T>,
}

impl<T> Resolution<T> {
    pub(crate) fn new(target: PostTransactionValue<T>, resolver: Resolver<T>) -> Self {
        Self { target, resolver }
    }
}

impl<T: Send + Sync> PendingResolution for Resolution<T> {
    fn resolve(&self, receipt: &TransactionReceipt) -> Result<()> {
        let value = (self.resolver)(receipt)?;
        self.target.set(value)
    }
}

/// What a procedure eventually returns to its caller.
pub enum ReturnValue<T> {
    /// Known at preparation time.
    Ready(T),
    /// Produced by a transaction's resolver.
    Deferred(PostTransactionValue<T>),
    /// Computed after every transaction of the queue has run.
    Computed(Box<dyn FnOnce() -> Result<T> + Send>),
}

impl<T> From<PostTransactionValue<T>> for ReturnValue<T> {
    fn from(value: PostTransactionValue<T>) -> Self {
        ReturnValue::Deferred(value)
    }
}

impl<T: Clone + Send + Sync + 'static> ReturnValue<T> {
    /// Materializes the value. Fails if a deferred value was never resolved.
    pub(crate) fn into_value(self) -> Result<T> {
        match self {
            ReturnValue::Ready(value) => Ok(value),
            ReturnValue::Deferred(deferred) => {
                deferred.value().cloned().ok_or_else(|| Error::Unexpected {
                    message: format!(
                        "transaction {} finished without resolving its value",
                        deferred.transaction()
                    ),
                })
            }
            ReturnValue::Computed(compute) => compute(),
        }
    }

    /// Transforms the value once it is available.
    pub fn map<U, F>(self, f: F) -> ReturnValue<U>
    where
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            ReturnValue::Ready(value) => ReturnValue::Ready(f(value)),
            other => ReturnValue::Computed(Box::new(move || other.into_value().map(f))),
        }
    }
}

#[cfg(test)]
mod tests {
    use subxt::utils::H256;

    use super::*;
    use crate::receipt::DecodedEvent;
    use crate::values;

    fn receipt_with(events: Vec<DecodedEvent>) -> TransactionReceipt {
        TransactionReceipt {
            tx_hash: H256::zero(),
            block_hash: H256::zero(),
            events,
            dispatch_error: None,
        }
    }

    #[test]
    fn values_are_absent_until_resolved_and_immutable_afterwards() {
        let value = PostTransactionValue::<u64>::new(TransactionId::next());
        let resolution = Resolution::new(
            value.clone(),
            Box::new(|receipt: &TransactionReceipt| {
                receipt
                    .find_event("Settlement", "VenueCreated")
                    .and_then(|event| event.field_at(1))
                    .and_then(values::as_u64)
                    .ok_or_else(|| Error::Unexpected {
                        message: "missing event".into(),
                    })
            }),
        );
        assert!(value.value().is_none());

        let receipt = receipt_with(vec![DecodedEvent::new(
            "Settlement",
            "VenueCreated",
            [Value::u128(0), Value::u128(7)],
        )]);
        resolution.resolve(&receipt).unwrap();
        assert_eq!(value.value(), Some(&7));

        let err = resolution.resolve(&receipt).unwrap_err();
        assert!(matches!(err, Error::Fatal { .. }));
        assert_eq!(value.value(), Some(&7));
    }

    #[test]
    fn return_values_compose() {
        let deferred = PostTransactionValue::<u64>::new(TransactionId::next());
        let mapped = ReturnValue::from(deferred.clone()).map(|n| n * 2);
        deferred.set(21).unwrap();
        assert_eq!(mapped.into_value().unwrap(), 42);

        let unresolved = PostTransactionValue::<u64>::new(TransactionId::next());
        assert!(ReturnValue::from(unresolved).into_value().is_err());
        assert_eq!(ReturnValue::Ready(1).map(|n: u64| n + 1).into_value().unwrap(), 2);
    }

    #[test]
    fn deferred_args_encode_once_resolved() {
        let deferred = PostTransactionValue::<u64>::new(TransactionId::next());
        let arg = deferred.to_arg(Value::u128(0), |n| Value::u128(u128::from(*n)));
        assert!(arg.materialize().is_err());
        assert_eq!(arg.estimate(), Value::u128(0));
        deferred.set(3).unwrap();
        assert_eq!(arg.materialize().unwrap(), Value::u128(3));
        assert_eq!(arg.estimate(), Value::u128(3));
    }
}
