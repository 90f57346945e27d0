use futures::future::try_join_all;
use polymesh_core::{Fees, TxTag};

use crate::chain::{ChainClient, ExtrinsicCall};
use crate::error::{Error, Result};
use crate::transaction::TransactionSpec;

/// Calls dispatched atomically in one extrinsic: either all take effect or none does.
#[derive(Debug, Default)]
pub struct TransactionBatch {
    specs: Vec<TransactionSpec>,
}

impl TransactionBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn push(mut self, spec: TransactionSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Number of calls in the batch.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the batch has no calls.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Tags of the batched calls, in order.
    pub fn tags(&self) -> Vec<TxTag> {
        self.specs.iter().map(|spec| spec.tag).collect()
    }

    /// A batch is critical when any of its calls is.
    pub fn is_critical(&self) -> bool {
        self.specs.iter().any(|spec| spec.is_critical)
    }

    pub(crate) fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Fatal {
                message: "cannot add an empty batch to a queue".into(),
            });
        }
        Ok(())
    }

    /// The extrinsic to submit. A batch of one call is submitted as that call.
    pub(crate) fn to_call(&self) -> Result<ExtrinsicCall> {
        self.ensure_not_empty()?;
        let mut calls = self
            .specs
            .iter()
            .map(TransactionSpec::materialize)
            .collect::<Result<Vec<_>>>()?;
        if calls.len() == 1 {
            if let Some((tag, args)) = calls.pop() {
                return Ok(ExtrinsicCall::Single { tag, args });
            }
        }
        Ok(ExtrinsicCall::BatchAll(calls))
    }

    /// Sum of the fees of every batched call.
    pub(crate) async fn fees(&self, client: &dyn ChainClient) -> Result<Fees> {
        let fees = try_join_all(self.specs.iter().map(|spec| spec.fees(client))).await?;
        Ok(fees.into_iter().sum())
    }
}

impl FromIterator<TransactionSpec> for TransactionBatch {
    fn from_iter<I: IntoIterator<Item = TransactionSpec>>(iter: I) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}
