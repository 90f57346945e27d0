//! In-memory chain client and entity layer for tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use polymesh_core::{AccountKey, Fees, IdentityId, Permissions, Role, TxTag};
use subxt::utils::H256;

use crate::authorization::{Actor, EntityLayer};
use crate::chain::{ChainClient, ExtrinsicCall, SubmissionEvent, SubmissionStream, Value};
use crate::error::{ChainError, Result};
use crate::procedure::Context;
use crate::receipt::{DecodedEvent, TransactionReceipt};

/// Installs the test logger once.
pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the mock chain does with a call.
#[derive(Clone, Debug)]
pub(crate) enum Outcome {
    /// Finalized successfully, emitting these events.
    Success(Vec<DecodedEvent>),
    /// Finalized with a dispatch error.
    DispatchError(String),
    /// The signer declines.
    Rejected,
    /// Dropped from the pool after submission.
    Dropped,
}

type StorageKey = (String, String, Vec<Value>);

/// Scripted chain. Clones share state.
#[derive(Clone)]
pub(crate) struct MockChain {
    signer: AccountKey,
    outcomes: Arc<Mutex<HashMap<TxTag, Outcome>>>,
    storage: Arc<Mutex<Vec<(StorageKey, Value)>>>,
    fee: Arc<Mutex<Fees>>,
    submitted: Arc<Mutex<Vec<ExtrinsicCall>>>,
    estimated: Arc<Mutex<Vec<ExtrinsicCall>>>,
    blocks: Arc<AtomicU64>,
}

impl MockChain {
    pub(crate) fn new() -> Self {
        Self {
            signer: AccountKey([1; 32]),
            outcomes: Arc::default(),
            storage: Arc::default(),
            fee: Arc::new(Mutex::new(Fees::new(0, 1))),
            submitted: Arc::default(),
            estimated: Arc::default(),
            blocks: Arc::default(),
        }
    }

    pub(crate) fn with_outcome(self, tag: TxTag, outcome: Outcome) -> Self {
        self.outcomes.lock().unwrap().insert(tag, outcome);
        self
    }

    pub(crate) fn with_events(self, tag: TxTag, events: Vec<DecodedEvent>) -> Self {
        self.with_outcome(tag, Outcome::Success(events))
    }

    pub(crate) fn with_storage(
        self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
        value: Value,
    ) -> Self {
        self.storage
            .lock()
            .unwrap()
            .push(((pallet.into(), entry.into(), keys), value));
        self
    }

    pub(crate) fn with_fee(self, fee: Fees) -> Self {
        *self.fee.lock().unwrap() = fee;
        self
    }

    /// Every call submitted so far, in order.
    pub(crate) fn submitted(&self) -> Vec<ExtrinsicCall> {
        self.submitted.lock().unwrap().clone()
    }

    /// Every call whose fee was estimated so far, in order.
    pub(crate) fn estimated(&self) -> Vec<ExtrinsicCall> {
        self.estimated.lock().unwrap().clone()
    }

    /// The first failing outcome among the dispatched calls, or the events of all of them.
    fn outcome_for(&self, call: &ExtrinsicCall) -> Outcome {
        let outcomes = self.outcomes.lock().unwrap();
        let mut events = Vec::new();
        for tag in call.dispatched_tags() {
            match outcomes.get(&tag) {
                Some(Outcome::Success(emitted)) => events.extend(emitted.iter().cloned()),
                Some(failure) => return failure.clone(),
                None => {}
            }
        }
        Outcome::Success(events)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn signer(&self) -> AccountKey {
        self.signer
    }

    async fn submit(&self, call: ExtrinsicCall) -> Result<SubmissionStream, ChainError> {
        let outcome = self.outcome_for(&call);
        if let Outcome::Rejected = outcome {
            return Err(ChainError::SignatureRejected {
                reason: "declined by the user".into(),
            });
        }

        let tx_hash = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(call);
            H256::from_low_u64_be(submitted.len() as u64)
        };
        let block_hash = H256::from_low_u64_be(1_000 + self.blocks.fetch_add(1, Ordering::SeqCst));
        let receipt = |events, dispatch_error| TransactionReceipt {
            tx_hash,
            block_hash,
            events,
            dispatch_error,
        };

        let mut progress = vec![Ok(SubmissionEvent::Submitted { hash: tx_hash })];
        match outcome {
            Outcome::Success(events) => {
                progress.push(Ok(SubmissionEvent::InBlock { block_hash }));
                progress.push(Ok(SubmissionEvent::Finalized(receipt(events, None))));
            }
            Outcome::DispatchError(message) => {
                progress.push(Ok(SubmissionEvent::Finalized(receipt(Vec::new(), Some(message)))));
            }
            Outcome::Dropped | Outcome::Rejected => progress.push(Err(ChainError::Dropped {
                message: "removed from the pool".into(),
            })),
        }
        Ok(futures::stream::iter(progress).boxed())
    }

    async fn query_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value>, ChainError> {
        let storage = self.storage.lock().unwrap();
        Ok(storage
            .iter()
            .find(|((p, e, k), _)| p == pallet && e == entry && *k == keys)
            .map(|(_, value)| value.clone()))
    }

    async fn estimate_fee(&self, call: &ExtrinsicCall) -> Result<Fees, ChainError> {
        self.estimated.lock().unwrap().push(call.clone());
        Ok(*self.fee.lock().unwrap())
    }
}

/// Fixed grants and roles.
pub(crate) struct MockEntities {
    permissions: Permissions,
    roles: BTreeSet<Role>,
    permission_queries: AtomicUsize,
}

impl MockEntities {
    pub(crate) fn new(permissions: Permissions) -> Self {
        Self {
            permissions,
            roles: BTreeSet::new(),
            permission_queries: AtomicUsize::new(0),
        }
    }

    /// Unrestricted permissions and no role.
    pub(crate) fn full() -> Self {
        Self::new(Permissions::full())
    }

    pub(crate) fn with_role(mut self, role: Role) -> Self {
        self.roles.insert(role);
        self
    }

    pub(crate) fn permission_queries(&self) -> usize {
        self.permission_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityLayer for MockEntities {
    async fn permissions(&self, _actor: &Actor) -> Result<Permissions> {
        self.permission_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.permissions.clone())
    }

    async fn has_role(&self, _actor: &Actor, role: &Role) -> Result<bool> {
        Ok(self.roles.contains(role))
    }
}

/// Identity of [`alice`].
pub(crate) const ALICE_DID: IdentityId = IdentityId([0xa1; 32]);

/// A signer with an identity.
pub(crate) fn alice() -> Actor {
    Actor {
        account: AccountKey([1; 32]),
        identity: Some(ALICE_DID),
    }
}

/// A context signing as [`alice`].
pub(crate) fn context(chain: MockChain, entities: MockEntities) -> Context {
    Context::new(Arc::new(chain), Arc::new(entities), alice())
}
