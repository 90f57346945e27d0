//! Procedures: the orchestration units that turn a user intent into a queue of
//! transactions.
//!
//! Preparing a procedure goes through three phases, in order:
//!
//! 1. [`Procedure::prepare_storage`] reads whatever chain state the other phases need.
//! 2. [`Procedure::authorization`] declares, without side effects, what the signer must
//!    hold. It is checked before anything else happens.
//! 3. [`Procedure::prepare`] validates business rules and adds transactions to a
//!    [`QueueBuilder`], possibly delegating to nested procedures.
//!
//! Nothing is submitted until the caller runs the returned [`TransactionQueue`].

use std::collections::BTreeSet;
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use polymesh_core::{IdentityId, TxTag};
use tokio::sync::broadcast;

use crate::authorization::{authorize, Actor, EntityLayer, ProcedureAuthorization, Verdict};
use crate::batch::TransactionBatch;
use crate::chain::{ChainClient, Value};
use crate::error::{Error, Result};
use crate::post_transaction_value::{PostTransactionValue, Resolution, ReturnValue};
use crate::queue::{Prepared, QueueEvent, Resolutions, TransactionQueue, EVENT_CAPACITY};
use crate::receipt::TransactionReceipt;
use crate::transaction::{Payload, PolymeshTransaction, TransactionId, TransactionSpec};

/// Everything a procedure may consult: the chain, the entity layer and the signer.
#[derive(Clone)]
pub struct Context {
    client: Arc<dyn ChainClient>,
    entities: Arc<dyn EntityLayer>,
    actor: Actor,
}

impl Context {
    /// Binds a chain client and an entity layer to the signer `actor`.
    pub fn new(client: Arc<dyn ChainClient>, entities: Arc<dyn EntityLayer>, actor: Actor) -> Self {
        Self {
            client,
            entities,
            actor,
        }
    }

    /// The chain client.
    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// The signer.
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// The identity of the signer, required by procedures acting on its behalf.
    pub fn signing_identity(&self) -> Result<IdentityId> {
        self.actor.identity.ok_or_else(|| Error::UnmetPrerequisite {
            message: "the signing key is not attached to an identity".into(),
        })
    }

    /// Reads a storage entry at the latest block.
    pub async fn query_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
    ) -> Result<Option<Value>> {
        self.client
            .query_storage(pallet, entry, keys)
            .await
            .map_err(|source| Error::Chain { source })
    }

    async fn authorize(&self, authorization: &ProcedureAuthorization) -> Result<Verdict> {
        authorize(self.entities.as_ref(), &self.actor, authorization).await
    }

    /// Checks whether the signer may run `procedure` with `params`, without preparing it.
    pub async fn check_authorization<P: Procedure>(
        &self,
        procedure: &P,
        params: &P::Params,
    ) -> Result<Verdict> {
        let storage = procedure.prepare_storage(self, params).await?;
        let authorization = procedure.authorization(self, params, &storage);
        self.authorize(&authorization).await
    }

    /// Prepares `procedure` for `params`, returning the queue to run.
    ///
    /// Fails with [`Error::NotAuthorized`] before `prepare` runs when the declared
    /// authorization is denied, and again afterwards if nested procedures required more.
    pub async fn prepare<P: Procedure>(
        &self,
        procedure: &P,
        params: P::Params,
    ) -> Result<TransactionQueue<P::Output>> {
        let storage = procedure.prepare_storage(self, &params).await?;
        let declared = procedure.authorization(self, &params, &storage);
        self.authorize(&declared).await?.into_result()?;

        let mut builder = QueueBuilder::root(self);
        let return_value = procedure.prepare(self, params, &storage, &mut builder).await?;
        let prepared = builder.finish(declared.clone(), return_value);

        if prepared.authorization != declared {
            self.authorize(&prepared.authorization)
                .await?
                .into_result()?;
        }

        debug!(
            "Prepared queue of {} transaction(s) for {:?}",
            prepared.transactions.len(),
            self.actor.account
        );
        Ok(TransactionQueue::new(prepared, Arc::clone(&self.client)))
    }

    /// Prepares and runs `procedure` in one go.
    pub async fn run<P: Procedure>(&self, procedure: &P, params: P::Params) -> Result<P::Output> {
        self.prepare(procedure, params).await?.run().await
    }
}

/// An operation composed of one or more transactions.
///
/// Implementations hold no state of their own: everything a phase needs is passed in.
#[async_trait]
pub trait Procedure: Send + Sync {
    /// User input.
    type Params: Send + Sync;
    /// Chain state read once and shared by the other phases.
    type Storage: Default + Send + Sync;
    /// What running the queue returns.
    type Output: Clone + Send + Sync + 'static;

    /// Reads the chain state the other phases need. Never mutates anything.
    async fn prepare_storage(&self, _ctx: &Context, _params: &Self::Params) -> Result<Self::Storage> {
        Ok(Self::Storage::default())
    }

    /// What the signer must hold. Must not depend on `prepare` having run.
    fn authorization(
        &self,
        ctx: &Context,
        params: &Self::Params,
        storage: &Self::Storage,
    ) -> ProcedureAuthorization;

    /// Validates `params` and adds the transactions to `queue`.
    ///
    /// Business rule violations must be returned before any transaction is added.
    async fn prepare(
        &self,
        ctx: &Context,
        params: Self::Params,
        storage: &Self::Storage,
        queue: &mut QueueBuilder<'_>,
    ) -> Result<ReturnValue<Self::Output>>;
}

/// Collects the transactions of one procedure invocation.
pub struct QueueBuilder<'a> {
    ctx: &'a Context,
    events: broadcast::Sender<QueueEvent>,
    transactions: Vec<PolymeshTransaction>,
    resolutions: Resolutions,
    nested: ProcedureAuthorization,
}

impl<'a> QueueBuilder<'a> {
    pub(crate) fn root(ctx: &'a Context) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_events(ctx, events)
    }

    fn with_events(ctx: &'a Context, events: broadcast::Sender<QueueEvent>) -> Self {
        Self {
            ctx,
            events,
            transactions: Vec::new(),
            resolutions: Resolutions::new(),
            nested: ProcedureAuthorization::default(),
        }
    }

    /// Number of transactions added so far.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether no transaction was added.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn push(&mut self, payload: Payload) -> TransactionId {
        let transaction = PolymeshTransaction::new(payload, self.events.clone());
        let id = transaction.id();
        self.transactions.push(transaction);
        id
    }

    fn bind<T, F>(&mut self, id: TransactionId, resolver: F) -> PostTransactionValue<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&TransactionReceipt) -> Result<T> + Send + Sync + 'static,
    {
        let value = PostTransactionValue::new(id);
        self.resolutions
            .entry(id)
            .or_default()
            .push(Box::new(Resolution::new(value.clone(), Box::new(resolver))));
        value
    }

    /// Appends a transaction.
    pub fn add_transaction(&mut self, spec: TransactionSpec) -> TransactionId {
        self.push(Payload::Single(spec))
    }

    /// Appends a transaction whose receipt produces a value.
    pub fn add_transaction_with_resolver<T, F>(
        &mut self,
        spec: TransactionSpec,
        resolver: F,
    ) -> PostTransactionValue<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&TransactionReceipt) -> Result<T> + Send + Sync + 'static,
    {
        let id = self.add_transaction(spec);
        self.bind(id, resolver)
    }

    /// Appends an atomic batch.
    pub fn add_batch_transaction(&mut self, batch: TransactionBatch) -> Result<TransactionId> {
        batch.ensure_not_empty()?;
        Ok(self.push(Payload::Batch(batch)))
    }

    /// Appends an atomic batch whose receipt produces a value.
    pub fn add_batch_transaction_with_resolver<T, F>(
        &mut self,
        batch: TransactionBatch,
        resolver: F,
    ) -> Result<PostTransactionValue<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(&TransactionReceipt) -> Result<T> + Send + Sync + 'static,
    {
        let id = self.add_batch_transaction(batch)?;
        Ok(self.bind(id, resolver))
    }

    /// Prepares a nested procedure and appends its transactions after the ones added so far.
    ///
    /// Its authorization is merged into the one of the procedure being prepared.
    pub async fn add_procedure<P: Procedure>(
        &mut self,
        procedure: &P,
        params: P::Params,
    ) -> Result<ReturnValue<P::Output>> {
        let ctx = self.ctx;
        let storage = procedure.prepare_storage(ctx, &params).await?;
        let declared = procedure.authorization(ctx, &params, &storage);

        let mut nested = QueueBuilder::with_events(ctx, self.events.clone());
        let return_value = procedure.prepare(ctx, params, &storage, &mut nested).await?;
        let prepared = nested.finish(declared, return_value);

        self.nested = mem::take(&mut self.nested).union(prepared.authorization);
        self.transactions.extend(prepared.transactions);
        self.resolutions.extend(prepared.resolutions);
        Ok(prepared.return_value)
    }

    pub(crate) fn finish<T>(
        self,
        declared: ProcedureAuthorization,
        return_value: ReturnValue<T>,
    ) -> Prepared<T> {
        let authorization = declared.union(self.nested);

        let undeclared = self
            .transactions
            .iter()
            .flat_map(PolymeshTransaction::tags)
            .filter(|tag| !authorization.permissions.transactions.contains(tag))
            .collect::<BTreeSet<TxTag>>();
        if !undeclared.is_empty() {
            warn!(
                "⚠️ Transactions added without being declared in the authorization: {:?}",
                undeclared
            );
        }

        Prepared {
            transactions: self.transactions,
            resolutions: self.resolutions,
            authorization,
            return_value,
            events: self.events,
        }
    }

    #[cfg(test)]
    pub(crate) fn into_queue<T: Clone + Send + Sync + 'static>(
        self,
        return_value: ReturnValue<T>,
    ) -> TransactionQueue<T> {
        let client = Arc::clone(&self.ctx.client);
        TransactionQueue::new(self.finish(ProcedureAuthorization::default(), return_value), client)
    }
}

#[cfg(test)]
mod tests {
    use polymesh_core::tags::{asset, settlement};
    use polymesh_core::{Permissions, TransactionPermissions};

    use super::*;
    use crate::authorization::DenialReason;
    use crate::mock::{context, MockChain, MockEntities};

    /// Adds one `Settlement.create_venue` per name, refusing empty names.
    struct CreateVenues;

    #[async_trait]
    impl Procedure for CreateVenues {
        type Params = Vec<String>;
        type Storage = ();
        type Output = usize;

        fn authorization(
            &self,
            _ctx: &Context,
            _params: &Self::Params,
            _storage: &Self::Storage,
        ) -> ProcedureAuthorization {
            ProcedureAuthorization::new().with_transactions([settlement::CREATE_VENUE])
        }

        async fn prepare(
            &self,
            _ctx: &Context,
            params: Self::Params,
            _storage: &Self::Storage,
            queue: &mut QueueBuilder<'_>,
        ) -> Result<ReturnValue<usize>> {
            if params.iter().any(String::is_empty) {
                return Err(Error::Validation {
                    message: "venue descriptions cannot be empty".into(),
                });
            }
            for name in &params {
                queue.add_transaction(TransactionSpec::new(
                    settlement::CREATE_VENUE,
                    [Value::string(name.clone())],
                ));
            }
            Ok(ReturnValue::Ready(params.len()))
        }
    }

    /// Issues, then delegates to [`CreateVenues`].
    struct IssueThenCreateVenues;

    #[async_trait]
    impl Procedure for IssueThenCreateVenues {
        type Params = Vec<String>;
        type Storage = ();
        type Output = usize;

        fn authorization(
            &self,
            _ctx: &Context,
            _params: &Self::Params,
            _storage: &Self::Storage,
        ) -> ProcedureAuthorization {
            ProcedureAuthorization::new().with_transactions([asset::ISSUE])
        }

        async fn prepare(
            &self,
            _ctx: &Context,
            params: Self::Params,
            _storage: &Self::Storage,
            queue: &mut QueueBuilder<'_>,
        ) -> Result<ReturnValue<usize>> {
            queue.add_transaction(TransactionSpec::new(asset::ISSUE, [Value::u128(1)]));
            let venues = queue.add_procedure(&CreateVenues, params).await?;
            Ok(venues.map(|count| count + 1))
        }
    }

    #[tokio::test]
    async fn nested_procedures_are_appended_and_merged() {
        let chain = MockChain::new();
        let ctx = context(chain.clone(), MockEntities::full());
        let queue = ctx
            .prepare(&IssueThenCreateVenues, vec!["OTC".into(), "Exchange".into()])
            .await
            .unwrap();

        let tags = queue
            .transactions()
            .iter()
            .flat_map(|tx| tx.tags())
            .collect::<Vec<_>>();
        assert_eq!(
            tags,
            vec![asset::ISSUE, settlement::CREATE_VENUE, settlement::CREATE_VENUE]
        );
        assert_eq!(
            queue.authorization().permissions.transactions,
            BTreeSet::from([asset::ISSUE, settlement::CREATE_VENUE])
        );
        assert!(chain.submitted().is_empty());

        assert_eq!(queue.run().await.unwrap(), 3);
        assert_eq!(chain.submitted().len(), 3);
    }

    #[tokio::test]
    async fn nested_requirements_are_checked_after_preparation() {
        let entities = MockEntities::new(Permissions {
            transactions: TransactionPermissions::include([asset::ISSUE.into()]),
            ..Permissions::full()
        });
        let ctx = context(MockChain::new(), entities);

        assert!(ctx
            .check_authorization(&IssueThenCreateVenues, &vec![])
            .await
            .unwrap()
            .is_allowed());

        let err = ctx
            .prepare(&IssueThenCreateVenues, vec!["OTC".into()])
            .await
            .unwrap_err();
        match err {
            Error::NotAuthorized { reasons } => assert_eq!(
                reasons,
                vec![DenialReason::MissingTransactions(vec![settlement::CREATE_VENUE])]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn business_errors_leave_nothing_behind() {
        let chain = MockChain::new();
        let ctx = context(chain.clone(), MockEntities::full());
        let err = ctx
            .prepare(&IssueThenCreateVenues, vec!["OTC".into(), String::new()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.is_pre_submission());
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn authorization_is_idempotent_and_independent_of_prepare() {
        let ctx = context(MockChain::new(), MockEntities::full());
        let invalid = vec![String::new()];
        let first = CreateVenues.authorization(&ctx, &invalid, &());
        let second = CreateVenues.authorization(&ctx, &invalid, &());
        assert_eq!(first, second);
        assert!(ctx
            .check_authorization(&CreateVenues, &invalid)
            .await
            .unwrap()
            .is_allowed());
        assert!(ctx.prepare(&CreateVenues, invalid).await.is_err());
    }

    #[tokio::test]
    async fn empty_batches_are_refused() {
        let ctx = context(MockChain::new(), MockEntities::full());
        let mut builder = QueueBuilder::root(&ctx);
        assert!(builder.add_batch_transaction(TransactionBatch::new()).is_err());
        assert!(builder.is_empty());
    }
}
