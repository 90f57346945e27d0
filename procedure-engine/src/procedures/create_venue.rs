use async_trait::async_trait;
use polymesh_core::tags::settlement;
use polymesh_core::VenueId;
use serde::Serialize;

use super::{missing_event, Venue};
use crate::authorization::ProcedureAuthorization;
use crate::chain::Value;
use crate::error::{Error, Result};
use crate::post_transaction_value::ReturnValue;
use crate::procedure::{Context, Procedure, QueueBuilder};
use crate::receipt::TransactionReceipt;
use crate::transaction::TransactionSpec;
use crate::values;

/// Longest accepted venue description, in bytes.
pub const MAX_VENUE_DESCRIPTION_LENGTH: usize = 2048;

/// What a venue is used for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum VenueType {
    /// Anything else.
    #[default]
    Other,
    /// Primary issuance.
    Distribution,
    /// Security token offerings.
    Sto,
    /// Secondary market trading.
    Exchange,
}

impl VenueType {
    fn variant_name(self) -> &'static str {
        match self {
            VenueType::Other => "Other",
            VenueType::Distribution => "Distribution",
            VenueType::Sto => "Sto",
            VenueType::Exchange => "Exchange",
        }
    }
}

/// Parameters of [`CreateVenue`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateVenueParams {
    /// Free form description.
    pub description: String,
    /// What the venue is used for.
    pub venue_type: VenueType,
}

/// Creates a settlement venue owned by the signer's identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct CreateVenue;

/// Reads the id out of the first `Settlement.VenueCreated` event.
fn venue_from(receipt: &TransactionReceipt) -> Result<Venue> {
    receipt
        .find_event("Settlement", "VenueCreated")
        .and_then(|event| event.field_at(1))
        .and_then(values::as_u64)
        .map(|id| Venue { id: VenueId(id) })
        .ok_or_else(|| missing_event("Settlement", "VenueCreated"))
}

#[async_trait]
impl Procedure for CreateVenue {
    type Params = CreateVenueParams;
    type Storage = ();
    type Output = Venue;

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
    ) -> Result<ReturnValue<Venue>> {
        if params.description.len() > MAX_VENUE_DESCRIPTION_LENGTH {
            return Err(Error::LimitExceeded {
                message: format!(
                    "venue description is {} bytes long, the limit is {MAX_VENUE_DESCRIPTION_LENGTH}",
                    params.description.len()
                ),
            });
        }

        let spec = TransactionSpec::new(
            settlement::CREATE_VENUE,
            [
                Value::from_bytes(params.description.as_bytes()),
                Value::unnamed_composite([]),
                Value::unnamed_variant(params.venue_type.variant_name(), []),
            ],
        );
        Ok(queue.add_transaction_with_resolver(spec, venue_from).into())
    }
}

#[cfg(test)]
mod tests {
    use polymesh_core::IdentityId;
    use subxt::utils::H256;

    use super::*;
    use crate::mock::{context, MockChain, MockEntities, ALICE_DID};
    use crate::receipt::DecodedEvent;

    fn venue_created(id: u64) -> DecodedEvent {
        DecodedEvent::new(
            "Settlement",
            "VenueCreated",
            [
                Value::from_bytes(ALICE_DID.0),
                Value::unnamed_composite([Value::u128(id.into())]),
                Value::from_bytes(b"OTC desk"),
                Value::unnamed_variant("Exchange", []),
            ],
        )
    }

    #[tokio::test]
    async fn created_venues_are_read_from_the_receipt() {
        let chain = MockChain::new().with_events(
            settlement::CREATE_VENUE,
            vec![
                DecodedEvent::new("Balances", "Withdraw", [Value::u128(12)]),
                DecodedEvent::new("Identity", "VenueCreated", [Value::u128(3), Value::u128(99)]),
                venue_created(7),
                DecodedEvent::new("System", "ExtrinsicSuccess", []),
            ],
        );
        let ctx = context(chain.clone(), MockEntities::full());
        let params = CreateVenueParams {
            description: "OTC desk".into(),
            venue_type: VenueType::Exchange,
        };

        let venue = ctx.run(&CreateVenue, params).await.unwrap();
        assert_eq!(venue, Venue { id: VenueId(7) });
        assert_eq!(
            chain.submitted()[0].call_args()[2],
            Value::unnamed_variant("Exchange", [])
        );
    }

    #[test]
    fn resolvers_ignore_unrelated_events() {
        let receipt = TransactionReceipt {
            tx_hash: H256::zero(),
            block_hash: H256::zero(),
            events: vec![
                DecodedEvent::new("Asset", "AssetCreated", [Value::from_bytes(IdentityId([1; 32]).0)]),
                venue_created(7),
                venue_created(8),
            ],
            dispatch_error: None,
        };
        assert_eq!(venue_from(&receipt).unwrap().id, VenueId(7));

        let empty = TransactionReceipt {
            events: vec![],
            ..receipt
        };
        assert!(matches!(venue_from(&empty), Err(Error::Unexpected { .. })));
    }

    #[tokio::test]
    async fn long_descriptions_exceed_the_limit() {
        let ctx = context(MockChain::new(), MockEntities::full());
        let params = CreateVenueParams {
            description: "x".repeat(MAX_VENUE_DESCRIPTION_LENGTH + 1),
            ..CreateVenueParams::default()
        };
        assert!(matches!(
            ctx.prepare(&CreateVenue, params).await,
            Err(Error::LimitExceeded { .. })
        ));
    }
}
