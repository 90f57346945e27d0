use subxt::utils::H256;

use crate::chain::Value;
use crate::values;

/// An event emitted while dispatching an extrinsic, with its fields decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedEvent {
    /// Pallet that emitted the event.
    pub pallet: String,
    /// Event variant name.
    pub variant: String,
    /// Event fields, as a composite value.
    pub fields: Value,
}

impl DecodedEvent {
    /// Creates an event with positional fields.
    pub fn new(
        pallet: impl Into<String>,
        variant: impl Into<String>,
        fields: impl IntoIterator<Item = Value>,
    ) -> Self {
        Self {
            pallet: pallet.into(),
            variant: variant.into(),
            fields: Value::unnamed_composite(fields),
        }
    }

    /// Whether this is `pallet.variant`.
    pub fn is(&self, pallet: &str, variant: &str) -> bool {
        self.pallet == pallet && self.variant == variant
    }

    /// A named field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        values::field(&self.fields, name)
    }

    /// A positional field.
    pub fn field_at(&self, index: usize) -> Option<&Value> {
        use subxt::ext::scale_value::At;
        self.fields.at(index)
    }
}

/// The outcome of a finalized extrinsic.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionReceipt {
    /// Extrinsic hash.
    pub tx_hash: H256,
    /// Hash of the finalized block including the extrinsic.
    pub block_hash: H256,
    /// Events emitted by the extrinsic, in emission order.
    pub events: Vec<DecodedEvent>,
    /// The dispatch error when the runtime rejected the call.
    pub dispatch_error: Option<String>,
}

impl TransactionReceipt {
    /// Whether the runtime dispatched the call without error.
    pub fn is_success(&self) -> bool {
        self.dispatch_error.is_none()
    }

    /// The first `pallet.variant` event.
    pub fn find_event(&self, pallet: &str, variant: &str) -> Option<&DecodedEvent> {
        self.events.iter().find(|event| event.is(pallet, variant))
    }

    /// Every `pallet.variant` event, in emission order.
    pub fn events_of<'a>(
        &'a self,
        pallet: &'a str,
        variant: &'a str,
    ) -> impl Iterator<Item = &'a DecodedEvent> + 'a {
        self.events
            .iter()
            .filter(move |event| event.is(pallet, variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(events: Vec<DecodedEvent>) -> TransactionReceipt {
        TransactionReceipt {
            tx_hash: H256::repeat_byte(1),
            block_hash: H256::repeat_byte(2),
            events,
            dispatch_error: None,
        }
    }

    #[test]
    fn events_are_found_by_pallet_and_variant() {
        let receipt = receipt(vec![
            DecodedEvent::new("Balances", "Withdraw", [Value::u128(10)]),
            DecodedEvent::new("Settlement", "VenueCreated", [Value::u128(1), Value::u128(7)]),
            DecodedEvent::new("Settlement", "VenueCreated", [Value::u128(1), Value::u128(8)]),
        ]);
        let first = receipt.find_event("Settlement", "VenueCreated").unwrap();
        assert_eq!(first.field_at(1).and_then(values::as_u64), Some(7));
        assert_eq!(receipt.events_of("Settlement", "VenueCreated").count(), 2);
        assert!(receipt.find_event("Asset", "AssetCreated").is_none());
        assert!(receipt.is_success());
    }
}
