//! Helpers reading typed data out of dynamically decoded storage values and event fields.
//!
//! Newtype wrappers (`VenueId(u64)`, `AssetName(Vec<u8>)`, ...) decode as single field
//! composites, so every accessor looks through them.

use polymesh_core::{AssetId, IdentityId, Ticker};
use subxt::ext::scale_value::{At, Primitive, ValueDef};

use crate::chain::Value;
use crate::error::{ChainError, Error};

/// The single inner value of a one field composite, or the value itself.
fn unwrap_newtype(value: &Value) -> &Value {
    match &value.value {
        ValueDef::Composite(composite) if composite.len() == 1 => composite
            .values()
            .next()
            .map(unwrap_newtype)
            .unwrap_or(value),
        _ => value,
    }
}

/// Reads an unsigned integer.
pub fn as_u128(value: &Value) -> Option<u128> {
    unwrap_newtype(value).as_u128()
}

/// Reads an unsigned integer that fits in 64 bits.
pub fn as_u64(value: &Value) -> Option<u64> {
    as_u128(value).and_then(|n| u64::try_from(n).ok())
}

/// Reads a byte string, encoded either as a sequence of `u8` or as a string primitive.
pub fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match &value.value {
        ValueDef::Primitive(Primitive::String(s)) => Some(s.as_bytes().to_vec()),
        ValueDef::Composite(composite) => {
            let bytes = composite
                .values()
                .map(|byte| match &byte.value {
                    ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
                    _ => None,
                })
                .collect::<Option<Vec<u8>>>();
            match bytes {
                Some(bytes) => Some(bytes),
                None if composite.len() == 1 => composite.values().next().and_then(as_bytes),
                None => None,
            }
        }
        _ => None,
    }
}

/// Reads a UTF-8 string, dropping the zero padding of fixed width fields.
pub fn as_string(value: &Value) -> Option<String> {
    let bytes = as_bytes(value)?;
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);
    String::from_utf8(bytes[..end].to_vec()).ok()
}

/// Reads an `Option<T>`: `Some(Some(inner))`, `Some(None)`, or `None` when not an option.
pub fn as_option(value: &Value) -> Option<Option<&Value>> {
    match &value.value {
        ValueDef::Variant(variant) if variant.name == "None" => Some(None),
        ValueDef::Variant(variant) if variant.name == "Some" => {
            variant.values.values().next().map(Some)
        }
        _ => None,
    }
}

/// Reads the name and fields of an enum value.
pub fn as_variant(value: &Value) -> Option<(&str, Vec<&Value>)> {
    match &value.value {
        ValueDef::Variant(variant) => Some((variant.name.as_str(), variant.values.values().collect())),
        _ => None,
    }
}

/// Reads the elements of a sequence, set or map (as key value pairs).
pub fn items(value: &Value) -> Option<Vec<&Value>> {
    match &value.value {
        ValueDef::Composite(composite) => Some(composite.values().collect()),
        _ => None,
    }
}

/// Reads a named field of a composite value.
pub fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value.at(name)
}

/// Reads an identity (32 bytes).
pub fn as_identity(value: &Value) -> Option<IdentityId> {
    let bytes: [u8; 32] = as_bytes(value)?.try_into().ok()?;
    Some(IdentityId(bytes))
}

/// Reads an asset id (16 bytes).
pub fn as_asset_id(value: &Value) -> Option<AssetId> {
    let bytes: [u8; 16] = as_bytes(value)?.try_into().ok()?;
    Some(AssetId(bytes))
}

/// Builds an `Option<T>` value.
pub fn option_value(value: Option<Value>) -> Value {
    match value {
        Some(inner) => Value::unnamed_variant("Some", [inner]),
        None => Value::unnamed_variant("None", []),
    }
}

/// Storage key of a ticker: its zero padded bytes.
pub fn ticker_value(ticker: &Ticker) -> Value {
    Value::from_bytes(ticker.to_padded_bytes())
}

/// Encodes an asset id.
pub fn asset_value(asset: &AssetId) -> Value {
    Value::from_bytes(asset.0)
}

/// A storage value did not have the expected shape.
pub(crate) fn malformed(what: &str, message: &str) -> Error {
    Error::Chain {
        source: ChainError::Decode {
            what: what.into(),
            message: message.into(),
        },
    }
}
