//! Procedures for common asset and settlement operations.
//!
//! Each procedure reads what it needs from storage, declares its authorization and emits
//! the calls. Results are returned as typed handles resolved from the emitted events.

use polymesh_core::{AssetId, IdentityId, Ticker, VenueId};
use serde::Serialize;

use crate::error::Error;

mod create_asset;
mod create_venue;
mod rename_asset;
mod reserve_ticker;

pub use create_asset::{AssetDocument, CreateAsset, CreateAssetParams, MAX_ASSET_NAME_LENGTH};
pub use create_venue::{CreateVenue, CreateVenueParams, VenueType, MAX_VENUE_DESCRIPTION_LENGTH};
pub use rename_asset::{RenameAsset, RenameAssetParams, RenameAssetStorage};
pub use reserve_ticker::{ReserveTicker, ReserveTickerParams, TickerState};

/// A reserved ticker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TickerReservation {
    /// The reserved ticker.
    pub ticker: Ticker,
    /// Identity holding the reservation.
    pub owner: IdentityId,
    /// When the reservation lapses, in milliseconds since the epoch. `None` never lapses.
    pub expiry: Option<u64>,
}

/// A created asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Asset {
    /// Unique id of the asset.
    pub id: AssetId,
    /// Ticker linked to the asset.
    pub ticker: Ticker,
}

/// A created settlement venue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Venue {
    /// Id of the venue.
    pub id: VenueId,
}

/// A finalized receipt lacked the event a resolver reads.
pub(crate) fn missing_event(pallet: &str, variant: &str) -> Error {
    Error::Unexpected {
        message: format!("expected a {pallet}.{variant} event in the receipt"),
    }
}

