use async_trait::async_trait;
use polymesh_core::tags::asset;
use polymesh_core::{AssetId, IdentityId, Role, Ticker};

use super::{missing_event, TickerReservation};
use crate::authorization::ProcedureAuthorization;
use crate::error::{Error, Result};
use crate::post_transaction_value::ReturnValue;
use crate::procedure::{Context, Procedure, QueueBuilder};
use crate::receipt::TransactionReceipt;
use crate::transaction::TransactionSpec;
use crate::values::{self, malformed, ticker_value};

/// Parameters of [`ReserveTicker`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReserveTickerParams {
    /// Ticker to reserve.
    pub ticker: Ticker,
    /// Renew an existing reservation of the signer instead of creating one.
    pub extend_period: bool,
}

/// An existing ticker reservation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Registration {
    pub(crate) owner: IdentityId,
    pub(crate) expiry: Option<u64>,
}

/// What the chain knows about a ticker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickerState {
    pub(crate) registration: Option<Registration>,
    pub(crate) asset: Option<AssetId>,
    pub(crate) now: u64,
}

impl TickerState {
    /// Reads the reservation, the linked asset and the current time concurrently.
    pub(crate) async fn fetch(ctx: &Context, ticker: &Ticker) -> Result<Self> {
        let (registration, asset, now) = futures::try_join!(
            ctx.query_storage("Asset", "UniqueTickerRegistration", vec![ticker_value(ticker)]),
            ctx.query_storage("Asset", "TickerAssetId", vec![ticker_value(ticker)]),
            ctx.query_storage("Timestamp", "Now", vec![]),
        )?;

        let registration = registration
            .map(|value| {
                let owner = values::field(&value, "owner")
                    .and_then(values::as_identity)
                    .ok_or_else(|| malformed("Asset.UniqueTickerRegistration", "missing owner"))?;
                let expiry = values::field(&value, "expiry")
                    .and_then(values::as_option)
                    .flatten()
                    .and_then(values::as_u64);
                Ok::<_, Error>(Registration { owner, expiry })
            })
            .transpose()?;
        let asset = asset
            .map(|value| {
                values::as_asset_id(&value)
                    .ok_or_else(|| malformed("Asset.TickerAssetId", "expected a 16 byte asset id"))
            })
            .transpose()?;

        let now = now.ok_or_else(|| Error::DataUnavailable {
            message: "the chain does not report its current time".into(),
        })?;
        let now = values::as_u64(&now)
            .ok_or_else(|| malformed("Timestamp.Now", "expected a millisecond timestamp"))?;

        Ok(Self {
            registration,
            asset,
            now,
        })
    }

    /// The reservation, unless it has lapsed.
    pub(crate) fn active_registration(&self) -> Option<&Registration> {
        self.registration
            .as_ref()
            .filter(|registration| registration.expiry.map_or(true, |expiry| expiry > self.now))
    }
}

/// Reserves a ticker for the signer's identity, or extends the signer's reservation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReserveTicker;

fn reservation_from(receipt: &TransactionReceipt, ticker: &Ticker) -> Result<TickerReservation> {
    let event = receipt
        .find_event("Asset", "TickerRegistered")
        .ok_or_else(|| missing_event("Asset", "TickerRegistered"))?;
    let owner = event
        .field_at(0)
        .and_then(values::as_identity)
        .ok_or_else(|| missing_event("Asset", "TickerRegistered"))?;
    let expiry = event
        .field_at(2)
        .and_then(values::as_option)
        .flatten()
        .and_then(values::as_u64);
    Ok(TickerReservation {
        ticker: ticker.clone(),
        owner,
        expiry,
    })
}

#[async_trait]
impl Procedure for ReserveTicker {
    type Params = ReserveTickerParams;
    type Storage = TickerState;
    type Output = TickerReservation;

    async fn prepare_storage(&self, ctx: &Context, params: &Self::Params) -> Result<TickerState> {
        TickerState::fetch(ctx, &params.ticker).await
    }

    fn authorization(
        &self,
        _ctx: &Context,
        params: &Self::Params,
        _storage: &Self::Storage,
    ) -> ProcedureAuthorization {
        let authorization = ProcedureAuthorization::new().with_transactions([asset::REGISTER_TICKER]);
        if params.extend_period {
            authorization.with_roles([Role::TickerOwner {
                ticker: params.ticker.clone(),
            }])
        } else {
            authorization
        }
    }

    async fn prepare(
        &self,
        _ctx: &Context,
        params: Self::Params,
        storage: &Self::Storage,
        queue: &mut QueueBuilder<'_>,
    ) -> Result<ReturnValue<TickerReservation>> {
        let ticker = params.ticker;

        if storage.asset.is_some() {
            return Err(Error::UnmetPrerequisite {
                message: format!("ticker {} is already linked to an asset", ticker.as_str()),
            });
        }

        match (storage.active_registration(), params.extend_period) {
            (Some(_), false) => {
                return Err(Error::UnmetPrerequisite {
                    message: format!("ticker {} is already reserved", ticker.as_str()),
                })
            }
            (None, true) => {
                return Err(Error::UnmetPrerequisite {
                    message: format!(
                        "ticker {} is not reserved or its reservation has expired",
                        ticker.as_str()
                    ),
                })
            }
            (Some(Registration { expiry: None, .. }), true) => {
                return Err(Error::NoDataChange {
                    message: format!("the reservation of {} never expires", ticker.as_str()),
                })
            }
            _ => {}
        }

        let spec = TransactionSpec::new(asset::REGISTER_TICKER, [ticker_value(&ticker)]);
        let reservation =
            queue.add_transaction_with_resolver(spec, move |receipt| reservation_from(receipt, &ticker));
        Ok(reservation.into())
    }
}
