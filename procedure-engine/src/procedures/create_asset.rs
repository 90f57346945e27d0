use async_trait::async_trait;
use polymesh_core::tags::asset;
use polymesh_core::{AssetId, Balance, Role, Ticker};

use super::reserve_ticker::TickerState;
use super::{missing_event, Asset, ReserveTicker, ReserveTickerParams};
use crate::authorization::ProcedureAuthorization;
use crate::batch::TransactionBatch;
use crate::chain::Value;
use crate::error::{Error, Result};
use crate::post_transaction_value::ReturnValue;
use crate::procedure::{Context, Procedure, QueueBuilder};
use crate::receipt::TransactionReceipt;
use crate::transaction::{TransactionSpec, TxArg};
use crate::values::{self, asset_value, ticker_value};

/// Longest accepted asset name, in bytes.
pub const MAX_ASSET_NAME_LENGTH: usize = 128;

/// A document attached to an asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetDocument {
    /// Display name.
    pub name: String,
    /// Where the document can be fetched.
    pub uri: String,
}

impl AssetDocument {
    fn to_value(&self) -> Value {
        Value::named_composite([
            ("uri", Value::from_bytes(self.uri.as_bytes())),
            ("content_hash", Value::unnamed_variant("None", [])),
            ("name", Value::from_bytes(self.name.as_bytes())),
            ("doc_type", values::option_value(None)),
            ("filing_date", values::option_value(None)),
        ])
    }
}

/// Parameters of [`CreateAsset`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateAssetParams {
    /// Ticker to link to the asset. Reserved on the way when not reserved yet.
    pub ticker: Ticker,
    /// Asset name.
    pub name: String,
    /// Whether balances may have decimals.
    pub divisible: bool,
    /// Asset type variant, e.g. `EquityCommon`.
    pub asset_type: String,
    /// Documents to attach once the asset exists.
    pub documents: Vec<AssetDocument>,
    /// Units to issue to the default portfolio once the asset exists.
    pub initial_supply: Option<Balance>,
}

/// Creates an asset, reserving its ticker first when needed.
///
/// Documents and the initial issuance reference the new asset id, so they are batched in
/// a second transaction that reads it from the creation receipt.
#[derive(Clone, Copy, Debug, Default)]
pub struct CreateAsset;

fn asset_from(receipt: &TransactionReceipt, ticker: &Ticker) -> Result<Asset> {
    let id = receipt
        .find_event("Asset", "AssetCreated")
        .and_then(|event| event.field_at(1))
        .and_then(values::as_asset_id)
        .ok_or_else(|| missing_event("Asset", "AssetCreated"))?;
    Ok(Asset {
        id,
        ticker: ticker.clone(),
    })
}

#[async_trait]
impl Procedure for CreateAsset {
    type Params = CreateAssetParams;
    type Storage = TickerState;
    type Output = Asset;

    async fn prepare_storage(&self, ctx: &Context, params: &Self::Params) -> Result<TickerState> {
        TickerState::fetch(ctx, &params.ticker).await
    }

    fn authorization(
        &self,
        ctx: &Context,
        params: &Self::Params,
        storage: &Self::Storage,
    ) -> ProcedureAuthorization {
        let mut transactions = vec![asset::CREATE_ASSET];
        if !params.documents.is_empty() {
            transactions.push(asset::ADD_DOCUMENTS);
        }
        if params.initial_supply.is_some() {
            transactions.push(asset::ISSUE);
        }
        let authorization = ProcedureAuthorization::new().with_transactions(transactions);

        if storage.active_registration().is_some() {
            authorization.with_roles([Role::TickerOwner {
                ticker: params.ticker.clone(),
            }])
        } else {
            let reserve = ReserveTickerParams {
                ticker: params.ticker.clone(),
                extend_period: false,
            };
            authorization.union(ReserveTicker.authorization(ctx, &reserve, storage))
        }
    }

    async fn prepare(
        &self,
        ctx: &Context,
        params: Self::Params,
        storage: &Self::Storage,
        queue: &mut QueueBuilder<'_>,
    ) -> Result<ReturnValue<Asset>> {
        if params.name.is_empty() {
            return Err(Error::Validation {
                message: "asset name cannot be empty".into(),
            });
        }
        if params.name.len() > MAX_ASSET_NAME_LENGTH {
            return Err(Error::LimitExceeded {
                message: format!(
                    "asset name is {} bytes long, the limit is {MAX_ASSET_NAME_LENGTH}",
                    params.name.len()
                ),
            });
        }
        if params.initial_supply == Some(0) {
            return Err(Error::Validation {
                message: "initial supply must be greater than zero".into(),
            });
        }
        if storage.asset.is_some() {
            return Err(Error::UnmetPrerequisite {
                message: format!("ticker {} is already linked to an asset", params.ticker),
            });
        }

        let signer = ctx.signing_identity()?;
        match storage.active_registration() {
            Some(registration) if registration.owner != signer => {
                return Err(Error::UnmetPrerequisite {
                    message: format!(
                        "ticker {} is reserved by another identity",
                        params.ticker
                    ),
                });
            }
            Some(_) => {}
            None => {
                let reserve = ReserveTickerParams {
                    ticker: params.ticker.clone(),
                    extend_period: false,
                };
                queue.add_procedure(&ReserveTicker, reserve).await?;
            }
        }

        let creation = TransactionSpec::new(
            asset::CREATE_ASSET,
            [
                Value::from_bytes(params.name.as_bytes()),
                ticker_value(&params.ticker),
                Value::bool(params.divisible),
                Value::unnamed_variant(params.asset_type.clone(), []),
                Value::unnamed_composite([]),
                values::option_value(None),
            ],
        );
        let ticker = params.ticker.clone();
        let created =
            queue.add_transaction_with_resolver(creation, move |receipt| asset_from(receipt, &ticker));

        let asset_arg =
            || created.to_arg(asset_value(&AssetId([0; 16])), |asset| asset_value(&asset.id));
        let mut follow_up = TransactionBatch::new();
        if !params.documents.is_empty() {
            let documents = params.documents.iter().map(AssetDocument::to_value);
            let count = u32::try_from(params.documents.len()).unwrap_or(u32::MAX);
            follow_up = follow_up.push(
                TransactionSpec::new(
                    asset::ADD_DOCUMENTS,
                    [
                        TxArg::from(Value::unnamed_composite(documents)),
                        asset_arg(),
                    ],
                )
                .with_fee_multiplier(count),
            );
        }
        if let Some(amount) = params.initial_supply {
            follow_up = follow_up.push(TransactionSpec::new(
                asset::ISSUE,
                [
                    asset_arg(),
                    TxArg::from(Value::u128(amount)),
                    TxArg::from(Value::unnamed_variant("Default", [])),
                ],
            ));
        }
        if !follow_up.is_empty() {
            queue.add_batch_transaction(follow_up)?;
        }

        Ok(created.into())
    }
}
