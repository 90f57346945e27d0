use async_trait::async_trait;
use polymesh_core::tags::asset;
use polymesh_core::AssetId;

use super::create_asset::MAX_ASSET_NAME_LENGTH;
use crate::authorization::ProcedureAuthorization;
use crate::chain::Value;
use crate::error::{Error, Result};
use crate::post_transaction_value::ReturnValue;
use crate::procedure::{Context, Procedure, QueueBuilder};
use crate::transaction::TransactionSpec;
use crate::values::{self, asset_value};

/// Parameters of [`RenameAsset`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameAssetParams {
    /// Asset to rename.
    pub asset: AssetId,
    /// New name.
    pub name: String,
}

/// Current name of the asset, `None` when the asset does not exist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameAssetStorage {
    current_name: Option<String>,
}

/// Renames an asset.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenameAsset;

#[async_trait]
impl Procedure for RenameAsset {
    type Params = RenameAssetParams;
    type Storage = RenameAssetStorage;
    type Output = ();

    async fn prepare_storage(
        &self,
        ctx: &Context,
        params: &Self::Params,
    ) -> Result<RenameAssetStorage> {
        let name = ctx
            .query_storage("Asset", "AssetNames", vec![asset_value(&params.asset)])
            .await?;
        Ok(RenameAssetStorage {
            current_name: name.as_ref().and_then(values::as_string),
        })
    }

    fn authorization(
        &self,
        _ctx: &Context,
        params: &Self::Params,
        _storage: &Self::Storage,
    ) -> ProcedureAuthorization {
        ProcedureAuthorization::new()
            .with_transactions([asset::RENAME_ASSET])
            .with_assets([params.asset].into_iter().collect())
    }

    async fn prepare(
        &self,
        _ctx: &Context,
        params: Self::Params,
        storage: &Self::Storage,
        queue: &mut QueueBuilder<'_>,
    ) -> Result<ReturnValue<()>> {
        let Some(current) = &storage.current_name else {
            return Err(Error::DataUnavailable {
                message: format!("asset {} does not exist", params.asset),
            });
        };
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
        if *current == params.name {
            return Err(Error::NoDataChange {
                message: "new name is the same as the current one".into(),
            });
        }

        queue.add_transaction(TransactionSpec::new(
            asset::RENAME_ASSET,
            [
                asset_value(&params.asset),
                Value::from_bytes(params.name.as_bytes()),
            ],
        ));
        Ok(ReturnValue::Ready(()))
    }
}
