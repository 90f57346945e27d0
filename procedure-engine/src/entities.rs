//! An [`EntityLayer`] reading key records, key permissions and roles from chain storage.
//!
//! Primary keys hold every permission. Secondary keys hold what their
//! `Identity.Key*Permissions` entries grant, where a missing entry grants the whole
//! section. Keys attached to no identity (or only to a multisig) hold nothing and
//! can therefore only sign ungated calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use polymesh_core::{
    AccountKey, IdentityId, Permissions, PortfolioId, Role, SectionPermissions, TagOrModule,
    TransactionPermissions, TxModule, TxTag,
};

use crate::authorization::{Actor, EntityLayer};
use crate::chain::{ChainClient, Value};
use crate::error::{Error, Result};
use crate::values::{self, asset_value, malformed, ticker_value};

const EXTRINSIC_PERMISSIONS: &str = "Identity.KeyExtrinsicPermissions";

/// What `Identity.KeyRecords` says about an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyRecord {
    Primary(IdentityId),
    Secondary(IdentityId),
    MultiSigSigner,
}

/// A decoded `SubsetRestriction`.
enum Restriction<'a> {
    Whole,
    These(Vec<&'a Value>),
    Except(Vec<&'a Value>),
}

fn restriction<'a>(value: &'a Value, what: &str) -> Result<Restriction<'a>> {
    let (name, fields) =
        values::as_variant(value).ok_or_else(|| malformed(what, "expected a subset restriction"))?;
    let elements = || {
        fields
            .first()
            .copied()
            .and_then(values::items)
            .ok_or_else(|| malformed(what, "missing element set"))
    };
    match name {
        "Whole" => Ok(Restriction::Whole),
        "These" => Ok(Restriction::These(elements()?)),
        "Except" => Ok(Restriction::Except(elements()?)),
        other => Err(malformed(what, &format!("unknown restriction {other}"))),
    }
}

fn section<T: Ord>(
    value: &Value,
    what: &str,
    read: impl Fn(&Value) -> Option<T>,
) -> Result<SectionPermissions<T>> {
    let collect = |elements: Vec<&Value>| {
        elements
            .into_iter()
            .map(|element| read(element).ok_or_else(|| malformed(what, "unreadable element")))
            .collect::<Result<BTreeSet<T>>>()
    };
    Ok(match restriction(value, what)? {
        Restriction::Whole => SectionPermissions::All,
        Restriction::These(elements) => SectionPermissions::Include(collect(elements)?),
        Restriction::Except(elements) => SectionPermissions::Exclude(collect(elements)?),
    })
}

/// Maps pallet level extrinsic permissions onto tag grants.
///
/// Pallets and calls the engine has no tag for are skipped: it never emits them.
fn transaction_permissions(value: &Value) -> Result<TransactionPermissions> {
    let (pallets, include) = match restriction(value, EXTRINSIC_PERMISSIONS)? {
        Restriction::Whole => return Ok(TransactionPermissions::All),
        Restriction::These(pallets) => (pallets, true),
        Restriction::Except(pallets) => (pallets, false),
    };

    let mut entries = BTreeSet::new();
    let mut exceptions = BTreeSet::new();
    for pallet in pallets {
        // map entries decode as (pallet name, pallet permissions) pairs
        let pair = values::items(pallet).unwrap_or_default();
        let (name, permissions) = match pair.as_slice() {
            [name, permissions] => (*name, *permissions),
            _ => return Err(malformed(EXTRINSIC_PERMISSIONS, "expected a pallet entry")),
        };
        let name = values::as_string(name)
            .ok_or_else(|| malformed(EXTRINSIC_PERMISSIONS, "unreadable pallet name"))?;
        let Some(module) = TxModule::from_pallet_name(&name) else {
            debug!("Skipping permissions of unknown pallet {name}");
            continue;
        };

        let extrinsics = values::field(permissions, "extrinsics").unwrap_or(permissions);
        let calls = |names: Vec<&Value>| {
            names
                .into_iter()
                .filter_map(values::as_string)
                .filter_map(|call| TxTag::lookup(module, &call))
                .collect::<Vec<_>>()
        };
        match restriction(extrinsics, EXTRINSIC_PERMISSIONS)? {
            Restriction::Whole => {
                entries.insert(TagOrModule::Module(module));
            }
            Restriction::These(names) => {
                entries.extend(calls(names).into_iter().map(TagOrModule::Tag));
            }
            Restriction::Except(names) => {
                entries.insert(TagOrModule::Module(module));
                exceptions.extend(calls(names));
            }
        }
    }

    Ok(if include {
        TransactionPermissions::Include {
            values: entries,
            exceptions,
        }
    } else {
        TransactionPermissions::Exclude {
            values: entries,
            exceptions,
        }
    })
}

fn as_portfolio(value: &Value) -> Option<PortfolioId> {
    let owner = values::field(value, "did").and_then(values::as_identity)?;
    let (kind, fields) = values::field(value, "kind").and_then(values::as_variant)?;
    match kind {
        "Default" => Some(PortfolioId::default_of(owner)),
        "User" => fields
            .first()
            .copied()
            .and_then(values::as_u64)
            .map(|number| PortfolioId::numbered(owner, number)),
        _ => None,
    }
}

fn portfolio_value(portfolio: &PortfolioId) -> Value {
    let kind = match portfolio.number {
        Some(number) => Value::unnamed_variant("User", [Value::u128(number.into())]),
        None => Value::unnamed_variant("Default", []),
    };
    Value::named_composite([("did", Value::from_bytes(portfolio.owner.0)), ("kind", kind)])
}

fn account_value(account: &AccountKey) -> Value {
    Value::from_bytes(account.0)
}

/// Entity layer answering from the latest block of the chain behind a [`ChainClient`].
#[derive(Clone)]
pub struct ChainEntities {
    client: Arc<dyn ChainClient>,
}

impl ChainEntities {
    /// Reads through `client`.
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    async fn query(&self, pallet: &str, entry: &str, keys: Vec<Value>) -> Result<Option<Value>> {
        self.client
            .query_storage(pallet, entry, keys)
            .await
            .map_err(|source| Error::Chain { source })
    }

    async fn key_record(&self, account: &AccountKey) -> Result<Option<KeyRecord>> {
        let Some(record) = self
            .query("Identity", "KeyRecords", vec![account_value(account)])
            .await?
        else {
            return Ok(None);
        };

        let (name, fields) = values::as_variant(&record)
            .ok_or_else(|| malformed("Identity.KeyRecords", "expected a key record"))?;
        let did = || {
            fields
                .first()
                .copied()
                .and_then(values::as_identity)
                .ok_or_else(|| malformed("Identity.KeyRecords", "missing identity"))
        };
        match name {
            "PrimaryKey" => Ok(Some(KeyRecord::Primary(did()?))),
            "SecondaryKey" => Ok(Some(KeyRecord::Secondary(did()?))),
            "MultiSigSignerKey" => Ok(Some(KeyRecord::MultiSigSigner)),
            other => Err(malformed(
                "Identity.KeyRecords",
                &format!("unknown key record {other}"),
            )),
        }
    }

    /// The actor signing with `account`, attached to the identity its key record names.
    pub async fn actor(&self, account: AccountKey) -> Result<Actor> {
        let identity = match self.key_record(&account).await? {
            Some(KeyRecord::Primary(did) | KeyRecord::Secondary(did)) => Some(did),
            Some(KeyRecord::MultiSigSigner) | None => None,
        };
        Ok(Actor { account, identity })
    }

    /// The actor signing through the chain client.
    pub async fn signer(&self) -> Result<Actor> {
        self.actor(self.client.signer()).await
    }

    async fn secondary_key_permissions(&self, account: &AccountKey) -> Result<Permissions> {
        let key = vec![account_value(account)];
        let (assets, transactions, portfolios) = futures::try_join!(
            self.query("Identity", "KeyAssetPermissions", key.clone()),
            self.query("Identity", "KeyExtrinsicPermissions", key.clone()),
            self.query("Identity", "KeyPortfolioPermissions", key),
        )?;

        Ok(Permissions {
            assets: match assets {
                Some(value) => section(&value, "Identity.KeyAssetPermissions", values::as_asset_id)?,
                None => SectionPermissions::All,
            },
            transactions: match transactions {
                Some(value) => transaction_permissions(&value)?,
                None => TransactionPermissions::All,
            },
            portfolios: match portfolios {
                Some(value) => section(&value, "Identity.KeyPortfolioPermissions", as_portfolio)?,
                None => SectionPermissions::All,
            },
        })
    }

    async fn identity_at(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<Value>,
        field: &str,
    ) -> Result<Option<IdentityId>> {
        let value = self.query(pallet, entry, keys).await?;
        Ok(value
            .as_ref()
            .and_then(|value| values::field(value, field))
            .and_then(values::as_identity))
    }
}

#[async_trait]
impl EntityLayer for ChainEntities {
    async fn permissions(&self, actor: &Actor) -> Result<Permissions> {
        match self.key_record(&actor.account).await? {
            Some(KeyRecord::Primary(_)) => Ok(Permissions::full()),
            Some(KeyRecord::Secondary(_)) => self.secondary_key_permissions(&actor.account).await,
            Some(KeyRecord::MultiSigSigner) | None => Ok(Permissions::empty()),
        }
    }

    async fn has_role(&self, actor: &Actor, role: &Role) -> Result<bool> {
        let Some(did) = actor.identity else {
            return Ok(false);
        };

        match role {
            Role::Identity { did: expected } => Ok(*expected == did),
            Role::TickerOwner { ticker } => {
                let owner = self
                    .identity_at("Asset", "UniqueTickerRegistration", vec![ticker_value(ticker)], "owner")
                    .await?;
                Ok(owner == Some(did))
            }
            Role::VenueOwner { venue } => {
                let creator = self
                    .identity_at("Settlement", "VenueInfo", vec![Value::u128(venue.0.into())], "creator")
                    .await?;
                Ok(creator == Some(did))
            }
            Role::CddProvider => {
                let members = self.query("CddServiceProviders", "ActiveMembers", vec![]).await?;
                Ok(members
                    .as_ref()
                    .and_then(values::items)
                    .is_some_and(|members| {
                        members
                            .into_iter()
                            .filter_map(values::as_identity)
                            .any(|member| member == did)
                    }))
            }
            Role::PortfolioCustodian { portfolio } => {
                let custodian = self
                    .query("Portfolio", "PortfolioCustodian", vec![portfolio_value(portfolio)])
                    .await?;
                let custodian = custodian
                    .as_ref()
                    .and_then(values::as_identity)
                    .unwrap_or(portfolio.owner);
                Ok(custodian == did)
            }
            Role::AssetCaa { asset } => {
                let group = self
                    .query(
                        "ExternalAgents",
                        "GroupOfAgent",
                        vec![asset_value(asset), Value::from_bytes(did.0)],
                    )
                    .await?;
                Ok(group
                    .as_ref()
                    .and_then(values::as_variant)
                    .is_some_and(|(name, _)| matches!(name, "Full" | "PolymeshV1CAA")))
            }
        }
    }
}
