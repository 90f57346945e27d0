//! What a procedure requires from its signer, and the check of those requirements
//! against what the signer actually holds.
//!
//! Permission checks are pure functions of the grant. Role checks ask the
//! [`EntityLayer`] and run concurrently with the grant lookup.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use futures::future::try_join_all;
use log::debug;
use polymesh_core::tags::UNGATED_TRANSACTIONS;
use polymesh_core::{AccountKey, AssetId, IdentityId, Permissions, PortfolioId, Role, Scope, TxTag};
use serde::Serialize;

use crate::error::{Error, Result};

/// Permissions a procedure requires from the signing key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequiredPermissions {
    /// Calls the procedure will sign.
    pub transactions: BTreeSet<TxTag>,
    /// Assets the procedure acts upon.
    pub assets: Scope<AssetId>,
    /// Portfolios the procedure acts upon.
    pub portfolios: Scope<PortfolioId>,
}

/// Everything a procedure requires from its signer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcedureAuthorization {
    /// Permissions checked against the signing key's grant.
    pub permissions: RequiredPermissions,
    /// Roles checked against chain state, independently of the permissions.
    pub roles: BTreeSet<Role>,
    /// Set when the procedure cannot run at all, with the reason.
    pub forbidden: Option<String>,
}

impl ProcedureAuthorization {
    /// Requires nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A procedure that cannot run for `reason`, whoever signs.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self {
            forbidden: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Adds required calls.
    pub fn with_transactions(mut self, tags: impl IntoIterator<Item = TxTag>) -> Self {
        self.permissions.transactions.extend(tags);
        self
    }

    /// Adds required assets.
    pub fn with_assets(mut self, assets: Scope<AssetId>) -> Self {
        self.permissions.assets = self.permissions.assets.union(assets);
        self
    }

    /// Adds required portfolios.
    pub fn with_portfolios(mut self, portfolios: Scope<PortfolioId>) -> Self {
        self.permissions.portfolios = self.permissions.portfolios.union(portfolios);
        self
    }

    /// Adds required roles.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    /// Union of both requirements, used when a procedure delegates to another.
    pub fn union(self, other: Self) -> Self {
        let forbidden = match (self.forbidden, other.forbidden) {
            (Some(left), Some(right)) if left != right => Some(format!("{left}; {right}")),
            (left, right) => left.or(right),
        };
        let mut roles = self.roles;
        roles.extend(other.roles);
        Self {
            permissions: RequiredPermissions {
                transactions: self
                    .permissions
                    .transactions
                    .into_iter()
                    .chain(other.permissions.transactions)
                    .collect(),
                assets: self.permissions.assets.union(other.permissions.assets),
                portfolios: self.permissions.portfolios.union(other.permissions.portfolios),
            },
            roles,
            forbidden,
        }
    }
}

/// Why an authorization check failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DenialReason {
    /// The procedure cannot run.
    Forbidden(String),
    /// The key may not sign these calls.
    MissingTransactions(Vec<TxTag>),
    /// The key may not act upon these assets.
    MissingAssets(Vec<AssetId>),
    /// The procedure needs every asset but the key's grant is restricted.
    AllAssetsRequired,
    /// The key may not act upon these portfolios.
    MissingPortfolios(Vec<PortfolioId>),
    /// The procedure needs every portfolio but the key's grant is restricted.
    AllPortfoliosRequired,
    /// The signer's identity does not hold these roles.
    MissingRoles(Vec<Role>),
    /// Roles are required but the signing key has no identity.
    NoIdentity,
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Forbidden(reason) => write!(f, "{reason}"),
            DenialReason::MissingTransactions(tags) => {
                write!(f, "missing transaction permissions: {}", join(tags))
            }
            DenialReason::MissingAssets(assets) => {
                write!(f, "missing asset permissions: {}", join(assets))
            }
            DenialReason::AllAssetsRequired => {
                f.write_str("permissions over every asset are required")
            }
            DenialReason::MissingPortfolios(portfolios) => {
                let portfolios = portfolios
                    .iter()
                    .map(|portfolio| format!("{portfolio:?}"))
                    .collect::<Vec<_>>();
                write!(f, "missing portfolio permissions: {}", portfolios.join(", "))
            }
            DenialReason::AllPortfoliosRequired => {
                f.write_str("permissions over every portfolio are required")
            }
            DenialReason::MissingRoles(roles) => write!(f, "missing roles: {}", join(roles)),
            DenialReason::NoIdentity => f.write_str("the signing key is not attached to an identity"),
        }
    }
}

/// Outcome of an authorization check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Every requirement is met.
    Allowed,
    /// At least one requirement is not met.
    Denied(Vec<DenialReason>),
}

impl Verdict {
    /// Whether every requirement is met.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }

    /// Turns a denial into [`Error::NotAuthorized`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Verdict::Allowed => Ok(()),
            Verdict::Denied(reasons) => Err(Error::NotAuthorized { reasons }),
        }
    }
}

/// The signer of a procedure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Actor {
    /// Signing key.
    pub account: AccountKey,
    /// Identity the key belongs to, if any.
    pub identity: Option<IdentityId>,
}

/// Read access to the entity layer: grants and roles of actors.
#[async_trait]
pub trait EntityLayer: Send + Sync {
    /// The effective permission grant of the actor's key.
    async fn permissions(&self, actor: &Actor) -> Result<Permissions>;

    /// Whether the actor's identity holds `role`.
    async fn has_role(&self, actor: &Actor, role: &Role) -> Result<bool>;
}

/// Checks required permissions against a grant. Ungated calls always pass.
pub fn check_permissions(required: &RequiredPermissions, granted: &Permissions) -> Vec<DenialReason> {
    let mut reasons = Vec::new();

    let missing = required
        .transactions
        .iter()
        .filter(|tag| !UNGATED_TRANSACTIONS.contains(tag) && !granted.transactions.allows(tag))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        reasons.push(DenialReason::MissingTransactions(missing));
    }

    match required.assets.missing_from(&granted.assets) {
        None => reasons.push(DenialReason::AllAssetsRequired),
        Some(missing) if !missing.is_empty() => reasons.push(DenialReason::MissingAssets(missing)),
        Some(_) => {}
    }

    match required.portfolios.missing_from(&granted.portfolios) {
        None => reasons.push(DenialReason::AllPortfoliosRequired),
        Some(missing) if !missing.is_empty() => {
            reasons.push(DenialReason::MissingPortfolios(missing))
        }
        Some(_) => {}
    }

    reasons
}

async fn missing_roles(
    entities: &dyn EntityLayer,
    actor: &Actor,
    roles: &BTreeSet<Role>,
) -> Result<Vec<DenialReason>> {
    if roles.is_empty() {
        return Ok(Vec::new());
    }
    if actor.identity.is_none() {
        return Ok(vec![DenialReason::NoIdentity]);
    }

    let held = try_join_all(roles.iter().map(|role| entities.has_role(actor, role))).await?;
    let missing = roles
        .iter()
        .zip(held)
        .filter(|(_, held)| !held)
        .map(|(role, _)| role.clone())
        .collect::<Vec<_>>();

    Ok(if missing.is_empty() {
        Vec::new()
    } else {
        vec![DenialReason::MissingRoles(missing)]
    })
}

/// Checks `authorization` for `actor`, reporting every unmet requirement.
pub async fn authorize(
    entities: &dyn EntityLayer,
    actor: &Actor,
    authorization: &ProcedureAuthorization,
) -> Result<Verdict> {
    if let Some(reason) = &authorization.forbidden {
        return Ok(Verdict::Denied(vec![DenialReason::Forbidden(reason.clone())]));
    }

    let (granted, role_reasons) = futures::try_join!(
        entities.permissions(actor),
        missing_roles(entities, actor, &authorization.roles),
    )?;

    let mut reasons = check_permissions(&authorization.permissions, &granted);
    reasons.extend(role_reasons);

    if reasons.is_empty() {
        Ok(Verdict::Allowed)
    } else {
        debug!("Authorization denied for {:?}: {:?}", actor.account, reasons);
        Ok(Verdict::Denied(reasons))
    }
}

#[cfg(test)]
mod tests {
    use polymesh_core::tags::{asset, identity, settlement, TxModule};
    use polymesh_core::{SectionPermissions, Ticker, TransactionPermissions};

    use super::*;
    use crate::mock::{alice, MockEntities};

    fn asset_id(byte: u8) -> AssetId {
        AssetId([byte; 16])
    }

    #[tokio::test]
    async fn excluded_tags_are_denied_and_listed() {
        let entities = MockEntities::new(Permissions {
            transactions: TransactionPermissions::exclude([asset::REGISTER_TICKER.into()]),
            ..Permissions::full()
        });
        let required = ProcedureAuthorization::new().with_transactions([asset::REGISTER_TICKER]);

        let verdict = authorize(&entities, &alice(), &required).await.unwrap();
        assert_eq!(
            verdict,
            Verdict::Denied(vec![DenialReason::MissingTransactions(vec![asset::REGISTER_TICKER])])
        );
        let err = verdict.into_result().unwrap_err();
        assert!(err.to_string().contains("Asset.register_ticker"));
    }

    #[tokio::test]
    async fn ungated_transactions_always_pass() {
        let entities = MockEntities::new(Permissions::empty());
        let required = ProcedureAuthorization::new()
            .with_transactions([identity::JOIN_IDENTITY_AS_KEY, identity::LEAVE_IDENTITY_AS_KEY]);
        assert!(authorize(&entities, &alice(), &required).await.unwrap().is_allowed());
    }

    #[test]
    fn asset_and_portfolio_scopes_are_checked() {
        let granted = Permissions {
            assets: SectionPermissions::Include(BTreeSet::from([asset_id(1)])),
            transactions: TransactionPermissions::All,
            portfolios: SectionPermissions::Exclude(BTreeSet::new()),
        };

        let required = RequiredPermissions {
            assets: [asset_id(1), asset_id(2)].into_iter().collect(),
            portfolios: Scope::All,
            ..RequiredPermissions::default()
        };
        assert_eq!(
            check_permissions(&required, &granted),
            vec![
                DenialReason::MissingAssets(vec![asset_id(2)]),
                DenialReason::AllPortfoliosRequired,
            ]
        );

        let nothing_involved = RequiredPermissions::default();
        assert!(check_permissions(&nothing_involved, &Permissions::empty()).is_empty());
    }

    #[tokio::test]
    async fn roles_are_checked_independently_of_permissions() {
        let ticker = Ticker::new("ACME").unwrap();
        let owner = Role::TickerOwner {
            ticker: ticker.clone(),
        };
        let required = ProcedureAuthorization::new().with_roles([owner.clone()]);

        let holder = MockEntities::new(Permissions::empty()).with_role(owner.clone());
        assert!(authorize(&holder, &alice(), &required).await.unwrap().is_allowed());

        let stranger = MockEntities::new(Permissions::full());
        assert_eq!(
            authorize(&stranger, &alice(), &required).await.unwrap(),
            Verdict::Denied(vec![DenialReason::MissingRoles(vec![owner])])
        );

        let keyless = Actor {
            identity: None,
            ..alice()
        };
        assert_eq!(
            authorize(&holder, &keyless, &required).await.unwrap(),
            Verdict::Denied(vec![DenialReason::NoIdentity])
        );
    }

    #[tokio::test]
    async fn forbidden_procedures_are_denied_without_queries() {
        let entities = MockEntities::new(Permissions::full());
        let required = ProcedureAuthorization::forbidden("the asset is frozen")
            .union(ProcedureAuthorization::new().with_transactions([asset::ISSUE]));
        assert_eq!(
            authorize(&entities, &alice(), &required).await.unwrap(),
            Verdict::Denied(vec![DenialReason::Forbidden("the asset is frozen".into())])
        );
        assert_eq!(entities.permission_queries(), 0);
    }

    #[test]
    fn union_merges_every_requirement() {
        let left = ProcedureAuthorization::new()
            .with_transactions([asset::REGISTER_TICKER])
            .with_assets([asset_id(1)].into_iter().collect());
        let right = ProcedureAuthorization::new()
            .with_transactions([settlement::CREATE_VENUE])
            .with_assets([asset_id(2)].into_iter().collect())
            .with_portfolios(Scope::All)
            .with_roles([Role::CddProvider]);

        let merged = left.clone().union(right);
        assert_eq!(
            merged.permissions.transactions,
            BTreeSet::from([asset::REGISTER_TICKER, settlement::CREATE_VENUE])
        );
        assert_eq!(
            merged.permissions.assets,
            Scope::Only(BTreeSet::from([asset_id(1), asset_id(2)]))
        );
        assert_eq!(merged.permissions.portfolios, Scope::All);
        assert!(merged.roles.contains(&Role::CddProvider));
        assert_eq!(left.clone().union(left.clone()), left);
    }

    #[tokio::test]
    async fn module_grants_cover_their_calls() {
        let entities = MockEntities::new(Permissions {
            transactions: TransactionPermissions::include([TxModule::Asset.into()]),
            ..Permissions::full()
        });
        let allowed = ProcedureAuthorization::new().with_transactions([asset::CREATE_ASSET, asset::ISSUE]);
        assert!(authorize(&entities, &alice(), &allowed).await.unwrap().is_allowed());

        let denied = allowed.with_transactions([settlement::CREATE_VENUE]);
        assert_eq!(
            authorize(&entities, &alice(), &denied).await.unwrap(),
            Verdict::Denied(vec![DenialReason::MissingTransactions(vec![settlement::CREATE_VENUE])])
        );
    }
}
