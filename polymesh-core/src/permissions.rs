use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::identifiers::{AssetId, PortfolioId};
use crate::tags::{TagOrModule, TxTag};

/// A grant over one kind of entity (assets, portfolios) held by a signing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionPermissions<T: Ord> {
    /// No restriction.
    All,
    /// Only the listed entities.
    Include(BTreeSet<T>),
    /// Everything except the listed entities.
    Exclude(BTreeSet<T>),
}

impl<T: Ord> SectionPermissions<T> {
    /// Whether the grant covers `item`.
    pub fn allows(&self, item: &T) -> bool {
        match self {
            SectionPermissions::All => true,
            SectionPermissions::Include(values) => values.contains(item),
            SectionPermissions::Exclude(values) => !values.contains(item),
        }
    }

    /// Whether the grant is unrestricted.
    pub fn is_all(&self) -> bool {
        matches!(self, SectionPermissions::All)
    }
}

/// A grant over runtime calls held by a signing key.
///
/// `exceptions` flip the membership of individual tags: an exception inside an
/// included module carves that call out, an exception inside an excluded module
/// re-includes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TransactionPermissions {
    /// Every call.
    All,
    /// Only the listed calls and modules.
    Include {
        /// Included calls and modules.
        values: BTreeSet<TagOrModule>,
        /// Calls whose membership is flipped.
        exceptions: BTreeSet<TxTag>,
    },
    /// Every call except the listed calls and modules.
    Exclude {
        /// Excluded calls and modules.
        values: BTreeSet<TagOrModule>,
        /// Calls whose membership is flipped.
        exceptions: BTreeSet<TxTag>,
    },
}

impl TransactionPermissions {
    /// Grant of only `values`, without exceptions.
    pub fn include(values: impl IntoIterator<Item = TagOrModule>) -> Self {
        TransactionPermissions::Include {
            values: values.into_iter().collect(),
            exceptions: BTreeSet::new(),
        }
    }

    /// Grant of everything except `values`, without exceptions.
    pub fn exclude(values: impl IntoIterator<Item = TagOrModule>) -> Self {
        TransactionPermissions::Exclude {
            values: values.into_iter().collect(),
            exceptions: BTreeSet::new(),
        }
    }

    /// Returns `self` with `exceptions` added. No-op on [`TransactionPermissions::All`].
    pub fn with_exceptions(mut self, extra: impl IntoIterator<Item = TxTag>) -> Self {
        match &mut self {
            TransactionPermissions::All => {}
            TransactionPermissions::Include { exceptions, .. }
            | TransactionPermissions::Exclude { exceptions, .. } => exceptions.extend(extra),
        }
        self
    }

    /// Whether the grant covers `tag`.
    pub fn allows(&self, tag: &TxTag) -> bool {
        match self {
            TransactionPermissions::All => true,
            TransactionPermissions::Include { values, exceptions } => {
                covered(values, tag) != exceptions.contains(tag)
            }
            TransactionPermissions::Exclude { values, exceptions } => {
                covered(values, tag) == exceptions.contains(tag)
            }
        }
    }
}

fn covered(values: &BTreeSet<TagOrModule>, tag: &TxTag) -> bool {
    values.iter().any(|value| value.covers(tag))
}

/// The full grant of a signing key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Permissions {
    /// Assets the key may act upon.
    pub assets: SectionPermissions<AssetId>,
    /// Calls the key may sign.
    pub transactions: TransactionPermissions,
    /// Portfolios the key may act upon.
    pub portfolios: SectionPermissions<PortfolioId>,
}

impl Permissions {
    /// Unrestricted permissions, as held by primary keys.
    pub fn full() -> Self {
        Self {
            assets: SectionPermissions::All,
            transactions: TransactionPermissions::All,
            portfolios: SectionPermissions::All,
        }
    }

    /// No permissions at all.
    pub fn empty() -> Self {
        Self {
            assets: SectionPermissions::Include(BTreeSet::new()),
            transactions: TransactionPermissions::include([]),
            portfolios: SectionPermissions::Include(BTreeSet::new()),
        }
    }
}

/// The entities an operation touches: every entity, or exactly the listed ones.
///
/// An empty [`Scope::Only`] means the operation touches no entity of that kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope<T: Ord> {
    /// The operation requires unrestricted access.
    All,
    /// The operation touches exactly these entities.
    Only(BTreeSet<T>),
}

impl<T: Ord> Default for Scope<T> {
    fn default() -> Self {
        Scope::Only(BTreeSet::new())
    }
}

impl<T: Ord> FromIterator<T> for Scope<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Scope::Only(iter.into_iter().collect())
    }
}

impl<T: Ord + Clone> Scope<T> {
    /// Union of two scopes. [`Scope::All`] absorbs everything.
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Scope::All, _) | (_, Scope::All) => Scope::All,
            (Scope::Only(mut left), Scope::Only(right)) => {
                left.extend(right);
                Scope::Only(left)
            }
        }
    }

    /// Entities of this scope not covered by `granted`.
    ///
    /// Returns `None` when the scope is [`Scope::All`] and the grant is restricted,
    /// since no finite list describes what is missing.
    pub fn missing_from(&self, granted: &SectionPermissions<T>) -> Option<Vec<T>> {
        match self {
            Scope::All if granted.is_all() => Some(Vec::new()),
            Scope::All => None,
            Scope::Only(items) => Some(
                items
                    .iter()
                    .filter(|item| !granted.allows(item))
                    .cloned()
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{asset, settlement, TxModule};

    #[test]
    fn exclude_grants_deny_the_excluded_tags() {
        let grant = TransactionPermissions::exclude([asset::REGISTER_TICKER.into()]);
        assert!(!grant.allows(&asset::REGISTER_TICKER));
        assert!(grant.allows(&asset::CREATE_ASSET));
    }

    #[test]
    fn include_grants_allow_only_the_included_tags() {
        let grant = TransactionPermissions::include([TxModule::Asset.into()]);
        assert!(grant.allows(&asset::REGISTER_TICKER));
        assert!(!grant.allows(&settlement::CREATE_VENUE));
    }

    #[test]
    fn exceptions_flip_membership() {
        let include = TransactionPermissions::include([TxModule::Asset.into()])
            .with_exceptions([asset::RENAME_ASSET, settlement::CREATE_VENUE]);
        assert!(!include.allows(&asset::RENAME_ASSET));
        assert!(include.allows(&settlement::CREATE_VENUE));
        assert!(include.allows(&asset::CREATE_ASSET));

        let exclude = TransactionPermissions::exclude([TxModule::Asset.into()])
            .with_exceptions([asset::RENAME_ASSET]);
        assert!(exclude.allows(&asset::RENAME_ASSET));
        assert!(!exclude.allows(&asset::CREATE_ASSET));
        assert!(exclude.allows(&settlement::CREATE_VENUE));
    }

    #[test]
    fn section_permissions_follow_include_and_exclude() {
        let a = AssetId([1; 16]);
        let b = AssetId([2; 16]);
        let include = SectionPermissions::Include(BTreeSet::from([a]));
        let exclude = SectionPermissions::Exclude(BTreeSet::from([a]));
        assert!(include.allows(&a) && !include.allows(&b));
        assert!(!exclude.allows(&a) && exclude.allows(&b));
        assert!(SectionPermissions::<AssetId>::All.allows(&b));
    }

    #[test]
    fn scope_union_is_absorbed_by_all() {
        let a = AssetId([1; 16]);
        let b = AssetId([2; 16]);
        let left: Scope<AssetId> = [a].into_iter().collect();
        let right: Scope<AssetId> = [b].into_iter().collect();
        assert_eq!(
            left.clone().union(right),
            Scope::Only(BTreeSet::from([a, b]))
        );
        assert_eq!(left.union(Scope::All), Scope::All);
    }

    #[test]
    fn missing_entities_are_listed() {
        let a = AssetId([1; 16]);
        let b = AssetId([2; 16]);
        let granted = SectionPermissions::Exclude(BTreeSet::from([b]));
        let required: Scope<AssetId> = [a, b].into_iter().collect();
        assert_eq!(required.missing_from(&granted), Some(vec![b]));
        assert_eq!(Scope::<AssetId>::All.missing_from(&granted), None);
        assert_eq!(
            Scope::<AssetId>::All.missing_from(&SectionPermissions::All),
            Some(vec![])
        );
        assert_eq!(Scope::default().missing_from(&granted), Some(vec![]));
    }
}
