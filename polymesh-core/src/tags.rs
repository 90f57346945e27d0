use core::fmt;

use serde::Serialize;

/// A runtime module (pallet) that owns a set of transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TxModule {
    /// Asset issuance and metadata.
    Asset,
    /// Native token transfers.
    Balances,
    /// Dividend and other capital distributions.
    CapitalDistribution,
    /// Balance checkpoints.
    Checkpoint,
    /// Corporate action management.
    CorporateAction,
    /// External agent groups of an asset.
    ExternalAgents,
    /// Identities and their keys.
    Identity,
    /// Multisig accounts.
    MultiSig,
    /// Portfolios and custody.
    Portfolio,
    /// Settlement venues and instructions.
    Settlement,
    /// Batching utilities.
    Utility,
}

impl TxModule {
    /// Every module, in declaration order.
    pub const ALL: [TxModule; 11] = [
        TxModule::Asset,
        TxModule::Balances,
        TxModule::CapitalDistribution,
        TxModule::Checkpoint,
        TxModule::CorporateAction,
        TxModule::ExternalAgents,
        TxModule::Identity,
        TxModule::MultiSig,
        TxModule::Portfolio,
        TxModule::Settlement,
        TxModule::Utility,
    ];

    /// The module whose metadata name is `name`.
    pub fn from_pallet_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|module| module.pallet_name() == name)
    }

    /// The pallet name as it appears in runtime metadata.
    pub const fn pallet_name(self) -> &'static str {
        match self {
            TxModule::Asset => "Asset",
            TxModule::Balances => "Balances",
            TxModule::CapitalDistribution => "CapitalDistribution",
            TxModule::Checkpoint => "Checkpoint",
            TxModule::CorporateAction => "CorporateAction",
            TxModule::ExternalAgents => "ExternalAgents",
            TxModule::Identity => "Identity",
            TxModule::MultiSig => "MultiSig",
            TxModule::Portfolio => "Portfolio",
            TxModule::Settlement => "Settlement",
            TxModule::Utility => "Utility",
        }
    }
}

impl fmt::Display for TxModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pallet_name())
    }
}

/// Names one runtime call, e.g. `Asset.register_ticker`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TxTag {
    /// Module owning the call.
    pub module: TxModule,
    /// Call name within the module.
    pub call: &'static str,
}

impl TxTag {
    /// Creates a tag for `call` in `module`.
    pub const fn new(module: TxModule, call: &'static str) -> Self {
        Self { module, call }
    }

    /// Pallet name of the call.
    pub const fn pallet_name(&self) -> &'static str {
        self.module.pallet_name()
    }

    /// The known tag for `call` in `module`, if the engine knows that call.
    pub fn lookup(module: TxModule, call: &str) -> Option<Self> {
        KNOWN_TAGS
            .iter()
            .find(|tag| tag.module == module && tag.call == call)
            .copied()
    }
}

impl fmt::Display for TxTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.call)
    }
}

/// An entry of a transaction grant: either a single call or every call of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TagOrModule {
    /// One call.
    Tag(TxTag),
    /// Every call of the module.
    Module(TxModule),
}

impl TagOrModule {
    /// Whether this entry covers `tag`.
    pub fn covers(&self, tag: &TxTag) -> bool {
        match self {
            TagOrModule::Tag(t) => t == tag,
            TagOrModule::Module(m) => *m == tag.module,
        }
    }
}

impl From<TxTag> for TagOrModule {
    fn from(tag: TxTag) -> Self {
        TagOrModule::Tag(tag)
    }
}

impl From<TxModule> for TagOrModule {
    fn from(module: TxModule) -> Self {
        TagOrModule::Module(module)
    }
}

impl fmt::Display for TagOrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagOrModule::Tag(tag) => tag.fmt(f),
            TagOrModule::Module(module) => write!(f, "{module}.*"),
        }
    }
}

/// Tags of the asset module.
pub mod asset {
    use super::{TxModule, TxTag};

    /// Reserve a ticker.
    pub const REGISTER_TICKER: TxTag = TxTag::new(TxModule::Asset, "register_ticker");
    /// Create an asset.
    pub const CREATE_ASSET: TxTag = TxTag::new(TxModule::Asset, "create_asset");
    /// Rename an asset.
    pub const RENAME_ASSET: TxTag = TxTag::new(TxModule::Asset, "rename_asset");
    /// Attach documents to an asset.
    pub const ADD_DOCUMENTS: TxTag = TxTag::new(TxModule::Asset, "add_documents");
    /// Issue more units of an asset.
    pub const ISSUE: TxTag = TxTag::new(TxModule::Asset, "issue");
}

/// Tags of the identity module.
pub mod identity {
    use super::{TxModule, TxTag};

    /// Accept an invitation to join an identity as a secondary key.
    pub const JOIN_IDENTITY_AS_KEY: TxTag = TxTag::new(TxModule::Identity, "join_identity_as_key");
    /// Leave the identity the signing key belongs to.
    pub const LEAVE_IDENTITY_AS_KEY: TxTag =
        TxTag::new(TxModule::Identity, "leave_identity_as_key");
}

/// Tags of the multisig module.
pub mod multisig {
    use super::{TxModule, TxTag};

    /// Accept becoming a signer of a multisig.
    pub const ACCEPT_MULTISIG_SIGNER_AS_KEY: TxTag =
        TxTag::new(TxModule::MultiSig, "accept_multisig_signer_as_key");
}

/// Tags of the settlement module.
pub mod settlement {
    use super::{TxModule, TxTag};

    /// Create a settlement venue.
    pub const CREATE_VENUE: TxTag = TxTag::new(TxModule::Settlement, "create_venue");
}

/// Tags of the utility module.
pub mod utility {
    use super::{TxModule, TxTag};

    /// Dispatch calls atomically, reverting all of them if one fails.
    pub const BATCH_ALL: TxTag = TxTag::new(TxModule::Utility, "batch_all");
}

/// Every tag defined in this module.
pub const KNOWN_TAGS: [TxTag; 10] = [
    asset::REGISTER_TICKER,
    asset::CREATE_ASSET,
    asset::RENAME_ASSET,
    asset::ADD_DOCUMENTS,
    asset::ISSUE,
    identity::JOIN_IDENTITY_AS_KEY,
    identity::LEAVE_IDENTITY_AS_KEY,
    multisig::ACCEPT_MULTISIG_SIGNER_AS_KEY,
    settlement::CREATE_VENUE,
    utility::BATCH_ALL,
];

/// Calls the chain never gates behind key permissions.
pub const UNGATED_TRANSACTIONS: [TxTag; 3] = [
    identity::JOIN_IDENTITY_AS_KEY,
    identity::LEAVE_IDENTITY_AS_KEY,
    multisig::ACCEPT_MULTISIG_SIGNER_AS_KEY,
];
