use core::fmt;

use serde::{Deserialize, Serialize};

use crate::identifiers::{AssetId, IdentityId, PortfolioId, Ticker, VenueId};

/// An eligibility that depends on current chain state rather than on a static grant.
///
/// Whether an identity satisfies a role is answered by the entity layer, since the
/// answer can change (ticker ownership transfers, custody changes, agent groups).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Owns the reservation of `ticker`.
    TickerOwner {
        /// The reserved ticker.
        ticker: Ticker,
    },
    /// Is a registered customer due diligence provider.
    CddProvider,
    /// Owns the settlement venue.
    VenueOwner {
        /// The venue.
        venue: VenueId,
    },
    /// Is the custodian of the portfolio.
    PortfolioCustodian {
        /// The portfolio.
        portfolio: PortfolioId,
    },
    /// Is exactly this identity.
    Identity {
        /// The identity.
        did: IdentityId,
    },
    /// Is the corporate actions agent of the asset.
    AssetCaa {
        /// The asset.
        asset: AssetId,
    },
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::TickerOwner { ticker } => write!(f, "TickerOwner({ticker})"),
            Role::CddProvider => f.write_str("CddProvider"),
            Role::VenueOwner { venue } => write!(f, "VenueOwner({venue})"),
            Role::PortfolioCustodian { portfolio } => write!(f, "PortfolioCustodian({portfolio})"),
            Role::Identity { did } => write!(f, "Identity({did})"),
            Role::AssetCaa { asset } => write!(f, "AssetCaa({asset})"),
        }
    }
}
