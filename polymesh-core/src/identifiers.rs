use core::fmt;
use core::str::FromStr;

use hex::FromHex;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt, Snafu};

/// Maximum number of characters in a ticker.
pub const MAX_TICKER_LENGTH: usize = 12;

/// Errors produced while parsing identifiers from user input.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub))]
pub enum IdentifierError {
    /// The ticker was empty.
    #[snafu(display("Ticker cannot be empty"))]
    EmptyTicker,

    /// The ticker exceeded [`MAX_TICKER_LENGTH`].
    #[snafu(display("Ticker length cannot exceed {MAX_TICKER_LENGTH}, got {length}"))]
    TickerTooLong {
        /// Length of the rejected ticker.
        length: usize,
    },

    /// The ticker contained lowercase or non printable characters.
    #[snafu(display("Ticker '{ticker}' must be uppercase printable ASCII"))]
    InvalidTickerCharacters {
        /// The rejected ticker.
        ticker: String,
    },

    /// A hex encoded identifier could not be decoded.
    #[snafu(display("Failed to decode hex identifier: {source}"))]
    InvalidHex {
        /// The underlying hex error.
        source: hex::FromHexError,
    },
}

/// An asset ticker: at most [`MAX_TICKER_LENGTH`] uppercase printable ASCII characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    /// Validates and wraps a ticker symbol.
    pub fn new(ticker: &str) -> Result<Self, IdentifierError> {
        ensure!(!ticker.is_empty(), EmptyTickerSnafu);
        ensure!(
            ticker.len() <= MAX_TICKER_LENGTH,
            TickerTooLongSnafu {
                length: ticker.len()
            }
        );
        ensure!(
            ticker
                .chars()
                .all(|c| c.is_ascii_graphic() && !c.is_ascii_lowercase()),
            InvalidTickerCharactersSnafu { ticker }
        );
        Ok(Self(ticker.to_string()))
    }

    /// The ticker symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ticker padded with zero bytes to the on-chain width.
    pub fn to_padded_bytes(&self) -> [u8; MAX_TICKER_LENGTH] {
        let mut bytes = [0u8; MAX_TICKER_LENGTH];
        bytes[..self.0.len()].copy_from_slice(self.0.as_bytes());
        bytes
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

/// Declares a fixed width byte identifier that displays and parses as `0x` prefixed hex.
macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = <[u8; $len]>::from_hex(s.trim_start_matches("0x"))
                    .context(InvalidHexSnafu)?;
                Ok(Self(bytes))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

hex_identifier!(
    /// The 16 byte identifier of an asset.
    AssetId,
    16
);

hex_identifier!(
    /// A decentralized identity (DID).
    IdentityId,
    32
);

hex_identifier!(
    /// The public key of a signing account.
    AccountKey,
    32
);

/// A venue used to settle instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VenueId(pub u64);

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A portfolio owned by an identity. `number == None` is the default portfolio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortfolioId {
    /// Identity owning the portfolio.
    pub owner: IdentityId,
    /// Numbered portfolio, or the default portfolio.
    pub number: Option<u64>,
}

impl PortfolioId {
    /// The default portfolio of `owner`.
    pub fn default_of(owner: IdentityId) -> Self {
        Self {
            owner,
            number: None,
        }
    }

    /// A numbered portfolio of `owner`.
    pub fn numbered(owner: IdentityId, number: u64) -> Self {
        Self {
            owner,
            number: Some(number),
        }
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(number) => write!(f, "{}/{}", self.owner, number),
            None => write!(f, "{}/default", self.owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn we_can_create_valid_tickers() {
        let ticker = Ticker::new("ACME").unwrap();
        assert_eq!(ticker.as_str(), "ACME");
        assert_eq!(&ticker.to_padded_bytes()[..5], b"ACME\0");
        assert!(Ticker::new("A-B.C_12/XYZ").is_ok());
    }

    #[test]
    fn we_cannot_create_invalid_tickers() {
        assert_eq!(Ticker::new(""), Err(IdentifierError::EmptyTicker));
        assert_eq!(
            Ticker::new("ABCDEFGHIJKLM"),
            Err(IdentifierError::TickerTooLong { length: 13 })
        );
        assert!(matches!(
            Ticker::new("acme"),
            Err(IdentifierError::InvalidTickerCharacters { .. })
        ));
        assert!(matches!(
            Ticker::new("AC ME"),
            Err(IdentifierError::InvalidTickerCharacters { .. })
        ));
    }

    #[test]
    fn tickers_are_validated_when_deserialized() {
        let ticker: Ticker = serde_json::from_str("\"ACME\"").unwrap();
        assert_eq!(ticker.as_str(), "ACME");
        assert!(serde_json::from_str::<Ticker>("\"acme\"").is_err());
    }

    #[test]
    fn hex_identifiers_round_trip_through_display() {
        let asset = AssetId([0xab; 16]);
        let parsed: AssetId = asset.to_string().parse().unwrap();
        assert_eq!(parsed, asset);
        assert!("0x1234".parse::<AssetId>().is_err());
    }

    #[test]
    fn portfolios_display_their_owner_and_number() {
        let owner = IdentityId([1; 32]);
        assert!(PortfolioId::default_of(owner)
            .to_string()
            .ends_with("/default"));
        assert!(PortfolioId::numbered(owner, 3).to_string().ends_with("/3"));
    }
}
