use core::iter::Sum;
use core::ops::{Add, AddAssign};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Amounts of the native token, in its smallest unit.
pub type Balance = u128;

/// Number of smallest units in one POLYX.
pub const ONE_POLYX: Balance = 1_000_000;

/// Fees paid to submit a transaction.
///
/// Serializes as `{ protocol, gas, total }`; `total` is ignored when deserializing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Fees {
    /// Module specific surcharge charged by the protocol fee pallet.
    pub protocol: Balance,
    /// Standard network fee for weight and length.
    pub gas: Balance,
}

impl Fees {
    /// Creates a fee from its components.
    pub const fn new(protocol: Balance, gas: Balance) -> Self {
        Self { protocol, gas }
    }

    /// Protocol plus gas.
    pub const fn total(&self) -> Balance {
        self.protocol.saturating_add(self.gas)
    }

    /// The protocol component charged `multiplier` times, as for calls repeated within a batch.
    pub const fn with_protocol_multiplier(self, multiplier: u32) -> Self {
        Self {
            protocol: self.protocol.saturating_mul(multiplier as Balance),
            gas: self.gas,
        }
    }
}

impl Serialize for Fees {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Fees", 3)?;
        state.serialize_field("protocol", &self.protocol)?;
        state.serialize_field("gas", &self.gas)?;
        state.serialize_field("total", &self.total())?;
        state.end()
    }
}

impl Add for Fees {
    type Output = Fees;

    fn add(self, rhs: Fees) -> Fees {
        Fees {
            protocol: self.protocol.saturating_add(rhs.protocol),
            gas: self.gas.saturating_add(rhs.gas),
        }
    }
}

impl AddAssign for Fees {
    fn add_assign(&mut self, rhs: Fees) {
        *self = *self + rhs;
    }
}

impl Sum for Fees {
    fn sum<I: Iterator<Item = Fees>>(iter: I) -> Fees {
        iter.fold(Fees::default(), Add::add)
    }
}
