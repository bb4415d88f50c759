//! Order positions for change sets.
//!
//! Every change set carries one [`OrderId`]. A locally authored set takes the
//! successor of the highest order visible in the store, so it sorts after
//! everything already known. Sets authored concurrently on other devices keep
//! the order their author assigned; when two raw positions coincide the
//! [`OrderKey`] breaks the tie by creator identity and then change-set id.

use crate::change::ChangeSetId;
use crate::error::{CoreError, Result};
use crate::lattice::Lattice;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Width of the rendered form. Fixed width keeps the string form
/// lexicographically sortable.
const RENDERED_WIDTH: usize = 16;

/// A totally ordered position in the change log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OrderId(u64);

impl OrderId {
    /// The position before any change set.
    pub const ZERO: OrderId = OrderId(0);

    /// Create an order from a raw position.
    pub fn from_position(position: u64) -> Self {
        OrderId(position)
    }

    /// The raw position.
    pub fn position(&self) -> u64 {
        self.0
    }

    /// Check if no change set has been ordered yet.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The next position after this one.
    pub fn successor(&self) -> Result<OrderId> {
        self.0
            .checked_add(1)
            .map(OrderId)
            .ok_or_else(|| CoreError::OrderingUnavailable("order space exhausted".to_string()))
    }

    /// Parse the rendered form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != RENDERED_WIDTH {
            return Err(CoreError::OrderingUnavailable(format!(
                "malformed order id {:?}",
                s
            )));
        }
        u64::from_str_radix(s, 16)
            .map(OrderId)
            .map_err(|_| CoreError::OrderingUnavailable(format!("malformed order id {:?}", s)))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId({})", self)
    }
}

impl FromStr for OrderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        OrderId::parse(s)
    }
}

impl Serialize for OrderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OrderId::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Lattice for OrderId {
    fn bottom() -> Self {
        OrderId::ZERO
    }

    fn join(&self, other: &Self) -> Self {
        (*self).max(*other)
    }
}

/// The full merge order of a change set.
///
/// Field order matters: the derived `Ord` compares the raw order first,
/// then the creator identity, then the change-set id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderKey {
    pub order: OrderId,
    pub creator: String,
    pub change_set_id: ChangeSetId,
}

impl OrderKey {
    pub fn new(order: OrderId, creator: impl Into<String>, change_set_id: ChangeSetId) -> Self {
        Self {
            order,
            creator: creator.into(),
            change_set_id,
        }
    }
}
