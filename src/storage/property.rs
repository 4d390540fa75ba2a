//! Minimal mirror of the external property catalog

use crate::storage::{Price, PropertyId, UnknownVariant, UserId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Listing availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
    /// Open for inquiries
    Available,
    /// Purchase confirmed
    Sold,
}

impl PropertyStatus {
    /// Stored name
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyStatus::Available => "AVAILABLE",
            PropertyStatus::Sold => "SOLD",
        }
    }
}

impl FromStr for PropertyStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(PropertyStatus::Available),
            "SOLD" => Ok(PropertyStatus::Sold),
            other => Err(UnknownVariant {
                kind: "property status",
                value: other.to_string(),
            }),
        }
    }
}

/// The slice of a listing the negotiation core needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Property identifier
    pub id: PropertyId,
    /// Owner or listing agent
    pub owner_id: UserId,
    /// Current listed price
    pub listed_price: Price,
    /// Availability
    pub status: PropertyStatus,
}

impl Property {
    /// An available listing
    pub fn available(id: PropertyId, owner_id: UserId, listed_price: Price) -> Self {
        Self {
            id,
            owner_id,
            listed_price,
            status: PropertyStatus::Available,
        }
    }
}

/// External catalog collaborator
///
/// Inquiry creation snapshots owner and price through [`PropertyCatalog::property`];
/// a confirmed purchase calls [`PropertyCatalog::mark_sold`].
pub trait PropertyCatalog: Send + Sync {
    /// Look up a listing
    fn property(&self, id: PropertyId) -> Result<Option<Property>>;

    /// Flag a listing as sold
    fn mark_sold(&self, id: PropertyId) -> Result<()>;
}
