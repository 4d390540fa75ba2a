//! Inquiry records, identifiers and money

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Negotiation thread identifier
    InquiryId
);
id_type!(
    /// Stable user identity supplied by the identity provider
    UserId
);
id_type!(
    /// Persisted message identifier
    MessageId
);
id_type!(
    /// Catalog property identifier
    PropertyId
);

/// Raised when a stored or wire string does not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// What was being parsed
    pub kind: &'static str,
    /// The offending value
    pub value: String,
}

/// A positive monetary amount, held in minor units (1/100)
///
/// On the wire a price is a plain JSON number in major units, e.g. `480000`
/// or `480000.5`. Whole amounts serialize as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

impl Price {
    /// Build from minor units; `None` unless strictly positive
    pub fn from_minor(minor: i64) -> Option<Self> {
        (minor > 0).then_some(Self(minor))
    }

    /// Build from a major-unit amount, rounding to two decimals
    pub fn from_major(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount <= 0.0 {
            return None;
        }
        let minor = (amount * 100.0).round();
        if minor < 1.0 || minor >= i64::MAX as f64 {
            return None;
        }
        Some(Self(minor as i64))
    }

    /// Amount in minor units
    pub fn minor_units(self) -> i64 {
        self.0
    }

    /// Amount in major units
    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0 % 100 == 0 {
            serializer.serialize_i64(self.0 / 100)
        } else {
            serializer.serialize_f64(self.as_major())
        }
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Price::from_major(amount)
            .ok_or_else(|| serde::de::Error::custom(format!("price must be positive, got {}", amount)))
    }
}

/// Role attached to an authenticated identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Prospective buyer
    Client,
    /// Property owner or listing agent
    Agent,
    /// Read-only observer of every inquiry
    Admin,
}

/// Lifecycle status of an inquiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InquiryStatus {
    /// Opened, no offer placed yet
    Active,
    /// At least one offer has been exchanged
    Negotiating,
    /// Both parties settled on a price
    Agreed,
    /// Owner confirmed the sale
    Purchased,
    /// Withdrawn before completion
    Cancelled,
    /// Closed without a sale
    Closed,
}

impl InquiryStatus {
    /// Status name as stored and sent on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            InquiryStatus::Active => "ACTIVE",
            InquiryStatus::Negotiating => "NEGOTIATING",
            InquiryStatus::Agreed => "AGREED",
            InquiryStatus::Purchased => "PURCHASED",
            InquiryStatus::Cancelled => "CANCELLED",
            InquiryStatus::Closed => "CLOSED",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InquiryStatus::Purchased | InquiryStatus::Cancelled | InquiryStatus::Closed
        )
    }

    /// Open statuses count toward the one-open-inquiry-per-buyer rule
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InquiryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(InquiryStatus::Active),
            "NEGOTIATING" => Ok(InquiryStatus::Negotiating),
            "AGREED" => Ok(InquiryStatus::Agreed),
            "PURCHASED" => Ok(InquiryStatus::Purchased),
            "CANCELLED" => Ok(InquiryStatus::Cancelled),
            "CLOSED" => Ok(InquiryStatus::Closed),
            other => Err(UnknownVariant {
                kind: "inquiry status",
                value: other.to_string(),
            }),
        }
    }
}

/// A negotiation thread between one client and one owner over one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inquiry {
    /// Inquiry identifier
    pub id: InquiryId,
    /// Property under negotiation
    pub property_id: PropertyId,
    /// Buyer
    pub client_id: UserId,
    /// Owner or listing agent
    pub owner_id: UserId,
    /// Property price when the inquiry was opened
    pub listed_price: Price,
    /// Current lifecycle status
    pub status: InquiryStatus,
    /// Outstanding, not yet answered offer
    pub offered_price: Option<Price>,
    /// Who placed the outstanding offer
    pub offered_by: Option<UserId>,
    /// Price both parties accepted
    pub agreed_price: Option<Price>,
    /// Bumped on every committed mutation
    pub version: i64,
    /// Creation time (Unix milliseconds)
    pub created_at: i64,
    /// Last mutation time (Unix milliseconds)
    pub updated_at: i64,
    /// When a terminal status was entered
    pub closed_at: Option<i64>,
}

impl Inquiry {
    /// Both participants, client first
    pub fn participants(&self) -> [UserId; 2] {
        [self.client_id, self.owner_id]
    }

    /// Whether `user` is the client or the owner
    pub fn is_participant(&self, user: UserId) -> bool {
        user == self.client_id || user == self.owner_id
    }

    /// The other participant, if `user` is one of them
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if user == self.client_id {
            Some(self.owner_id)
        } else if user == self.owner_id {
            Some(self.client_id)
        } else {
            None
        }
    }
}
