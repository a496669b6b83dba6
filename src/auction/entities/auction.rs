use {
    serde::{
        Deserialize,
        Serialize,
    },
    time::OffsetDateTime,
    utoipa::ToSchema,
    uuid::Uuid,
};

pub type AuctionId = Uuid;
pub type ProductId = Uuid;
pub type UserId = Uuid;

/// Price in minor currency units (cents).
pub type Amount = i64;

/// Lifecycle phase of an auction. Transitions are monotonic in the order
/// Scheduled -> Active -> Ended; Cancelled is reachable from Scheduled or
/// Active only. Ended and Cancelled are terminal.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    sqlx::Type,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "auction_status", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Ended | AuctionStatus::Cancelled)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, AuctionStatus::Scheduled | AuctionStatus::Active)
    }

    /// The next status this auction is due for at `now`, or `None` if no
    /// boundary has been crossed. Advances a single step: a scheduled auction
    /// whose end time has also passed still goes through Active first, so
    /// that every auction observably passes through each phase.
    pub fn next_due(
        &self,
        now: OffsetDateTime,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
    ) -> Option<AuctionStatus> {
        match self {
            AuctionStatus::Scheduled if now >= start_time => Some(AuctionStatus::Active),
            AuctionStatus::Active if now >= end_time => Some(AuctionStatus::Ended),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Auction {
    pub id:             AuctionId,
    pub product_id:     ProductId,
    pub created_by:     UserId,
    pub starting_price: Amount,
    pub highest_bid:    Option<Amount>,
    pub highest_bidder: Option<UserId>,
    pub start_time:     OffsetDateTime,
    pub end_time:       OffsetDateTime,
    pub status:         AuctionStatus,
    pub creation_time:  OffsetDateTime,
}

impl Auction {
    /// Whether bids are admissible at `now`. Requires both the Active status
    /// and the [start, end) window; the two can disagree between sweeps.
    pub fn is_open(&self, now: OffsetDateTime) -> bool {
        self.status == AuctionStatus::Active && self.start_time <= now && now < self.end_time
    }

    /// The smallest acceptable next bid: the current price (or the starting
    /// price while there is no bid yet) plus the configured increment.
    pub fn minimum_next_bid(&self, min_increment: Amount) -> Amount {
        self.highest_bid.unwrap_or(self.starting_price) + min_increment
    }

    /// Current price as surfaced in rejections, so callers can correct and
    /// resubmit.
    pub fn current_price(&self) -> Amount {
        self.highest_bid.unwrap_or(self.starting_price)
    }
}

/// Display fields for a referenced user, as shown in broadcast snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    #[schema(value_type = Uuid)]
    pub id:         UserId,
    pub name:       String,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    #[schema(value_type = Uuid)]
    pub id:        ProductId,
    pub name:      String,
    pub image_url: Option<String>,
}

/// An auction joined with the display fields of its product, seller and
/// current leader. This is what status-change notifications carry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolvedAuction {
    #[schema(value_type = Uuid)]
    pub id:             AuctionId,
    pub product:        ProductSummary,
    pub seller:         UserSummary,
    pub starting_price: Amount,
    pub highest_bid:    Option<Amount>,
    pub highest_bidder: Option<UserSummary>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time:     OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time:       OffsetDateTime,
    pub status:         AuctionStatus,
}
