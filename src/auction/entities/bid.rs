use {
    super::auction::{
        Amount,
        AuctionId,
        AuctionStatus,
        UserId,
    },
    time::OffsetDateTime,
    uuid::Uuid,
};

pub type BidId = Uuid;

/// An accepted bid. Immutable once created; the record is written atomically
/// with the auction price update that admitted it.
#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub id:              BidId,
    pub auction_id:      AuctionId,
    pub bidder:          UserId,
    pub amount:          Amount,
    pub submission_time: OffsetDateTime,
}

impl Bid {
    pub fn new(auction_id: AuctionId, bidder: UserId, amount: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            auction_id,
            bidder,
            amount,
            submission_time: OffsetDateTime::now_utc(),
        }
    }
}

/// Why a bid was not accepted. Every rejection carries enough state for the
/// caller to correct and resubmit; none of these are thrown as faults.
#[derive(Clone, Debug, PartialEq)]
pub enum BidError {
    /// No auction with the given id.
    NotFound,
    /// The auction is not accepting bids right now.
    AuctionNotOpen {
        status:     AuctionStatus,
        start_time: OffsetDateTime,
        end_time:   OffsetDateTime,
    },
    /// Sellers may not bid on their own auctions and the current leader may
    /// not outbid themselves.
    InvalidBidder,
    /// The amount does not clear the current price plus the increment.
    BidTooLow {
        current_price:    Amount,
        minimum_next_bid: Amount,
    },
    /// Lost the conditional write race more times than the configured bound.
    Conflict,
    /// The durable store did not answer within the per-attempt deadline.
    StoreUnavailable,
}
