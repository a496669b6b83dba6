use {
    super::Service,
    crate::{
        api::ws::{
            BidAcceptedEvent,
            UpdateEvent,
        },
        auction::{
            entities,
            entities::BidError,
            repository::StoreError,
        },
    },
    std::future::Future,
    time::OffsetDateTime,
    tracing::instrument,
};

pub struct PlaceBidInput {
    pub auction_id: entities::AuctionId,
    pub bidder:     entities::UserId,
    pub amount:     entities::Amount,
}

impl Service {
    /// Validates and applies a single bid. The read-validate-apply cycle runs
    /// under optimistic concurrency: the write is conditioned on the highest
    /// bid observed at read time, and a lost race re-reads and revalidates
    /// against the new price up to the configured bound. Among racing bidders
    /// exactly one write wins per price level; the rest either fail
    /// validation against the new price or exhaust their attempts with
    /// [`BidError::Conflict`].
    #[instrument(
        skip_all,
        fields(auction_id = %input.auction_id, bidder = %input.bidder, amount = input.amount)
    )]
    pub async fn place_bid(&self, input: PlaceBidInput) -> Result<entities::Bid, BidError> {
        for attempt in 0..self.config.max_bid_attempts {
            let auction = self
                .with_store_deadline(self.repo.get_auction(input.auction_id))
                .await?
                .map_err(|e| match e {
                    StoreError::NotFound => BidError::NotFound,
                    StoreError::Unavailable => BidError::StoreUnavailable,
                })?;

            self.verify_bid(&auction, &input, OffsetDateTime::now_utc())?;

            let bid = entities::Bid::new(input.auction_id, input.bidder, input.amount);
            let applied = self
                .with_store_deadline(
                    self.repo.conditional_apply_bid(auction.highest_bid, &bid),
                )
                .await?
                .map_err(|_| BidError::StoreUnavailable)?;

            if applied {
                self.emit(UpdateEvent::BidAccepted(BidAcceptedEvent {
                    auction_id:         bid.auction_id,
                    bid_id:             bid.id,
                    new_price:          bid.amount,
                    new_highest_bidder: bid.bidder,
                    timestamp:          bid.submission_time,
                }));
                tracing::debug!(bid_id = %bid.id, "Bid accepted");
                return Ok(bid);
            }

            tracing::debug!(attempt, "Concurrent bid won the race, revalidating");
        }

        Err(BidError::Conflict)
    }

    /// Bounds a single store round trip; exceeding the deadline is an
    /// infrastructure error, never a retry.
    async fn with_store_deadline<T>(
        &self,
        fut: impl Future<Output = T>,
    ) -> Result<T, BidError> {
        tokio::time::timeout(self.config.store_timeout, fut)
            .await
            .map_err(|_| BidError::StoreUnavailable)
    }
}
