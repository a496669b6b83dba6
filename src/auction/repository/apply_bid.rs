use {
    super::{
        Repository,
        StoreError,
    },
    crate::auction::entities,
    tracing::instrument,
};

impl Repository {
    /// Applies the price/bidder update and the bid record as one atomic
    /// conditional write. `false` means the precondition no longer held and
    /// nothing was written.
    #[instrument(skip_all, fields(auction_id = %bid.auction_id, bid_id = %bid.id))]
    pub async fn conditional_apply_bid(
        &self,
        expected_prior_bid: Option<entities::Amount>,
        bid: &entities::Bid,
    ) -> Result<bool, StoreError> {
        let applied = self.db.conditional_apply_bid(expected_prior_bid, bid).await?;
        if !applied {
            tracing::debug!(
                auction_id = %bid.auction_id,
                "bid lost the conditional write race"
            );
        }
        Ok(applied)
    }
}
