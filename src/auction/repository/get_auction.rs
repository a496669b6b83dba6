use {
    super::{
        Repository,
        StoreError,
    },
    crate::auction::entities,
    tracing::instrument,
};

impl Repository {
    #[instrument(skip(self))]
    pub async fn get_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<entities::Auction, StoreError> {
        self.db.get_auction(auction_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_resolved_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<entities::ResolvedAuction, StoreError> {
        self.db.get_resolved_auction(auction_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_auction_bids(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<Vec<entities::Bid>, StoreError> {
        self.db.get_auction_bids(auction_id).await
    }
}
