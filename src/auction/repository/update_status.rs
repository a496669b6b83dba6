use {
    super::{
        Repository,
        StoreError,
    },
    crate::auction::entities,
    time::OffsetDateTime,
    tracing::instrument,
};

impl Repository {
    #[instrument(skip(self))]
    pub async fn update_auction_status(
        &self,
        auction_id: entities::AuctionId,
        from: entities::AuctionStatus,
        to: entities::AuctionStatus,
    ) -> Result<bool, StoreError> {
        self.db.update_auction_status(auction_id, from, to).await
    }

    #[instrument(skip(self))]
    pub async fn list_boundary_crossed(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<entities::Auction>, StoreError> {
        self.db.list_boundary_crossed(now).await
    }
}
