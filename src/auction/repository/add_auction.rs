use {
    super::{
        Repository,
        StoreError,
    },
    crate::auction::entities,
    tracing::instrument,
};

impl Repository {
    #[instrument(skip_all, fields(auction_id = %auction.id))]
    pub async fn add_auction(&self, auction: &entities::Auction) -> Result<(), StoreError> {
        self.db.add_auction(auction).await
    }
}
