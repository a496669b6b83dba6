use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
};

#[derive(Debug)]
pub struct GetAuctionInput {
    pub auction_id: entities::AuctionId,
}

#[derive(Debug)]
pub struct GetResolvedAuctionInput {
    pub auction_id: entities::AuctionId,
}

#[derive(Debug)]
pub struct GetAuctionBidsInput {
    pub auction_id: entities::AuctionId,
}

impl Service {
    pub async fn get_auction(
        &self,
        input: GetAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        Ok(self.repo.get_auction(input.auction_id).await?)
    }

    pub async fn get_resolved_auction(
        &self,
        input: GetResolvedAuctionInput,
    ) -> Result<entities::ResolvedAuction, RestError> {
        Ok(self.repo.get_resolved_auction(input.auction_id).await?)
    }

    /// Accepted bids of the auction, most recent first. The auction is looked
    /// up first so a missing auction is a not-found rather than an empty list.
    pub async fn get_auction_bids(
        &self,
        input: GetAuctionBidsInput,
    ) -> Result<Vec<entities::Bid>, RestError> {
        self.repo.get_auction(input.auction_id).await?;
        Ok(self.repo.get_auction_bids(input.auction_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            auction::repository::{
                MockDatabase,
                StoreError,
            },
            config::AuctionConfig,
        },
        uuid::Uuid,
    };

    #[tokio::test]
    async fn test_get_auction_bids_missing_auction_is_not_found() {
        let mut db = MockDatabase::new();
        db.expect_get_auction()
            .returning(|_| Err(StoreError::NotFound));
        db.expect_get_auction_bids().never();

        let (service, _events) = Service::new_with_mocks(db, AuctionConfig::default());
        let result = service
            .get_auction_bids(GetAuctionBidsInput {
                auction_id: Uuid::new_v4(),
            })
            .await;
        assert!(matches!(result, Err(RestError::AuctionNotFound)));
    }
}
