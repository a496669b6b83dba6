use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
    time::OffsetDateTime,
    tracing::instrument,
    uuid::Uuid,
};

pub struct AddAuctionInput {
    pub product_id:     entities::ProductId,
    pub created_by:     entities::UserId,
    pub starting_price: entities::Amount,
    pub start_time:     OffsetDateTime,
    pub end_time:       OffsetDateTime,
}

impl Service {
    /// Lists a new auction in the scheduled state. The lifecycle sweep takes
    /// it from there; start times in the past are allowed and simply activate
    /// on the next sweep.
    #[instrument(skip_all, fields(product_id = %input.product_id))]
    pub async fn add_auction(
        &self,
        input: AddAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        if input.start_time >= input.end_time {
            return Err(RestError::BadParameters(
                "Auction start time must be before its end time".to_string(),
            ));
        }
        if input.starting_price <= 0 {
            return Err(RestError::BadParameters(
                "Starting price must be positive".to_string(),
            ));
        }

        let auction = entities::Auction {
            id:             Uuid::new_v4(),
            product_id:     input.product_id,
            created_by:     input.created_by,
            starting_price: input.starting_price,
            highest_bid:    None,
            highest_bidder: None,
            start_time:     input.start_time,
            end_time:       input.end_time,
            status:         entities::AuctionStatus::Scheduled,
            creation_time:  OffsetDateTime::now_utc(),
        };
        self.repo.add_auction(&auction).await?;
        tracing::info!(auction_id = %auction.id, "Auction listed");
        Ok(auction)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            auction::{
                entities::AuctionStatus,
                repository::MockDatabase,
            },
            config::AuctionConfig,
        },
        time::Duration,
    };

    fn input() -> AddAuctionInput {
        let now = OffsetDateTime::now_utc();
        AddAuctionInput {
            product_id:     Uuid::new_v4(),
            created_by:     Uuid::new_v4(),
            starting_price: 10_000,
            start_time:     now + Duration::minutes(5),
            end_time:       now + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_add_auction_starts_scheduled() {
        let mut db = MockDatabase::new();
        db.expect_add_auction()
            .withf(|auction| {
                auction.status == AuctionStatus::Scheduled && auction.highest_bid.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));

        let (service, _events) = Service::new_with_mocks(db, AuctionConfig::default());
        let auction = service.add_auction(input()).await.unwrap();
        assert_eq!(auction.status, AuctionStatus::Scheduled);
        assert_eq!(auction.starting_price, 10_000);
    }

    #[tokio::test]
    async fn test_add_auction_rejects_inverted_window() {
        let mut bad = input();
        bad.end_time = bad.start_time;

        let (service, _events) =
            Service::new_with_mocks(MockDatabase::new(), AuctionConfig::default());
        assert!(matches!(
            service.add_auction(bad).await,
            Err(RestError::BadParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_add_auction_rejects_non_positive_price() {
        let mut bad = input();
        bad.starting_price = 0;

        let (service, _events) =
            Service::new_with_mocks(MockDatabase::new(), AuctionConfig::default());
        assert!(matches!(
            service.add_auction(bad).await,
            Err(RestError::BadParameters(_))
        ));
    }
}
