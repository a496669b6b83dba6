use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
    tracing::instrument,
};

pub struct CancelAuctionInput {
    pub auction_id:   entities::AuctionId,
    pub requested_by: entities::UserId,
}

impl Service {
    /// Withdraws an auction before it ends. Only the creator may cancel, and
    /// only out of the scheduled or active state. The transition is the same
    /// conditional status write the sweep uses, so a cancel racing the closing
    /// sweep resolves to exactly one of the two outcomes.
    #[instrument(skip_all, fields(auction_id = %input.auction_id))]
    pub async fn cancel_auction(
        &self,
        input: CancelAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        let mut auction = self.repo.get_auction(input.auction_id).await?;

        if auction.created_by != input.requested_by {
            return Err(RestError::Forbidden(
                "Only the auction creator may cancel it".to_string(),
            ));
        }
        if !auction.status.can_cancel() {
            return Err(RestError::AuctionNotOpen(format!(
                "Auction is {} and can no longer be cancelled",
                auction.status
            )));
        }

        let cancelled = self
            .repo
            .update_auction_status(
                auction.id,
                auction.status,
                entities::AuctionStatus::Cancelled,
            )
            .await?;
        if !cancelled {
            // The sweep (or another cancel) transitioned the auction between
            // our read and write.
            return Err(RestError::AuctionNotOpen(
                "Auction status changed concurrently; it can no longer be cancelled".to_string(),
            ));
        }

        auction.status = entities::AuctionStatus::Cancelled;
        self.notify_status_changed(auction.id, auction.status).await;
        tracing::info!(auction_id = %auction.id, "Auction cancelled");
        Ok(auction)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            api::ws::UpdateEvent,
            auction::{
                entities::{
                    Auction,
                    AuctionStatus,
                },
                repository::MockDatabase,
            },
            config::AuctionConfig,
        },
        mockall::predicate::eq,
        time::{
            Duration,
            OffsetDateTime,
        },
        uuid::Uuid,
    };

    fn auction(status: AuctionStatus) -> Auction {
        let now = OffsetDateTime::now_utc();
        Auction {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            starting_price: 10_000,
            highest_bid: None,
            highest_bidder: None,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            status,
            creation_time: now - Duration::hours(2),
        }
    }

    #[tokio::test]
    async fn test_cancel_active_auction_notifies_subscribers() {
        let auction = auction(AuctionStatus::Active);
        let mut db = MockDatabase::new();
        {
            let auction = auction.clone();
            db.expect_get_auction().returning(move |_| Ok(auction.clone()));
        }
        db.expect_update_auction_status()
            .with(
                eq(auction.id),
                eq(AuctionStatus::Active),
                eq(AuctionStatus::Cancelled),
            )
            .times(1)
            .returning(|_, _, _| Ok(true));
        {
            let resolved = crate::auction::entities::ResolvedAuction {
                id:             auction.id,
                product:        crate::auction::entities::ProductSummary {
                    id:        auction.product_id,
                    name:      "A painting".to_string(),
                    image_url: None,
                },
                seller:         crate::auction::entities::UserSummary {
                    id:         auction.created_by,
                    name:       "seller".to_string(),
                    avatar_url: None,
                },
                starting_price: auction.starting_price,
                highest_bid:    None,
                highest_bidder: None,
                start_time:     auction.start_time,
                end_time:       auction.end_time,
                status:         AuctionStatus::Cancelled,
            };
            db.expect_get_resolved_auction()
                .returning(move |_| Ok(resolved.clone()));
        }

        let (service, mut events) = Service::new_with_mocks(db, AuctionConfig::default());
        let cancelled = service
            .cancel_auction(CancelAuctionInput {
                auction_id:   auction.id,
                requested_by: auction.created_by,
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, AuctionStatus::Cancelled);

        match events.try_recv().unwrap() {
            UpdateEvent::AuctionStatusChanged(event) => {
                assert_eq!(event.auction_id, auction.id);
                assert_eq!(event.new_status, AuctionStatus::Cancelled);
            }
            other => panic!("expected status change, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_requires_the_creator() {
        let auction = auction(AuctionStatus::Active);
        let mut db = MockDatabase::new();
        {
            let auction = auction.clone();
            db.expect_get_auction().returning(move |_| Ok(auction.clone()));
        }
        db.expect_update_auction_status().never();

        let (service, _events) = Service::new_with_mocks(db, AuctionConfig::default());
        let result = service
            .cancel_auction(CancelAuctionInput {
                auction_id:   auction.id,
                requested_by: Uuid::new_v4(),
            })
            .await;
        assert!(matches!(result, Err(RestError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_cancel_rejects_terminal_states() {
        for status in [AuctionStatus::Ended, AuctionStatus::Cancelled] {
            let auction = auction(status);
            let mut db = MockDatabase::new();
            {
                let auction = auction.clone();
                db.expect_get_auction().returning(move |_| Ok(auction.clone()));
            }
            db.expect_update_auction_status().never();

            let (service, _events) = Service::new_with_mocks(db, AuctionConfig::default());
            let result = service
                .cancel_auction(CancelAuctionInput {
                    auction_id:   auction.id,
                    requested_by: auction.created_by,
                })
                .await;
            assert!(matches!(result, Err(RestError::AuctionNotOpen(_))));
        }
    }

    #[tokio::test]
    async fn test_cancel_lost_race_with_the_sweep_is_rejected() {
        let auction = auction(AuctionStatus::Active);
        let mut db = MockDatabase::new();
        {
            let auction = auction.clone();
            db.expect_get_auction().returning(move |_| Ok(auction.clone()));
        }
        db.expect_update_auction_status().returning(|_, _, _| Ok(false));

        let (service, mut events) = Service::new_with_mocks(db, AuctionConfig::default());
        let result = service
            .cancel_auction(CancelAuctionInput {
                auction_id:   auction.id,
                requested_by: auction.created_by,
            })
            .await;
        assert!(matches!(result, Err(RestError::AuctionNotOpen(_))));
        assert!(events.try_recv().is_err());
    }
}
