use {
    super::Service,
    crate::{
        api::ws::{
            AuctionStatusChangedEvent,
            UpdateEvent,
        },
        auction::entities,
    },
    anyhow::Result,
    time::OffsetDateTime,
    tracing::instrument,
};

pub struct SweepResult {
    /// Auctions whose status advanced this sweep, in apply order.
    pub auctions: Vec<entities::Auction>,
}

impl Service {
    /// One pass of the lifecycle state machine over every auction with a
    /// crossed boundary. Each auction advances by exactly one step per sweep:
    /// an auction whose whole window passed while the process was down
    /// becomes active on this sweep and ends on the next, so subscribers
    /// always observe the Active phase. Each update is durable before the
    /// next sweep re-evaluates it; a missed sweep therefore delays, never
    /// loses, a transition.
    #[instrument(skip_all, fields(updated))]
    pub async fn sweep_statuses(&self) -> Result<SweepResult> {
        let now = OffsetDateTime::now_utc();
        let due = self
            .repo
            .list_boundary_crossed(now)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list due auctions: {:?}", e))?;

        let mut updated = Vec::new();
        for mut auction in due {
            let Some(next) = auction
                .status
                .next_due(now, auction.start_time, auction.end_time)
            else {
                continue;
            };
            match self
                .repo
                .update_auction_status(auction.id, auction.status, next)
                .await
            {
                Ok(true) => {
                    auction.status = next;
                    updated.push(auction);
                }
                // Another writer (an explicit cancel, or a sweep racing on a
                // restarted process) transitioned this auction first; the
                // winner is responsible for the notification.
                Ok(false) => {
                    tracing::debug!(auction_id = %auction.id, "Skipping concurrently updated auction");
                }
                Err(e) => {
                    tracing::error!(auction_id = %auction.id, error = ?e, "Failed to advance auction status");
                }
            }
        }
        tracing::Span::current().record("updated", updated.len());

        // Notify in the same order the updates were applied.
        for auction in &updated {
            self.notify_status_changed(auction.id, auction.status).await;
        }

        Ok(SweepResult { auctions: updated })
    }

    /// Resolves the auction's display fields and broadcasts the transition.
    /// Delivery trouble is logged and isolated; the status update itself is
    /// already durable and the next reader sees it regardless.
    pub(super) async fn notify_status_changed(
        &self,
        auction_id: entities::AuctionId,
        new_status: entities::AuctionStatus,
    ) {
        match self.repo.get_resolved_auction(auction_id).await {
            Ok(auction) => {
                self.emit(UpdateEvent::AuctionStatusChanged(AuctionStatusChangedEvent {
                    auction_id,
                    new_status,
                    auction,
                    timestamp: OffsetDateTime::now_utc(),
                }));
            }
            Err(e) => {
                tracing::error!(
                    auction_id = %auction_id,
                    error = ?e,
                    "Failed to resolve auction for status notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            auction::{
                entities::{
                    Auction,
                    AuctionStatus,
                    ResolvedAuction,
                },
                repository::{
                    MockDatabase,
                    StoreError,
                },
            },
            config::AuctionConfig,
        },
        mockall::predicate::eq,
        time::Duration,
        uuid::Uuid,
    };

    fn auction(status: AuctionStatus, start_offset: Duration, end_offset: Duration) -> Auction {
        let now = OffsetDateTime::now_utc();
        Auction {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            starting_price: 10_000,
            highest_bid: None,
            highest_bidder: None,
            start_time: now + start_offset,
            end_time: now + end_offset,
            status,
            creation_time: now - Duration::hours(1),
        }
    }

    fn resolved(auction: &Auction) -> ResolvedAuction {
        ResolvedAuction {
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
            highest_bid:    auction.highest_bid,
            highest_bidder: None,
            start_time:     auction.start_time,
            end_time:       auction.end_time,
            status:         auction.status,
        }
    }

    #[tokio::test]
    async fn test_sweep_activates_and_ends_in_order() {
        let due_start = auction(AuctionStatus::Scheduled, Duration::minutes(-5), Duration::hours(1));
        let due_end = auction(AuctionStatus::Active, Duration::hours(-2), Duration::seconds(-30));

        let mut db = MockDatabase::new();
        {
            let due = vec![due_start.clone(), due_end.clone()];
            db.expect_list_boundary_crossed()
                .returning(move |_| Ok(due.clone()));
        }
        db.expect_update_auction_status()
            .with(
                eq(due_start.id),
                eq(AuctionStatus::Scheduled),
                eq(AuctionStatus::Active),
            )
            .times(1)
            .returning(|_, _, _| Ok(true));
        db.expect_update_auction_status()
            .with(
                eq(due_end.id),
                eq(AuctionStatus::Active),
                eq(AuctionStatus::Ended),
            )
            .times(1)
            .returning(|_, _, _| Ok(true));
        {
            let resolved_start = resolved(&due_start);
            db.expect_get_resolved_auction()
                .with(eq(due_start.id))
                .returning(move |_| Ok(resolved_start.clone()));
        }
        {
            let resolved_end = resolved(&due_end);
            db.expect_get_resolved_auction()
                .with(eq(due_end.id))
                .returning(move |_| Ok(resolved_end.clone()));
        }

        let (service, mut events) = Service::new_with_mocks(db, AuctionConfig::default());
        let result = service.sweep_statuses().await.unwrap();

        assert_eq!(result.auctions.len(), 2);
        assert_eq!(result.auctions[0].status, AuctionStatus::Active);
        assert_eq!(result.auctions[1].status, AuctionStatus::Ended);

        // Events come out in apply order.
        match events.try_recv().unwrap() {
            UpdateEvent::AuctionStatusChanged(event) => {
                assert_eq!(event.auction_id, due_start.id);
                assert_eq!(event.new_status, AuctionStatus::Active);
            }
            other => panic!("expected status change, got {:?}", other),
        }
        match events.try_recv().unwrap() {
            UpdateEvent::AuctionStatusChanged(event) => {
                assert_eq!(event.auction_id, due_end.id);
                assert_eq!(event.new_status, AuctionStatus::Ended);
            }
            other => panic!("expected status change, got {:?}", other),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sweep_never_skips_the_active_phase() {
        // Both boundaries are in the past; one sweep still only activates.
        let expired = auction(
            AuctionStatus::Scheduled,
            Duration::hours(-2),
            Duration::hours(-1),
        );

        let mut db = MockDatabase::new();
        {
            let due = vec![expired.clone()];
            db.expect_list_boundary_crossed()
                .returning(move |_| Ok(due.clone()));
        }
        db.expect_update_auction_status()
            .with(
                eq(expired.id),
                eq(AuctionStatus::Scheduled),
                eq(AuctionStatus::Active),
            )
            .times(1)
            .returning(|_, _, _| Ok(true));
        {
            let resolved = resolved(&expired);
            db.expect_get_resolved_auction()
                .returning(move |_| Ok(resolved.clone()));
        }

        let (service, _events) = Service::new_with_mocks(db, AuctionConfig::default());
        let result = service.sweep_statuses().await.unwrap();
        assert_eq!(result.auctions.len(), 1);
        assert_eq!(result.auctions[0].status, AuctionStatus::Active);
    }

    #[tokio::test]
    async fn test_sweep_skips_concurrently_transitioned_auctions() {
        let cancelled_underneath =
            auction(AuctionStatus::Active, Duration::hours(-2), Duration::minutes(-1));

        let mut db = MockDatabase::new();
        {
            let due = vec![cancelled_underneath.clone()];
            db.expect_list_boundary_crossed()
                .returning(move |_| Ok(due.clone()));
        }
        db.expect_update_auction_status().returning(|_, _, _| Ok(false));

        let (service, mut events) = Service::new_with_mocks(db, AuctionConfig::default());
        let result = service.sweep_statuses().await.unwrap();
        assert!(result.auctions.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sweep_store_failure_is_an_error_not_a_panic() {
        let mut db = MockDatabase::new();
        db.expect_list_boundary_crossed()
            .returning(|_| Err(StoreError::Unavailable));

        let (service, _events) = Service::new_with_mocks(db, AuctionConfig::default());
        assert!(service.sweep_statuses().await.is_err());
    }
}
