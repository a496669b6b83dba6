use {
    super::{
        place_bid::PlaceBidInput,
        Service,
    },
    crate::auction::entities::{
        Auction,
        BidError,
    },
    time::OffsetDateTime,
};

impl Service {
    /// Checks the admission preconditions against the auction state read for
    /// this attempt. The first violated condition determines the error, in
    /// this order: open window, bidder eligibility, amount.
    pub(super) fn verify_bid(
        &self,
        auction: &Auction,
        input: &PlaceBidInput,
        now: OffsetDateTime,
    ) -> Result<(), BidError> {
        if !auction.is_open(now) {
            return Err(BidError::AuctionNotOpen {
                status:     auction.status,
                start_time: auction.start_time,
                end_time:   auction.end_time,
            });
        }

        if auction.highest_bidder == Some(input.bidder) || auction.created_by == input.bidder {
            return Err(BidError::InvalidBidder);
        }

        let minimum_next_bid = auction.minimum_next_bid(self.config.min_increment);
        if input.amount < minimum_next_bid {
            return Err(BidError::BidTooLow {
                current_price: auction.current_price(),
                minimum_next_bid,
            });
        }

        Ok(())
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
                },
                repository::MockDatabase,
                service::place_bid::PlaceBidInput,
            },
            config::AuctionConfig,
        },
        time::{
            macros::datetime,
            Duration,
        },
        uuid::Uuid,
    };

    fn active_auction(now: OffsetDateTime) -> Auction {
        Auction {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            starting_price: 10_000,
            highest_bid: None,
            highest_bidder: None,
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            status: AuctionStatus::Active,
            creation_time: now - Duration::hours(2),
        }
    }

    fn bid_on(auction: &Auction, amount: i64) -> PlaceBidInput {
        PlaceBidInput {
            auction_id: auction.id,
            bidder: Uuid::new_v4(),
            amount,
        }
    }

    fn service() -> Service {
        let (service, _) = Service::new_with_mocks(
            MockDatabase::new(),
            AuctionConfig {
                min_increment: 1_000,
                ..AuctionConfig::default()
            },
        );
        service
    }

    const NOW: OffsetDateTime = datetime!(2025-03-01 12:00 UTC);

    #[test]
    fn test_verify_bid_accepts_exact_minimum() {
        let service = service();
        let auction = active_auction(NOW);
        // No prior bid: starting price plus increment is the floor.
        assert_eq!(
            service.verify_bid(&auction, &bid_on(&auction, 11_000), NOW),
            Ok(())
        );
    }

    #[test]
    fn test_verify_bid_rejects_one_below_minimum() {
        let service = service();
        let auction = active_auction(NOW);
        assert_eq!(
            service.verify_bid(&auction, &bid_on(&auction, 10_999), NOW),
            Err(BidError::BidTooLow {
                current_price:    10_000,
                minimum_next_bid: 11_000,
            })
        );
    }

    #[test]
    fn test_verify_bid_floor_moves_with_the_highest_bid() {
        let service = service();
        let mut auction = active_auction(NOW);
        auction.highest_bid = Some(11_000);
        auction.highest_bidder = Some(Uuid::new_v4());

        assert_eq!(
            service.verify_bid(&auction, &bid_on(&auction, 12_000), NOW),
            Ok(())
        );
        assert_eq!(
            service.verify_bid(&auction, &bid_on(&auction, 11_999), NOW),
            Err(BidError::BidTooLow {
                current_price:    11_000,
                minimum_next_bid: 12_000,
            })
        );
    }

    #[test]
    fn test_verify_bid_rejects_creator_and_current_leader() {
        let service = service();
        let mut auction = active_auction(NOW);

        let mut self_bid = bid_on(&auction, 20_000);
        self_bid.bidder = auction.created_by;
        assert_eq!(
            service.verify_bid(&auction, &self_bid, NOW),
            Err(BidError::InvalidBidder)
        );

        let leader = Uuid::new_v4();
        auction.highest_bid = Some(11_000);
        auction.highest_bidder = Some(leader);
        let mut repeat_bid = bid_on(&auction, 20_000);
        repeat_bid.bidder = leader;
        assert_eq!(
            service.verify_bid(&auction, &repeat_bid, NOW),
            Err(BidError::InvalidBidder)
        );
    }

    #[test]
    fn test_verify_bid_rejects_closed_auctions_first() {
        let service = service();
        let mut auction = active_auction(NOW);
        auction.status = AuctionStatus::Scheduled;

        // A closed auction wins over any later violation; the amount here
        // would also be too low but the window check comes first.
        assert_eq!(
            service.verify_bid(&auction, &bid_on(&auction, 1), NOW),
            Err(BidError::AuctionNotOpen {
                status:     AuctionStatus::Scheduled,
                start_time: auction.start_time,
                end_time:   auction.end_time,
            })
        );
    }

    #[test]
    fn test_verify_bid_rejects_active_auction_past_its_window() {
        let service = service();
        let auction = active_auction(NOW);
        let after_end = auction.end_time + Duration::seconds(30);

        assert!(matches!(
            service.verify_bid(&auction, &bid_on(&auction, 20_000), after_end),
            Err(BidError::AuctionNotOpen { .. })
        ));
    }
}
