#[cfg(test)]
use mockall::automock;
use {
    crate::{
        auction::entities,
        state::DB,
    },
    axum::async_trait,
    sqlx::FromRow,
    time::OffsetDateTime,
};

/// Failures of the durable store, mapped away from sqlx at this boundary.
/// `Unavailable` is infrastructure trouble and is never surfaced as a
/// business rejection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StoreError {
    NotFound,
    Unavailable,
}

fn store_error(context: &str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => {
            tracing::error!(error = e.to_string(), "DB: {} failed", context);
            StoreError::Unavailable
        }
    }
}

#[derive(Clone, FromRow, Debug)]
struct AuctionRow {
    id:             entities::AuctionId,
    product_id:     entities::ProductId,
    created_by:     entities::UserId,
    starting_price: i64,
    highest_bid:    Option<i64>,
    highest_bidder: Option<entities::UserId>,
    start_time:     OffsetDateTime,
    end_time:       OffsetDateTime,
    status:         entities::AuctionStatus,
    creation_time:  OffsetDateTime,
}

impl From<AuctionRow> for entities::Auction {
    fn from(row: AuctionRow) -> Self {
        Self {
            id:             row.id,
            product_id:     row.product_id,
            created_by:     row.created_by,
            starting_price: row.starting_price,
            highest_bid:    row.highest_bid,
            highest_bidder: row.highest_bidder,
            start_time:     row.start_time,
            end_time:       row.end_time,
            status:         row.status,
            creation_time:  row.creation_time,
        }
    }
}

#[derive(Clone, FromRow, Debug)]
struct BidRow {
    id:              entities::BidId,
    auction_id:      entities::AuctionId,
    bidder:          entities::UserId,
    amount:          i64,
    submission_time: OffsetDateTime,
}

impl From<BidRow> for entities::Bid {
    fn from(row: BidRow) -> Self {
        Self {
            id:              row.id,
            auction_id:      row.auction_id,
            bidder:          row.bidder,
            amount:          row.amount,
            submission_time: row.submission_time,
        }
    }
}

#[derive(Clone, FromRow, Debug)]
struct ResolvedAuctionRow {
    id:                entities::AuctionId,
    product_id:        entities::ProductId,
    product_name:      String,
    product_image_url: Option<String>,
    created_by:        entities::UserId,
    seller_name:       String,
    seller_avatar_url: Option<String>,
    starting_price:    i64,
    highest_bid:       Option<i64>,
    highest_bidder:    Option<entities::UserId>,
    bidder_name:       Option<String>,
    bidder_avatar_url: Option<String>,
    start_time:        OffsetDateTime,
    end_time:          OffsetDateTime,
    status:            entities::AuctionStatus,
}

impl From<ResolvedAuctionRow> for entities::ResolvedAuction {
    fn from(row: ResolvedAuctionRow) -> Self {
        Self {
            id:             row.id,
            product:        entities::ProductSummary {
                id:        row.product_id,
                name:      row.product_name,
                image_url: row.product_image_url,
            },
            seller:         entities::UserSummary {
                id:         row.created_by,
                name:       row.seller_name,
                avatar_url: row.seller_avatar_url,
            },
            starting_price: row.starting_price,
            highest_bid:    row.highest_bid,
            highest_bidder: row.highest_bidder.and_then(|id| {
                row.bidder_name.map(|name| entities::UserSummary {
                    id,
                    name,
                    avatar_url: row.bidder_avatar_url,
                })
            }),
            start_time:     row.start_time,
            end_time:       row.end_time,
            status:         row.status,
        }
    }
}

/// The durable store consumed by the bid admission and lifecycle paths.
///
/// The two writers own disjoint auction fields: `conditional_apply_bid` is the
/// only mutation of price/bidder and `update_auction_status` the only mutation
/// of status, so no lock is needed between them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn add_auction(&self, auction: &entities::Auction) -> Result<(), StoreError>;
    async fn get_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<entities::Auction, StoreError>;
    async fn get_resolved_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<entities::ResolvedAuction, StoreError>;
    async fn get_auction_bids(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<Vec<entities::Bid>, StoreError>;
    /// Atomically applies `bid` to its auction and inserts the bid record,
    /// conditioned on the auction's highest bid still being
    /// `expected_prior_bid`. Returns `false` without writing anything if a
    /// concurrent bid got there first.
    async fn conditional_apply_bid(
        &self,
        expected_prior_bid: Option<entities::Amount>,
        bid: &entities::Bid,
    ) -> Result<bool, StoreError>;
    /// Advances the status, conditioned on the current status still being
    /// `from`. Returns `false` if another writer transitioned the auction
    /// first.
    async fn update_auction_status(
        &self,
        auction_id: entities::AuctionId,
        from: entities::AuctionStatus,
        to: entities::AuctionStatus,
    ) -> Result<bool, StoreError>;
    /// Non-terminal auctions whose start or end boundary has been crossed at
    /// `now`, in creation order.
    async fn list_boundary_crossed(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<entities::Auction>, StoreError>;
}

#[async_trait]
impl Database for DB {
    async fn add_auction(&self, auction: &entities::Auction) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO auction (id, product_id, created_by, starting_price, start_time, end_time, status, creation_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(auction.id)
        .bind(auction.product_id)
        .bind(auction.created_by)
        .bind(auction.starting_price)
        .bind(auction.start_time)
        .bind(auction.end_time)
        .bind(auction.status)
        .bind(auction.creation_time)
        .execute(self)
        .await
        .map_err(|e| store_error("insert auction", e))?;
        Ok(())
    }

    async fn get_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<entities::Auction, StoreError> {
        let row: AuctionRow = sqlx::query_as("SELECT * FROM auction WHERE id = $1")
            .bind(auction_id)
            .fetch_one(self)
            .await
            .map_err(|e| store_error("get auction", e))?;
        Ok(row.into())
    }

    async fn get_resolved_auction(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<entities::ResolvedAuction, StoreError> {
        let row: ResolvedAuctionRow = sqlx::query_as(
            "SELECT a.id, a.product_id, p.name AS product_name, p.image_url AS product_image_url, \
                    a.created_by, s.name AS seller_name, s.avatar_url AS seller_avatar_url, \
                    a.starting_price, a.highest_bid, a.highest_bidder, \
                    b.name AS bidder_name, b.avatar_url AS bidder_avatar_url, \
                    a.start_time, a.end_time, a.status \
             FROM auction a \
             JOIN product p ON p.id = a.product_id \
             JOIN app_user s ON s.id = a.created_by \
             LEFT JOIN app_user b ON b.id = a.highest_bidder \
             WHERE a.id = $1",
        )
        .bind(auction_id)
        .fetch_one(self)
        .await
        .map_err(|e| store_error("get resolved auction", e))?;
        Ok(row.into())
    }

    async fn get_auction_bids(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<Vec<entities::Bid>, StoreError> {
        let rows: Vec<BidRow> =
            sqlx::query_as("SELECT * FROM bid WHERE auction_id = $1 ORDER BY submission_time DESC")
                .bind(auction_id)
                .fetch_all(self)
                .await
                .map_err(|e| store_error("get auction bids", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn conditional_apply_bid(
        &self,
        expected_prior_bid: Option<entities::Amount>,
        bid: &entities::Bid,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .begin()
            .await
            .map_err(|e| store_error("begin bid transaction", e))?;

        let updated = sqlx::query(
            "UPDATE auction SET highest_bid = $1, highest_bidder = $2 \
             WHERE id = $3 AND highest_bid IS NOT DISTINCT FROM $4",
        )
        .bind(bid.amount)
        .bind(bid.bidder)
        .bind(bid.auction_id)
        .bind(expected_prior_bid)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("conditional auction update", e))?;

        if updated.rows_affected() == 0 {
            // A concurrent bid changed the price since it was read.
            tx.rollback()
                .await
                .map_err(|e| store_error("rollback bid transaction", e))?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO bid (id, auction_id, bidder, amount, submission_time) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(bid.id)
        .bind(bid.auction_id)
        .bind(bid.bidder)
        .bind(bid.amount)
        .bind(bid.submission_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("insert bid", e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("commit bid transaction", e))?;
        Ok(true)
    }

    async fn update_auction_status(
        &self,
        auction_id: entities::AuctionId,
        from: entities::AuctionStatus,
        to: entities::AuctionStatus,
    ) -> Result<bool, StoreError> {
        let updated = sqlx::query("UPDATE auction SET status = $1 WHERE id = $2 AND status = $3")
            .bind(to)
            .bind(auction_id)
            .bind(from)
            .execute(self)
            .await
            .map_err(|e| store_error("update auction status", e))?;
        Ok(updated.rows_affected() == 1)
    }

    async fn list_boundary_crossed(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<entities::Auction>, StoreError> {
        let rows: Vec<AuctionRow> = sqlx::query_as(
            "SELECT * FROM auction \
             WHERE (status = 'scheduled' AND start_time <= $1) \
                OR (status = 'active' AND end_time <= $1) \
             ORDER BY creation_time ASC",
        )
        .bind(now)
        .fetch_all(self)
        .await
        .map_err(|e| store_error("list boundary crossed", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
