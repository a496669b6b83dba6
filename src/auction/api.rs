use {
    crate::{
        api::{
            ErrorBodyResponse,
            RestError,
        },
        auction::{
            entities,
            service::{
                add_auction::AddAuctionInput,
                cancel_auction::CancelAuctionInput,
                get_auction::{
                    GetAuctionBidsInput,
                    GetResolvedAuctionInput,
                },
                place_bid::PlaceBidInput,
            },
        },
        state::StoreNew,
    },
    axum::{
        extract::{
            Path,
            State,
        },
        Json,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::sync::Arc,
    time::OffsetDateTime,
    utoipa::ToSchema,
};

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
pub struct BidCreate {
    /// The auction to bid on.
    #[schema(example = "0b03ee3e-58cc-4372-a567-0e02b2c3d479", value_type = uuid::Uuid)]
    pub auction_id: entities::AuctionId,
    /// The bidding user.
    #[schema(example = "5b6d0e29-58cc-4372-a567-0e02b2c3d479", value_type = uuid::Uuid)]
    pub bidder:     entities::UserId,
    /// Bid amount in minor currency units.
    #[schema(example = 11000)]
    pub amount:     entities::Amount,
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug, PartialEq)]
pub struct BidResponse {
    #[schema(value_type = uuid::Uuid)]
    pub id:              entities::BidId,
    #[schema(value_type = uuid::Uuid)]
    pub auction_id:      entities::AuctionId,
    #[schema(value_type = uuid::Uuid)]
    pub bidder:          entities::UserId,
    pub amount:          entities::Amount,
    #[serde(with = "time::serde::rfc3339")]
    pub submission_time: OffsetDateTime,
}

impl From<entities::Bid> for BidResponse {
    fn from(bid: entities::Bid) -> Self {
        Self {
            id:              bid.id,
            auction_id:      bid.auction_id,
            bidder:          bid.bidder,
            amount:          bid.amount,
            submission_time: bid.submission_time,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
pub struct CreateAuction {
    #[schema(value_type = uuid::Uuid)]
    pub product_id:     entities::ProductId,
    #[schema(value_type = uuid::Uuid)]
    pub created_by:     entities::UserId,
    /// Starting price in minor currency units.
    #[schema(example = 10000)]
    pub starting_price: entities::Amount,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time:     OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time:       OffsetDateTime,
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
pub struct AuctionResponse {
    #[schema(value_type = uuid::Uuid)]
    pub id:             entities::AuctionId,
    #[schema(value_type = uuid::Uuid)]
    pub product_id:     entities::ProductId,
    #[schema(value_type = uuid::Uuid)]
    pub created_by:     entities::UserId,
    pub starting_price: entities::Amount,
    pub highest_bid:    Option<entities::Amount>,
    #[schema(value_type = Option<uuid::Uuid>)]
    pub highest_bidder: Option<entities::UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time:     OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time:       OffsetDateTime,
    pub status:         entities::AuctionStatus,
}

impl From<entities::Auction> for AuctionResponse {
    fn from(auction: entities::Auction) -> Self {
        Self {
            id:             auction.id,
            product_id:     auction.product_id,
            created_by:     auction.created_by,
            starting_price: auction.starting_price,
            highest_bid:    auction.highest_bid,
            highest_bidder: auction.highest_bidder,
            start_time:     auction.start_time,
            end_time:       auction.end_time,
            status:         auction.status,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
pub struct CancelAuction {
    /// Must be the creator of the auction.
    #[schema(value_type = uuid::Uuid)]
    pub requested_by: entities::UserId,
}

pub async fn process_bid(store: Arc<StoreNew>, bid: BidCreate) -> Result<BidResponse, RestError> {
    let bid = store
        .auction_service
        .place_bid(PlaceBidInput {
            auction_id: bid.auction_id,
            bidder:     bid.bidder,
            amount:     bid.amount,
        })
        .await?;
    Ok(bid.into())
}

/// Bid on an auction.
///
/// The amount must exceed the auction's current price by at least the configured
/// minimum increment. Rejections carry the information needed to correct and resubmit.
#[utoipa::path(post, path = "/v1/bids", request_body = BidCreate, responses(
    (status = 200, description = "Bid was accepted", body = BidResponse),
    (status = 400, response = ErrorBodyResponse),
    (status = 404, description = "Auction was not found", body = ErrorBodyResponse),
),)]
pub async fn post_bid(
    State(store): State<Arc<StoreNew>>,
    Json(bid): Json<BidCreate>,
) -> Result<Json<BidResponse>, RestError> {
    process_bid(store, bid).await.map(Json)
}

/// List a new auction for a product.
///
/// The auction starts out scheduled; the lifecycle sweep activates it once its
/// start time passes.
#[utoipa::path(post, path = "/v1/auctions", request_body = CreateAuction, responses(
    (status = 200, description = "Auction was created", body = AuctionResponse),
    (status = 400, response = ErrorBodyResponse),
),)]
pub async fn post_auction(
    State(store): State<Arc<StoreNew>>,
    Json(auction): Json<CreateAuction>,
) -> Result<Json<AuctionResponse>, RestError> {
    let auction = store
        .auction_service
        .add_auction(AddAuctionInput {
            product_id:     auction.product_id,
            created_by:     auction.created_by,
            starting_price: auction.starting_price,
            start_time:     auction.start_time,
            end_time:       auction.end_time,
        })
        .await?;
    Ok(Json(auction.into()))
}

/// Query an auction with its product and user display fields resolved.
#[utoipa::path(get, path = "/v1/auctions/{auction_id}",
    params(("auction_id" = uuid::Uuid, description = "Auction id to query for")),
    responses(
        (status = 200, description = "The resolved auction", body = entities::ResolvedAuction),
        (status = 404, description = "Auction was not found", body = ErrorBodyResponse),
    )
)]
pub async fn get_auction(
    State(store): State<Arc<StoreNew>>,
    Path(auction_id): Path<entities::AuctionId>,
) -> Result<Json<entities::ResolvedAuction>, RestError> {
    let auction = store
        .auction_service
        .get_resolved_auction(GetResolvedAuctionInput { auction_id })
        .await?;
    Ok(Json(auction))
}

/// Query the accepted bids of an auction, most recent first.
#[utoipa::path(get, path = "/v1/auctions/{auction_id}/bids",
    params(("auction_id" = uuid::Uuid, description = "Auction id to query for")),
    responses(
        (status = 200, description = "Accepted bids of the auction", body = Vec<BidResponse>),
        (status = 404, description = "Auction was not found", body = ErrorBodyResponse),
    )
)]
pub async fn get_auction_bids(
    State(store): State<Arc<StoreNew>>,
    Path(auction_id): Path<entities::AuctionId>,
) -> Result<Json<Vec<BidResponse>>, RestError> {
    let bids = store
        .auction_service
        .get_auction_bids(GetAuctionBidsInput { auction_id })
        .await?;
    Ok(Json(bids.into_iter().map(BidResponse::from).collect()))
}

/// Cancel an auction before it ends.
///
/// Only the creator may cancel, and only while the auction is scheduled or active.
#[utoipa::path(post, path = "/v1/auctions/{auction_id}/cancel",
    params(("auction_id" = uuid::Uuid, description = "Auction id to cancel")),
    request_body = CancelAuction,
    responses(
        (status = 200, description = "The cancelled auction", body = AuctionResponse),
        (status = 400, response = ErrorBodyResponse),
        (status = 403, description = "Only the creator may cancel", body = ErrorBodyResponse),
        (status = 404, description = "Auction was not found", body = ErrorBodyResponse),
    )
)]
pub async fn post_cancel_auction(
    State(store): State<Arc<StoreNew>>,
    Path(auction_id): Path<entities::AuctionId>,
    Json(cancel): Json<CancelAuction>,
) -> Result<Json<AuctionResponse>, RestError> {
    let auction = store
        .auction_service
        .cancel_auction(CancelAuctionInput {
            auction_id,
            requested_by: cancel.requested_by,
        })
        .await?;
    Ok(Json(auction.into()))
}
