use {
    crate::{
        auction::{
            api::{
                AuctionResponse,
                BidCreate,
                BidResponse,
                CancelAuction,
                CreateAuction,
            },
            entities::BidError,
            repository::StoreError,
        },
        config::RunOptions,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::StoreNew,
    },
    anyhow::Result,
    axum::{
        http::StatusCode,
        response::{
            IntoResponse,
            Response,
        },
        routing::{
            get,
            post,
        },
        Json,
        Router,
    },
    clap::crate_version,
    serde::Serialize,
    std::sync::{
        atomic::Ordering,
        Arc,
    },
    tower_http::cors::CorsLayer,
    utoipa::{
        OpenApi,
        ToResponse,
        ToSchema,
    },
    utoipa_redoc::{
        Redoc,
        Servable,
    },
};

pub(crate) mod ws;

#[derive(Debug)]
pub enum RestError {
    /// The request contained invalid parameters
    BadParameters(String),
    /// The caller is not allowed to perform this operation
    Forbidden(String),
    /// The auction was not found
    AuctionNotFound,
    /// The auction is not accepting bids
    AuctionNotOpen(String),
    /// The bidder already leads the auction or owns it
    InvalidBidder,
    /// The bid amount does not clear the current price plus increment
    BidTooLow(String),
    /// The bid lost the concurrency race repeatedly; the whole operation may be retried
    BidConflict,
    /// Internal error occurred during processing the request
    TemporarilyUnavailable,
}

impl RestError {
    pub fn to_status_and_message(&self) -> (StatusCode, String) {
        match self {
            RestError::BadParameters(msg) => {
                (StatusCode::BAD_REQUEST, format!("Bad parameters: {}", msg))
            }
            RestError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            RestError::AuctionNotFound => (
                StatusCode::NOT_FOUND,
                "Auction with the specified id was not found".to_string(),
            ),
            RestError::AuctionNotOpen(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RestError::InvalidBidder => (
                StatusCode::BAD_REQUEST,
                "You already lead this auction or you are the seller".to_string(),
            ),
            RestError::BidTooLow(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RestError::BidConflict => (
                StatusCode::CONFLICT,
                "Another bid was accepted concurrently, please retry".to_string(),
            ),
            RestError::TemporarilyUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "This service is temporarily unavailable".to_string(),
            ),
        }
    }
}

impl From<BidError> for RestError {
    fn from(err: BidError) -> Self {
        match err {
            BidError::NotFound => RestError::AuctionNotFound,
            BidError::AuctionNotOpen {
                status,
                start_time,
                end_time,
            } => RestError::AuctionNotOpen(format!(
                "Auction is not open for bids: status is {}, bidding window is [{}, {})",
                status, start_time, end_time,
            )),
            BidError::InvalidBidder => RestError::InvalidBidder,
            BidError::BidTooLow {
                current_price,
                minimum_next_bid,
            } => RestError::BidTooLow(format!(
                "Bid too low: current price is {}, minimum next bid is {}",
                current_price, minimum_next_bid,
            )),
            BidError::Conflict => RestError::BidConflict,
            BidError::StoreUnavailable => RestError::TemporarilyUnavailable,
        }
    }
}

impl From<StoreError> for RestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => RestError::AuctionNotFound,
            StoreError::Unavailable => RestError::TemporarilyUnavailable,
        }
    }
}

#[derive(ToResponse, ToSchema, Serialize)]
#[response(description = "An error occurred processing the request")]
pub struct ErrorBodyResponse {
    error: String,
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let (status, msg) = self.to_status_and_message();
        (status, Json(ErrorBodyResponse { error: msg })).into_response()
    }
}

async fn root() -> String {
    format!("Gavel Auction Server API {}", crate_version!())
}

pub async fn live() -> Response {
    (StatusCode::OK, "OK").into_response()
}

pub async fn start_api(run_options: RunOptions, store: Arc<StoreNew>) -> Result<()> {
    // Make sure functions included in the paths section have distinct names, otherwise some api generators will fail
    #[derive(OpenApi)]
    #[openapi(
    paths(
    crate::auction::api::post_bid,
    crate::auction::api::post_auction,
    crate::auction::api::get_auction,
    crate::auction::api::get_auction_bids,
    crate::auction::api::post_cancel_auction,
    ),
    components(
    schemas(
    BidCreate,
    BidResponse,
    CreateAuction,
    AuctionResponse,
    CancelAuction,
    ErrorBodyResponse,
    crate::auction::entities::AuctionStatus,
    crate::auction::entities::ResolvedAuction,
    crate::auction::entities::ProductSummary,
    crate::auction::entities::UserSummary,
    ws::ClientRequest,
    ws::ClientMessage,
    ws::ServerResultMessage,
    ws::ServerResultResponse,
    ws::ServerUpdateResponse,
    ws::BidAcceptedEvent,
    ws::AuctionStatusChangedEvent,
    ),
    responses(
    ErrorBodyResponse,
    ),
    ),
    tags(
    (name = "Gavel Auction Server", description = "Gavel runs live timed auctions: it admits bids under \
    concurrent access, advances auction lifecycle states on a schedule and fans out price and status \
    changes to subscribed clients.")
    )
    )]
    struct ApiDoc;

    let auction_routes = Router::new()
        .route("/", post(crate::auction::api::post_auction))
        .route("/:auction_id", get(crate::auction::api::get_auction))
        .route("/:auction_id/bids", get(crate::auction::api::get_auction_bids))
        .route(
            "/:auction_id/cancel",
            post(crate::auction::api::post_cancel_auction),
        );
    let bid_routes = Router::new().route("/", post(crate::auction::api::post_bid));

    let v1_routes = Router::new().nest(
        "/v1",
        Router::new()
            .nest("/auctions", auction_routes)
            .nest("/bids", bid_routes)
            .route("/ws", get(ws::ws_route_handler)),
    );

    let app: Router<()> = Router::new()
        .merge(Redoc::with_url("/docs", ApiDoc::openapi()))
        .merge(v1_routes)
        .route("/", get(root))
        .route("/live", get(live))
        .layer(CorsLayer::permissive())
        .with_state(store);

    let listener = tokio::net::TcpListener::bind(&run_options.server.listen_addr).await?;
    tracing::info!("Server listening on {}", run_options.server.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            while !SHOULD_EXIT.load(Ordering::Acquire) {
                tokio::time::sleep(EXIT_CHECK_INTERVAL).await;
            }
            tracing::info!("Shutting down RPC server...");
        })
        .await?;
    Ok(())
}
