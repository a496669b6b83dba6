use {
    crate::{
        api::ws::WsState,
        auction::service::Service as AuctionService,
    },
    sqlx::{
        Pool,
        Postgres,
    },
    std::sync::Arc,
    tokio_util::task::TaskTracker,
};

pub type DB = Pool<Postgres>;

/// Shared process state reachable from every request handler.
pub struct Store {
    pub db: DB,
    pub ws: WsState,
}

pub struct StoreNew {
    pub store:           Arc<Store>,
    pub auction_service: AuctionService,
    pub task_tracker:    TaskTracker,
}
