mod add_auction;
mod apply_bid;
mod get_auction;
mod models;
mod update_status;

pub use models::*;

/// Seam between the auction service and the durable store. Holds the store
/// behind the [`Database`] trait so tests can substitute a mock.
pub struct Repository {
    db: Box<dyn Database>,
}

impl Repository {
    pub fn new(db: impl Database) -> Self {
        Self { db: Box::new(db) }
    }
}
