use {
    super::repository::Repository,
    crate::{
        api::ws::UpdateEvent,
        config::AuctionConfig,
    },
    std::sync::Arc,
    tokio::sync::broadcast,
};

pub mod add_auction;
pub mod cancel_auction;
pub mod get_auction;
pub mod place_bid;
pub mod sweep;
pub mod verification;
pub mod workers;

pub struct ServiceInner {
    config:       AuctionConfig,
    repo:         Repository,
    // TODO the event payloads live in the api layer; move them to a
    // transport-neutral module so the service does not depend on api types.
    event_sender: broadcast::Sender<UpdateEvent>,
}

#[derive(Clone)]
pub struct Service(Arc<ServiceInner>);

impl std::ops::Deref for Service {
    type Target = ServiceInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Service {
    pub fn new(
        repo: Repository,
        config: AuctionConfig,
        event_sender: broadcast::Sender<UpdateEvent>,
    ) -> Self {
        Self(Arc::new(ServiceInner {
            config,
            repo,
            event_sender,
        }))
    }

    /// Fans the event out to everyone currently subscribed; never blocks and
    /// never fails the caller. A send error only means there is no receiver
    /// alive, which cannot happen while the server holds one.
    pub(super) fn emit(&self, event: UpdateEvent) {
        if let Err(e) = self.event_sender.send(event) {
            tracing::debug!(error = ?e, "No active receiver for update event");
        }
    }
}

#[cfg(test)]
pub mod tests {
    use {
        super::Service,
        crate::{
            api::ws::UpdateEvent,
            auction::repository::{
                MockDatabase,
                Repository,
            },
            config::AuctionConfig,
        },
        tokio::sync::broadcast,
    };

    impl Service {
        pub fn new_with_mocks(
            db: MockDatabase,
            config: AuctionConfig,
        ) -> (Self, broadcast::Receiver<UpdateEvent>) {
            let (event_sender, event_receiver) = broadcast::channel(16);
            (
                Service::new(Repository::new(db), config, event_sender),
                event_receiver,
            )
        }
    }
}
