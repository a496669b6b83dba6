use {
    crate::{
        auction::{
            api::{
                process_bid,
                BidCreate,
                BidResponse,
            },
            entities::{
                AuctionId,
                AuctionStatus,
                BidId,
                ResolvedAuction,
                UserId,
            },
            service::get_auction::GetAuctionInput,
        },
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
        state::StoreNew,
    },
    anyhow::{
        anyhow,
        Result,
    },
    axum::{
        extract::{
            ws::{
                Message,
                WebSocket,
            },
            State,
            WebSocketUpgrade,
        },
        http::HeaderMap,
        response::IntoResponse,
    },
    futures::{
        stream::{
            SplitSink,
            SplitStream,
        },
        SinkExt,
        StreamExt,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        collections::{
            HashMap,
            HashSet,
        },
        future::Future,
        net::IpAddr,
        sync::{
            atomic::{
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    time::OffsetDateTime,
    tokio::sync::{
        broadcast,
        RwLock,
        Semaphore,
    },
    tracing::Instrument,
    utoipa::ToSchema,
};

pub type SubscriberId = usize;

/// Tracks which connected clients are interested in which auctions. Join and
/// leave are idempotent; nothing here is persisted, clients rejoin after a
/// restart.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<AuctionId, HashSet<SubscriberId>>>,
}

impl SubscriptionRegistry {
    pub async fn join(&self, client: SubscriberId, auction_id: AuctionId) {
        self.subscriptions
            .write()
            .await
            .entry(auction_id)
            .or_default()
            .insert(client);
    }

    pub async fn leave(&self, client: SubscriberId, auction_id: AuctionId) {
        let mut write_guard = self.subscriptions.write().await;
        if let Some(clients) = write_guard.get_mut(&auction_id) {
            clients.remove(&client);
            if clients.is_empty() {
                write_guard.remove(&auction_id);
            }
        }
    }

    /// Called synchronously with a disconnect; drops every subscription the
    /// client holds.
    pub async fn leave_all(&self, client: SubscriberId) {
        let mut write_guard = self.subscriptions.write().await;
        write_guard.retain(|_, clients| {
            clients.remove(&client);
            !clients.is_empty()
        });
    }

    /// Snapshot of the clients subscribed to an auction at the moment of the
    /// call. Writes racing with the snapshot may or may not be observed.
    pub async fn subscribers_of(&self, auction_id: AuctionId) -> HashSet<SubscriberId> {
        self.subscriptions
            .read()
            .await
            .get(&auction_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_subscribed(&self, client: SubscriberId, auction_id: AuctionId) -> bool {
        self.subscriptions
            .read()
            .await
            .get(&auction_id)
            .map(|clients| clients.contains(&client))
            .unwrap_or(false)
    }
}

pub struct WsState {
    pub requester_ip_header_name: String,
    subscriber_counter:           AtomicUsize,
    subscriber_per_ip:            RwLock<HashMap<IpAddr, HashSet<SubscriberId>>>,
    pub registry:                 SubscriptionRegistry,
    pub broadcast_sender:         broadcast::Sender<UpdateEvent>,
    pub broadcast_receiver:       broadcast::Receiver<UpdateEvent>,
}

const MAXIMUM_SUBSCRIBERS_PER_IP: usize = 10;

impl WsState {
    pub fn new(requester_ip_header_name: String, broadcast_channel_size: usize) -> Self {
        let (broadcast_sender, broadcast_receiver) = broadcast::channel(broadcast_channel_size);
        Self {
            requester_ip_header_name,
            subscriber_counter: AtomicUsize::new(0),
            subscriber_per_ip: RwLock::new(HashMap::new()),
            registry: SubscriptionRegistry::default(),
            broadcast_sender,
            broadcast_receiver,
        }
    }

    /// If the specified IP address has too many open websocket connections, this function will
    /// return none. Otherwise, it will return the new subscriber id.
    pub async fn get_new_subscriber_id(&self, ip: Option<IpAddr>) -> Option<SubscriberId> {
        let id = self.subscriber_counter.fetch_add(1, Ordering::SeqCst);
        if let Some(ip) = ip {
            let mut write_guard = self.subscriber_per_ip.write().await;
            let ids = write_guard.entry(ip).or_insert_with(HashSet::new);
            if ids.len() >= MAXIMUM_SUBSCRIBERS_PER_IP {
                return None;
            }
            ids.insert(id);
        }
        Some(id)
    }

    pub async fn remove_subscriber(&self, id: SubscriberId, ip: Option<IpAddr>) {
        if let Some(ip) = ip {
            let mut write_guard = self.subscriber_per_ip.write().await;
            if let Some(ids) = write_guard.get_mut(&ip) {
                ids.remove(&id);
                if ids.is_empty() {
                    write_guard.remove(&ip);
                }
            }
        }
        self.registry.leave_all(id).await;
    }
}

/// A price change accepted by the bid admission path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct BidAcceptedEvent {
    #[schema(value_type = uuid::Uuid)]
    pub auction_id:         AuctionId,
    #[schema(value_type = uuid::Uuid)]
    pub bid_id:             BidId,
    pub new_price:          i64,
    #[schema(value_type = uuid::Uuid)]
    pub new_highest_bidder: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp:          OffsetDateTime,
}

/// A lifecycle transition applied by the status sweep or an explicit cancel.
/// Idempotent to receive more than once.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct AuctionStatusChangedEvent {
    #[schema(value_type = uuid::Uuid)]
    pub auction_id: AuctionId,
    pub new_status: AuctionStatus,
    pub auction:    ResolvedAuction,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp:  OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpdateEvent {
    BidAccepted(BidAcceptedEvent),
    AuctionStatusChanged(AuctionStatusChangedEvent),
}

impl UpdateEvent {
    fn auction_id(&self) -> AuctionId {
        match self {
            UpdateEvent::BidAccepted(event) => event.auction_id,
            UpdateEvent::AuctionStatusChanged(event) => event.auction_id,
        }
    }
}

#[derive(Deserialize, Clone, ToSchema, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe {
        #[schema(value_type = Vec<uuid::Uuid>)]
        auction_ids: Vec<AuctionId>,
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        #[schema(value_type = Vec<uuid::Uuid>)]
        auction_ids: Vec<AuctionId>,
    },
    #[serde(rename = "post_bid")]
    PostBid { bid: BidCreate },
}

#[derive(Deserialize, Clone, ToSchema, Serialize)]
pub struct ClientRequest {
    pub id:  String,
    #[serde(flatten)]
    pub msg: ClientMessage,
}

/// This enum is used to send an update to the client for any subscriptions made.
#[derive(Serialize, Clone, ToSchema, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerUpdateResponse {
    #[serde(rename = "bid_accepted")]
    BidAccepted { bid: BidAcceptedEvent },
    #[serde(rename = "auction_status_changed")]
    AuctionStatusChanged { update: AuctionStatusChangedEvent },
}

#[derive(Serialize, Clone, ToSchema, Deserialize, Debug)]
#[serde(untagged)]
pub enum APIResponse {
    BidResult(BidResponse),
}

#[derive(Serialize, Clone, ToSchema, Deserialize, Debug)]
#[serde(tag = "status", content = "result")]
pub enum ServerResultMessage {
    #[serde(rename = "success")]
    Success(Option<APIResponse>),
    #[serde(rename = "error")]
    Err(String),
}

/// This enum is used to send the result for a specific client request with the same id.
/// Id is only None when the client message is invalid.
#[derive(Serialize, ToSchema, Deserialize, Clone, Debug)]
pub struct ServerResultResponse {
    pub id:     Option<String>,
    #[serde(flatten)]
    pub result: ServerResultMessage,
}

pub async fn ws_route_handler(
    ws: WebSocketUpgrade,
    State(store): State<Arc<StoreNew>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ws_state = &store.store.ws;
    let requester_ip = headers
        .get(ws_state.requester_ip_header_name.as_str())
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next()) // Only take the first ip if there are multiple
        .and_then(|value| value.parse().ok());

    if requester_ip.is_none() {
        tracing::warn!("Failed to get requester IP address");
    }

    match ws_state.get_new_subscriber_id(requester_ip).await {
        Some(subscriber_id) => {
            ws.on_upgrade(move |socket| websocket_handler(socket, store, subscriber_id, requester_ip))
        }
        None => crate::api::RestError::BadParameters(
            "Too many open websocket connections".to_string(),
        )
        .into_response(),
    }
}

async fn websocket_handler(
    stream: WebSocket,
    state: Arc<StoreNew>,
    subscriber_id: SubscriberId,
    requester_ip: Option<IpAddr>,
) {
    let ws_state = &state.store.ws;
    let (sender, receiver) = stream.split();
    let new_receiver = ws_state.broadcast_receiver.resubscribe();
    let mut subscriber = Subscriber::new(subscriber_id, state.clone(), new_receiver, receiver, sender);
    subscriber.run().await;
    // Synchronous with the disconnect: all subscriptions are gone before this
    // returns.
    state
        .store
        .ws
        .remove_subscriber(subscriber_id, requester_ip)
        .await;
}

/// Subscriber is an actor that handles a single websocket connection. It
/// listens to the broadcast channel for updates on the auctions the client
/// joined and forwards them in publish order.
pub struct Subscriber {
    id:                  SubscriberId,
    closed:              bool,
    store:               Arc<StoreNew>,
    notify_receiver:     broadcast::Receiver<UpdateEvent>,
    receiver:            SplitStream<WebSocket>,
    sender:              SplitSink<WebSocket, Message>,
    ping_interval:       tokio::time::Interval,
    exit_check_interval: tokio::time::Interval,
    responded_to_ping:   bool,
    active_requests:     Arc<Semaphore>,
    response_sender:     broadcast::Sender<ServerResultResponse>,
    response_receiver:   broadcast::Receiver<ServerResultResponse>,
}

const PING_INTERVAL_DURATION: Duration = Duration::from_secs(30);

const MAX_ACTIVE_REQUESTS: usize = 50;

fn ok_response(id: String) -> ServerResultResponse {
    ServerResultResponse {
        id:     Some(id),
        result: ServerResultMessage::Success(None),
    }
}

impl Subscriber {
    pub fn new(
        id: SubscriberId,
        store: Arc<StoreNew>,
        notify_receiver: broadcast::Receiver<UpdateEvent>,
        receiver: SplitStream<WebSocket>,
        sender: SplitSink<WebSocket, Message>,
    ) -> Self {
        let (response_sender, response_receiver) = broadcast::channel(100);
        Self {
            id,
            closed: false,
            store,
            notify_receiver,
            receiver,
            sender,
            ping_interval: tokio::time::interval(PING_INTERVAL_DURATION),
            exit_check_interval: tokio::time::interval(EXIT_CHECK_INTERVAL),
            responded_to_ping: true, // We start with true so we don't close the connection immediately
            active_requests: Arc::new(Semaphore::new(MAX_ACTIVE_REQUESTS)),
            response_sender,
            response_receiver,
        }
    }

    pub async fn run(&mut self) {
        while !self.closed {
            if let Err(e) = self.handle_next().await {
                tracing::debug!(subscriber = self.id, error = ?e, "Error Handling Subscriber Message.");
                break;
            }
        }
    }

    async fn handle_next(&mut self) -> Result<()> {
        tokio::select! {
            maybe_update_event = self.notify_receiver.recv() => {
                match maybe_update_event {
                    Ok(event) => self.handle_update(event).await,
                    // A lagged receiver means this client's queue overflowed;
                    // dropping the connection keeps the publisher unblocked.
                    Err(e) => Err(anyhow!("Error receiving update event: {:?}", e)),
                }
            },
            maybe_message_or_err = self.receiver.next() => {
                self.handle_client_message(
                    maybe_message_or_err.ok_or(anyhow!("Client channel is closed"))??
                ).await
            },
            response_received = self.response_receiver.recv() => {
                match response_received {
                    Ok(response) => {
                        self.sender.send(serde_json::to_string(&response)?.into()).await?;
                    }
                    Err(e) => {
                        tracing::warn!(
                            subscriber = self.id,
                            error = ?e,
                            "Error Handling Subscriber Response Message."
                        );
                    }
                }
                Ok(())
            },
            _ = self.ping_interval.tick() => {
                if !self.responded_to_ping {
                    return Err(anyhow!("Subscriber did not respond to ping. Closing connection."));
                }
                self.responded_to_ping = false;
                self.sender.send(Message::Ping(vec![])).await?;
                Ok(())
            },
            _ = self.exit_check_interval.tick() => {
                if SHOULD_EXIT.load(Ordering::Acquire) {
                    self.sender.close().await?;
                    self.closed = true;
                    return Err(anyhow!("Application is shutting down. Closing connection."));
                }
                Ok(())
            }
        }
    }

    async fn handle_update(&mut self, event: UpdateEvent) -> Result<()> {
        let registry = &self.store.store.ws.registry;
        if !registry.is_subscribed(self.id, event.auction_id()).await {
            // Irrelevant update
            return Ok(());
        }
        let message = match event {
            UpdateEvent::BidAccepted(bid) => {
                serde_json::to_string(&ServerUpdateResponse::BidAccepted { bid })?
            }
            UpdateEvent::AuctionStatusChanged(update) => {
                serde_json::to_string(&ServerUpdateResponse::AuctionStatusChanged { update })?
            }
        };
        self.sender.send(message.into()).await?;
        Ok(())
    }

    async fn handle_subscribe(&mut self, message_id: String, auction_ids: Vec<AuctionId>) {
        let mut not_found = Vec::new();
        for auction_id in &auction_ids {
            if self
                .store
                .auction_service
                .get_auction(GetAuctionInput {
                    auction_id: *auction_id,
                })
                .await
                .is_err()
            {
                not_found.push(*auction_id);
            }
        }

        // If there is a single auction id that is not found, we don't subscribe to any of the
        // asked correct auction ids and return an error to be more explicit and clear.
        let resp = if !not_found.is_empty() {
            ServerResultResponse {
                id:     Some(message_id),
                result: ServerResultMessage::Err(format!(
                    "Auction(s) with id(s) {:?} not found",
                    not_found
                )),
            }
        } else {
            let registry = &self.store.store.ws.registry;
            for auction_id in auction_ids {
                registry.join(self.id, auction_id).await;
            }
            ok_response(message_id)
        };
        Self::send_response(&self.response_sender, resp);
    }

    async fn handle_unsubscribe(&mut self, message_id: String, auction_ids: Vec<AuctionId>) {
        let registry = &self.store.store.ws.registry;
        for auction_id in auction_ids {
            registry.leave(self.id, auction_id).await;
        }
        Self::send_response(&self.response_sender, ok_response(message_id));
    }

    fn send_response(
        response_sender: &broadcast::Sender<ServerResultResponse>,
        response: ServerResultResponse,
    ) {
        if let Err(e) = response_sender.send(response) {
            tracing::warn!(error = ?e, "Error sending response to subscriber");
        }
    }

    async fn spawn_deferred(
        &mut self,
        fut: impl Future<Output = ServerResultResponse> + Send + 'static,
    ) {
        let permit = self
            .active_requests
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore should not be closed");
        let response_sender = self.response_sender.clone();
        self.store.task_tracker.spawn(
            async move {
                let resp = fut.await;
                Self::send_response(&response_sender, resp);
                drop(permit);
            }
            .in_current_span(),
        );
    }

    async fn handle_post_bid(&mut self, message_id: String, bid: BidCreate) {
        let store = self.store.clone();
        self.spawn_deferred(async move {
            match process_bid(store, bid).await {
                Ok(bid_response) => ServerResultResponse {
                    id:     Some(message_id),
                    result: ServerResultMessage::Success(Some(APIResponse::BidResult(
                        bid_response,
                    ))),
                },
                Err(e) => ServerResultResponse {
                    id:     Some(message_id),
                    result: ServerResultMessage::Err(e.to_status_and_message().1),
                },
            }
        })
        .await;
    }

    async fn handle_client_message(&mut self, message: Message) -> Result<()> {
        let maybe_client_message = match message {
            Message::Close(_) => {
                // Send the close message to gracefully shut down the connection
                // Otherwise the client might get an abnormal Websocket closure
                // error.
                self.sender.close().await?;
                self.closed = true;
                return Ok(());
            }
            Message::Text(text) => serde_json::from_str::<ClientRequest>(&text),
            Message::Binary(data) => serde_json::from_slice::<ClientRequest>(&data),
            Message::Ping(_) => {
                // Axum will send Pong automatically
                return Ok(());
            }
            Message::Pong(_) => {
                self.responded_to_ping = true;
                return Ok(());
            }
        };

        match maybe_client_message {
            Err(e) => {
                Self::send_response(
                    &self.response_sender,
                    ServerResultResponse {
                        id:     None,
                        result: ServerResultMessage::Err(e.to_string()),
                    },
                );
            }
            Ok(ClientRequest { msg, id }) => match msg {
                ClientMessage::Subscribe { auction_ids } => {
                    self.handle_subscribe(id, auction_ids).await
                }
                ClientMessage::Unsubscribe { auction_ids } => {
                    self.handle_unsubscribe(id, auction_ids).await
                }
                ClientMessage::PostBid { bid } => self.handle_post_bid(id, bid).await,
            },
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        uuid::Uuid,
    };

    #[tokio::test]
    async fn test_registry_join_and_leave_are_idempotent() {
        let registry = SubscriptionRegistry::default();
        let auction_id = Uuid::new_v4();

        registry.join(1, auction_id).await;
        registry.join(1, auction_id).await;
        assert_eq!(
            registry.subscribers_of(auction_id).await,
            HashSet::from([1])
        );

        registry.leave(1, auction_id).await;
        registry.leave(1, auction_id).await;
        assert!(registry.subscribers_of(auction_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_registry_tracks_many_to_many() {
        let registry = SubscriptionRegistry::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.join(1, first).await;
        registry.join(1, second).await;
        registry.join(2, first).await;

        assert_eq!(
            registry.subscribers_of(first).await,
            HashSet::from([1, 2])
        );
        assert_eq!(registry.subscribers_of(second).await, HashSet::from([1]));
        assert!(registry.is_subscribed(1, second).await);
        assert!(!registry.is_subscribed(2, second).await);
    }

    #[tokio::test]
    async fn test_registry_leave_all_clears_every_subscription() {
        let registry = SubscriptionRegistry::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.join(1, first).await;
        registry.join(1, second).await;
        registry.join(2, first).await;
        registry.leave_all(1).await;

        assert_eq!(registry.subscribers_of(first).await, HashSet::from([2]));
        assert!(registry.subscribers_of(second).await.is_empty());
    }

    #[test]
    fn test_client_request_wire_format() {
        let auction_id = Uuid::new_v4();
        let request: ClientRequest = serde_json::from_str(&format!(
            r#"{{"id": "1", "method": "subscribe", "params": {{"auction_ids": ["{}"]}}}}"#,
            auction_id
        ))
        .unwrap();
        assert_eq!(request.id, "1");
        match request.msg {
            ClientMessage::Subscribe { auction_ids } => assert_eq!(auction_ids, vec![auction_id]),
            _ => panic!("expected subscribe"),
        }
    }
}
