use {
    crate::{
        api::{
            self,
            ws,
        },
        auction::{
            repository::Repository,
            service::Service as AuctionService,
        },
        config::{
            Config,
            RunOptions,
        },
        state::{
            Store,
            StoreNew,
        },
    },
    anyhow::anyhow,
    futures::future::join_all,
    sqlx::postgres::PgPoolOptions,
    std::{
        sync::{
            atomic::{
                AtomicBool,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    tokio_util::task::TaskTracker,
};

const NOTIFICATIONS_CHAN_LEN: usize = 1000;

pub async fn start_server(run_options: RunOptions) -> anyhow::Result<()> {
    tokio::spawn(async move {
        tracing::info!("Registered shutdown signal handler...");
        tokio::signal::ctrl_c().await.unwrap();
        tracing::info!("Shut down signal received, waiting for tasks...");
        SHOULD_EXIT.store(true, Ordering::Release);
    });

    let config = Config::load(&run_options.config.config).map_err(|err| {
        anyhow!(
            "Failed to load config from file({path}): {:?}",
            err,
            path = run_options.config.config
        )
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&run_options.server.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(Store {
        db: pool,
        ws: ws::WsState::new(
            run_options.server.requester_ip_header_name.clone(),
            NOTIFICATIONS_CHAN_LEN,
        ),
    });

    let task_tracker = TaskTracker::new();
    let auction_service = AuctionService::new(
        Repository::new(store.db.clone()),
        config.auction,
        store.ws.broadcast_sender.clone(),
    );
    let store_new = Arc::new(StoreNew {
        store,
        auction_service: auction_service.clone(),
        task_tracker,
    });

    let sweep_loop = tokio::spawn(async move { auction_service.run_sweep_loop().await });
    let server_loop = tokio::spawn(api::start_api(run_options, store_new));
    join_all(vec![sweep_loop, server_loop]).await;
    Ok(())
}

// A static exit flag to indicate to running threads that we're shutting down. This is used to
// gracefully shutdown the application.
pub(crate) static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
pub const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
