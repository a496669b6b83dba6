use {
    super::Service,
    crate::server::{
        EXIT_CHECK_INTERVAL,
        SHOULD_EXIT,
    },
    anyhow::Result,
    std::sync::atomic::Ordering,
};

impl Service {
    /// Drives the lifecycle sweep until shutdown. The interval ticks
    /// immediately, so transitions missed while the process was down are
    /// applied at boot rather than waiting a full period. A failed sweep is
    /// logged and retried on the next tick.
    pub async fn run_sweep_loop(self) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        while !SHOULD_EXIT.load(Ordering::Acquire) {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_statuses().await {
                        tracing::error!(error = ?e, "Status sweep failed");
                    }
                }
                _ = tokio::time::sleep(EXIT_CHECK_INTERVAL) => {}
            }
        }
        tracing::info!("Shutting down sweep loop...");
        Ok(())
    }
}
