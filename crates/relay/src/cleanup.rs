//! Periodic sweep task with an explicit start/stop lifecycle.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    relaydesk_channels::InboundEvent,
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::engine::RelayEngine;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Feeds [`InboundEvent::CleanupTick`] into the engine on a fixed interval,
/// independent of inbound traffic.
pub struct CleanupScheduler {
    engine: Arc<RelayEngine>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl CleanupScheduler {
    pub fn new(engine: Arc<RelayEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Spawn the tick loop. Calling `start` while running is a no-op.
    /// The first tick fires one full interval after start.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let engine = Arc::clone(&self.engine);
        let token = cancel.clone();
        let period = self.interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("cleanup tick");
                        let _ = engine.handle(InboundEvent::CleanupTick).await;
                    },
                }
            }
        });

        *running = Some(Running { cancel, handle });
        info!(interval_secs = self.interval.as_secs(), "cleanup scheduler started");
    }

    /// Cancel the tick loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if join_loop(handle).await {
                info!("cleanup scheduler stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Wait for the tick loop; `false` when it panicked or was aborted.
async fn join_loop(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "cleanup task panicked");
            false
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_reports_a_panicked_loop() {
        let finished = tokio::spawn(async {});
        assert!(join_loop(finished).await);

        let panicked = tokio::spawn(async { panic!("tick failed") });
        assert!(!join_loop(panicked).await);
    }
}
