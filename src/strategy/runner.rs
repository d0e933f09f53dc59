//! Scheduling loop driving the lifecycle.

use crate::config::SharedConfig;
use crate::strategy::lifecycle::{PositionLifecycle, TickOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ticks the lifecycle until shutdown is requested.
pub struct TradingLoop {
    lifecycle: PositionLifecycle,
    config: SharedConfig,
    shutdown: Arc<AtomicBool>,
}

impl TradingLoop {
    pub fn new(
        lifecycle: PositionLifecycle,
        config: SharedConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            lifecycle,
            config,
            shutdown,
        }
    }

    /// One tick plus the delay to wait before the next one.
    pub async fn step(&mut self) -> Duration {
        let execution = self.config.snapshot().await.execution;

        match self.lifecycle.tick().await {
            Ok(outcome) => {
                match &outcome {
                    TickOutcome::Idle | TickOutcome::Holding { .. } => {
                        debug!(?outcome, "Tick complete")
                    }
                    TickOutcome::Suspended(gate) => debug!(gate = gate.as_str(), "Entries suspended"),
                    TickOutcome::Opened(_) | TickOutcome::Closed(_) => {}
                }
                if self.lifecycle.is_open() {
                    execution.open_poll()
                } else {
                    execution.flat_poll()
                }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("⚠️ [LOOP] Tick failed, retrying: {}", e);
                } else {
                    error!("❌ [LOOP] Tick failed: {}", e);
                }
                self.lifecycle.record_error(&e).await;
                execution.error_backoff()
            }
        }
    }

    /// Run until the shutdown flag is set. Returns the lifecycle for a final
    /// status report.
    pub async fn run(mut self) -> PositionLifecycle {
        info!("🚀 [LOOP] Trading loop started");

        while !self.shutdown.load(Ordering::SeqCst) {
            let delay = self.step().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(delay).await;
        }

        info!("👋 [LOOP] Trading loop stopped");
        self.lifecycle
    }
}
