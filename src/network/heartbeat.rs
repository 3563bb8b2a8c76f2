//! Heartbeat Monitor
//!
//! Periodic liveness sweep over every live player: the waiting occupant
//! plus both sides of each active game. A player silent beyond the
//! threshold gets exactly one close attempt per tick; the forced close
//! surfaces through the normal disconnect path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info};

use crate::network::session::Matchmaker;

/// Sweeps the matchmaker's live players on a fixed period.
pub struct HeartbeatMonitor {
    matchmaker: Arc<Matchmaker>,
    timeout: Duration,
    sweep_interval: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor over the injected registry.
    pub fn new(matchmaker: Arc<Matchmaker>, timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            matchmaker,
            timeout,
            sweep_interval,
        }
    }

    /// Run the sweep loop until the task is aborted.
    pub async fn run(self) {
        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// Scan every live player once and close the silent ones. Returns
    /// the number of close attempts issued.
    pub async fn sweep_once(&self) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let timeout_ms = self.timeout.as_millis() as i64;

        let mut closes = 0;
        for player in self.matchmaker.live_players().await {
            let silent_for = now_ms - player.last_heartbeat_ms();
            if silent_for <= timeout_ms {
                continue;
            }

            info!(
                player = player.name(),
                silent_ms = silent_for,
                "inactive session detected, closing it"
            );
            if !player.conn().close().await {
                // Connection already torn down; the registry catches up
                // when the disconnect event lands.
                debug!(player = player.name(), "close skipped, connection already gone");
            }
            closes += 1;
        }

        closes
    }
}
