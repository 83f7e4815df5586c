//! Background finalization of stale sessions.
//!
//! Expiry is enforced on every read, so the sweeper only moves sessions that
//! have already lapsed into their terminal state and records the audit entry.

use super::manager::{SessionManager, SweepReport};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweeperConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl SweeperConfig {
    /// Load sweeper configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("SWEEPER_ENABLED") {
            config.enabled = enabled.parse().unwrap_or(true);
        }

        if let Some(interval) = parse_env_with_prefix("SWEEPER_INTERVAL_SECS") {
            config.interval_secs = interval;
        }

        config
    }
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    30
}

/// Periodically calls [`SessionManager::sweep`].
pub struct ExpirySweeper;

impl ExpirySweeper {
    /// Start sweeping on the current runtime.
    ///
    /// Returns `None` when the sweeper is disabled.
    pub fn spawn(manager: SessionManager, config: &SweeperConfig) -> Option<SweeperHandle> {
        if !config.enabled {
            tracing::info!(target: "impersonation.sweeper", "Expiry sweeper disabled");
            return None;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = Duration::from_secs(config.interval_secs.max(1));

        let task = tokio::spawn(async move {
            tracing::info!(
                target: "impersonation.sweeper",
                interval_secs = period.as_secs(),
                "Expiry sweeper started"
            );

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        match manager.sweep().await {
                            Ok(report) if report != SweepReport::default() => {
                                tracing::info!(
                                    target: "impersonation.sweeper",
                                    expired = report.expired,
                                    timed_out = report.timed_out,
                                    exhausted = report.exhausted,
                                    purged_challenges = report.purged_challenges,
                                    "Sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(
                                    target: "impersonation.sweeper",
                                    error = %e,
                                    "Sweep failed"
                                );
                            }
                        }
                    }
                }
            }

            tracing::info!(target: "impersonation.sweeper", "Expiry sweeper stopped");
        });

        Some(SweeperHandle { shutdown_tx, task })
    }
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(target: "impersonation.sweeper", error = %e, "Sweeper task panicked");
        }
    }
}
