// src/core/liveness.rs

//! Bounded retry probing of a database session.

use crate::config::Config;
use crate::core::session::DbSession;
use std::time::Duration;
use tokio::time;
use tracing::{info, warn};

/// Probes `session` up to `attempts` times with `interval` between
/// failed attempts, each probe bounded by `probe_timeout`. Returns on
/// the first success; worst case takes `attempts * (probe_timeout +
/// interval)`.
pub async fn is_alive(
    session: &DbSession,
    attempts: u32,
    interval: Duration,
    probe_timeout: Duration,
) -> bool {
    let attempts = attempts.max(1);
    let mut failures = 0u32;
    for attempt in 1..=attempts {
        match session.probe(probe_timeout).await {
            Ok(()) => {
                if failures > 0 {
                    info!(
                        "connection to '{}' recovered after {failures} failed probe(s)",
                        session.conninfo()
                    );
                }
                return true;
            }
            Err(e) => {
                failures += 1;
                warn!("probe attempt {attempt}/{attempts} failed: {e}");
                if attempt < attempts {
                    time::sleep(interval).await;
                }
            }
        }
    }
    false
}

/// `is_alive` with the retry budget taken from the configuration.
pub async fn check(session: &DbSession, config: &Config) -> bool {
    is_alive(
        session,
        config.reconnect_attempts,
        config.reconnect_interval(),
        config.master_response_timeout(),
    )
    .await
}
