// src/core/monitor/standby.rs

//! The standby monitor: one tick of observation against the primary,
//! and the entry point into failover coordination when the primary is
//! gone.

use crate::config::FailoverMode;
use crate::core::errors::WardenError;
use crate::core::failover;
use crate::core::liveness;
use crate::core::lsn::LogPos;
use crate::core::metadata::{self, MonitorSample};
use crate::core::monitor::Tick;
use crate::core::supervisor::WardenContext;
use chrono::Utc;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct StandbyMonitor;

impl StandbyMonitor {
    pub async fn tick(&mut self, ctx: &mut WardenContext) -> Result<Tick, WardenError> {
        if let Some(outcome) = ensure_connections(ctx).await? {
            return Ok(outcome);
        }

        // Another agent may have promoted this node underneath us; a
        // standby monitor running against a primary is a split brain.
        match ctx.local.in_recovery().await {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    "local node {} reports itself primary while monitored as a standby; \
                     refusing to continue",
                    ctx.config.node
                );
                return Err(WardenError::BadConfig(
                    "local node left recovery outside a coordinated failover".into(),
                ));
            }
            Err(e) => {
                warn!("recovery re-check failed, skipping this tick: {e}");
                return Ok(Tick::Continue);
            }
        }

        if ctx.history {
            record_sample(ctx).await;
        }
        Ok(Tick::Continue)
    }
}

/// Shared prologue: both sessions must be alive before observing.
/// A dead local session is fatal; a dead primary session branches on
/// the configured failover mode.
async fn ensure_connections(ctx: &mut WardenContext) -> Result<Option<Tick>, WardenError> {
    if !liveness::check(&ctx.local, &ctx.config).await {
        return Err(WardenError::DbConnection(
            "lost the connection to the local database".into(),
        ));
    }
    let primary = ctx.primary()?.clone();
    if liveness::check(&primary, &ctx.config).await {
        return Ok(None);
    }

    warn!("connection to primary node {} lost", ctx.primary_node_id);
    match ctx.config.failover {
        FailoverMode::Manual => {
            reacquire_primary(ctx).await?;
            Ok(None)
        }
        FailoverMode::Automatic => {
            failover::do_failover(ctx).await?;
            Ok(Some(Tick::Reelect))
        }
    }
}

/// Manual failover mode: wait for an operator to bring a primary back,
/// rescanning the cluster metadata between sleeps.
async fn reacquire_primary(ctx: &mut WardenContext) -> Result<(), WardenError> {
    info!("manual failover mode: waiting for a primary to become available");
    let attempts = ctx.config.reconnect_attempts.max(1);
    for attempt in 1..=attempts {
        // An operator promoting this node ends the wait for good.
        match ctx.local.in_recovery().await {
            Ok(false) => return Err(WardenError::Promoted),
            Ok(true) => {}
            Err(e) => warn!("recovery probe failed while waiting for a primary: {e}"),
        }
        match metadata::find_primary(&ctx.local, &ctx.schema, ctx.config.master_response_timeout())
            .await
        {
            Ok(Some((session, node))) => {
                info!("primary node {} ('{}') is available again", node.id, node.name);
                ctx.set_primary(Arc::new(session), node.id);
                return Ok(());
            }
            Ok(None) => debug!("no primary found (attempt {attempt}/{attempts})"),
            Err(e) => warn!("cluster scan failed (attempt {attempt}/{attempts}): {e}"),
        }
        if attempt < attempts {
            time::sleep(ctx.config.retry_promote_interval()).await;
        }
    }
    Err(WardenError::DbConnection(
        "no primary became available within the retry budget".into(),
    ))
}

/// One telemetry observation. Failures here are transient: they are
/// logged and the tick simply produces no row.
async fn record_sample(ctx: &mut WardenContext) {
    let primary = match ctx.primary() {
        Ok(primary) => primary.clone(),
        Err(e) => {
            warn!("no primary session for telemetry: {e}");
            return;
        }
    };
    let timeout = ctx.config.master_response_timeout();

    // Drain last tick's insert so the position pair below is not read
    // around an in-flight write.
    if let Err(e) = primary.cancel(timeout).await {
        warn!("could not cancel the in-flight telemetry insert: {e}");
        return;
    }
    if let Err(e) = primary.wait_idle(timeout).await {
        warn!("primary connection did not go idle: {e}");
        return;
    }

    let now = Utc::now();
    let received = match ctx.local.last_received_position().await {
        Ok(position) => position,
        Err(e) => {
            warn!("cannot read the local receive position: {e}");
            return;
        }
    };
    let (replayed, last_apply) = match ctx.local.last_replayed_position_and_timestamp().await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("cannot read the local replay position: {e}");
            return;
        }
    };
    let primary_position = match primary.current_log_position().await {
        Ok(position) => position,
        Err(e) => {
            warn!("cannot read the primary's current position: {e}");
            return;
        }
    };

    let (replication_lag, clamped) = LogPos::saturating_lag(primary_position, received);
    if clamped {
        warn!(
            "receive position {received} is ahead of the primary position {primary_position}; \
             clamping replication lag to 0"
        );
    }
    let (apply_lag, clamped) = LogPos::saturating_lag(received, replayed);
    if clamped {
        warn!(
            "replay position {replayed} is ahead of the receive position {received}; \
             clamping apply lag to 0"
        );
    }

    let sample = MonitorSample {
        primary_node: ctx.primary_node_id,
        standby_node: ctx.config.node,
        last_monitor_time: now,
        last_apply_time: last_apply,
        primary_position,
        standby_position: Some(received),
        replication_lag,
        apply_lag,
    };
    primary.insert_monitor_row(&ctx.schema, &sample);
}
