// src/core/monitor/witness.rs

//! The witness monitor: the witness replicates nothing, so its tick
//! only proves the primary is alive and, when history is on, records a
//! row carrying the primary position alone. A witness never takes part
//! in promotion; when the primary disappears it hunts for whichever
//! node now advertises itself as primary.

use crate::core::errors::WardenError;
use crate::core::liveness;
use crate::core::metadata::{self, MonitorSample, NodeRecord};
use crate::core::monitor::Tick;
use crate::core::session::DbSession;
use crate::core::supervisor::WardenContext;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

const LOCATE_BURST_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct WitnessMonitor;

impl WitnessMonitor {
    pub async fn tick(&mut self, ctx: &mut WardenContext) -> Result<Tick, WardenError> {
        if !liveness::check(&ctx.local, &ctx.config).await {
            return Err(WardenError::DbConnection(
                "lost the connection to the local witness database".into(),
            ));
        }
        let primary = ctx.primary()?.clone();
        if !liveness::check(&primary, &ctx.config).await {
            warn!("connection to primary node {} lost", ctx.primary_node_id);
            locate_new_primary(ctx).await?;
        }

        if ctx.history {
            record_sample(ctx).await;
        }
        Ok(Tick::Continue)
    }
}

/// A fast burst bounded by `master_response_timeout`, then up to
/// `reconnect_attempts` slower rounds spaced by `reconnect_interval`,
/// scanning the metadata on the still-alive local session.
async fn locate_new_primary(ctx: &mut WardenContext) -> Result<(), WardenError> {
    info!("searching the cluster for a node advertising itself as primary");

    let deadline = Instant::now() + ctx.config.master_response_timeout();
    while Instant::now() < deadline {
        if let Some((session, node)) = scan(ctx).await? {
            adopt(ctx, session, node);
            return Ok(());
        }
        time::sleep(LOCATE_BURST_INTERVAL).await;
    }

    let attempts = ctx.config.reconnect_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some((session, node)) = scan(ctx).await? {
            adopt(ctx, session, node);
            return Ok(());
        }
        debug!("no new primary yet (round {attempt}/{attempts})");
        if attempt < attempts {
            time::sleep(ctx.config.reconnect_interval()).await;
        }
    }
    Err(WardenError::DbConnection(
        "no node advertised itself as primary".into(),
    ))
}

async fn scan(ctx: &WardenContext) -> Result<Option<(DbSession, NodeRecord)>, WardenError> {
    metadata::find_primary(&ctx.local, &ctx.schema, ctx.config.master_response_timeout()).await
}

fn adopt(ctx: &mut WardenContext, session: DbSession, node: NodeRecord) {
    info!("node {} ('{}') is the new primary", node.id, node.name);
    ctx.set_primary(Arc::new(session), node.id);
}

/// The witness row: primary position only, no standby position, zero
/// lags. Failures are transient and only cost the row.
async fn record_sample(ctx: &mut WardenContext) {
    let primary = match ctx.primary() {
        Ok(primary) => primary.clone(),
        Err(e) => {
            warn!("no primary session for telemetry: {e}");
            return;
        }
    };
    let timeout = ctx.config.master_response_timeout();

    if let Err(e) = primary.cancel(timeout).await {
        warn!("could not cancel the in-flight telemetry insert: {e}");
        return;
    }
    if let Err(e) = primary.wait_idle(timeout).await {
        warn!("primary connection did not go idle: {e}");
        return;
    }

    let primary_position = match primary.current_log_position().await {
        Ok(position) => position,
        Err(e) => {
            warn!("cannot read the primary's current position: {e}");
            return;
        }
    };

    let sample = MonitorSample {
        primary_node: ctx.primary_node_id,
        standby_node: ctx.config.node,
        last_monitor_time: Utc::now(),
        last_apply_time: None,
        primary_position,
        standby_position: None,
        replication_lag: 0,
        apply_lag: 0,
    };
    primary.insert_monitor_row(&ctx.schema, &sample);
}
