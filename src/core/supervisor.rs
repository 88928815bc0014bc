// src/core/supervisor.rs

//! The outer control loop: detect the local role, keep the node's
//! registration current, and drive the role's monitor until something
//! (a failover, a reload, a signal) forces a re-detection.

use crate::config::Config;
use crate::core::errors::WardenError;
use crate::core::metadata::{self, NodeRecord, SchemaName};
use crate::core::monitor::{Monitor, PrimaryMonitor, StandbyMonitor, Tick, WitnessMonitor};
use crate::core::roles::{self, NodeRole};
use crate::core::session::DbSession;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time;
use tracing::{info, warn};

/// Everything the daemon's control flow owns, passed by reference into
/// the monitors and the failover coordinator. Only the supervisor flow
/// mutates it; the signal listeners touch nothing but the flags.
pub struct WardenContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub schema: SchemaName,
    /// The session to the node this daemon supervises.
    pub local: Arc<DbSession>,
    /// The session to the current primary. Aliases `local` when the
    /// local role is primary; `Arc::ptr_eq` tells the two apart and the
    /// driver is closed exactly once either way.
    pub primary: Option<Arc<DbSession>>,
    pub primary_node_id: i32,
    pub role: NodeRole,
    /// Whether monitoring-history rows are written.
    pub history: bool,
    /// Set by the coordinator after a completed failover.
    pub failover_done: bool,
    pub sighup: Arc<AtomicBool>,
    pub terminate: Arc<AtomicBool>,
}

impl WardenContext {
    pub fn primary(&self) -> Result<&Arc<DbSession>, WardenError> {
        self.primary
            .as_ref()
            .ok_or_else(|| WardenError::Internal("no primary session attached".into()))
    }

    pub fn set_primary(&mut self, session: Arc<DbSession>, node_id: i32) {
        self.primary = Some(session);
        self.primary_node_id = node_id;
    }

    pub fn clear_primary(&mut self) {
        self.primary = None;
        self.primary_node_id = 0;
    }

    pub fn primary_is_local(&self) -> bool {
        self.primary
            .as_ref()
            .is_some_and(|primary| Arc::ptr_eq(primary, &self.local))
    }

    /// This node's registration row as the current configuration and
    /// role describe it.
    pub fn node_record(&self) -> NodeRecord {
        NodeRecord {
            id: self.config.node,
            cluster: self.config.cluster.clone(),
            name: self.config.node_name.clone(),
            conninfo: self.config.conninfo.clone(),
            priority: self.config.priority,
            witness: self.role == NodeRole::Witness,
        }
    }
}

/// Runs the daemon until a signal stops it or an error terminates it.
pub async fn run(
    config: Config,
    config_path: PathBuf,
    monitoring_history: bool,
) -> Result<(), WardenError> {
    let sighup = Arc::new(AtomicBool::new(false));
    let terminate = Arc::new(AtomicBool::new(false));
    spawn_signal_listeners(Arc::clone(&sighup), Arc::clone(&terminate))?;

    let local = Arc::new(
        DbSession::connect(&config.conninfo, config.master_response_timeout()).await?,
    );
    let schema = SchemaName::for_cluster(&config.cluster);
    let mut ctx = WardenContext {
        config,
        config_path,
        schema,
        local,
        primary: None,
        primary_node_id: 0,
        role: NodeRole::Unknown,
        history: monitoring_history,
        failover_done: false,
        sighup,
        terminate,
    };

    loop {
        if ctx.terminate.load(Ordering::Relaxed) {
            info!("termination requested, shutting down");
            return Ok(());
        }
        ctx.failover_done = false;

        let role = roles::detect_role(&ctx.local, &ctx.schema, ctx.config.node).await?;
        ctx.role = role;
        info!(
            "node {} ('{}') monitoring as {role}",
            ctx.config.node, ctx.config.node_name
        );

        match role {
            NodeRole::Primary => run_as_primary(&mut ctx).await?,
            NodeRole::Standby => {
                run_following(&mut ctx, Monitor::Standby(StandbyMonitor::default())).await?
            }
            NodeRole::Witness => {
                run_following(&mut ctx, Monitor::Witness(WitnessMonitor::default())).await?
            }
            NodeRole::Unknown => {
                return Err(WardenError::Internal(
                    "role detection produced 'unknown'".into(),
                ));
            }
        }
    }
}

async fn run_as_primary(ctx: &mut WardenContext) -> Result<(), WardenError> {
    let local = Arc::clone(&ctx.local);
    ctx.set_primary(local, ctx.config.node);
    verify_registration(ctx).await?;
    tick_loop(ctx, Monitor::Primary(PrimaryMonitor)).await
}

async fn run_following(ctx: &mut WardenContext, monitor: Monitor) -> Result<(), WardenError> {
    let found =
        metadata::find_primary(&ctx.local, &ctx.schema, ctx.config.master_response_timeout())
            .await?;
    let (session, node) = found.ok_or_else(|| {
        WardenError::DbConnection("no primary found among the registered cluster nodes".into())
    })?;
    info!("following primary node {} ('{}')", node.id, node.name);
    ctx.set_primary(Arc::new(session), node.id);
    verify_registration(ctx).await?;
    tick_loop(ctx, monitor).await
}

/// The metadata tables must exist, and this node must have a record.
/// A standby registers itself on first contact; a witness must have
/// been registered by the administration tooling beforehand.
async fn verify_registration(ctx: &mut WardenContext) -> Result<(), WardenError> {
    let via = ctx.primary()?.clone();
    if !via.metadata_tables_present(&ctx.schema).await? {
        return Err(WardenError::SchemaMissing(ctx.config.cluster.clone()));
    }
    let count = via
        .count_node_rows(&ctx.schema, ctx.config.node, &ctx.config.cluster)
        .await?;
    if count == 0 {
        if ctx.role == NodeRole::Witness {
            return Err(WardenError::BadConfig(format!(
                "witness node {} is not registered in cluster '{}'",
                ctx.config.node, ctx.config.cluster
            )));
        }
        info!(
            "registering node {} ('{}') in cluster '{}'",
            ctx.config.node, ctx.config.node_name, ctx.config.cluster
        );
        let record = ctx.node_record();
        via.upsert_node_record(&ctx.schema, &record).await?;
    }
    Ok(())
}

/// The inner loop: one tick per interval until the monitor asks for a
/// re-detection, a reload replaces the sessions, or a signal stops us.
async fn tick_loop(ctx: &mut WardenContext, mut monitor: Monitor) -> Result<(), WardenError> {
    loop {
        if ctx.terminate.load(Ordering::Relaxed) {
            return Ok(());
        }
        if ctx.sighup.swap(false, Ordering::Relaxed) && reload_config(ctx).await? {
            return Ok(());
        }
        match monitor.tick(ctx).await? {
            Tick::Continue => {}
            Tick::Reelect => return Ok(()),
        }
        time::sleep(ctx.config.monitor_interval()).await;
    }
}

/// Applies a SIGHUP. Returns `true` when the sessions were reopened and
/// the caller must re-detect the role. A reload that fails to parse
/// keeps the running configuration.
async fn reload_config(ctx: &mut WardenContext) -> Result<bool, WardenError> {
    info!(
        "SIGHUP received, reloading configuration from {}",
        ctx.config_path.display()
    );
    let fresh = match Config::from_file(&ctx.config_path) {
        Ok(fresh) => fresh,
        Err(e) => {
            warn!("configuration reload failed, keeping the running configuration: {e:#}");
            return Ok(false);
        }
    };

    let conninfo_changed = fresh.conninfo != ctx.config.conninfo;
    let was_alias = ctx.primary_is_local();
    ctx.config = fresh;
    if !conninfo_changed {
        return Ok(false);
    }

    info!("conninfo changed, reopening the local session");
    ctx.local.close();
    let local = Arc::new(
        DbSession::connect(&ctx.config.conninfo, ctx.config.master_response_timeout()).await?,
    );
    ctx.local = local;

    // Push the updated record through whatever still looks like the
    // primary so peers see the new connection string.
    let via = if was_alias {
        Arc::clone(&ctx.local)
    } else {
        match &ctx.primary {
            Some(primary) => Arc::clone(primary),
            None => Arc::clone(&ctx.local),
        }
    };
    let record = ctx.node_record();
    if let Err(e) = via.upsert_node_record(&ctx.schema, &record).await {
        warn!("could not update the node registration after the reload: {e}");
    }
    Ok(true)
}

/// Installs the signal listeners. They only flip flags; the control
/// loop observes them at tick boundaries.
fn spawn_signal_listeners(
    sighup: Arc<AtomicBool>,
    terminate: Arc<AtomicBool>,
) -> Result<(), WardenError> {
    let mut hup = signal(SignalKind::hangup())
        .map_err(|e| WardenError::SysFailure(format!("cannot install the SIGHUP handler: {e}")))?;
    tokio::spawn(async move {
        while hup.recv().await.is_some() {
            sighup.store(true, Ordering::Relaxed);
        }
    });

    let mut term = signal(SignalKind::terminate()).map_err(|e| {
        WardenError::SysFailure(format!("cannot install the SIGTERM handler: {e}"))
    })?;
    let mut int = signal(SignalKind::interrupt())
        .map_err(|e| WardenError::SysFailure(format!("cannot install the SIGINT handler: {e}")))?;
    tokio::spawn(async move {
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
        info!("shutdown signal received");
        terminate.store(true, Ordering::Relaxed);
    });
    Ok(())
}
