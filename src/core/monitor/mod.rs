// src/core/monitor/mod.rs

//! Per-role monitoring: one observation tick per supervisor iteration,
//! dispatched over the tagged role variant.

pub mod standby;
pub mod witness;

pub use standby::StandbyMonitor;
pub use witness::WitnessMonitor;

use crate::core::errors::WardenError;
use crate::core::liveness;
use crate::core::supervisor::WardenContext;

/// What the supervisor should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Sleep one interval and tick again.
    Continue,
    /// The cluster topology changed; re-detect the local role.
    Reelect,
}

/// The primary role has no replication to observe; its tick is a bare
/// liveness check on the node the daemon exists to supervise.
#[derive(Debug, Default)]
pub struct PrimaryMonitor;

impl PrimaryMonitor {
    pub async fn tick(&mut self, ctx: &mut WardenContext) -> Result<Tick, WardenError> {
        if !liveness::check(&ctx.local, &ctx.config).await {
            return Err(WardenError::DbConnection(
                "lost the connection to the local primary database".into(),
            ));
        }
        Ok(Tick::Continue)
    }
}

/// The role-dispatched monitor.
#[derive(Debug)]
pub enum Monitor {
    Primary(PrimaryMonitor),
    Standby(StandbyMonitor),
    Witness(WitnessMonitor),
}

impl Monitor {
    pub async fn tick(&mut self, ctx: &mut WardenContext) -> Result<Tick, WardenError> {
        match self {
            Monitor::Primary(monitor) => monitor.tick(ctx).await,
            Monitor::Standby(monitor) => monitor.tick(ctx).await,
            Monitor::Witness(monitor) => monitor.tick(ctx).await,
        }
    }
}
