// src/core/failover.rs

//! The failover coordinator: entered by a standby in automatic mode
//! once the primary is unreachable. Enumerates the cluster, gates on a
//! strict majority of visible nodes, has every surviving standby
//! publish its receive position, elects the node with the highest
//! position, and drives the local promote or follow hook.

use crate::config::Config;
use crate::core::errors::WardenError;
use crate::core::lsn::LogPos;
use crate::core::metadata::{FAILOVER_NODES_MAX_CHECK, NodeRecord, SchemaName};
use crate::core::session::DbSession;
use crate::core::supervisor::WardenContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, error, info};

/// Grace period before promoting ourselves, so slower peers finish
/// publishing and reach the same verdict.
const PROMOTE_SETTLE: Duration = Duration::from_secs(5);
/// Grace period before re-following, so the winner's promote settles.
const FOLLOW_SETTLE: Duration = Duration::from_secs(10);

/// One cluster member as seen by the election, in enumeration order
/// (priority ascending, then id ascending).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: NodeRecord,
    pub is_self: bool,
    pub visible: bool,
    pub ready: bool,
    pub position: LogPos,
}

impl Candidate {
    pub fn new(record: NodeRecord, is_self: bool) -> Self {
        Self {
            record,
            is_self,
            visible: false,
            ready: false,
            position: LogPos::INVALID,
        }
    }

    /// Only a visible, ready, non-witness peer with a real position can
    /// win an election.
    pub fn electable(&self) -> bool {
        self.visible && self.ready && !self.record.witness && self.position.is_valid()
    }
}

/// Strict majority: a node seeing fewer than half of the registered
/// nodes must abstain and leave the election to the other partition.
pub fn meets_quorum(visible: usize, total: usize) -> bool {
    visible * 2 >= total
}

/// The winner holds the highest published position; candidates are
/// examined in enumeration order, so at equal positions the earlier
/// entry (lowest priority, then lowest id) prevails.
pub fn select_winner(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut winner: Option<&Candidate> = None;
    for candidate in candidates {
        if !candidate.electable() {
            continue;
        }
        match winner {
            Some(best) if candidate.position <= best.position => {}
            _ => winner = Some(candidate),
        }
    }
    winner
}

pub async fn do_failover(ctx: &mut WardenContext) -> Result<(), WardenError> {
    let config = ctx.config.clone();
    let schema = ctx.schema.clone();
    let timeout = config.master_response_timeout();
    info!(
        "primary node {} is unreachable; coordinating failover for cluster '{}'",
        ctx.primary_node_id, config.cluster
    );

    // Enumerate the cluster in election order.
    let nodes = ctx
        .local
        .list_nodes_in_cluster(&schema, &config.cluster, FAILOVER_NODES_MAX_CHECK)
        .await?;
    let total = nodes.len();
    let mut candidates: Vec<Candidate> = nodes
        .into_iter()
        .map(|record| {
            let is_self = record.id == config.node;
            Candidate::new(record, is_self)
        })
        .collect();

    // Visibility probe: a fresh, bounded connection per peer.
    let mut visible = 0usize;
    for candidate in &mut candidates {
        if candidate.is_self {
            candidate.visible = true;
            visible += 1;
            continue;
        }
        match DbSession::connect(&candidate.record.conninfo, timeout).await {
            Ok(session) => {
                candidate.visible = true;
                visible += 1;
                session.close();
            }
            Err(e) => debug!("node {} is not visible: {e}", candidate.record.id),
        }
    }

    if !meets_quorum(visible, total) {
        error!(
            "only {visible} of {total} registered nodes are visible from here; \
             the majority partition must elect without us"
        );
        return Err(WardenError::FailoverFail(format!(
            "quorum not met ({visible}/{total} nodes visible)"
        )));
    }

    // Every visible standby must be reporting a real receive position;
    // electing around a silent one would risk losing its log.
    for candidate in &candidates {
        if candidate.is_self || !candidate.visible || candidate.record.witness {
            continue;
        }
        let session = DbSession::connect(&candidate.record.conninfo, timeout)
            .await
            .map_err(|e| {
                WardenError::FailoverFail(format!(
                    "node {} disappeared during the election: {e}",
                    candidate.record.id
                ))
            })?;
        let position = session.last_received_position().await;
        session.close();
        match position {
            Ok(position) if position.is_valid() => {}
            Ok(_) => {
                return Err(WardenError::FailoverFail(format!(
                    "node {} has not received any log position",
                    candidate.record.id
                )));
            }
            Err(e) => {
                return Err(WardenError::FailoverFail(format!(
                    "cannot read the receive position of node {}: {e}",
                    candidate.record.id
                )));
            }
        }
    }

    // Publish our own position so the peers' elections see it.
    let own_position = match ctx.local.last_received_position().await {
        Ok(position) => position,
        Err(e) => {
            let _ = ctx
                .local
                .publish_standby_position(&schema, LogPos::INVALID)
                .await;
            return Err(WardenError::DbQuery(format!(
                "cannot read the local receive position: {e}"
            )));
        }
    };
    match ctx.local.publish_standby_position(&schema, own_position).await {
        Ok(true) => info!("published local receive position {own_position}"),
        Err(e @ WardenError::ExtensionMissing(_)) => {
            error!("the shared-memory helper extension is not loaded locally");
            return Err(e);
        }
        Ok(false) | Err(_) => {
            // Withdraw from the election: peers will read the sentinel
            // and never pick us.
            let _ = ctx
                .local
                .publish_standby_position(&schema, LogPos::INVALID)
                .await;
            return Err(WardenError::DbQuery(
                "cannot publish the local receive position".into(),
            ));
        }
    }

    // Wait until every reachable standby has published.
    for candidate in &mut candidates {
        if candidate.is_self {
            candidate.ready = true;
            candidate.position = own_position;
            continue;
        }
        if !candidate.visible {
            continue;
        }
        if candidate.record.witness {
            candidate.ready = true;
            continue;
        }
        match await_published_position(candidate, &schema, &config).await? {
            Some(position) => {
                candidate.ready = true;
                candidate.position = position;
                info!(
                    "node {} published position {position}",
                    candidate.record.id
                );
            }
            None => debug!(
                "node {} never published a position; skipping it",
                candidate.record.id
            ),
        }
    }

    // No session may outlive the decision; the hook owns the node now.
    ctx.local.close();
    if let Ok(primary) = ctx.primary() {
        primary.close();
    }

    match select_winner(&candidates) {
        None => {
            return Err(WardenError::FailoverFail(
                "no promotion candidate survived the election".into(),
            ));
        }
        Some(winner) if winner.is_self => {
            info!(
                "this node wins the election at position {}; promoting",
                winner.position
            );
            time::sleep(PROMOTE_SETTLE).await;
            let command = config.promote_command.as_deref().ok_or_else(|| {
                WardenError::BadConfig("election won but no promote_command is configured".into())
            })?;
            run_hook("promote", command).await?;
        }
        Some(winner) => {
            info!(
                "node {} ('{}') wins the election at position {}; re-following it",
                winner.record.id, winner.record.name, winner.position
            );
            time::sleep(FOLLOW_SETTLE).await;
            let command = config.follow_command.as_deref().ok_or_else(|| {
                WardenError::BadConfig("election lost but no follow_command is configured".into())
            })?;
            run_hook("follow", command).await?;
        }
    }

    // Reconnect and let the supervisor re-detect what this node is now.
    let local = Arc::new(DbSession::connect(&config.conninfo, timeout).await?);
    ctx.local = local;
    ctx.clear_primary();
    ctx.failover_done = true;
    info!("failover complete; re-detecting the local role");
    Ok(())
}

/// Polls one peer's published register until it holds a real position.
/// A peer that goes unreachable or keeps the sentinel past the retry
/// budget is skipped; a peer without the helper extension is fatal.
async fn await_published_position(
    candidate: &Candidate,
    schema: &SchemaName,
    config: &Config,
) -> Result<Option<LogPos>, WardenError> {
    let rounds = config.reconnect_attempts.max(1);
    for round in 1..=rounds {
        let session =
            match DbSession::connect(&candidate.record.conninfo, config.master_response_timeout())
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    debug!(
                        "node {} became unreachable while publishing: {e}",
                        candidate.record.id
                    );
                    return Ok(None);
                }
            };
        let result = session.peer_last_standby_position(schema).await;
        session.close();
        match result {
            Ok(position) if position.is_valid() => return Ok(Some(position)),
            Ok(_) => debug!(
                "node {} has not published yet (round {round}/{rounds})",
                candidate.record.id
            ),
            Err(WardenError::ExtensionMissing(_)) => {
                error!(
                    "node {} does not have the shared-memory helper extension loaded",
                    candidate.record.id
                );
                return Err(WardenError::BadConfig(format!(
                    "helper extension missing on node {}",
                    candidate.record.id
                )));
            }
            Err(e) => {
                debug!(
                    "cannot read the published position of node {}: {e}",
                    candidate.record.id
                );
                return Ok(None);
            }
        }
        if round < rounds {
            time::sleep(config.reconnect_interval()).await;
        }
    }
    Ok(None)
}

/// Runs an operator hook through the shell and judges it purely by its
/// exit status.
async fn run_hook(kind: &str, command: &str) -> Result<(), WardenError> {
    info!("executing {kind} command: {command}");
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .await
        .map_err(|e| WardenError::SysFailure(format!("cannot spawn the {kind} command: {e}")))?;
    if !status.success() {
        return Err(WardenError::BadConfig(format!(
            "{kind} command exited with {status}"
        )));
    }
    info!("{kind} command completed");
    Ok(())
}
