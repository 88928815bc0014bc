// src/core/metadata.rs

//! The cluster metadata store: the `repl_nodes` registry, the
//! `repl_monitor` telemetry log, and the shared-memory helper functions,
//! all living in a per-cluster schema inside the managed database.
//!
//! This module owns the SQL text; execution happens through
//! [`DbSession`](crate::core::session::DbSession).

use crate::core::errors::WardenError;
use crate::core::lsn::LogPos;
use crate::core::session::DbSession;
use chrono::{DateTime, Utc};
use postgres_protocol::escape::{escape_identifier, escape_literal};
use std::time::Duration;
use tokio_postgres::Row;
use tracing::debug;

/// Upper bound on node records fetched when enumerating a cluster.
pub const FAILOVER_NODES_MAX_CHECK: i64 = 50;

/// The quoted, per-cluster schema name (`repmgr_<cluster>`), escaped
/// according to PostgreSQL identifier rules so arbitrary cluster names
/// are safe to interpolate into statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaName {
    cluster: String,
    escaped: String,
}

impl SchemaName {
    pub fn for_cluster(cluster: &str) -> Self {
        let escaped = escape_identifier(&format!("repmgr_{cluster}"));
        Self {
            cluster: cluster.to_string(),
            escaped,
        }
    }

    /// The escaped schema identifier, ready for interpolation.
    pub fn quoted(&self) -> &str {
        &self.escaped
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }
}

/// One row of `repl_nodes`: the registration of a cluster member.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: i32,
    pub cluster: String,
    pub name: String,
    pub conninfo: String,
    pub priority: i32,
    pub witness: bool,
}

impl NodeRecord {
    pub fn from_row(row: &Row) -> Result<Self, WardenError> {
        let get = |idx: usize| {
            WardenError::ResultMalformed(format!("repl_nodes column {idx} has an unexpected type"))
        };
        Ok(NodeRecord {
            id: row.try_get(0).map_err(|_| get(0))?,
            cluster: row.try_get(1).map_err(|_| get(1))?,
            name: row.try_get(2).map_err(|_| get(2))?,
            conninfo: row.try_get(3).map_err(|_| get(3))?,
            priority: row.try_get(4).map_err(|_| get(4))?,
            witness: row.try_get(5).map_err(|_| get(5))?,
        })
    }
}

/// One telemetry observation, destined for `repl_monitor`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSample {
    pub primary_node: i32,
    pub standby_node: i32,
    pub last_monitor_time: DateTime<Utc>,
    pub last_apply_time: Option<DateTime<Utc>>,
    pub primary_position: LogPos,
    pub standby_position: Option<LogPos>,
    pub replication_lag: u64,
    pub apply_lag: u64,
}

pub fn list_nodes_sql(schema: &SchemaName) -> String {
    format!(
        "SELECT id, cluster, name, conninfo, priority, witness \
         FROM {}.repl_nodes WHERE cluster = $1 \
         ORDER BY priority ASC, id ASC LIMIT $2",
        schema.quoted()
    )
}

pub fn count_node_rows_sql(schema: &SchemaName) -> String {
    format!(
        "SELECT count(*) FROM {}.repl_nodes WHERE id = $1 AND cluster = $2",
        schema.quoted()
    )
}

pub fn upsert_node_sql(schema: &SchemaName) -> String {
    format!(
        "INSERT INTO {}.repl_nodes (id, cluster, name, conninfo, priority, witness) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
         cluster = EXCLUDED.cluster, name = EXCLUDED.name, \
         conninfo = EXCLUDED.conninfo, priority = EXCLUDED.priority, \
         witness = EXCLUDED.witness",
        schema.quoted()
    )
}

pub fn tables_present_sql(schema: &SchemaName) -> String {
    let nodes = escape_literal(&format!("{}.repl_nodes", schema.quoted()));
    let monitor = escape_literal(&format!("{}.repl_monitor", schema.quoted()));
    format!(
        "SELECT to_regclass({nodes}) IS NOT NULL AND to_regclass({monitor}) IS NOT NULL"
    )
}

pub fn get_last_standby_location_sql(schema: &SchemaName) -> String {
    format!("SELECT {}.repmgr_get_last_standby_location()", schema.quoted())
}

pub fn update_standby_location_sql(schema: &SchemaName, pos: LogPos) -> String {
    format!(
        "SELECT {}.repmgr_update_standby_location({})",
        schema.quoted(),
        escape_literal(&pos.to_string())
    )
}

/// Builds the complete `repl_monitor` insert as literal SQL so it can
/// be fired through `submit_async` without a parameter round-trip.
pub fn insert_monitor_sql(schema: &SchemaName, sample: &MonitorSample) -> String {
    let apply_time = match &sample.last_apply_time {
        Some(ts) => escape_literal(&ts.to_rfc3339()),
        None => "NULL".to_string(),
    };
    let standby_location = match &sample.standby_position {
        Some(pos) => escape_literal(&pos.to_string()),
        None => "NULL".to_string(),
    };
    format!(
        "INSERT INTO {}.repl_monitor (primary_node, standby_node, last_monitor_time, \
         last_apply_time, last_wal_primary_location, last_wal_standby_location, \
         replication_lag, apply_lag) \
         VALUES ({}, {}, {}, {}, {}, {}, {}, {})",
        schema.quoted(),
        sample.primary_node,
        sample.standby_node,
        escape_literal(&sample.last_monitor_time.to_rfc3339()),
        apply_time,
        escape_literal(&sample.primary_position.to_string()),
        standby_location,
        sample.replication_lag,
        sample.apply_lag,
    )
}

/// Scans the cluster's node records for a database that reports itself
/// out of recovery and returns a fresh session to it. Witnesses never
/// hold the write position and are skipped outright.
pub async fn find_primary(
    local: &DbSession,
    schema: &SchemaName,
    timeout: Duration,
) -> Result<Option<(DbSession, NodeRecord)>, WardenError> {
    let nodes = local
        .list_nodes_in_cluster(schema, schema.cluster(), FAILOVER_NODES_MAX_CHECK)
        .await?;

    for node in nodes {
        if node.witness {
            continue;
        }
        let session = match DbSession::connect(&node.conninfo, timeout).await {
            Ok(session) => session,
            Err(e) => {
                debug!("node {} ({}) not reachable: {e}", node.id, node.name);
                continue;
            }
        };
        match session.in_recovery().await {
            Ok(false) => return Ok(Some((session, node))),
            Ok(true) => session.close(),
            Err(e) => {
                debug!("recovery probe on node {} failed: {e}", node.id);
                session.close();
            }
        }
    }
    Ok(None)
}
