// src/core/roles.rs

//! Classifies the local node's role from its cluster registration and
//! the database's own recovery state.

use crate::core::errors::WardenError;
use crate::core::metadata::{FAILOVER_NODES_MAX_CHECK, SchemaName};
use crate::core::session::DbSession;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Primary,
    Standby,
    Witness,
    Unknown,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Primary => "primary",
            NodeRole::Standby => "standby",
            NodeRole::Witness => "witness",
            NodeRole::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The witness flag wins over everything; otherwise a database in
/// recovery is a standby and one accepting writes is the primary.
pub fn classify(witness: bool, in_recovery: bool) -> NodeRole {
    if witness {
        NodeRole::Witness
    } else if in_recovery {
        NodeRole::Standby
    } else {
        NodeRole::Primary
    }
}

/// Resolves the local node's role. Any query failure is returned to the
/// caller; the supervisor treats a detection failure as fatal.
pub async fn detect_role(
    session: &DbSession,
    schema: &SchemaName,
    node_id: i32,
) -> Result<NodeRole, WardenError> {
    let nodes = session
        .list_nodes_in_cluster(schema, schema.cluster(), FAILOVER_NODES_MAX_CHECK)
        .await?;
    let witness = nodes
        .iter()
        .find(|node| node.id == node_id)
        .map(|node| node.witness)
        .unwrap_or(false);
    let in_recovery = session.in_recovery().await?;
    Ok(classify(witness, in_recovery))
}
