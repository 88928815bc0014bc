// src/core/errors.rs

//! Defines the primary error type for the entire daemon.

use thiserror::Error;

/// The main error enum, representing all possible failures within the daemon.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    BadConfig(String),

    #[error("Database connection lost: {0}")]
    DbConnection(String),

    #[error("Database query error: {0}")]
    DbQuery(String),

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Malformed query result: {0}")]
    ResultMalformed(String),

    #[error("Replication metadata schema missing for cluster '{0}'")]
    SchemaMissing(String),

    #[error("Helper extension not loaded on node '{0}'")]
    ExtensionMissing(String),

    #[error("Failover failed: {0}")]
    FailoverFail(String),

    #[error("System failure: {0}")]
    SysFailure(String),

    #[error("Local node was promoted; monitoring it as a standby is over")]
    Promoted,

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

impl WardenError {
    /// Maps each error kind onto the daemon's documented process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::BadConfig(_)
            | WardenError::SchemaMissing(_)
            | WardenError::ExtensionMissing(_) => 1,
            WardenError::DbConnection(_) | WardenError::Unreachable(_) => 6,
            WardenError::DbQuery(_)
            | WardenError::QueryFailed(_)
            | WardenError::ResultMalformed(_) => 7,
            WardenError::Promoted => 8,
            WardenError::FailoverFail(_) => 11,
            WardenError::SysFailure(_) => 13,
            WardenError::Internal(_) => 15,
        }
    }
}
