// src/core/session.rs

//! A typed wrapper over a single PostgreSQL connection.
//!
//! `DbSession` keeps the tokio-postgres client/driver pair together with
//! a cancel token and the one statement that may be in flight at a time
//! (the asynchronously submitted telemetry insert). Every operation is
//! bounded by the session's query timeout; the session itself never
//! retries, since retry policy belongs to the caller.

use crate::core::errors::WardenError;
use crate::core::lsn::LogPos;
use crate::core::metadata::{self, MonitorSample, NodeRecord, SchemaName};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, Client, NoTls, Row};
use tracing::{debug, warn};

type PendingStatement = JoinHandle<Result<u64, tokio_postgres::Error>>;

pub struct DbSession {
    client: Arc<Client>,
    cancel_token: CancelToken,
    conninfo: String,
    query_timeout: Duration,
    /// The fire-and-forget statement currently in flight, if any.
    pending: Mutex<Option<PendingStatement>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl DbSession {
    /// Opens a connection, bounded by `query_timeout`, and spawns the
    /// driver task that pumps the socket for the client's lifetime.
    pub async fn connect(conninfo: &str, query_timeout: Duration) -> Result<Self, WardenError> {
        let connect = tokio_postgres::connect(conninfo, NoTls);
        let (client, connection) = match time::timeout(query_timeout, connect).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(WardenError::Unreachable(format!(
                    "cannot connect to '{conninfo}': {e}"
                )));
            }
            Err(_) => {
                return Err(WardenError::Unreachable(format!(
                    "connection to '{conninfo}' timed out after {}s",
                    query_timeout.as_secs()
                )));
            }
        };
        let cancel_token = client.cancel_token();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("connection driver terminated: {e}");
            }
        });
        Ok(Self {
            client: Arc::new(client),
            cancel_token,
            conninfo: conninfo.to_string(),
            query_timeout,
            pending: Mutex::new(None),
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn conninfo(&self) -> &str {
        &self.conninfo
    }

    /// Tears the session down. Safe to call more than once; the driver
    /// is aborted exactly once, so an aliased handle closes cleanly.
    pub fn close(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
    }

    /// Issues a trivial query bounded by `timeout`. The session is left
    /// idle whether or not the probe succeeds.
    pub async fn probe(&self, timeout: Duration) -> Result<(), WardenError> {
        match time::timeout(timeout, self.client.simple_query("SELECT 1")).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(WardenError::Unreachable(format!("probe failed: {e}"))),
            Err(_) => Err(WardenError::Unreachable(format!(
                "probe timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Fires a statement without awaiting its result. The caller must
    /// drain it through `cancel` or `wait_idle` before the next typed
    /// read on this session. An older un-drained statement is aborted.
    pub fn submit_async(&self, sql: String) {
        let client = Arc::clone(&self.client);
        let handle = tokio::spawn(async move { client.execute(sql.as_str(), &[]).await });
        if let Some(stale) = self.pending.lock().replace(handle) {
            stale.abort();
        }
    }

    /// Cancels any in-flight statement and waits for the session to go
    /// idle within `timeout`.
    pub async fn cancel(&self, timeout: Duration) -> Result<(), WardenError> {
        let Some(handle) = self.pending.lock().take() else {
            return Ok(());
        };
        if !handle.is_finished() {
            if let Err(e) = self.cancel_token.clone().cancel_query(NoTls).await {
                debug!("cancel request failed: {e}");
            }
        }
        self.drain(handle, timeout).await
    }

    /// Blocks until any in-flight statement has finished or `timeout`
    /// elapses.
    pub async fn wait_idle(&self, timeout: Duration) -> Result<(), WardenError> {
        let Some(handle) = self.pending.lock().take() else {
            return Ok(());
        };
        self.drain(handle, timeout).await
    }

    async fn drain(
        &self,
        mut handle: PendingStatement,
        timeout: Duration,
    ) -> Result<(), WardenError> {
        match time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(_rows))) => Ok(()),
            Ok(Ok(Err(e))) => {
                // Telemetry is append-only; a failed or cancelled insert
                // costs at most one history row.
                warn!("in-flight statement did not complete: {e}");
                Ok(())
            }
            Ok(Err(e)) => {
                debug!("in-flight statement task aborted: {e}");
                Ok(())
            }
            Err(_) => {
                handle.abort();
                Err(WardenError::Unreachable(format!(
                    "connection still busy after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    // --- Named typed queries ---

    pub async fn in_recovery(&self) -> Result<bool, WardenError> {
        let row = self
            .query_one("SELECT pg_catalog.pg_is_in_recovery()", &[])
            .await?;
        row.try_get(0)
            .map_err(|e| WardenError::ResultMalformed(format!("pg_is_in_recovery: {e}")))
    }

    /// The primary's current write-ahead log position.
    pub async fn current_log_position(&self) -> Result<LogPos, WardenError> {
        let row = self
            .query_one("SELECT pg_catalog.pg_current_wal_lsn()::text", &[])
            .await?;
        let text: String = row
            .try_get(0)
            .map_err(|e| WardenError::ResultMalformed(format!("pg_current_wal_lsn: {e}")))?;
        text.parse()
            .map_err(|e| WardenError::ResultMalformed(format!("{e}")))
    }

    /// The last position this standby received from its upstream, or
    /// the `0/0` sentinel when streaming has not reported one yet.
    pub async fn last_received_position(&self) -> Result<LogPos, WardenError> {
        let row = self
            .query_one("SELECT pg_catalog.pg_last_wal_receive_lsn()::text", &[])
            .await?;
        let text: Option<String> = row
            .try_get(0)
            .map_err(|e| WardenError::ResultMalformed(format!("pg_last_wal_receive_lsn: {e}")))?;
        match text {
            None => Ok(LogPos::INVALID),
            Some(text) => text
                .parse()
                .map_err(|e| WardenError::ResultMalformed(format!("{e}"))),
        }
    }

    /// The last replayed position together with the timestamp of the
    /// last replayed transaction (absent on an idle upstream).
    pub async fn last_replayed_position_and_timestamp(
        &self,
    ) -> Result<(LogPos, Option<DateTime<Utc>>), WardenError> {
        let row = self
            .query_one(
                "SELECT pg_catalog.pg_last_wal_replay_lsn()::text, \
                 pg_catalog.pg_last_xact_replay_timestamp()",
                &[],
            )
            .await?;
        let text: Option<String> = row
            .try_get(0)
            .map_err(|e| WardenError::ResultMalformed(format!("pg_last_wal_replay_lsn: {e}")))?;
        let position = match text {
            None => LogPos::INVALID,
            Some(text) => text
                .parse()
                .map_err(|e| WardenError::ResultMalformed(format!("{e}")))?,
        };
        let timestamp: Option<DateTime<Utc>> = row.try_get(1).map_err(|e| {
            WardenError::ResultMalformed(format!("pg_last_xact_replay_timestamp: {e}"))
        })?;
        Ok((position, timestamp))
    }

    /// Reads the position a peer standby last published through the
    /// shared-memory helper. An absent helper (missing function, or the
    /// empty string it yields before the extension is initialized) is a
    /// distinct `ExtensionMissing` signal; `0/0` means "not yet
    /// published".
    pub async fn peer_last_standby_position(
        &self,
        schema: &SchemaName,
    ) -> Result<LogPos, WardenError> {
        let sql = metadata::get_last_standby_location_sql(schema);
        let row = self.query_one(&sql, &[]).await?;
        let text: Option<String> = row.try_get(0).map_err(|e| {
            WardenError::ResultMalformed(format!("repmgr_get_last_standby_location: {e}"))
        })?;
        match text.as_deref() {
            None | Some("") => Err(WardenError::ExtensionMissing(self.conninfo.clone())),
            Some(text) => text
                .parse()
                .map_err(|e| WardenError::ResultMalformed(format!("{e}"))),
        }
    }

    /// Publishes this standby's position into the shared-memory helper
    /// for peers to read during an election.
    pub async fn publish_standby_position(
        &self,
        schema: &SchemaName,
        pos: LogPos,
    ) -> Result<bool, WardenError> {
        let sql = metadata::update_standby_location_sql(schema, pos);
        let row = self.query_one(&sql, &[]).await?;
        row.try_get(0).map_err(|e| {
            WardenError::ResultMalformed(format!("repmgr_update_standby_location: {e}"))
        })
    }

    /// Fires the telemetry insert without awaiting it; the next tick's
    /// cancel/wait-idle prologue drains the result.
    pub fn insert_monitor_row(&self, schema: &SchemaName, sample: &MonitorSample) {
        self.submit_async(metadata::insert_monitor_sql(schema, sample));
    }

    pub async fn upsert_node_record(
        &self,
        schema: &SchemaName,
        record: &NodeRecord,
    ) -> Result<(), WardenError> {
        let sql = metadata::upsert_node_sql(schema);
        self.execute(
            &sql,
            &[
                &record.id,
                &record.cluster,
                &record.name,
                &record.conninfo,
                &record.priority,
                &record.witness,
            ],
        )
        .await
        .map(drop)
    }

    pub async fn list_nodes_in_cluster(
        &self,
        schema: &SchemaName,
        cluster: &str,
        limit: i64,
    ) -> Result<Vec<NodeRecord>, WardenError> {
        let sql = metadata::list_nodes_sql(schema);
        let rows = self.query(&sql, &[&cluster, &limit]).await?;
        rows.iter().map(NodeRecord::from_row).collect()
    }

    pub async fn count_node_rows(
        &self,
        schema: &SchemaName,
        id: i32,
        cluster: &str,
    ) -> Result<i64, WardenError> {
        let sql = metadata::count_node_rows_sql(schema);
        let row = self.query_one(&sql, &[&id, &cluster]).await?;
        row.try_get(0)
            .map_err(|e| WardenError::ResultMalformed(format!("count(*): {e}")))
    }

    pub async fn metadata_tables_present(
        &self,
        schema: &SchemaName,
    ) -> Result<bool, WardenError> {
        let sql = metadata::tables_present_sql(schema);
        let row = self.query_one(&sql, &[]).await?;
        row.try_get(0)
            .map_err(|e| WardenError::ResultMalformed(format!("to_regclass: {e}")))
    }

    // --- Bounded execution helpers ---

    async fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Row, WardenError> {
        match time::timeout(self.query_timeout, self.client.query_one(sql, params)).await {
            Ok(Ok(row)) => Ok(row),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, WardenError> {
        match time::timeout(self.query_timeout, self.client.query(sql, params)).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, WardenError> {
        match time::timeout(self.query_timeout, self.client.execute(sql, params)).await {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn timeout_error(&self) -> WardenError {
        WardenError::Unreachable(format!(
            "query timed out after {}s",
            self.query_timeout.as_secs()
        ))
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSession")
            .field("conninfo", &self.conninfo)
            .finish_non_exhaustive()
    }
}

/// Maps a driver error onto the daemon's error kinds: a dead socket is
/// a connection loss, a missing relation or schema points at an
/// unprepared cluster, anything else is a plain query failure.
fn classify(e: tokio_postgres::Error) -> WardenError {
    if e.is_closed() {
        return WardenError::DbConnection(e.to_string());
    }
    match e.code() {
        Some(code)
            if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME =>
        {
            WardenError::SchemaMissing(e.to_string())
        }
        Some(code) if *code == SqlState::UNDEFINED_FUNCTION => {
            WardenError::ExtensionMissing(e.to_string())
        }
        _ => WardenError::QueryFailed(e.to_string()),
    }
}
