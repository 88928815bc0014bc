use chrono::{TimeZone, Utc};
use pgwarden::core::lsn::LogPos;
use pgwarden::core::metadata::{
    self, MonitorSample, SchemaName, insert_monitor_sql, list_nodes_sql, tables_present_sql,
    update_standby_location_sql, upsert_node_sql,
};

#[test]
fn test_schema_name_is_quoted() {
    let schema = SchemaName::for_cluster("c1");
    assert_eq!(schema.quoted(), "\"repmgr_c1\"");
    assert_eq!(schema.cluster(), "c1");
}

#[test]
fn test_schema_name_escapes_embedded_quotes() {
    let schema = SchemaName::for_cluster("we\"ird");
    assert_eq!(schema.quoted(), "\"repmgr_we\"\"ird\"");
}

#[test]
fn test_list_nodes_orders_by_priority_then_id() {
    let schema = SchemaName::for_cluster("c1");
    let sql = list_nodes_sql(&schema);
    assert!(sql.contains("\"repmgr_c1\".repl_nodes"));
    assert!(sql.contains("ORDER BY priority ASC, id ASC"));
    assert!(sql.contains("LIMIT $2"));
}

#[test]
fn test_upsert_is_idempotent_per_id() {
    let schema = SchemaName::for_cluster("c1");
    let sql = upsert_node_sql(&schema);
    assert!(sql.contains("INSERT INTO \"repmgr_c1\".repl_nodes"));
    assert!(sql.contains("ON CONFLICT (id) DO UPDATE"));
}

#[test]
fn test_tables_present_checks_both_tables() {
    let schema = SchemaName::for_cluster("c1");
    let sql = tables_present_sql(&schema);
    assert!(sql.contains("to_regclass"));
    assert!(sql.contains("repl_nodes"));
    assert!(sql.contains("repl_monitor"));
}

#[test]
fn test_update_standby_location_quotes_the_position() {
    let schema = SchemaName::for_cluster("c1");
    let sql = update_standby_location_sql(&schema, LogPos::new(0, 0x1A));
    assert!(sql.contains("\"repmgr_c1\".repmgr_update_standby_location"));
    assert!(sql.contains("'0/1A'"));
}

#[test]
fn test_standby_monitor_row_sql() {
    let schema = SchemaName::for_cluster("c1");
    let sample = MonitorSample {
        primary_node: 1,
        standby_node: 2,
        last_monitor_time: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        last_apply_time: Some(Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 50).unwrap()),
        primary_position: LogPos::new(0, 0x200),
        standby_position: Some(LogPos::new(0, 0x100)),
        replication_lag: 0x100,
        apply_lag: 0x10,
    };
    let sql = insert_monitor_sql(&schema, &sample);
    assert!(sql.starts_with("INSERT INTO \"repmgr_c1\".repl_monitor"));
    // The row references exactly the ids of the observation it records.
    assert!(sql.contains("VALUES (1, 2,"));
    assert!(sql.contains("'0/200'"));
    assert!(sql.contains("'0/100'"));
    assert!(sql.contains("256, 16"));
    assert!(sql.contains("2026-03-14T09:26:53"));
}

#[test]
fn test_witness_monitor_row_has_null_standby_fields() {
    let schema = SchemaName::for_cluster("c1");
    let sample = MonitorSample {
        primary_node: 1,
        standby_node: 3,
        last_monitor_time: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        last_apply_time: None,
        primary_position: LogPos::new(0, 0x200),
        standby_position: None,
        replication_lag: 0,
        apply_lag: 0,
    };
    let sql = insert_monitor_sql(&schema, &sample);
    assert!(sql.contains("NULL"));
    assert!(sql.contains("0, 0"));
    assert!(!sql.contains("''"));
}

#[test]
fn test_monitor_row_escapes_nothing_injectable() {
    // Positions and timestamps render through literal escaping, so a
    // quote in the rendered text could not break out of the statement.
    let schema = SchemaName::for_cluster("c1");
    let sample = MonitorSample {
        primary_node: 1,
        standby_node: 2,
        last_monitor_time: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        last_apply_time: None,
        primary_position: LogPos::new(0xAB, 0xCD),
        standby_position: Some(LogPos::new(0xAB, 0xCC)),
        replication_lag: 1,
        apply_lag: 0,
    };
    let sql = insert_monitor_sql(&schema, &sample);
    assert_eq!(sql.matches("INSERT INTO").count(), 1);
    assert!(sql.contains("'AB/CD'"));
}

#[test]
fn test_failover_enumeration_cap() {
    assert_eq!(metadata::FAILOVER_NODES_MAX_CHECK, 50);
}
