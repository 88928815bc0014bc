use pgwarden::config::{Config, FailoverMode, LogFacility, LogLevel};
use std::io::Write;
use std::path::PathBuf;

const MINIMAL: &str = "\
cluster=c1
node=2
conninfo=host=192.168.0.11 dbname=repmgr
";

#[test]
fn test_minimal_config_and_defaults() {
    let config = Config::parse(MINIMAL).unwrap();
    assert_eq!(config.cluster, "c1");
    assert_eq!(config.node, 2);
    assert_eq!(config.conninfo, "host=192.168.0.11 dbname=repmgr");
    assert_eq!(config.node_name, "node2");
    assert_eq!(config.failover, FailoverMode::Manual);
    assert_eq!(config.priority, 0);
    assert_eq!(config.master_response_timeout, 60);
    assert_eq!(config.reconnect_attempts, 6);
    assert_eq!(config.reconnect_interval, 10);
    assert_eq!(config.monitor_interval_secs, 2);
    assert_eq!(config.retry_promote_interval_secs, 300);
    assert_eq!(config.loglevel, LogLevel::Info);
    assert_eq!(config.logfacility, LogFacility::Stderr);
    assert!(config.promote_command.is_none());
    assert!(config.logfile.is_none());
}

#[test]
fn test_full_config() {
    let text = "\
cluster=prod
node=3
node_name=replica-east
conninfo=host=10.0.0.3 user=repmgr dbname=repmgr
failover=automatic
priority=50
master_response_timeout=30
reconnect_attempts=4
reconnect_interval=5
monitor_interval_secs=1
retry_promote_interval_secs=60
promote_command=pg_ctl promote -D /var/lib/postgresql/data
follow_command=repmgr standby follow
loglevel=WARNING
logfacility=LOCAL3
logfile=/var/log/pgwarden.log
";
    let config = Config::parse(text).unwrap();
    assert_eq!(config.node_name, "replica-east");
    assert_eq!(config.failover, FailoverMode::Automatic);
    assert_eq!(config.priority, 50);
    assert_eq!(config.master_response_timeout, 30);
    assert_eq!(
        config.promote_command.as_deref(),
        Some("pg_ctl promote -D /var/lib/postgresql/data")
    );
    assert_eq!(config.follow_command.as_deref(), Some("repmgr standby follow"));
    assert_eq!(config.loglevel, LogLevel::Warning);
    assert_eq!(config.logfacility, LogFacility::Local3);
    assert_eq!(config.logfile, Some(PathBuf::from("/var/log/pgwarden.log")));
}

#[test]
fn test_unknown_keys_are_ignored() {
    let text = format!("{MINIMAL}some_future_key=whatever\n");
    let config = Config::parse(&text).unwrap();
    assert_eq!(config.cluster, "c1");
}

#[test]
fn test_comments_and_blank_lines_are_skipped() {
    let text = "\
# main settings
cluster=c1

node=2
# the standby itself
conninfo=host=localhost
";
    assert!(Config::parse(text).is_ok());
}

#[test]
fn test_values_keep_embedded_equals_signs() {
    let text = "\
cluster=c1
node=2
conninfo=host=localhost port=5432 dbname=repmgr
";
    let config = Config::parse(text).unwrap();
    assert_eq!(config.conninfo, "host=localhost port=5432 dbname=repmgr");
}

#[test]
fn test_missing_required_keys_fail() {
    assert!(Config::parse("node=1\nconninfo=host=x\n").is_err());
    assert!(Config::parse("cluster=c1\nconninfo=host=x\n").is_err());
    assert!(Config::parse("cluster=c1\nnode=1\n").is_err());
}

#[test]
fn test_bad_integer_reports_line() {
    let text = "\
cluster=c1
node=not-a-number
conninfo=host=x
";
    let err = Config::parse(text).unwrap_err();
    assert!(err.to_string().contains("line 2"), "got: {err}");
}

#[test]
fn test_bad_failover_mode_rejected() {
    let text = format!("{MINIMAL}failover=sometimes\n");
    assert!(Config::parse(&text).is_err());
}

#[test]
fn test_negative_priority_rejected() {
    let text = format!("{MINIMAL}priority=-1\n");
    assert!(Config::parse(&text).is_err());
}

#[test]
fn test_loglevel_directives() {
    assert_eq!(LogLevel::Debug.as_directive(), "debug");
    assert_eq!(LogLevel::Notice.as_directive(), "info");
    assert_eq!(LogLevel::Warning.as_directive(), "warn");
    assert_eq!(LogLevel::Crit.as_directive(), "error");
}

#[test]
fn test_logfacility_stderr_detection() {
    assert!(LogFacility::Stderr.keeps_stderr());
    assert!(!LogFacility::Local0.keeps_stderr());
    assert!(!LogFacility::User.keeps_stderr());
}

#[test]
fn test_from_file_roundtrip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.node, 2);
}

#[test]
fn test_from_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.conf");
    assert!(Config::from_file(&path).is_err());
}
