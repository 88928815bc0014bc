use pgwarden::core::failover::{Candidate, select_winner};
use pgwarden::core::lsn::LogPos;
use pgwarden::core::metadata::NodeRecord;

/// Builds an electable candidate the way the coordinator enumerates
/// them. Tests push candidates in (priority, id) order, matching the
/// metadata query's ordering.
fn candidate(id: i32, priority: i32, witness: bool, position: &str) -> Candidate {
    let record = NodeRecord {
        id,
        cluster: "c1".to_string(),
        name: format!("node{id}"),
        conninfo: format!("host=192.168.0.{} dbname=repmgr", 9 + id),
        priority,
        witness,
    };
    let mut candidate = Candidate::new(record, false);
    candidate.visible = true;
    candidate.ready = true;
    candidate.position = position.parse::<LogPos>().unwrap();
    candidate
}

#[test]
fn test_unique_highest_position_wins() {
    // Three-node cluster, primary gone: node 3 received more log.
    let candidates = vec![
        candidate(3, 50, false, "0/200"),
        candidate(2, 100, false, "0/100"),
    ];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 3);
}

#[test]
fn test_position_tie_breaks_on_priority() {
    // Both standbys at 0/300: the lower priority value wins.
    let candidates = vec![
        candidate(3, 50, false, "0/300"),
        candidate(2, 100, false, "0/300"),
    ];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 3);
}

#[test]
fn test_full_tie_breaks_on_lowest_id() {
    let candidates = vec![
        candidate(2, 100, false, "0/300"),
        candidate(5, 100, false, "0/300"),
    ];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 2);
}

#[test]
fn test_witness_never_wins() {
    // The witness iterates first (priority 1) and holds the highest
    // position, but it replicates nothing and must not be promoted.
    let candidates = vec![
        candidate(3, 1, true, "0/FFFF"),
        candidate(2, 100, false, "0/100"),
    ];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 2);
}

#[test]
fn test_invisible_and_unready_peers_are_skipped() {
    let mut unreachable = candidate(2, 50, false, "0/500");
    unreachable.visible = false;
    let mut silent = candidate(3, 60, false, "0/400");
    silent.ready = false;
    let candidates = vec![unreachable, silent, candidate(4, 100, false, "0/100")];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 4);
}

#[test]
fn test_sentinel_position_is_not_electable() {
    let candidates = vec![
        candidate(2, 50, false, "0/0"),
        candidate(3, 100, false, "0/10"),
    ];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 3);
}

#[test]
fn test_no_candidate_yields_none() {
    assert!(select_winner(&[]).is_none());
    let only_witness = vec![candidate(3, 1, true, "0/100")];
    assert!(select_winner(&only_witness).is_none());
}

#[test]
fn test_higher_position_beats_better_priority() {
    // Priority is only a tie-break: the most advanced log always wins.
    let candidates = vec![
        candidate(2, 1, false, "0/100"),
        candidate(3, 200, false, "1/0"),
    ];
    let winner = select_winner(&candidates).unwrap();
    assert_eq!(winner.record.id, 3);
}
