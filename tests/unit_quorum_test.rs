use pgwarden::core::failover::meets_quorum;

#[test]
fn test_single_visible_in_four_node_cluster_abstains() {
    // A node seeing only itself out of four must leave the election
    // to the surviving majority.
    assert!(!meets_quorum(1, 4));
}

#[test]
fn test_exact_half_of_even_cluster_proceeds() {
    assert!(meets_quorum(2, 4));
}

#[test]
fn test_minority_of_odd_cluster_abstains() {
    assert!(!meets_quorum(1, 3));
    assert!(!meets_quorum(2, 5));
}

#[test]
fn test_majority_of_odd_cluster_proceeds() {
    assert!(meets_quorum(2, 3));
    assert!(meets_quorum(3, 5));
}

#[test]
fn test_lone_node_cluster() {
    assert!(meets_quorum(1, 1));
}

#[test]
fn test_nothing_visible_abstains() {
    assert!(!meets_quorum(0, 2));
}
