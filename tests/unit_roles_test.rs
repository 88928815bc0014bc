use pgwarden::core::roles::{NodeRole, classify};

#[test]
fn test_witness_flag_wins_over_recovery_state() {
    assert_eq!(classify(true, true), NodeRole::Witness);
    assert_eq!(classify(true, false), NodeRole::Witness);
}

#[test]
fn test_recovery_means_standby() {
    assert_eq!(classify(false, true), NodeRole::Standby);
}

#[test]
fn test_accepting_writes_means_primary() {
    assert_eq!(classify(false, false), NodeRole::Primary);
}

#[test]
fn test_role_names() {
    assert_eq!(NodeRole::Primary.to_string(), "primary");
    assert_eq!(NodeRole::Standby.to_string(), "standby");
    assert_eq!(NodeRole::Witness.to_string(), "witness");
    assert_eq!(NodeRole::Unknown.to_string(), "unknown");
}
