// tests/property_test.rs

//! Property-based tests for the log-position arithmetic the election
//! and the lag computations depend on.

use pgwarden::core::lsn::LogPos;
use proptest::prelude::*;

proptest! {
    /// Rendering then parsing any position is the identity.
    #[test]
    fn prop_render_parse_roundtrip(hi in any::<u32>(), lo in any::<u32>()) {
        let pos = LogPos::new(hi, lo);
        let reparsed: LogPos = pos.to_string().parse().unwrap();
        prop_assert_eq!(pos, reparsed);
    }

    /// Parsing normalizes: one render/parse pass reaches a fixed point.
    #[test]
    fn prop_parse_render_normalizes(hi in any::<u32>(), lo in any::<u32>()) {
        let text = format!("{hi:08X}/{lo:08x}");
        let parsed: LogPos = text.parse().unwrap();
        let normalized = parsed.to_string();
        let reparsed: LogPos = normalized.parse().unwrap();
        prop_assert_eq!(normalized, reparsed.to_string());
    }

    /// The comparison order agrees with the linear scalar everywhere.
    #[test]
    fn prop_order_matches_scalar(a in any::<(u32, u32)>(), b in any::<(u32, u32)>()) {
        let left = LogPos::new(a.0, a.1);
        let right = LogPos::new(b.0, b.1);
        prop_assert_eq!(left.cmp(&right), left.scalar().cmp(&right.scalar()));
    }

    /// Lag is zero exactly when the "newer" side is not ahead, and
    /// clamping reports precisely the reversed pairs.
    #[test]
    fn prop_lag_clamps_only_reversed_pairs(a in any::<(u32, u32)>(), b in any::<(u32, u32)>()) {
        let newer = LogPos::new(a.0, a.1);
        let older = LogPos::new(b.0, b.1);
        let (lag, clamped) = LogPos::saturating_lag(newer, older);
        if newer >= older {
            prop_assert!(!clamped);
            prop_assert_eq!(lag, newer.scalar() - older.scalar());
        } else {
            prop_assert!(clamped);
            prop_assert_eq!(lag, 0);
        }
    }
}
