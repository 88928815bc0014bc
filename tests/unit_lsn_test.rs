use pgwarden::core::lsn::LogPos;

#[test]
fn test_parse_simple_position() {
    let pos: LogPos = "0/16B3C50".parse().unwrap();
    assert_eq!(pos, LogPos::new(0, 0x16B3C50));
}

#[test]
fn test_parse_both_halves() {
    let pos: LogPos = "AB/12345678".parse().unwrap();
    assert_eq!(pos.hi, 0xAB);
    assert_eq!(pos.lo, 0x12345678);
}

#[test]
fn test_parse_accepts_lowercase_and_whitespace() {
    let pos: LogPos = "  ab/cdef01 ".parse().unwrap();
    assert_eq!(pos, LogPos::new(0xAB, 0xCDEF01));
}

#[test]
fn test_render_uppercase_without_padding() {
    assert_eq!(LogPos::new(0, 0x100).to_string(), "0/100");
    assert_eq!(LogPos::new(0xAB, 0xCDEF01).to_string(), "AB/CDEF01");
}

#[test]
fn test_render_parse_normalizes() {
    let pos: LogPos = "0/0100".parse().unwrap();
    assert_eq!(pos.to_string(), "0/100");
}

#[test]
fn test_parse_rejects_garbage() {
    assert!("".parse::<LogPos>().is_err());
    assert!("123456".parse::<LogPos>().is_err());
    assert!("0/XYZ".parse::<LogPos>().is_err());
    assert!("G/0".parse::<LogPos>().is_err());
    assert!("1/2/3".parse::<LogPos>().is_err());
}

#[test]
fn test_sentinel_is_invalid() {
    assert!(!LogPos::INVALID.is_valid());
    assert_eq!("0/0".parse::<LogPos>().unwrap(), LogPos::INVALID);
    assert!(LogPos::new(0, 1).is_valid());
    assert!(LogPos::new(1, 0).is_valid());
}

#[test]
fn test_scalar_uses_full_segment_multiplier() {
    assert_eq!(LogPos::new(1, 0).scalar(), 0x1_0000_0000);
    assert_eq!(LogPos::new(0, 0xFFFF_FFFF).scalar(), 0xFFFF_FFFF);
    assert_eq!(LogPos::new(2, 0x10).scalar(), 0x2_0000_0010);
}

#[test]
fn test_ordering_crosses_segment_boundary() {
    let low = LogPos::new(0, 0xFFFF_FFFF);
    let high = LogPos::new(1, 0);
    assert!(high > low);
    assert!(LogPos::new(1, 1) > LogPos::new(1, 0));
    assert_eq!(LogPos::new(3, 7), LogPos::new(3, 7));
}

#[test]
fn test_saturating_lag_forward() {
    let primary = LogPos::new(0, 0x200);
    let standby = LogPos::new(0, 0x100);
    assert_eq!(LogPos::saturating_lag(primary, standby), (0x100, false));
}

#[test]
fn test_saturating_lag_clamps_negative() {
    let primary = LogPos::new(0, 0x100);
    let standby = LogPos::new(0, 0x200);
    assert_eq!(LogPos::saturating_lag(primary, standby), (0, true));
}

#[test]
fn test_saturating_lag_across_segments() {
    let newer = LogPos::new(1, 0x10);
    let older = LogPos::new(0, 0xFFFF_FF00);
    assert_eq!(LogPos::saturating_lag(newer, older), (0x110, false));
}
