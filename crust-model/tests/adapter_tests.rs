use crust_model::{BitArray, DataType, Flag, Point, PropertyConfig, Timestamp};
use pretty_assertions::assert_eq;
use serde_json::json;

// ── Flag ─────────────────────────────────────────────────────────

#[test]
fn flag_splits_integer_into_bits() {
    assert_eq!(Flag::to_bits(0), Vec::<i64>::new());
    assert_eq!(Flag::to_bits(5), vec![1, 4]);
    assert_eq!(Flag::to_bits(12), vec![4, 8]);
}

#[test]
fn flag_joins_bits_into_integer() {
    assert_eq!(Flag::to_int(&[1, 4]), 5);
    assert_eq!(Flag::to_int(&[]), 0);
}

#[test]
fn flag_raw_and_value() {
    let mut flag = Flag::default();
    flag.set_raw(&json!(6));
    assert_eq!(flag.value(), json!([2, 4]));
    assert_eq!(flag.raw(), json!(6));
}

#[test]
fn flag_set_value_from_bits() {
    let mut flag = Flag::new(1);
    flag.set_value(&json!([8, 2]));
    assert_eq!(flag.bits(), &[2, 8]);
    assert_eq!(flag.raw(), json!(10));
}

#[test]
fn flag_set_value_null_clears() {
    let mut flag = Flag::new(3);
    flag.set_value(&json!(null));
    assert_eq!(flag.raw(), json!(0));
}

#[test]
fn flag_is_always_valid() {
    assert!(Flag::new(0).validate().is_empty());
}

// ── BitArray ─────────────────────────────────────────────────────

#[test]
fn bit_array_pads_to_width() {
    let config = PropertyConfig {
        max_length: Some(4),
        ..Default::default()
    };
    let mut bits = BitArray::boxed(&config);
    bits.set_raw(&json!(5));
    assert_eq!(bits.value(), json!([false, true, false, true]));
    assert_eq!(bits.raw(), json!(5));
}

#[test]
fn bit_array_default_width_is_one() {
    let mut bits = BitArray::boxed(&PropertyConfig::default());
    bits.set_raw(&json!(1));
    assert_eq!(bits.value(), json!([true]));
}

#[test]
fn bit_array_set_value_from_bools() {
    let mut bits = BitArray::new(3);
    bits.set_value(&json!([true, true, false]));
    assert_eq!(bits.raw(), json!(6));
    assert_eq!(bits.bits(), &[true, true, false]);
}

// ── Point ────────────────────────────────────────────────────────

#[test]
fn point_round_trips_coordinates() {
    let mut point = Point::default();
    point.set_raw(&json!({"latitude": 51.5, "longitude": -0.12}));
    assert_eq!(point.raw(), json!({"latitude": 51.5, "longitude": -0.12}));
    assert!(point.validate().is_empty());
}

#[test]
fn point_empty_is_null_on_wire() {
    assert_eq!(Point::default().raw(), json!(null));
}

#[test]
fn point_requires_both_coordinates() {
    let mut point = Point::default();
    point.set_raw(&json!({"latitude": 10.0}));
    let errors = point.validate();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, "required");
    assert_eq!(errors[0].subtype.as_deref(), Some("longitude"));
}

#[test]
fn point_zero_is_a_valid_coordinate() {
    assert!(Point::new(0.0, 0.0).validate().is_empty());
}

// ── Timestamp ────────────────────────────────────────────────────

#[test]
fn timestamp_keeps_zulu_form() {
    let ts = Timestamp::parse(&json!("2024-03-01T10:20:30Z")).unwrap();
    assert_eq!(ts.to_value(), json!("2024-03-01T10:20:30Z"));
}

#[test]
fn timestamp_keeps_offset_form() {
    let ts = Timestamp::parse(&json!("2024-03-01T10:20:30+02:00")).unwrap();
    assert_eq!(ts.to_value(), json!("2024-03-01T10:20:30+02:00"));
    assert_eq!(ts.to_utc().to_rfc3339(), "2024-03-01T08:20:30+00:00");
}

#[test]
fn timestamp_keeps_naive_form() {
    let ts = Timestamp::parse(&json!("2024-03-01T10:20:30")).unwrap();
    assert_eq!(ts.to_value(), json!("2024-03-01T10:20:30"));

    let ts = Timestamp::parse(&json!("2024-03-01T10:20:30.250")).unwrap();
    assert_eq!(ts.to_value(), json!("2024-03-01T10:20:30.250"));
}

#[test]
fn timestamp_reemits_fractions_and_separators_verbatim() {
    for wire in [
        "2024-01-01T10:00:00.1234567",
        "2024-01-01T10:00:00.5Z",
        "2024-01-01T10:00:00.5+02:00",
        "2024-01-01 10:00:00Z",
        "2024-01-01 10:00:00.25",
    ] {
        let ts = Timestamp::parse(&json!(wire)).unwrap();
        assert_eq!(ts.to_value(), json!(wire));
    }
}

#[test]
fn timestamp_fraction_is_parsed() {
    let ts = Timestamp::parse(&json!("2024-01-01T10:00:00.5Z")).unwrap();
    assert_eq!(ts.to_utc().timestamp_subsec_millis(), 500);

    let spaced = Timestamp::parse(&json!("2024-01-01 10:00:00Z")).unwrap();
    let zulu = Timestamp::parse(&json!("2024-01-01T10:00:00Z")).unwrap();
    assert_eq!(spaced.to_utc(), zulu.to_utc());
}

#[test]
fn local_timestamps_use_rfc3339() {
    let at = chrono::DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    assert_eq!(Timestamp::from_utc(at).to_value(), json!("2024-01-01T10:00:00Z"));
}

#[test]
fn timestamp_keeps_date_only_form() {
    let ts = Timestamp::parse(&json!("2024-03-01")).unwrap();
    assert_eq!(ts.to_value(), json!("2024-03-01"));
}

#[test]
fn timestamp_epoch_millis() {
    let ts = Timestamp::parse(&json!(1_700_000_000_000i64)).unwrap();
    assert_eq!(ts.to_value(), json!(1_700_000_000_000i64));
    assert_eq!(ts.to_utc().timestamp(), 1_700_000_000);
}

#[test]
fn timestamp_rejects_garbage() {
    assert!(Timestamp::parse(&json!("yesterday")).is_none());
    assert!(Timestamp::parse(&json!(true)).is_none());
    assert!(Timestamp::parse(&json!(null)).is_none());
}
