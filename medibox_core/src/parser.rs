//! Wire payload -> typed reading.
//!
//! Firmware revisions publish the same logical channel in different shapes,
//! so decoding is an ordered list of fallbacks per [`Encoding`]:
//!
//! - Numeric: bare float, else JSON scalar cast to float.
//! - Vector: JSON object, all of `x`, `y`, `z` required.
//! - Tolerant: JSON first. An object is searched for the known field names in
//!   priority order, then for the first value (in payload order) that casts to
//!   float. A JSON scalar is cast directly. Text that is not JSON falls back to
//!   a bare float parse.
//! - Status: the payload verbatim.
//!
//! Non-finite numbers (`nan`, `inf`) are rejected everywhere.

use crate::error::ParseError;
use crate::reading::{Channel, Encoding, ReadingValue, Vector3};
use serde_json::{Map, Value};

pub fn parse(channel: Channel, raw: &[u8]) -> Result<ReadingValue, ParseError> {
    let text = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8 { channel })?;
    match channel.encoding() {
        Encoding::Numeric => parse_numeric(channel, text).map(ReadingValue::Scalar),
        Encoding::Vector => parse_vector(channel, text).map(ReadingValue::Vector),
        Encoding::Tolerant { fields } => {
            parse_tolerant(channel, text, fields).map(ReadingValue::Scalar)
        }
        Encoding::Status => Ok(ReadingValue::Status(text.to_owned())),
    }
}

#[inline]
fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn bare_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().and_then(finite)
}

/// Float cast of a decoded JSON value: numbers and numeric strings.
fn cast(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(finite),
        Value::String(s) => bare_float(s),
        _ => None,
    }
}

fn not_numeric(channel: Channel, text: &str) -> ParseError {
    ParseError::NotNumeric {
        channel,
        payload: text.to_owned(),
    }
}

fn parse_numeric(channel: Channel, text: &str) -> Result<f64, ParseError> {
    bare_float(text)
        .or_else(|| {
            serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| cast(&v))
        })
        .ok_or_else(|| not_numeric(channel, text))
}

fn parse_vector(channel: Channel, text: &str) -> Result<Vector3, ParseError> {
    let not_object = || ParseError::NotAnObject {
        channel,
        payload: text.to_owned(),
    };
    let value: Value = serde_json::from_str(text).map_err(|_| not_object())?;
    let obj = value.as_object().ok_or_else(not_object)?;
    let axis = |name: char| -> Result<f64, ParseError> {
        let key = name.to_string();
        let v = obj
            .get(&key)
            .ok_or(ParseError::MissingAxis { channel, axis: name })?;
        cast(v).ok_or_else(|| not_numeric(channel, &v.to_string()))
    };
    Ok(Vector3 {
        x: axis('x')?,
        y: axis('y')?,
        z: axis('z')?,
    })
}

fn parse_tolerant(
    channel: Channel,
    text: &str,
    fields: &[&str],
) -> Result<f64, ParseError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => from_object(channel, text, &obj, fields),
        Ok(other) => cast(&other).ok_or_else(|| not_numeric(channel, text)),
        Err(_) => bare_float(text).ok_or_else(|| not_numeric(channel, text)),
    }
}

fn from_object(
    channel: Channel,
    text: &str,
    obj: &Map<String, Value>,
    fields: &[&str],
) -> Result<f64, ParseError> {
    // A known field that is present but not numeric is a bad payload, not a
    // reason to go looking at other fields.
    if let Some(v) = fields.iter().find_map(|f| obj.get(*f)) {
        return cast(v).ok_or_else(|| not_numeric(channel, text));
    }
    obj.values()
        .find_map(cast)
        .ok_or_else(|| ParseError::NoNumericField {
            channel,
            payload: text.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scalar(channel: Channel, raw: &str) -> f64 {
        match parse(channel, raw.as_bytes()) {
            Ok(ReadingValue::Scalar(v)) => v,
            other => panic!("expected scalar for {raw:?}, got {other:?}"),
        }
    }

    #[rstest]
    #[case("36.6")]
    #[case(" 36.6\n")]
    #[case(r#"{"temperature": 36.6}"#)]
    #[case(r#"{"temp": 36.6}"#)]
    #[case(r#"{"temp": "36.6"}"#)]
    #[case(r#"{"sensor": "ir", "object_c": 36.6}"#)]
    #[case(r#""36.6""#)]
    fn temperature_shapes_normalize_to_same_value(#[case] raw: &str) {
        assert_eq!(scalar(Channel::Temperature, raw), 36.6);
    }

    #[test]
    fn temp_field_wins_over_temperature() {
        let v = scalar(Channel::Temperature, r#"{"temperature": 20.0, "temp": 36.6}"#);
        assert_eq!(v, 36.6);
    }

    #[test]
    fn first_numeric_field_follows_payload_order() {
        let v = scalar(Channel::Temperature, r#"{"zeta": 1.5, "alpha": 2.5}"#);
        assert_eq!(v, 1.5);
    }

    #[test]
    fn non_numeric_known_field_is_rejected() {
        let err = parse(Channel::Temperature, br#"{"temp": "warm", "other": 36.6}"#)
            .expect_err("known field must be numeric");
        assert!(matches!(err, ParseError::NotNumeric { .. }));
    }

    #[test]
    fn object_without_numbers_is_rejected() {
        let err = parse(Channel::Alcohol, br#"{"unit": "mg/L"}"#).expect_err("no number");
        assert!(matches!(err, ParseError::NoNumericField { .. }));
    }

    #[rstest]
    #[case("0.25")]
    #[case(r#"{"alcohol_level": 0.25, "alcohol": 9.0}"#)]
    #[case(r#"{"alcohol": 0.25}"#)]
    #[case(r#"{"raw": 0.25}"#)]
    fn alcohol_shapes(#[case] raw: &str) {
        assert_eq!(scalar(Channel::Alcohol, raw), 0.25);
    }

    #[rstest]
    #[case(Channel::HeartRate, "72", 72.0)]
    #[case(Channel::Distance, "12.5", 12.5)]
    #[case(Channel::Load, "\"3.25\"", 3.25)]
    #[case(Channel::GyroY, "-4.5", -4.5)]
    #[case(Channel::ServoState, "90", 90.0)]
    fn numeric_channels(#[case] channel: Channel, #[case] raw: &str, #[case] want: f64) {
        assert_eq!(scalar(channel, raw), want);
    }

    #[rstest]
    #[case("not-a-number")]
    #[case("")]
    #[case("nan")]
    #[case("inf")]
    #[case(r#"{"value": 5}"#)]
    fn numeric_channel_rejects_garbage(#[case] raw: &str) {
        let err = parse(Channel::HeartRate, raw.as_bytes()).expect_err("garbage");
        assert!(matches!(err, ParseError::NotNumeric { .. }), "{err:?}");
    }

    #[test]
    fn vector_requires_all_axes() {
        let v = parse(Channel::Gyro, br#"{"x": 1, "y": -2.5, "z": 3}"#).expect("vector");
        assert_eq!(
            v,
            ReadingValue::Vector(Vector3 {
                x: 1.0,
                y: -2.5,
                z: 3.0
            })
        );
        let err = parse(Channel::Accel, br#"{"x": 1, "y": 2}"#).expect_err("no z");
        assert_eq!(
            err,
            ParseError::MissingAxis {
                channel: Channel::Accel,
                axis: 'z'
            }
        );
        let err = parse(Channel::Accel, b"9.81").expect_err("scalar");
        assert!(matches!(err, ParseError::NotAnObject { .. }));
    }

    #[test]
    fn status_is_verbatim() {
        let v = parse(Channel::WeightStatus, b"stable").expect("status");
        assert_eq!(v, ReadingValue::Status("stable".into()));
        let v = parse(Channel::WeightStatus, b"12").expect("status");
        assert_eq!(v, ReadingValue::Status("12".into()));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = parse(Channel::WeightStatus, &[0xff, 0xfe]).expect_err("bytes");
        assert_eq!(
            err,
            ParseError::InvalidUtf8 {
                channel: Channel::WeightStatus
            }
        );
    }
}
