use crate::domain::DecodeError;
use common::domain::{MotorStatus, ReadingField, TelemetryReading};

/// Separator between the fields of a telemetry frame
pub const FIELD_DELIMITER: char = ',';

/// Longest payload, in characters, that is decoded at all
pub const MAX_PAYLOAD_CHARS: usize = 1024;

/// Decode a raw telemetry payload.
///
/// A frame is six fields separated by [`FIELD_DELIMITER`], in
/// [`ReadingField::WIRE_ORDER`]:
///
/// ```text
/// water_level,chemical_level,motor1_status,motor2_status,flow_rate,total_amount
/// 1.2,0.5,1,0,10.0,100.0
/// ```
///
/// Whitespace around a field is ignored. Decimal fields take an optional
/// sign, digits and an optional fraction (`.5` and `3.` are accepted);
/// exponents, `inf`, `NaN` and hex are not. Motor fields are the integers
/// `0` or `1`. Payloads longer than [`MAX_PAYLOAD_CHARS`] are malformed.
pub fn decode_frame(payload: &str) -> Result<TelemetryReading, DecodeError> {
    let length = payload.chars().count();
    if length > MAX_PAYLOAD_CHARS {
        return Err(DecodeError::malformed(format!(
            "payload exceeds {} characters ({})",
            MAX_PAYLOAD_CHARS, length
        )));
    }

    let fields: Vec<&str> = payload.split(FIELD_DELIMITER).map(str::trim).collect();
    if fields.len() != ReadingField::WIRE_ORDER.len() {
        return Err(DecodeError::malformed(format!(
            "expected {} fields, got {}",
            ReadingField::WIRE_ORDER.len(),
            fields.len()
        )));
    }

    Ok(TelemetryReading {
        water_level: parse_decimal(ReadingField::WaterLevel, fields[0])?,
        chemical_level: parse_decimal(ReadingField::ChemicalLevel, fields[1])?,
        motor1_status: parse_motor(ReadingField::Motor1Status, fields[2])?,
        motor2_status: parse_motor(ReadingField::Motor2Status, fields[3])?,
        flow_rate: parse_decimal(ReadingField::FlowRate, fields[4])?,
        total_amount: parse_decimal(ReadingField::TotalAmount, fields[5])?,
    })
}

fn parse_decimal(field: ReadingField, text: &str) -> Result<f64, DecodeError> {
    if !is_decimal_literal(text) {
        return Err(DecodeError::malformed(format!(
            "{}: '{}' is not a decimal number",
            field, text
        )));
    }

    let value: f64 = text.parse().map_err(|_| {
        DecodeError::malformed(format!("{}: '{}' is not a decimal number", field, text))
    })?;

    // Very long digit strings overflow to infinity
    if !value.is_finite() {
        return Err(DecodeError::malformed(format!(
            "{}: '{}' is out of numeric range",
            field, text
        )));
    }

    Ok(value)
}

fn parse_motor(field: ReadingField, text: &str) -> Result<MotorStatus, DecodeError> {
    let digits = strip_sign(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::malformed(format!(
            "{}: '{}' is not an integer",
            field, text
        )));
    }

    let code: i64 = text.parse().map_err(|_| {
        DecodeError::malformed(format!("{}: '{}' is not an integer", field, text))
    })?;

    MotorStatus::from_code(code).map_err(|_| {
        DecodeError::malformed(format!("{}: expected 0 or 1, got '{}'", field, text))
    })
}

/// `[+-]? digits? ('.' digits?)?` with at least one digit
fn is_decimal_literal(text: &str) -> bool {
    let unsigned = strip_sign(text);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    all_digits(whole) && all_digits(fraction) && !(whole.is_empty() && fraction.is_empty())
}

fn strip_sign(text: &str) -> &str {
    text.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<TelemetryReading, DecodeError>) -> String {
        match result {
            Err(DecodeError::Malformed { reason }) => reason,
            Ok(reading) => panic!("expected malformed frame, decoded {:?}", reading),
        }
    }

    #[test]
    fn test_decode_well_formed_frame() {
        let reading = decode_frame("1.2,0.5,1,0,10.0,100.0").unwrap();

        assert_eq!(
            reading,
            TelemetryReading {
                water_level: 1.2,
                chemical_level: 0.5,
                motor1_status: MotorStatus::Running,
                motor2_status: MotorStatus::Stopped,
                flow_rate: 10.0,
                total_amount: 100.0,
            }
        );
    }

    #[test]
    fn test_whitespace_around_fields_is_ignored() {
        let spaced = decode_frame("  1.2 , 0.5,\t1 ,0 , 10.0 ,100.0\r\n").unwrap();
        let compact = decode_frame("1.2,0.5,1,0,10.0,100.0").unwrap();
        assert_eq!(spaced, compact);
    }

    #[test]
    fn test_decimal_forms() {
        let reading = decode_frame(".5,3.,+1,-0,-2.25,12").unwrap();
        assert_eq!(reading.water_level, 0.5);
        assert_eq!(reading.chemical_level, 3.0);
        assert_eq!(reading.motor1_status, MotorStatus::Running);
        assert_eq!(reading.motor2_status, MotorStatus::Stopped);
        assert_eq!(reading.flow_rate, -2.25);
        assert_eq!(reading.total_amount, 12.0);
    }

    #[test]
    fn test_wrong_field_count() {
        assert_eq!(
            reason(decode_frame("1.2,0.5,1,0,10.0")),
            "expected 6 fields, got 5"
        );
        assert_eq!(
            reason(decode_frame("1.2,0.5,1,0,10.0,100.0,7")),
            "expected 6 fields, got 7"
        );
        assert_eq!(reason(decode_frame("")), "expected 6 fields, got 1");
    }

    #[test]
    fn test_motor_outside_domain() {
        let msg = reason(decode_frame("1.2,0.5,2,0,10.0,100.0"));
        assert!(msg.contains("motor1_status"));
        assert!(msg.contains("'2'"));
    }

    #[test]
    fn test_motor_must_be_integer() {
        let msg = reason(decode_frame("1.2,0.5,1,1.0,10.0,100.0"));
        assert!(msg.contains("motor2_status"));
        assert!(msg.contains("'1.0'"));
    }

    #[test]
    fn test_rejected_number_spellings() {
        for bad in ["1e3", "inf", "NaN", "0x1A", "", "-", ".", "1.2.3", "1 2", "abc"] {
            let payload = format!("{},0.5,1,0,10.0,100.0", bad);
            let msg = reason(decode_frame(&payload));
            assert!(
                msg.starts_with("water_level:"),
                "unexpected reason for {:?}: {}",
                bad,
                msg
            );
        }
    }

    #[test]
    fn test_overflowing_value_is_malformed() {
        let huge = "9".repeat(400);
        let payload = format!("1.2,0.5,1,0,{},100.0", huge);
        let msg = reason(decode_frame(&payload));
        assert!(msg.contains("flow_rate"));
        assert!(msg.contains("out of numeric range"));
    }

    #[test]
    fn test_payload_length_limit_counts_characters() {
        // Whitespace counts toward the limit even though decoding trims it
        let padded = format!("1.2,0.5,1,0,10.0,100.0{}", " ".repeat(1002));
        assert_eq!(padded.chars().count(), MAX_PAYLOAD_CHARS);
        assert!(decode_frame(&padded).is_ok());

        let over = "é".repeat(MAX_PAYLOAD_CHARS + 1);
        let msg = reason(decode_frame(&over));
        assert!(msg.contains("payload exceeds 1024 characters"));
    }

    #[test]
    fn test_decoding_is_idempotent() {
        let payload = "4.75, 0.0, 0, 1, -3.5, 2048.125";
        assert_eq!(decode_frame(payload), decode_frame(payload));
    }
}
