use crate::domain::ValidationError;
use common::domain::{ParsedReading, ReadingField, Site, TelemetryReading};

/// Check a decoded reading against the site's geometry and the site's last
/// accepted reading.
///
/// Checks run in order and the first failure wins:
/// 1. `0 <= water_level <= site.height`
/// 2. `chemical_level >= 0`
/// 3. `flow_rate` is finite
/// 4. `total_amount >= 0`, and not below the previous total
pub fn validate_reading(
    reading: TelemetryReading,
    site: &Site,
    previous: Option<&ParsedReading>,
) -> Result<TelemetryReading, ValidationError> {
    if !(0.0..=site.height).contains(&reading.water_level) {
        let bound = if reading.water_level < 0.0 {
            0.0
        } else {
            site.height
        };
        return Err(out_of_range(
            ReadingField::WaterLevel,
            reading.water_level,
            bound,
        ));
    }

    if !(0.0..).contains(&reading.chemical_level) {
        return Err(out_of_range(
            ReadingField::ChemicalLevel,
            reading.chemical_level,
            0.0,
        ));
    }

    if !reading.flow_rate.is_finite() {
        return Err(out_of_range(ReadingField::FlowRate, reading.flow_rate, f64::MAX));
    }

    if !(0.0..).contains(&reading.total_amount) {
        return Err(out_of_range(
            ReadingField::TotalAmount,
            reading.total_amount,
            0.0,
        ));
    }
    if let Some(previous) = previous {
        let previous_total = previous.reading.total_amount;
        if reading.total_amount < previous_total {
            return Err(ValidationError::NonMonotonicTotal {
                previous: previous_total,
                observed: reading.total_amount,
            });
        }
    }

    Ok(reading)
}

fn out_of_range(field: ReadingField, value: f64, bound: f64) -> ValidationError {
    ValidationError::OutOfRange {
        field,
        value,
        bound,
    }
}
