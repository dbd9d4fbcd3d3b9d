use crate::{Result, SchedulerError};
use sextant_core::PressureRatio;

/// Convert a raw reading into a pressure ratio against the fleet maximum.
///
/// - `fleet_max <= 0` means nobody measured this resource: `Unknown`.
/// - `current > fleet_max` (stale maximum) clamps to exactly 1.0.
/// - Negative or non-finite input is an `InvalidReading`.
pub fn normalize(current: f64, fleet_max: f64) -> Result<PressureRatio> {
    if !fleet_max.is_finite() {
        return Err(SchedulerError::invalid_reading(current, fleet_max));
    }

    if fleet_max <= 0.0 {
        return Ok(PressureRatio::Unknown);
    }

    if !current.is_finite() || current < 0.0 {
        return Err(SchedulerError::invalid_reading(current, fleet_max));
    }

    if current == 0.0 {
        return Ok(PressureRatio::Idle);
    }

    if current >= fleet_max {
        return Ok(PressureRatio::Loaded(1.0));
    }

    Ok(PressureRatio::Loaded(current / fleet_max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_is_unknown() {
        for current in [0.0, 0.5, 1.0, 1e9] {
            assert_eq!(normalize(current, 0.0).unwrap(), PressureRatio::Unknown);
        }
        assert_eq!(normalize(3.0, -1.0).unwrap(), PressureRatio::Unknown);
    }

    #[test]
    fn test_ratio_within_range() {
        assert_eq!(normalize(50.0, 100.0).unwrap(), PressureRatio::Loaded(0.5));
        assert_eq!(normalize(1.0, 4.0).unwrap(), PressureRatio::Loaded(0.25));
        assert_eq!(normalize(100.0, 100.0).unwrap(), PressureRatio::Loaded(1.0));
        assert_eq!(normalize(0.0, 100.0).unwrap(), PressureRatio::Idle);
    }

    #[test]
    fn test_ratio_matches_division() {
        let max = 7.3;
        for i in 0..=73 {
            let current = i as f64 / 10.0;
            let ratio = normalize(current, max).unwrap().value().unwrap();
            assert!((ratio - (current / max).min(1.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_above_max_clamps_to_one() {
        assert_eq!(normalize(150.0, 100.0).unwrap(), PressureRatio::Loaded(1.0));
        assert_eq!(normalize(f64::MAX, 1.0).unwrap(), PressureRatio::Loaded(1.0));
    }

    #[test]
    fn test_invalid_readings() {
        assert!(matches!(
            normalize(-1.0, 10.0),
            Err(SchedulerError::InvalidReading { .. })
        ));
        assert!(matches!(
            normalize(f64::NAN, 10.0),
            Err(SchedulerError::InvalidReading { .. })
        ));
        assert!(matches!(
            normalize(1.0, f64::INFINITY),
            Err(SchedulerError::InvalidReading { .. })
        ));
    }
}
