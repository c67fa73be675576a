//! Fixed-point scaling factors used on the wire. These are part of the wire contract (§6 of
//! the format description) and must never change without bumping the format version, so C2
//! and C6 both import them from here rather than each hard-coding their own constant.

/// Micro-degrees per degree, used for latitude/longitude.
pub const COORD_SCALE: f64 = 1_000_000.0;

/// Centimetres per metre, used for horizontal/vertical accuracy.
pub const ACCURACY_SCALE: f64 = 100.0;

/// Centimetres-per-second per metre-per-second, used for speed.
pub const SPEED_SCALE: f64 = 100.0;

/// Millimetres per metre, used for accelerometer/gyroscope/magnetometer axis values.
pub const SENSOR_SCALE: f64 = 1_000.0;

/// Converts a coordinate in degrees to scaled micro-degrees, rounding to the nearest integer.
pub fn coord_to_fixed(degrees: f64) -> i32 {
    (degrees * COORD_SCALE).round() as i32
}

/// Inverse of [`coord_to_fixed`].
pub fn coord_from_fixed(micro_degrees: i32) -> f64 {
    micro_degrees as f64 / COORD_SCALE
}

/// Converts a value in metres to scaled centimetres.
pub fn accuracy_to_fixed(metres: f64) -> i32 {
    (metres * ACCURACY_SCALE).round() as i32
}

/// Inverse of [`accuracy_to_fixed`].
pub fn accuracy_from_fixed(centimetres: i32) -> f64 {
    centimetres as f64 / ACCURACY_SCALE
}

/// Converts a value in metres-per-second to scaled centimetres-per-second.
pub fn speed_to_fixed(metres_per_second: f64) -> i32 {
    (metres_per_second * SPEED_SCALE).round() as i32
}

/// Inverse of [`speed_to_fixed`].
pub fn speed_from_fixed(centimetres_per_second: i32) -> f64 {
    centimetres_per_second as f64 / SPEED_SCALE
}

/// Converts a sensor axis value (in SI units) to scaled millimetres.
pub fn sensor_to_fixed(value: f64) -> i32 {
    (value * SENSOR_SCALE).round() as i32
}

/// Inverse of [`sensor_to_fixed`].
pub fn sensor_from_fixed(millis: i32) -> f64 {
    millis as f64 / SENSOR_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_round_trip_is_exact_to_six_digits() {
        let lat = 50.851368;
        let fixed = coord_to_fixed(lat);
        assert_eq!(fixed, 50_851_368);
        assert!((coord_from_fixed(fixed) - lat).abs() < 1e-6);
    }

    #[test]
    fn accuracy_and_speed_round_trip_to_centimetre_precision() {
        assert_eq!(accuracy_to_fixed(1.0), 100);
        assert_eq!(accuracy_from_fixed(100), 1.0);
        assert_eq!(speed_to_fixed(1.0), 100);
        assert_eq!(speed_from_fixed(100), 1.0);
    }

    #[test]
    fn sensor_round_trips_to_millimetre_precision() {
        assert_eq!(sensor_to_fixed(1.0), 1_000);
        assert_eq!(sensor_from_fixed(1_000), 1.0);
    }
}
