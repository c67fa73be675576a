/// A single 3-axis inertial sample, as delivered by the host OS's sensor callbacks. Not
/// persisted as an entity; streamed straight to a [`crate::sensor_file::SensorFile`] by the
/// sampling pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorValue {
    /// Milliseconds since epoch.
    pub time: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SensorValue {
    pub fn new(time: i64, x: f64, y: f64, z: f64) -> Self {
        SensorValue { time, x, y, z }
    }
}
