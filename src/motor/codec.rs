// Velocity encoding for Feetech STS3215 actuators
//
// The goal/present velocity registers hold a signed step rate (steps/s) where
// one revolution is 4096 steps. On the wire the value is sign-magnitude:
// bit 15 = direction, bits 0-14 = magnitude.

/// Motor resolution: 4096 steps per revolution
pub const STEPS_PER_REVOLUTION: f64 = 4096.0;
pub const STEPS_PER_DEG: f64 = STEPS_PER_REVOLUTION / 360.0;

/// Largest magnitude the velocity register can hold
pub const RAW_LIMIT: i32 = 0x7FFF;

/// One encoding step expressed in deg/s
pub const DEGPS_PER_STEP: f64 = 360.0 / STEPS_PER_REVOLUTION;

/// Convert an angular velocity in deg/s to the raw register value.
///
/// Magnitude is rounded to the nearest step and saturated at [`RAW_LIMIT`],
/// so out-of-range requests clamp instead of wrapping. NaN encodes as zero.
pub fn encode(degps: f64) -> i32 {
    if degps.is_nan() {
        return 0;
    }
    let steps = (degps.abs() * STEPS_PER_DEG).round();
    let magnitude = if steps >= RAW_LIMIT as f64 {
        RAW_LIMIT
    } else {
        steps as i32
    };

    if degps < 0.0 { -magnitude } else { magnitude }
}

/// Convert a raw register value back to deg/s
pub fn decode(raw: i32) -> f64 {
    let degps = raw.unsigned_abs() as f64 / STEPS_PER_DEG;
    if raw < 0 { -degps } else { degps }
}

/// Pack a signed raw value into the sign-magnitude wire format
pub fn to_sign_magnitude(raw: i32) -> u16 {
    let magnitude = raw.unsigned_abs().min(RAW_LIMIT as u32) as u16;
    if raw < 0 { 0x8000 | magnitude } else { magnitude }
}

/// Unpack a sign-magnitude wire value
pub fn from_sign_magnitude(wire: u16) -> i32 {
    let magnitude = (wire & 0x7FFF) as i32;
    if wire & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
