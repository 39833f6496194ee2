// Omniwheel kinematics for the 3-wheel base
// Converts body-frame velocities (x, y, theta) to individual wheel velocities and back.

use serde::{Deserialize, Serialize};

use super::codec::{self, STEPS_PER_DEG};
use crate::messages::{BodyVelocity, Joint, WheelCommand};

/// Default wheel configuration
pub const WHEEL_RADIUS: f64 = 0.05; // meters
pub const BASE_RADIUS: f64 = 0.125; // meters (distance from center to wheel)

/// Wheel mounting angles (degrees) with -90° offset
/// Left wheel at 240°, Back wheel at 0°, Right wheel at 120°
const WHEEL_ANGLES_DEG: [f64; 3] = [240.0 - 90.0, 0.0 - 90.0, 120.0 - 90.0];

/// Default raw velocity cap for the base (safety limit)
pub const MAX_RAW: i32 = 3000;

/// Below this raw-step peak the rescale branch is skipped
const PEAK_EPSILON: f64 = 1e-6;

/// Physical base dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Wheel radius in meters
    pub wheel_radius: f64,
    /// Center-to-wheel distance in meters
    pub base_radius: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS,
            base_radius: BASE_RADIUS,
        }
    }
}

/// Angular wheel velocities in deg/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelSpeeds {
    pub left: f64,
    pub back: f64,
    pub right: f64,
}

impl WheelSpeeds {
    pub fn new(left: f64, back: f64, right: f64) -> Self {
        Self { left, back, right }
    }

    /// Returns velocities as array [left, back, right]
    pub fn as_array(&self) -> [f64; 3] {
        [self.left, self.back, self.right]
    }

    fn from_array([left, back, right]: [f64; 3]) -> Self {
        Self { left, back, right }
    }
}

/// Forward/inverse kinematics for a 120°-spaced omniwheel base
#[derive(Debug, Clone)]
pub struct OmniKinematics {
    geometry: Geometry,
    max_raw: i32,
    /// Rows of [cos(a), sin(a), base_radius]
    matrix: [[f64; 3]; 3],
}

impl OmniKinematics {
    pub fn new(geometry: Geometry, max_raw: i32) -> Self {
        let mut matrix = [[0.0; 3]; 3];
        for (row, &angle_deg) in matrix.iter_mut().zip(WHEEL_ANGLES_DEG.iter()) {
            let angle_rad = angle_deg.to_radians();
            *row = [angle_rad.cos(), angle_rad.sin(), geometry.base_radius];
        }

        Self {
            geometry,
            max_raw,
            matrix,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn max_raw(&self) -> i32 {
        self.max_raw
    }

    /// Convert a body velocity to wheel angular velocities
    ///
    /// The result is uniformly rescaled so that no wheel exceeds `max_raw`
    /// once encoded; wheel ratios (and therefore heading) are preserved.
    pub fn body_to_wheels(&self, v: BodyVelocity) -> WheelSpeeds {
        // Positive body velocity maps to negative drive direction with this wheel mounting
        let velocity = [-v.x, -v.y, v.theta.to_radians()];

        // Linear speed = cos(a)*x + sin(a)*y + base_radius*theta_rad
        let wheel_linear_speeds = self.matrix.map(|row| dot(row, velocity));

        // m/s -> rad/s -> deg/s
        let mut wheel_degps =
            wheel_linear_speeds.map(|linear| (linear / self.geometry.wheel_radius).to_degrees());

        let peak = wheel_degps
            .iter()
            .map(|degps| degps.abs() * STEPS_PER_DEG)
            .fold(0.0f64, f64::max);

        if peak > self.max_raw as f64 && peak > PEAK_EPSILON {
            let scale = self.max_raw as f64 / peak;
            for degps in &mut wheel_degps {
                *degps *= scale;
            }
        }

        WheelSpeeds::from_array(wheel_degps)
    }

    /// Recover the body velocity from wheel angular velocities
    ///
    /// Diagnostics only; the live control path never inverts.
    pub fn wheels_to_body(&self, wheels: WheelSpeeds) -> BodyVelocity {
        let linear = wheels
            .as_array()
            .map(|degps| degps.to_radians() * self.geometry.wheel_radius);

        // The mount angles are fixed and distinct, so the matrix is never singular
        // for a positive base radius.
        let inverse = invert_3x3(self.matrix).unwrap_or([[0.0; 3]; 3]);
        let [x, y, theta_rad] = inverse.map(|row| dot(row, linear));

        BodyVelocity {
            x: -x,
            y: -y,
            theta: theta_rad.to_degrees(),
        }
    }

    /// Body velocity straight to raw base commands
    pub fn body_to_command(&self, v: BodyVelocity) -> WheelCommand {
        let wheels = self.body_to_wheels(v);
        [
            (Joint::Left, codec::encode(wheels.left)),
            (Joint::Back, codec::encode(wheels.back)),
            (Joint::Right, codec::encode(wheels.right)),
        ]
        .into_iter()
        .collect()
    }

    /// Raw base commands back to a body velocity (missing wheels read as zero)
    pub fn command_to_body(&self, command: &WheelCommand) -> BodyVelocity {
        let decode = |joint| codec::decode(command.get(joint).unwrap_or(0));
        self.wheels_to_body(WheelSpeeds::new(
            decode(Joint::Left),
            decode(Joint::Back),
            decode(Joint::Right),
        ))
    }
}

impl Default for OmniKinematics {
    fn default() -> Self {
        Self::new(Geometry::default(), MAX_RAW)
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Inverse of a 3x3 matrix by cofactor expansion, `None` if singular
fn invert_3x3(m: [[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;

    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}
