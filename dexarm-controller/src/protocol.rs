//! Assembly of the device's line-oriented ASCII command protocol.
//!
//! The firmware reads carriage-return terminated lines and acknowledges each
//! one with an `ok` reply once it has been queued.

use nalgebra as na;

/// Every command line is terminated by a carriage return.
pub const TERMINATOR: char = '\r';

/// The device acknowledges every line with a reply starting with this.
pub const ACK: &str = "ok";

/// Default linear move feedrate in mm/min.
pub const DEFAULT_FEEDRATE: u32 = 2000;

/// Return the arm to its home position.
pub fn home() -> String {
    with_terminator("M1112")
}

/// Query the current position report.
pub fn query_position() -> String {
    with_terminator("M114")
}

/// Linear move to a target in mm. The firmware expects whole-millimeter
/// coordinates with the feedrate leading.
pub fn move_linear(target: na::Vector3<f32>, feedrate: u32) -> String {
    with_terminator(&format!(
        "G1F{}X{}Y{}Z{}",
        feedrate,
        target.x.round() as i64,
        target.y.round() as i64,
        target.z.round() as i64
    ))
}

/// Open the gripper jaws.
pub fn gripper_open() -> String {
    with_terminator("M1000")
}

/// Close the gripper jaws.
pub fn gripper_grab() -> String {
    with_terminator("M1001")
}

/// Park the gripper module.
pub fn gripper_park() -> String {
    with_terminator("M1003")
}

/// Halt wrist rotation.
pub fn wrist_stop() -> String {
    with_terminator("M2101 STOP")
}

/// Rotate the wrist to an absolute angle in degrees.
pub fn wrist_absolute(degrees: f64) -> String {
    with_terminator(&format!("M2101 P{}", fmt_number(degrees)))
}

/// Rotate the wrist continuously at a signed speed.
pub fn wrist_continuous(speed: f64) -> String {
    with_terminator(&format!("M2101 S{}", fmt_number(speed)))
}

/// Perform one bounded wrist rotation at a signed speed.
pub fn wrist_bounded(speed: f64) -> String {
    with_terminator(&format!("M2101 R{}", fmt_number(speed)))
}

/// Append the line terminator when it is not already present.
pub fn with_terminator(line: &str) -> String {
    if line.ends_with(TERMINATOR) {
        line.to_owned()
    } else {
        format!("{line}{TERMINATOR}")
    }
}

/// Format a number the way the firmware expects: integral values carry no
/// decimal point.
fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
