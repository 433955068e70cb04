//! Device-control adapter for the Rotrics DexArm desktop arm and its rotary
//! gripper module.
//!
//! The arm owns the single serial connection to the device and translates
//! motion requests into the device's line-oriented ASCII protocol. The
//! gripper holds no connection of its own; it is bound by name to an arm at
//! configuration time and forwards every command through the arm's raw
//! command channel.

pub mod arm_controller;
pub mod arm_driver;
pub mod config;
pub mod error;
pub mod gripper_controller;
pub mod protocol;
pub mod resource;

pub use arm_controller::DexArm;
pub use config::{AttributeMap, ComponentConfig};
pub use error::{ControllerError, Result};
pub use gripper_controller::RotaryGripper;
pub use resource::{Arm, Dependencies, Gripper, HoldingStatus, Resource};
