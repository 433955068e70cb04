//! Capability contracts exposed to the orchestration host, and the registry
//! through which configured components resolve each other.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use nalgebra as na;

use crate::config::AttributeMap;
use crate::error::{ControllerError, Result};

/// Joint angles reported by the device, in degrees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointPositions {
    pub base: f32,
    pub shoulder: f32,
    pub elbow: f32,
}

impl JointPositions {
    pub fn new(base: f32, shoulder: f32, elbow: f32) -> JointPositions {
        JointPositions {
            base,
            shoulder,
            elbow,
        }
    }
}

/// Whether the gripper believes it is grasping an object.
///
/// The device has no holding sensor, so this is the locally tracked state,
/// not ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingStatus {
    Holding,
    Open,
}

/// File formats a kinematics model could be served in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinematicsFormat {
    Sva,
    Urdf,
}

/// A kinematics model file as served to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicsModel {
    pub format: KinematicsFormat,
    pub data: Vec<u8>,
}

/// Spatial geometry a resource reports about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub label: String,
    pub center: na::Vector3<f32>,
}

/// A motion-capable resource exposing raw command passthrough.
///
/// Operations a device cannot express return
/// [`ControllerError::Unsupported`] instead of crashing the host.
#[async_trait]
pub trait Arm: Send + Sync {
    /// Current end effector position in mm, queried live from the device.
    async fn end_position(&self) -> Result<na::Vector3<f32>>;

    /// Issue a linear move. Returns once the command is queued on the
    /// device, not once motion completes.
    async fn move_to_position(&self, target: na::Vector3<f32>) -> Result<()>;

    async fn move_to_joint_positions(&self, joints: &JointPositions) -> Result<()>;

    /// Current joint angles, queried live from the device.
    async fn joint_positions(&self) -> Result<JointPositions>;

    /// Interrupt whatever the arm is doing.
    async fn stop(&self) -> Result<()>;

    async fn is_moving(&self) -> Result<bool>;

    /// Send one line of the device's ASCII protocol and return the response.
    async fn raw_command(&self, line: &str) -> Result<String>;

    async fn do_command(&self, command: &AttributeMap) -> Result<AttributeMap>;

    async fn kinematics(&self) -> Result<KinematicsModel>;

    async fn geometries(&self) -> Result<Vec<Geometry>>;
}

/// A gripper-capable resource.
#[async_trait]
pub trait Gripper: Send + Sync {
    async fn open(&self) -> Result<()>;

    /// Close on an object. Returns whether the gripper reports it is now
    /// holding something.
    async fn grab(&self) -> Result<bool>;

    /// Halt wrist rotation and park the gripper.
    async fn stop(&self) -> Result<()>;

    async fn holding_status(&self) -> Result<HoldingStatus>;

    async fn is_moving(&self) -> Result<bool>;

    /// Structured extension commands, see
    /// [`GripperCommand`](crate::gripper_controller::GripperCommand).
    async fn do_command(&self, command: &AttributeMap) -> Result<AttributeMap>;

    async fn kinematics(&self) -> Result<KinematicsModel>;

    async fn geometries(&self) -> Result<Vec<Geometry>>;
}

/// A resolved capability handle to a live resource.
#[derive(Clone)]
pub enum Resource {
    Arm(Arc<dyn Arm>),
    Gripper(Arc<dyn Gripper>),
}

impl Resource {
    pub fn capability(&self) -> &'static str {
        match self {
            Resource::Arm(_) => "arm",
            Resource::Gripper(_) => "gripper",
        }
    }
}

/// The set of dependencies the host resolved for a component before calling
/// its `reconfigure`.
#[derive(Clone, Default)]
pub struct Dependencies {
    resources: HashMap<String, Resource>,
}

impl Dependencies {
    pub fn new() -> Dependencies {
        Dependencies::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, resource: Resource) {
        self.resources.insert(name.into(), resource);
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Resolve a named dependency that must be arm-capable.
    pub fn arm(&self, name: &str) -> Result<Arc<dyn Arm>> {
        match self.resources.get(name) {
            Some(Resource::Arm(arm)) => Ok(arm.clone()),
            Some(other) => Err(ControllerError::MissingDependency(format!(
                "{name:?} is {}-capable, not arm-capable",
                other.capability()
            ))),
            None => Err(ControllerError::MissingDependency(format!(
                "no resource named {name:?}"
            ))),
        }
    }
}
