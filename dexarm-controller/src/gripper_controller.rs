//! Controller for the rotary gripper mounted on the arm's wrist module.
//!
//! The gripper performs no hardware I/O of its own. It is bound by name to a
//! configured arm and expresses every gripper operation as raw protocol
//! lines forwarded through the arm's command channel, so both components
//! share the arm's wire serialization point.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{AttributeMap, ComponentConfig};
use crate::error::{ControllerError, Result};
use crate::protocol;
use crate::resource::{
    Arm, Dependencies, Geometry, Gripper, HoldingStatus, KinematicsModel,
};

/// How `grab` reports success.
///
/// The device has no holding sensor, so neither variant can observe the
/// object itself; they differ in when the local holding state is recorded
/// relative to the device acknowledging the grab command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabBehavior {
    /// Record holding only after the device acknowledged the command.
    #[default]
    Confirmed,
    /// Record holding before the command is sent, trusting it will succeed.
    Optimistic,
}

impl GrabBehavior {
    fn from_config(config: &ComponentConfig) -> Result<GrabBehavior> {
        match config.optional_string("grab_behavior")? {
            None => Ok(GrabBehavior::default()),
            Some("confirmed") => Ok(GrabBehavior::Confirmed),
            Some("optimistic") => Ok(GrabBehavior::Optimistic),
            Some(other) => Err(ControllerError::Configuration(format!(
                "grab_behavior must be \"confirmed\" or \"optimistic\", got {other:?}"
            ))),
        }
    }
}

/// Rotation direction of the wrist module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Clockwise,
    #[serde(alias = "anticlockwise")]
    Counterclockwise,
}

impl Direction {
    fn signed(self, speed: f64) -> f64 {
        match self {
            Direction::Clockwise => speed,
            Direction::Counterclockwise => -speed,
        }
    }
}

/// Options of the `rotate_wrist` extension command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotateWrist {
    /// Rotation speed magnitude. Defaults to 1000.
    pub speed: f64,
    /// Rotation sign. Defaults to clockwise.
    pub direction: Direction,
    /// Rotate continuously instead of one bounded rotation. Defaults to off.
    pub keep_rotating: bool,
    /// When set, move the wrist to this absolute angle in degrees first.
    pub to_degrees: Option<f64>,
}

impl Default for RotateWrist {
    fn default() -> RotateWrist {
        RotateWrist {
            speed: 1000.0,
            direction: Direction::default(),
            keep_rotating: false,
            to_degrees: None,
        }
    }
}

/// Extension commands the gripper understands.
#[derive(Debug, Clone, PartialEq)]
pub enum GripperCommand {
    RotateWrist(RotateWrist),
}

impl GripperCommand {
    /// Parse a host command map. Commands that are not recognized are
    /// rejected instead of silently ignored.
    pub fn from_attributes(command: &AttributeMap) -> Result<GripperCommand> {
        if let Some(options) = command.get("rotate_wrist") {
            if let Some(unknown) = command.keys().find(|key| *key != "rotate_wrist") {
                return Err(ControllerError::UnrecognizedCommand(unknown.clone()));
            }
            let options = RotateWrist::deserialize(options).map_err(|error| {
                ControllerError::Configuration(format!("invalid rotate_wrist options: {error}"))
            })?;
            return Ok(GripperCommand::RotateWrist(options));
        }
        match command.keys().next() {
            Some(key) => Err(ControllerError::UnrecognizedCommand(key.clone())),
            None => Err(ControllerError::UnrecognizedCommand(
                "(empty command)".to_owned(),
            )),
        }
    }
}

/// The gripper component.
///
/// Destroying a gripper never affects the arm it was bound to; the
/// reference is shared, not owned.
pub struct RotaryGripper {
    state: Mutex<GripperState>,
}

#[derive(Default)]
struct GripperState {
    arm_name: Option<String>,
    arm: Option<Arc<dyn Arm>>,
    holding: bool,
    grab_behavior: GrabBehavior,
}

fn bound_arm(state: &GripperState) -> Result<Arc<dyn Arm>> {
    state.arm.clone().ok_or(ControllerError::DeviceNotReady)
}

impl RotaryGripper {
    pub fn new() -> RotaryGripper {
        RotaryGripper {
            state: Mutex::new(GripperState::default()),
        }
    }

    /// Check a host-delivered configuration and list the names of required
    /// dependencies: the arm this gripper commands through.
    pub fn validate_config(config: &ComponentConfig) -> Result<Vec<String>> {
        let arm_name = config.required_string("arm_name")?;
        GrabBehavior::from_config(config)?;
        Ok(vec![arm_name.to_owned()])
    }

    /// Apply a new configuration.
    ///
    /// An unchanged `arm_name` is a no-op. A changed one is resolved against
    /// the dependency set; resolution failure leaves any previously bound
    /// arm untouched.
    pub async fn reconfigure(
        &self,
        config: &ComponentConfig,
        dependencies: &Dependencies,
    ) -> Result<()> {
        let arm_name = config.required_string("arm_name")?;
        let grab_behavior = GrabBehavior::from_config(config)?;

        let mut state = self.state.lock().await;
        state.grab_behavior = grab_behavior;
        if state.arm_name.as_deref() == Some(arm_name) {
            debug!(arm_name, "arm name unchanged, skipping reconfiguration");
            return Ok(());
        }
        let arm = dependencies.arm(arm_name)?;
        info!(arm_name, "binding gripper to arm");
        state.arm_name = Some(arm_name.to_owned());
        state.arm = Some(arm);
        Ok(())
    }

    async fn rotate_wrist(&self, options: RotateWrist) -> Result<()> {
        info!(
            speed = options.speed,
            direction = ?options.direction,
            keep_rotating = options.keep_rotating,
            "rotating wrist"
        );
        let state = self.state.lock().await;
        let arm = bound_arm(&state)?;
        if let Some(degrees) = options.to_degrees {
            arm.raw_command(&protocol::wrist_absolute(degrees)).await?;
        }
        let speed = options.direction.signed(options.speed);
        if options.keep_rotating {
            arm.raw_command(&protocol::wrist_continuous(speed)).await?;
        } else {
            arm.raw_command(&protocol::wrist_bounded(speed)).await?;
        }
        Ok(())
    }
}

impl Default for RotaryGripper {
    fn default() -> Self {
        RotaryGripper::new()
    }
}

#[async_trait]
impl Gripper for RotaryGripper {
    async fn open(&self) -> Result<()> {
        info!("opening gripper");
        let mut state = self.state.lock().await;
        let arm = bound_arm(&state)?;
        state.holding = false;
        arm.raw_command(&protocol::gripper_open()).await?;
        Ok(())
    }

    async fn grab(&self) -> Result<bool> {
        info!("closing gripper on object");
        let mut state = self.state.lock().await;
        let arm = bound_arm(&state)?;
        match state.grab_behavior {
            GrabBehavior::Optimistic => {
                state.holding = true;
                arm.raw_command(&protocol::gripper_grab()).await?;
            }
            GrabBehavior::Confirmed => {
                arm.raw_command(&protocol::gripper_grab()).await?;
                state.holding = true;
            }
        }
        Ok(state.holding)
    }

    async fn stop(&self) -> Result<()> {
        info!("stopping gripper");
        let mut state = self.state.lock().await;
        let arm = bound_arm(&state)?;
        state.holding = false;
        arm.raw_command(&protocol::wrist_stop()).await?;
        arm.raw_command(&protocol::gripper_park()).await?;
        Ok(())
    }

    async fn holding_status(&self) -> Result<HoldingStatus> {
        let state = self.state.lock().await;
        Ok(if state.holding {
            HoldingStatus::Holding
        } else {
            HoldingStatus::Open
        })
    }

    async fn is_moving(&self) -> Result<bool> {
        Err(ControllerError::Unsupported("is_moving"))
    }

    async fn do_command(&self, command: &AttributeMap) -> Result<AttributeMap> {
        match GripperCommand::from_attributes(command)? {
            GripperCommand::RotateWrist(options) => self.rotate_wrist(options).await?,
        }
        Ok(AttributeMap::new())
    }

    async fn kinematics(&self) -> Result<KinematicsModel> {
        Err(ControllerError::Unsupported("kinematics"))
    }

    async fn geometries(&self) -> Result<Vec<Geometry>> {
        Err(ControllerError::Unsupported("geometries"))
    }
}
