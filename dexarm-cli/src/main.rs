use anyhow::Result;
use clap::{Parser, Subcommand};
use dexarm_controller::{
    arm_controller::DexArm,
    config::{AttributeMap, ComponentConfig},
    gripper_controller::RotaryGripper,
    resource::{Arm, Dependencies, Gripper, Resource},
};
use nalgebra as na;
use serde_json::json;
use std::sync::Arc;

mod logging;

#[derive(Parser)]
#[command(author, version, about = "Operator console for the DexArm and its rotary gripper")]
struct Args {
    /// Serial port the arm is connected to
    #[arg(short, long)]
    port: String,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current end effector position
    Position,
    /// Print the current joint angles
    Joints,
    /// Move the end effector to a position in mm
    Move { x: f32, y: f32, z: f32 },
    /// Send the arm home
    Home,
    /// Open the gripper
    Open,
    /// Close the gripper on an object
    Grab,
    /// Stop wrist rotation and park the gripper
    Stop,
    /// Rotate the wrist module
    RotateWrist {
        /// Rotation speed magnitude
        #[arg(long, default_value_t = 1000.0)]
        speed: f64,
        /// "clockwise" or "counterclockwise"
        #[arg(long, default_value = "clockwise")]
        direction: String,
        /// Keep rotating until stopped
        #[arg(long)]
        keep_rotating: bool,
        /// Move to an absolute angle first
        #[arg(long)]
        to_degrees: Option<f64>,
    },
    /// Send a raw protocol line and print the response
    Raw { line: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbose);

    let arm = Arc::new(DexArm::new());
    let arm_config = ComponentConfig::new("arm").with_attribute("port", args.port.clone());
    DexArm::validate_config(&arm_config)?;
    arm.reconfigure(&arm_config).await?;

    match args.command {
        Command::Position => {
            let position = arm.end_position().await?;
            println!(
                "x: {:.2}\ny: {:.2}\nz: {:.2}",
                position.x, position.y, position.z
            );
        }
        Command::Joints => {
            let joints = arm.joint_positions().await?;
            println!(
                "base: {:.2}\nshoulder: {:.2}\nelbow: {:.2}",
                joints.base, joints.shoulder, joints.elbow
            );
        }
        Command::Move { x, y, z } => {
            arm.move_to_position(na::Vector3::new(x, y, z)).await?;
        }
        Command::Home => {
            arm.stop().await?;
        }
        Command::Raw { line } => {
            let response = arm.raw_command(&line).await?;
            if !response.is_empty() {
                println!("{response}");
            }
        }
        gripper_command => {
            let gripper = RotaryGripper::new();
            let mut dependencies = Dependencies::new();
            dependencies.insert("arm", Resource::Arm(arm.clone()));
            let gripper_config =
                ComponentConfig::new("gripper").with_attribute("arm_name", "arm");
            RotaryGripper::validate_config(&gripper_config)?;
            gripper.reconfigure(&gripper_config, &dependencies).await?;

            match gripper_command {
                Command::Open => gripper.open().await?,
                Command::Grab => {
                    let holding = gripper.grab().await?;
                    println!("holding: {holding}");
                }
                Command::Stop => gripper.stop().await?,
                Command::RotateWrist {
                    speed,
                    direction,
                    keep_rotating,
                    to_degrees,
                } => {
                    let mut options = AttributeMap::new();
                    options.insert("speed".to_owned(), json!(speed));
                    options.insert("direction".to_owned(), json!(direction));
                    options.insert("keep_rotating".to_owned(), json!(keep_rotating));
                    if let Some(degrees) = to_degrees {
                        options.insert("to_degrees".to_owned(), json!(degrees));
                    }
                    let mut command = AttributeMap::new();
                    command.insert("rotate_wrist".to_owned(), options.into());
                    gripper.do_command(&command).await?;
                }
                _ => unreachable!("non-gripper commands are handled above"),
            }
        }
    }

    arm.close().await?;
    Ok(())
}
