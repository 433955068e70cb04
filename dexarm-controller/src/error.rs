use std::time::Duration;
use thiserror::Error;

/// Errors produced by the arm and gripper controllers.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("cannot resolve required dependency: {0}")]
    MissingDependency(String),
    #[error("failed to open serial port {port}")]
    Connection {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("serial link failure")]
    Serial(#[from] tokio_serial::Error),
    #[error("device is not connected, configure a port first")]
    DeviceNotReady,
    #[error("device did not answer within {0:?}")]
    DeviceTimeout(Duration),
    #[error("`{0}` is not supported by this device")]
    Unsupported(&'static str),
    #[error("unrecognized command {0:?}")]
    UnrecognizedCommand(String),
    #[error("serial i/o failed")]
    Io(#[from] std::io::Error),
    #[error("could not parse device response {0:?}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
