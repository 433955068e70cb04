//! Boundary to the physical device: a structured driver trait plus the real
//! serial implementation over tokio-serial.

use std::time::Duration;

use async_trait::async_trait;
use nalgebra as na;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::trace;

use crate::error::{ControllerError, Result};
use crate::protocol;

/// Serial link speed of the device.
pub const BAUD_RATE: u32 = 115_200;

/// Default budget for a single command/response exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Live position record parsed from a position query.
///
/// `x`/`y`/`z` are the Cartesian end effector coordinates in mm, `e` the
/// extruder-style accessory axis, `a`/`b`/`c` the joint angles in degrees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DevicePosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub e: f32,
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

/// Structured calls the controllers make against the device.
///
/// One driver instance owns one open serial session. Calls are
/// request/response: each sends a line and waits for the firmware
/// acknowledgment before returning.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Send one protocol line verbatim (terminator added when absent) and
    /// return the response body, without the acknowledgment line.
    async fn send(&mut self, line: &str) -> Result<String>;

    /// Return the arm to its home position.
    async fn go_home(&mut self) -> Result<()>;

    /// Queue a linear move on the device.
    async fn move_to(&mut self, target: na::Vector3<f32>, feedrate: u32) -> Result<()>;

    /// Query the live position report.
    async fn current_position(&mut self) -> Result<DevicePosition>;

    /// Release the serial session.
    async fn close(&mut self) -> Result<()>;
}

/// Opens device drivers for a named port. This is the seam test doubles
/// implement to observe connection lifecycle.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self, port: &str) -> Result<Box<dyn DeviceDriver>>;
}

/// Factory producing [`SerialDeviceDriver`] instances.
pub struct SerialDriverFactory {
    timeout: Duration,
}

impl SerialDriverFactory {
    pub fn new() -> SerialDriverFactory {
        SerialDriverFactory {
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }

    /// Use a custom per-exchange timeout instead of the default.
    pub fn with_timeout(timeout: Duration) -> SerialDriverFactory {
        SerialDriverFactory { timeout }
    }
}

impl Default for SerialDriverFactory {
    fn default() -> Self {
        SerialDriverFactory::new()
    }
}

#[async_trait]
impl DriverFactory for SerialDriverFactory {
    async fn open(&self, port: &str) -> Result<Box<dyn DeviceDriver>> {
        Ok(Box::new(SerialDeviceDriver::open(port, self.timeout)?))
    }
}

/// Driver over a real serial port.
pub struct SerialDeviceDriver {
    reader: BufReader<ReadHalf<SerialStream>>,
    writer: WriteHalf<SerialStream>,
    timeout: Duration,
}

impl SerialDeviceDriver {
    pub fn open(port: &str, timeout: Duration) -> Result<SerialDeviceDriver> {
        let stream = tokio_serial::new(port, BAUD_RATE)
            .open_native_async()
            .map_err(|source| ControllerError::Connection {
                port: port.to_owned(),
                source,
            })?;
        // The firmware prints a greeting banner on connect; drop it so it is
        // not mistaken for the first command's reply.
        stream.clear(ClearBuffer::All)?;
        let (read, write) = tokio::io::split(stream);
        Ok(SerialDeviceDriver {
            reader: BufReader::new(read),
            writer: write,
            timeout,
        })
    }

    /// Write one line and collect reply lines until the acknowledgment.
    async fn exchange(&mut self, line: &str) -> Result<String> {
        trace!(line, "sending");
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.exchange_inner(line))
            .await
            .map_err(|_| ControllerError::DeviceTimeout(timeout))?
    }

    async fn exchange_inner(&mut self, line: &str) -> Result<String> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        let mut response = String::new();
        loop {
            let mut reply = String::new();
            let read = self.reader.read_line(&mut reply).await?;
            if read == 0 {
                return Err(ControllerError::MalformedResponse(
                    "link closed before acknowledgment".to_owned(),
                ));
            }
            let reply = reply.trim_end_matches(['\r', '\n']);
            trace!(reply, "received");
            if reply
                .trim_start()
                .to_ascii_lowercase()
                .starts_with(protocol::ACK)
            {
                return Ok(response);
            }
            if !response.is_empty() {
                response.push('\n');
            }
            response.push_str(reply);
        }
    }
}

#[async_trait]
impl DeviceDriver for SerialDeviceDriver {
    async fn send(&mut self, line: &str) -> Result<String> {
        self.exchange(&protocol::with_terminator(line)).await
    }

    async fn go_home(&mut self) -> Result<()> {
        self.exchange(&protocol::home()).await?;
        Ok(())
    }

    async fn move_to(&mut self, target: na::Vector3<f32>, feedrate: u32) -> Result<()> {
        self.exchange(&protocol::move_linear(target, feedrate))
            .await?;
        Ok(())
    }

    async fn current_position(&mut self) -> Result<DevicePosition> {
        let response = self.exchange(&protocol::query_position()).await?;
        parse_position(&response)
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Parse the labeled floats of a position report, e.g.
/// `X:0.00 Y:300.00 Z:0.00 E:0.00 A:0.00 B:-45.00 C:45.00`.
///
/// Only the first occurrence of each label counts; some firmware revisions
/// append raw step counts under repeated labels.
fn parse_position(response: &str) -> Result<DevicePosition> {
    let mut x = None;
    let mut y = None;
    let mut z = None;
    let mut e = None;
    let mut a = None;
    let mut b = None;
    let mut c = None;
    for token in response.split_whitespace() {
        let Some((label, value)) = token.split_once(':') else {
            continue;
        };
        let Ok(value) = value.parse::<f32>() else {
            continue;
        };
        let slot = match label {
            "X" => &mut x,
            "Y" => &mut y,
            "Z" => &mut z,
            "E" => &mut e,
            "A" => &mut a,
            "B" => &mut b,
            "C" => &mut c,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
    match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Ok(DevicePosition {
            x,
            y,
            z,
            e: e.unwrap_or(0.0),
            a: a.unwrap_or(0.0),
            b: b.unwrap_or(0.0),
            c: c.unwrap_or(0.0),
        }),
        _ => Err(ControllerError::MalformedResponse(response.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_full_position_report() {
        let position =
            parse_position("X:0.00 Y:300.00 Z:0.00 E:0.00 A:10.00 B:-45.00 C:45.00").unwrap();
        assert_relative_eq!(position.x, 0.0);
        assert_relative_eq!(position.y, 300.0);
        assert_relative_eq!(position.z, 0.0);
        assert_relative_eq!(position.a, 10.0);
        assert_relative_eq!(position.b, -45.0);
        assert_relative_eq!(position.c, 45.0);
    }

    #[test]
    fn first_label_occurrence_wins_over_step_counts() {
        let position = parse_position("X:1.50 Y:2.50 Z:3.50 Count X:120 Y:200 Z:280").unwrap();
        assert_relative_eq!(position.x, 1.5);
        assert_relative_eq!(position.y, 2.5);
        assert_relative_eq!(position.z, 3.5);
    }

    #[test]
    fn missing_axes_default_to_zero() {
        let position = parse_position("X:1.00 Y:2.00 Z:3.00").unwrap();
        assert_relative_eq!(position.e, 0.0);
        assert_relative_eq!(position.a, 0.0);
    }

    #[test]
    fn report_without_cartesian_axes_is_malformed() {
        let error = parse_position("wait start").unwrap_err();
        assert!(matches!(error, ControllerError::MalformedResponse(_)));
    }
}
