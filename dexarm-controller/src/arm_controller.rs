//! Controller for the desktop arm. Owns the serial connection as a stateful
//! resource and translates capability calls into device protocol lines.

use async_trait::async_trait;
use nalgebra as na;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::arm_driver::{DeviceDriver, DriverFactory, SerialDriverFactory};
use crate::config::{AttributeMap, ComponentConfig};
use crate::error::{ControllerError, Result};
use crate::protocol;
use crate::resource::{Arm, Geometry, JointPositions, KinematicsModel};

/// The arm component.
///
/// Created unconfigured; [`reconfigure`](DexArm::reconfigure) with a `port`
/// attribute opens the connection and homes the device. The underlying
/// serial session is closed when the controller is dropped or
/// [`close`](DexArm::close)d.
pub struct DexArm {
    factory: Box<dyn DriverFactory>,
    // One lock guards the connection handle and command issuance, so
    // reconfiguration can never interleave with an in-flight command and
    // commands are strictly serialized on the wire.
    state: Mutex<ArmState>,
}

struct ArmState {
    port: Option<String>,
    feedrate: u32,
    driver: Option<Box<dyn DeviceDriver>>,
}

impl DexArm {
    /// An unconfigured controller talking over a real serial port.
    pub fn new() -> DexArm {
        DexArm::with_factory(Box::new(SerialDriverFactory::new()))
    }

    /// An unconfigured controller with a custom transport behind the driver
    /// seam.
    pub fn with_factory(factory: Box<dyn DriverFactory>) -> DexArm {
        DexArm {
            factory,
            state: Mutex::new(ArmState {
                port: None,
                feedrate: protocol::DEFAULT_FEEDRATE,
                driver: None,
            }),
        }
    }

    /// Check a host-delivered configuration and list the names of required
    /// dependencies. The arm depends on nothing.
    pub fn validate_config(config: &ComponentConfig) -> Result<Vec<String>> {
        config.required_string("port")?;
        config.positive_integer_or("speed", protocol::DEFAULT_FEEDRATE)?;
        Ok(Vec::new())
    }

    /// Apply a new configuration.
    ///
    /// An unchanged `port` leaves the connection alone. A changed `port`
    /// closes the previous connection first, then opens and homes the new
    /// one. When the open fails the controller is left unconfigured; no
    /// partially configured instance accepts commands.
    pub async fn reconfigure(&self, config: &ComponentConfig) -> Result<()> {
        let port = config.required_string("port")?;
        let feedrate = config.positive_integer_or("speed", protocol::DEFAULT_FEEDRATE)?;

        let mut state = self.state.lock().await;
        state.feedrate = feedrate;
        if state.port.as_deref() == Some(port) {
            debug!(port, "port unchanged, skipping reconfiguration");
            return Ok(());
        }
        if let Some(mut old) = state.driver.take() {
            info!("closing previous connection");
            old.close().await?;
        }
        state.port = None;
        info!(port, "connecting to arm");
        let mut driver = self.factory.open(port).await?;
        driver.go_home().await?;
        state.port = Some(port.to_owned());
        state.driver = Some(driver);
        Ok(())
    }

    /// Close the connection. The controller accepts commands again only
    /// after a successful `reconfigure`.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.port = None;
        if let Some(mut driver) = state.driver.take() {
            driver.close().await?;
        }
        Ok(())
    }
}

impl Default for DexArm {
    fn default() -> Self {
        DexArm::new()
    }
}

#[async_trait]
impl Arm for DexArm {
    async fn end_position(&self) -> Result<na::Vector3<f32>> {
        let mut state = self.state.lock().await;
        let driver = state.driver.as_mut().ok_or(ControllerError::DeviceNotReady)?;
        let position = driver.current_position().await?;
        Ok(na::Vector3::new(position.x, position.y, position.z))
    }

    async fn move_to_position(&self, target: na::Vector3<f32>) -> Result<()> {
        info!(x = target.x, y = target.y, z = target.z, "moving to position");
        let mut state = self.state.lock().await;
        let feedrate = state.feedrate;
        let driver = state.driver.as_mut().ok_or(ControllerError::DeviceNotReady)?;
        driver.move_to(target, feedrate).await
    }

    async fn move_to_joint_positions(&self, _joints: &JointPositions) -> Result<()> {
        // The device's native control is Cartesian.
        Err(ControllerError::Unsupported("move_to_joint_positions"))
    }

    async fn joint_positions(&self) -> Result<JointPositions> {
        let mut state = self.state.lock().await;
        let driver = state.driver.as_mut().ok_or(ControllerError::DeviceNotReady)?;
        let position = driver.current_position().await?;
        Ok(JointPositions::new(position.a, position.b, position.c))
    }

    async fn stop(&self) -> Result<()> {
        // Returning home is the only interruption primitive the protocol
        // exposes.
        info!("stopping arm by homing");
        let mut state = self.state.lock().await;
        let driver = state.driver.as_mut().ok_or(ControllerError::DeviceNotReady)?;
        driver.go_home().await
    }

    async fn is_moving(&self) -> Result<bool> {
        // The firmware queues motion internally and exposes no busy signal.
        Err(ControllerError::Unsupported("is_moving"))
    }

    async fn raw_command(&self, line: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let driver = state.driver.as_mut().ok_or(ControllerError::DeviceNotReady)?;
        driver.send(line).await
    }

    async fn do_command(&self, _command: &AttributeMap) -> Result<AttributeMap> {
        Err(ControllerError::Unsupported("do_command"))
    }

    async fn kinematics(&self) -> Result<KinematicsModel> {
        Err(ControllerError::Unsupported("kinematics"))
    }

    async fn geometries(&self) -> Result<Vec<Geometry>> {
        Err(ControllerError::Unsupported("geometries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm_driver::DevicePosition;
    use approx::assert_relative_eq;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex as StdMutex,
    };

    #[derive(Default)]
    struct MockStats {
        opens: AtomicUsize,
        closes: AtomicUsize,
        events: StdMutex<Vec<&'static str>>,
        sent: StdMutex<Vec<String>>,
        fail_next_open: AtomicBool,
    }

    impl MockStats {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    struct MockDriver {
        stats: Arc<MockStats>,
    }

    #[async_trait]
    impl DeviceDriver for MockDriver {
        async fn send(&mut self, line: &str) -> Result<String> {
            self.stats.sent.lock().unwrap().push(line.to_owned());
            Ok(String::new())
        }

        async fn go_home(&mut self) -> Result<()> {
            self.stats.sent.lock().unwrap().push("home".to_owned());
            Ok(())
        }

        async fn move_to(&mut self, target: na::Vector3<f32>, feedrate: u32) -> Result<()> {
            self.stats
                .sent
                .lock()
                .unwrap()
                .push(format!("move {} {} {} F{}", target.x, target.y, target.z, feedrate));
            Ok(())
        }

        async fn current_position(&mut self) -> Result<DevicePosition> {
            self.stats.sent.lock().unwrap().push("position".to_owned());
            Ok(DevicePosition {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                a: 10.0,
                b: 20.0,
                c: 30.0,
                ..Default::default()
            })
        }

        async fn close(&mut self) -> Result<()> {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
            self.stats.events.lock().unwrap().push("close");
            Ok(())
        }
    }

    struct MockFactory {
        stats: Arc<MockStats>,
    }

    #[async_trait]
    impl DriverFactory for MockFactory {
        async fn open(&self, port: &str) -> Result<Box<dyn DeviceDriver>> {
            if self.stats.fail_next_open.swap(false, Ordering::SeqCst) {
                return Err(ControllerError::Connection {
                    port: port.to_owned(),
                    source: tokio_serial::Error::new(
                        tokio_serial::ErrorKind::NoDevice,
                        "no such device",
                    ),
                });
            }
            self.stats.opens.fetch_add(1, Ordering::SeqCst);
            self.stats.events.lock().unwrap().push("open");
            Ok(Box::new(MockDriver {
                stats: self.stats.clone(),
            }))
        }
    }

    fn arm_with_mock() -> (DexArm, Arc<MockStats>) {
        let stats = Arc::new(MockStats::default());
        let arm = DexArm::with_factory(Box::new(MockFactory {
            stats: stats.clone(),
        }));
        (arm, stats)
    }

    fn port_config(port: &str) -> ComponentConfig {
        ComponentConfig::new("arm").with_attribute("port", port)
    }

    #[tokio::test]
    async fn repeated_configure_with_same_port_opens_once() {
        let (arm, stats) = arm_with_mock();
        for _ in 0..3 {
            arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        }
        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn configure_with_new_port_closes_then_opens() {
        let (arm, stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        arm.reconfigure(&port_config("/dev/ttyACM1")).await.unwrap();
        assert_eq!(stats.opens.load(Ordering::SeqCst), 2);
        assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
        assert_eq!(*stats.events.lock().unwrap(), vec!["open", "close", "open"]);
    }

    #[tokio::test]
    async fn configure_homes_the_device() {
        let (arm, stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        assert_eq!(stats.sent(), vec!["home"]);
    }

    #[tokio::test]
    async fn end_position_before_configure_is_device_not_ready() {
        let (arm, _stats) = arm_with_mock();
        let error = arm.end_position().await.unwrap_err();
        assert!(matches!(error, ControllerError::DeviceNotReady));
    }

    #[tokio::test]
    async fn end_position_after_configure_succeeds() {
        let (arm, _stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        let position = arm.end_position().await.unwrap();
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.y, 2.0);
        assert_relative_eq!(position.z, 3.0);
    }

    #[tokio::test]
    async fn joint_positions_come_from_the_live_report() {
        let (arm, _stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        let joints = arm.joint_positions().await.unwrap();
        assert_relative_eq!(joints.base, 10.0);
        assert_relative_eq!(joints.shoulder, 20.0);
        assert_relative_eq!(joints.elbow, 30.0);
    }

    #[tokio::test]
    async fn move_uses_the_configured_feedrate() {
        let (arm, stats) = arm_with_mock();
        let config = port_config("/dev/ttyACM0").with_attribute("speed", 4000);
        arm.reconfigure(&config).await.unwrap();
        arm.move_to_position(na::Vector3::new(50.0, 0.0, 10.0))
            .await
            .unwrap();
        assert_eq!(stats.sent(), vec!["home", "move 50 0 10 F4000"]);
    }

    #[tokio::test]
    async fn stop_homes_the_device() {
        let (arm, stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        arm.stop().await.unwrap();
        assert_eq!(stats.sent(), vec!["home", "home"]);
    }

    #[tokio::test]
    async fn unsupported_operations_never_touch_the_connection() {
        let (arm, stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        let sent_after_configure = stats.sent();

        assert!(matches!(
            arm.is_moving().await.unwrap_err(),
            ControllerError::Unsupported(_)
        ));
        assert!(matches!(
            arm.move_to_joint_positions(&JointPositions::default())
                .await
                .unwrap_err(),
            ControllerError::Unsupported(_)
        ));
        assert!(matches!(
            arm.do_command(&AttributeMap::new()).await.unwrap_err(),
            ControllerError::Unsupported(_)
        ));
        assert!(matches!(
            arm.kinematics().await.unwrap_err(),
            ControllerError::Unsupported(_)
        ));
        assert!(matches!(
            arm.geometries().await.unwrap_err(),
            ControllerError::Unsupported(_)
        ));
        assert_eq!(stats.sent(), sent_after_configure);
    }

    #[tokio::test]
    async fn raw_command_forwards_verbatim() {
        let (arm, stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        arm.raw_command("M1000\r").await.unwrap();
        assert_eq!(stats.sent(), vec!["home", "M1000\r"]);
    }

    #[tokio::test]
    async fn failed_open_leaves_arm_unconfigured() {
        let (arm, stats) = arm_with_mock();
        stats.fail_next_open.store(true, Ordering::SeqCst);
        let error = arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap_err();
        assert!(matches!(error, ControllerError::Connection { .. }));
        assert!(matches!(
            arm.end_position().await.unwrap_err(),
            ControllerError::DeviceNotReady
        ));

        // A retry with the very same port must attempt a fresh open.
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
        arm.end_position().await.unwrap();
    }

    #[tokio::test]
    async fn validate_config_checks_the_port_attribute() {
        assert!(DexArm::validate_config(&port_config("/dev/ttyACM0")).is_ok());
        for config in [
            ComponentConfig::new("arm"),
            ComponentConfig::new("arm").with_attribute("port", ""),
            ComponentConfig::new("arm").with_attribute("port", 7),
        ] {
            let error = DexArm::validate_config(&config).unwrap_err();
            assert!(matches!(error, ControllerError::Configuration(_)));
        }
    }

    #[tokio::test]
    async fn close_releases_the_connection() {
        let (arm, stats) = arm_with_mock();
        arm.reconfigure(&port_config("/dev/ttyACM0")).await.unwrap();
        arm.close().await.unwrap();
        assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            arm.end_position().await.unwrap_err(),
            ControllerError::DeviceNotReady
        ));
    }
}
