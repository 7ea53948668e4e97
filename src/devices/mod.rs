//! Robot transport implementations

pub mod create;
pub mod mock;

use crate::config::Config;
use crate::core::transport::RobotTransport;
use crate::error::{Error, Result};
use create::CreateTransport;
use mock::MockRobot;
use std::time::Duration;

/// Create a robot transport based on configuration
pub fn create_transport(config: &Config) -> Result<Box<dyn RobotTransport>> {
    match config.robot.device_type.as_str() {
        "create" => {
            let transport = CreateTransport::new(
                config.robot.wheel_base,
                Duration::from_millis(config.robot.sensor_timeout_ms),
            );
            Ok(Box::new(transport))
        }
        "mock" => Ok(Box::new(MockRobot::new(config.mock.clone()))),
        _ => Err(Error::UnknownDevice(config.robot.device_type.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_by_type() {
        let mut config = Config::default();
        config.robot.device_type = "mock".to_string();
        let transport = create_transport(&config).unwrap();
        assert!(!transport.is_connected());

        config.robot.device_type = "roomba9000".to_string();
        assert!(matches!(
            create_transport(&config),
            Err(Error::UnknownDevice(name)) if name == "roomba9000"
        ));
    }
}
