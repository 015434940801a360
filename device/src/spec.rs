use kernlink_dtype::DeviceSpec;

use crate::error::{InvalidDeviceSnafu, Result};

/// Extension trait for DeviceSpec to add parsing functionality.
pub trait DeviceSpecExt {
    /// Parse a device string into a DeviceSpec.
    ///
    /// Examples:
    /// - "CPU" -> DeviceSpec::Cpu
    /// - "CUDA:0" -> DeviceSpec::Cuda { device_id: 0 }
    /// - "gpu" -> DeviceSpec::Cuda { device_id: 0 } (default to device 0)
    fn parse(s: &str) -> Result<DeviceSpec>;
}

impl DeviceSpecExt for DeviceSpec {
    fn parse(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let mut parts = upper.splitn(2, ':');
        let kind = parts.next().unwrap_or_default();
        let ordinal = parts.next();

        match kind {
            "CPU" | "HOST" if ordinal.is_none() => Ok(DeviceSpec::Cpu),
            "CUDA" | "GPU" => {
                let device_id = match ordinal {
                    Some(id) => id.parse::<usize>().map_err(|_| InvalidDeviceSnafu { device: s }.build())?,
                    None => 0,
                };
                Ok(DeviceSpec::Cuda { device_id })
            }
            _ => InvalidDeviceSnafu { device: s }.fail(),
        }
    }
}
