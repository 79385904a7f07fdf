use std::env;

use crate::device::Device;

/// Environment variable that overrides the adapter's default device.
pub const DEFAULT_DEVICE_ENV: &str = "LATTICE_DEFAULT_DEVICE";

/// Configuration for a [`DeviceAdapter`](crate::adapter::DeviceAdapter).
///
/// The default device is the fallback used whenever the adapter cannot find
/// out where a value lives. It is chosen here, at construction time, rather
/// than read from a process-wide singleton.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Fallback device. `None` means the first device of the runtime's
    /// default platform.
    pub default_device: Option<Device>,
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_device(mut self, device: impl Into<Device>) -> Self {
        self.default_device = Some(device.into());
        self
    }

    /// Read `LATTICE_DEFAULT_DEVICE`; unset or blank leaves the default open.
    pub fn from_env() -> Self {
        Self::from_env_value(env::var(DEFAULT_DEVICE_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        let default_device = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Device::new);
        AdapterConfig { default_device }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_value_parsing() {
        assert_eq!(AdapterConfig::from_env_value(None), AdapterConfig::default());
        assert_eq!(AdapterConfig::from_env_value(Some("  ")), AdapterConfig::default());
        assert_eq!(
            AdapterConfig::from_env_value(Some(" gpu:1 ")).default_device,
            Some(Device::new("gpu:1"))
        );
    }

    #[test]
    fn test_builder() {
        let cfg = AdapterConfig::new().with_default_device("cpu");
        assert_eq!(cfg.default_device, Some(Device::cpu()));
    }
}
