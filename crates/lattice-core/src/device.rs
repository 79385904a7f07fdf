use std::fmt;

use crate::error::{Error, Result};

// Device — Backend-neutral device identifier
//
// A device is named by a string of the form `<platform>` or
// `<platform>:<index>`, e.g. "cpu", "gpu:0", "tpu:3". An omitted index means
// index 0. The identifier is a plain value: constructing one from a string
// performs no validation, parsing happens only when it is translated to a
// runtime's native handle.
//
// NativeDevice is the narrow view of a runtime-owned device handle. The
// adapter only ever reads the platform name and the index off it, so that
// is all a runtime has to expose.

/// Platform name that collapses to a bare identifier regardless of index.
pub const CPU_PLATFORM: &str = "cpu";

/// A backend-neutral device identifier such as `"cpu"` or `"gpu:1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Device(String);

impl Device {
    /// Wrap a string as a device identifier, as-is.
    pub fn new(id: impl Into<String>) -> Self {
        Device(id.into())
    }

    /// The `"cpu"` identifier.
    pub fn cpu() -> Self {
        Device(CPU_PLATFORM.to_string())
    }

    /// Build the identifier for a native device handle.
    ///
    /// The cpu platform collapses to `"cpu"` whatever its index; every other
    /// platform is formatted as `platform:index`.
    pub fn from_native<D: NativeDevice + ?Sized>(device: &D) -> Self {
        let platform = device.platform();
        if platform == CPU_PLATFORM {
            Device(platform.to_string())
        } else {
            Device(format!("{}:{}", platform, device.index()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The platform part: everything before the first `:`.
    pub fn platform(&self) -> &str {
        match self.0.split_once(':') {
            Some((platform, _)) => platform,
            None => &self.0,
        }
    }

    /// The index part, defaulting to 0 when absent.
    ///
    /// Only the second `:`-separated segment is read; anything after it is
    /// ignored.
    pub fn index(&self) -> Result<usize> {
        match self.0.split(':').nth(1) {
            Some(idx) => idx.parse().map_err(|source| Error::InvalidDeviceIndex {
                device: self.0.clone(),
                source,
            }),
            None => Ok(0),
        }
    }

    /// Both parts at once.
    pub fn split(&self) -> Result<(&str, usize)> {
        Ok((self.platform(), self.index()?))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Device {
    fn from(s: &str) -> Self {
        Device::new(s)
    }
}

impl From<String> for Device {
    fn from(s: String) -> Self {
        Device(s)
    }
}

impl AsRef<str> for Device {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Device {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Device {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The view of a runtime-owned device handle that the adapter relies on.
pub trait NativeDevice: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Platform name, e.g. `"cpu"` or `"gpu"`.
    fn platform(&self) -> &str;

    /// Position of this device among its platform's devices.
    fn index(&self) -> usize;
}

/// Either a backend-neutral identifier or a runtime's native handle.
///
/// This is the argument type of the adapter's translation functions, which
/// accept both forms.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceLike<N> {
    Id(Device),
    Native(N),
}

impl<N> DeviceLike<N> {
    pub fn native(device: N) -> Self {
        DeviceLike::Native(device)
    }
}

impl<N> From<Device> for DeviceLike<N> {
    fn from(d: Device) -> Self {
        DeviceLike::Id(d)
    }
}

impl<N> From<&Device> for DeviceLike<N> {
    fn from(d: &Device) -> Self {
        DeviceLike::Id(d.clone())
    }
}

impl<N> From<&str> for DeviceLike<N> {
    fn from(s: &str) -> Self {
        DeviceLike::Id(Device::new(s))
    }
}

impl<N> From<String> for DeviceLike<N> {
    fn from(s: String) -> Self {
        DeviceLike::Id(Device::new(s))
    }
}
