// DeviceAdapter — Backend-neutral device handling over one runtime
//
// The adapter translates between Device identifiers ("cpu", "gpu:1") and the
// runtime's native device handles, answers "where does this value live?",
// moves values between devices and probes which platforms exist.
//
// FAILURE MODES:
//
//   resolve_device     never fails; anything it cannot determine degrades
//                      to the configured default device (traced values
//                      have no device and resolve to None)
//   to_native          propagates runtime errors (unknown platform) and
//                      reports malformed or out-of-range indices
//   *_available/count  turn PlatformNotFound into false / 0, propagate the
//                      rest
//
// The default device is resolved once in `new`, so the fallback path cannot
// fail later.

use std::path::Path;
use std::sync::Arc;

use crate::array::Array;
use crate::config::AdapterConfig;
use crate::device::{Device, DeviceLike};
use crate::error::{Error, Result};
use crate::profiler::Profiler;
use crate::runtime::Runtime;

/// Platform name probed by [`DeviceAdapter::gpu_available`].
pub const GPU_PLATFORM: &str = "gpu";
/// Platform name probed by [`DeviceAdapter::tpu_available`].
pub const TPU_PLATFORM: &str = "tpu";

/// Device translation, placement and availability probes for runtime `R`.
#[derive(Debug)]
pub struct DeviceAdapter<R: Runtime> {
    runtime: Arc<R>,
    default_device: Device,
    default_native: R::Device,
}

impl<R: Runtime> Clone for DeviceAdapter<R> {
    fn clone(&self) -> Self {
        DeviceAdapter {
            runtime: Arc::clone(&self.runtime),
            default_device: self.default_device.clone(),
            default_native: self.default_native.clone(),
        }
    }
}

impl<R: Runtime> DeviceAdapter<R> {
    /// Build an adapter, resolving the configured default device.
    pub fn new(runtime: Arc<R>, config: AdapterConfig) -> Result<Self> {
        let default_native = match &config.default_device {
            Some(device) => native_for(runtime.as_ref(), device)?,
            None => {
                let platform = runtime.default_platform();
                runtime
                    .devices(platform)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::PlatformNotFound {
                        platform: platform.to_string(),
                    })?
            }
        };
        let default_device = Device::from_native(&default_native);
        Ok(DeviceAdapter {
            runtime,
            default_device,
            default_native,
        })
    }

    /// Adapter whose default is the first device of the default platform.
    pub fn with_defaults(runtime: Arc<R>) -> Result<Self> {
        Self::new(runtime, AdapterConfig::default())
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// The fallback device used when resolution fails.
    pub fn default_device(&self) -> &Device {
        &self.default_device
    }

    pub fn default_native_device(&self) -> &R::Device {
        &self.default_native
    }

    //  Resolution

    /// The native device `x` lives on.
    ///
    /// `None` for a traced placeholder. If the runtime cannot report the
    /// buffer's device, the default device is returned instead.
    pub fn resolve_native_device(&self, x: &Array<R>) -> Option<R::Device> {
        let buffer = x.buffer()?;
        Some(self.native_device_of(buffer))
    }

    /// Identifier of the device `x` lives on; see
    /// [`resolve_native_device`](Self::resolve_native_device).
    pub fn resolve_device(&self, x: &Array<R>) -> Option<Device> {
        self.resolve_native_device(x)
            .map(|d| Device::from_native(&d))
    }

    fn native_device_of(&self, buffer: &R::Buffer) -> R::Device {
        self.runtime
            .buffer_device(buffer)
            .unwrap_or_else(|_| self.default_native.clone())
    }

    //  Placement

    /// Move `x` to `device` if it is given and differs from where `x` is.
    ///
    /// Returns `x` itself when no transfer is needed. Traced placeholders
    /// have no storage to move and are returned unchanged.
    pub fn place_on_device(&self, x: Array<R>, device: Option<&Device>) -> Result<Array<R>> {
        match x {
            Array::Concrete(buffer) => Ok(Array::Concrete(self.place_buffer(buffer, device)?)),
            traced @ Array::Traced(_) => Ok(traced),
        }
    }

    /// [`place_on_device`](Self::place_on_device), writing the result into
    /// `out` and returning that slot.
    pub fn place_on_device_into<'a>(
        &self,
        x: Array<R>,
        device: Option<&Device>,
        out: &'a mut Array<R>,
    ) -> Result<&'a mut Array<R>> {
        *out = self.place_on_device(x, device)?;
        Ok(out)
    }

    /// Placement on the runtime's raw buffer type.
    ///
    /// For callers that hold runtime buffers directly and want one back,
    /// without going through [`Array`].
    pub fn place_buffer(&self, buffer: R::Buffer, device: Option<&Device>) -> Result<R::Buffer> {
        let Some(target) = device else {
            return Ok(buffer);
        };
        let current = Device::from_native(&self.native_device_of(&buffer));
        if &current == target {
            return Ok(buffer);
        }
        let native = self.to_native(target)?;
        self.runtime.device_put(&buffer, &native)
    }

    //  Translation

    /// Convert a native handle or string into a Device identifier.
    ///
    /// Strings are wrapped as-is. The cpu platform collapses to `"cpu"`;
    /// other platforms become `platform:index`.
    pub fn to_identifier(&self, device: Option<DeviceLike<R::Device>>) -> Option<Device> {
        match device? {
            DeviceLike::Id(d) => Some(d),
            DeviceLike::Native(n) => Some(Device::from_native(&n)),
        }
    }

    /// Convert an identifier into the runtime's native handle.
    ///
    /// Native handles pass through unchanged.
    pub fn to_native(&self, device: impl Into<DeviceLike<R::Device>>) -> Result<R::Device> {
        match device.into() {
            DeviceLike::Native(n) => Ok(n),
            DeviceLike::Id(d) => native_for(self.runtime.as_ref(), &d),
        }
    }

    /// Release cached memory on `device`.
    ///
    /// Not supported by this runtime family; always a no-op.
    pub fn clear_device_memory(&self, _device: &Device) {}

    //  Availability

    /// Whether `platform` has at least one device.
    pub fn platform_available(&self, platform: &str) -> Result<bool> {
        Ok(self.device_count(platform)? > 0)
    }

    /// Number of devices on `platform`; 0 if the platform is absent.
    pub fn device_count(&self, platform: &str) -> Result<usize> {
        match self.runtime.devices(platform) {
            Ok(devices) => Ok(devices.len()),
            Err(e) if e.is_platform_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn gpu_available(&self) -> Result<bool> {
        self.platform_available(GPU_PLATFORM)
    }

    pub fn tpu_available(&self) -> Result<bool> {
        self.platform_available(TPU_PLATFORM)
    }

    pub fn gpu_count(&self) -> Result<usize> {
        self.device_count(GPU_PLATFORM)
    }

    /// A profiler writing under `<save_dir>/profile`.
    pub fn profiler(&self, save_dir: impl AsRef<Path>) -> Profiler<R> {
        Profiler::new(Arc::clone(&self.runtime), save_dir)
    }
}

fn native_for<R: Runtime>(runtime: &R, device: &Device) -> Result<R::Device> {
    let (platform, index) = device.split()?;
    let devices = runtime.devices(platform)?;
    let available = devices.len();
    devices
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::DeviceIndexOutOfRange {
            platform: platform.to_string(),
            index,
            available,
        })
}

