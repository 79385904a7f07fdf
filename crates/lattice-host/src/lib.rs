// Host runtime — Reference in-process runtime for Lattice
//
// HostRuntime implements the Runtime seam entirely in host memory. It is the
// runtime every Lattice test runs on, and a usable CPU runtime on its own.
//
// VIRTUAL DEVICES:
//
// Devices are grouped by platform name. By default the runtime exposes one
// "cpu" device; the builder can register more devices or further platforms:
//
//   let rt = HostRuntime::builder()
//       .platform("cpu", 4)     // cpu:0 .. cpu:3
//       .platform("gpu", 2)     // a virtual gpu platform
//       .build();
//
// A buffer records the device it lives on. Transfers copy the data and
// retag it, so two buffers on different devices never share storage.
//
// OWNERSHIP:
//
// HostRuntime is a cheap handle around shared client state. Devices keep a
// handle to the client that created them, which is how the runtime tells
// its own buffers apart from a foreign runtime's and how kernels find the
// active trace session.

mod buffer;
pub mod trace;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use lattice_core::device::{NativeDevice, CPU_PLATFORM};
use lattice_core::dtype::DType;
use lattice_core::error::{Error, Result};
use lattice_core::runtime::{BinaryOp, Runtime, UnaryOp};
use lattice_core::shape::Shape;

pub use buffer::HostBuffer;
use trace::{TraceArgs, TraceSession};

// HostClient — State shared by a runtime and everything it created

struct HostClient {
    platforms: BTreeMap<String, usize>,
    default_platform: String,
    trace: Mutex<Option<TraceSession>>,
}

impl HostClient {
    fn trace_lock(&self) -> Result<MutexGuard<'_, Option<TraceSession>>> {
        self.trace
            .lock()
            .map_err(|_| Error::msg("trace lock poisoned"))
    }

    /// Record an event in the active session, if any.
    fn record(
        &self,
        name: &str,
        cat: &'static str,
        start: Instant,
        device: &HostDevice,
        elements: usize,
    ) {
        if let Ok(mut guard) = self.trace.lock() {
            if let Some(session) = guard.as_mut() {
                session.record(
                    name,
                    cat,
                    start,
                    TraceArgs {
                        device: device.label(),
                        elements: elements as u64,
                    },
                );
            }
        }
    }

    fn owns(&self, device: &HostDevice) -> bool {
        self.platforms
            .get(device.platform.as_ref())
            .is_some_and(|&count| device.index < count)
    }
}

// HostDevice — A virtual device of the host runtime

/// A native device handle of [`HostRuntime`].
#[derive(Clone)]
pub struct HostDevice {
    platform: Arc<str>,
    index: usize,
    client: Arc<HostClient>,
}

impl HostDevice {
    /// `platform:index`, always with the index.
    pub fn label(&self) -> String {
        format!("{}:{}", self.platform, self.index)
    }

    fn same_client(&self, other: &Arc<HostClient>) -> bool {
        Arc::ptr_eq(&self.client, other)
    }

    pub(crate) fn record(&self, name: &str, cat: &'static str, start: Instant, elements: usize) {
        self.client.record(name, cat, start, self, elements);
    }
}

impl NativeDevice for HostDevice {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn index(&self) -> usize {
        self.index
    }
}

impl PartialEq for HostDevice {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.platform == other.platform
            && Arc::ptr_eq(&self.client, &other.client)
    }
}

impl fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostDevice({}:{})", self.platform, self.index)
    }
}

// HostRuntime

/// In-process reference runtime with virtual devices.
#[derive(Clone)]
pub struct HostRuntime {
    client: Arc<HostClient>,
}

impl HostRuntime {
    /// A runtime with a single `cpu` device.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HostRuntimeBuilder {
        HostRuntimeBuilder::default()
    }

    /// Registered platforms and their device counts.
    pub fn platforms(&self) -> impl Iterator<Item = (&str, usize)> {
        self.client
            .platforms
            .iter()
            .map(|(name, &count)| (name.as_str(), count))
    }

    /// Whether a trace capture is running.
    pub fn is_tracing(&self) -> bool {
        self.client
            .trace
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Directory of the running capture, if any.
    pub fn trace_dir(&self) -> Option<PathBuf> {
        let guard = self.client.trace.lock().ok()?;
        guard.as_ref().map(|s| s.dir().to_path_buf())
    }

    fn platform_labels(&self) -> Vec<String> {
        self.platforms()
            .map(|(name, count)| format!("{name}={count}"))
            .collect()
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRuntime")
            .field("platforms", &self.client.platforms)
            .field("default_platform", &self.client.default_platform)
            .finish()
    }
}

/// Builder for [`HostRuntime`].
#[derive(Debug, Clone)]
pub struct HostRuntimeBuilder {
    platforms: BTreeMap<String, usize>,
    default_platform: String,
}

impl Default for HostRuntimeBuilder {
    fn default() -> Self {
        let mut platforms = BTreeMap::new();
        platforms.insert(CPU_PLATFORM.to_string(), 1);
        HostRuntimeBuilder {
            platforms,
            default_platform: CPU_PLATFORM.to_string(),
        }
    }
}

impl HostRuntimeBuilder {
    /// Expose `count` devices on `platform`, replacing any earlier count.
    ///
    /// A count of 0 registers the name without devices; enumerating it
    /// reports the platform as missing.
    pub fn platform(mut self, name: impl Into<String>, count: usize) -> Self {
        self.platforms.insert(name.into(), count);
        self
    }

    /// Platform whose first device is the default.
    pub fn default_platform(mut self, name: impl Into<String>) -> Self {
        self.default_platform = name.into();
        self
    }

    pub fn build(self) -> HostRuntime {
        HostRuntime {
            client: Arc::new(HostClient {
                platforms: self.platforms,
                default_platform: self.default_platform,
                trace: Mutex::new(None),
            }),
        }
    }
}

impl Runtime for HostRuntime {
    type Device = HostDevice;
    type Buffer = HostBuffer;

    fn default_platform(&self) -> &str {
        &self.client.default_platform
    }

    fn devices(&self, platform: &str) -> Result<Vec<HostDevice>> {
        let count = match self.client.platforms.get(platform) {
            Some(&count) if count > 0 => count,
            _ => {
                return Err(Error::PlatformNotFound {
                    platform: platform.to_string(),
                })
            }
        };
        let name: Arc<str> = Arc::from(platform);
        Ok((0..count)
            .map(|index| HostDevice {
                platform: Arc::clone(&name),
                index,
                client: Arc::clone(&self.client),
            })
            .collect())
    }

    fn buffer_device(&self, buffer: &HostBuffer) -> Result<HostDevice> {
        let device = buffer.device();
        if !device.same_client(&self.client) || !self.client.owns(device) {
            return Err(Error::DeviceNotFound {
                device: device.label(),
            });
        }
        Ok(device.clone())
    }

    fn device_put(&self, buffer: &HostBuffer, device: &HostDevice) -> Result<HostBuffer> {
        if !device.same_client(&self.client) || !self.client.owns(device) {
            return Err(Error::DeviceNotFound {
                device: device.label(),
            });
        }
        let start = Instant::now();
        let moved = buffer.copy_to(device);
        device.record("device_put", "transfer", start, moved.elem_count());
        Ok(moved)
    }

    fn start_trace(&self, dir: &Path) -> Result<()> {
        let mut guard = self.client.trace_lock()?;
        if let Some(active) = guard.as_ref() {
            return Err(trace::already_active(active.dir()));
        }
        *guard = Some(TraceSession::new(dir));
        Ok(())
    }

    fn stop_trace(&self) -> Result<()> {
        let session = self.client.trace_lock()?.take().ok_or_else(trace::not_active)?;
        session.flush(self.platform_labels())?;
        Ok(())
    }

    fn from_f64_slice(
        data: &[f64],
        shape: &Shape,
        dtype: DType,
        device: &HostDevice,
    ) -> Result<HostBuffer> {
        HostBuffer::from_f64_slice(data, shape.clone(), dtype, device)
    }

    fn rand_uniform(shape: &Shape, dtype: DType, device: &HostDevice) -> Result<HostBuffer> {
        HostBuffer::rand_uniform(shape.clone(), dtype, device)
    }

    fn shape(buffer: &HostBuffer) -> &Shape {
        buffer.shape()
    }

    fn dtype(buffer: &HostBuffer) -> DType {
        buffer.dtype()
    }

    fn to_f64_vec(buffer: &HostBuffer) -> Result<Vec<f64>> {
        Ok(buffer.data().to_vec())
    }

    fn binary_op(op: BinaryOp, lhs: &HostBuffer, rhs: &HostBuffer) -> Result<HostBuffer> {
        buffer::binary(op, lhs, rhs)
    }

    fn unary_op(op: UnaryOp, input: &HostBuffer) -> Result<HostBuffer> {
        Ok(buffer::unary(op, input))
    }

    fn matmul(lhs: &HostBuffer, rhs: &HostBuffer) -> Result<HostBuffer> {
        buffer::matmul(lhs, rhs)
    }

    fn transpose(input: &HostBuffer) -> Result<HostBuffer> {
        buffer::transpose(input)
    }

    fn affine(input: &HostBuffer, mul: f64, add: f64) -> Result<HostBuffer> {
        Ok(buffer::affine(input, mul, add))
    }
}
