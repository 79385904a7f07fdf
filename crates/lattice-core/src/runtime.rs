use std::fmt;
use std::path::Path;

use crate::device::NativeDevice;
use crate::dtype::DType;
use crate::error::Result;
use crate::shape::Shape;

// Runtime — The seam to an array-computation runtime
//
// Lattice does not own kernels, device memory or trace capture: a Runtime
// does. The trait has two halves.
//
// SERVICES (&self): device enumeration by platform, locating a buffer's
// device, transferring buffers, and process-level trace capture. These need
// the runtime's state (which platforms exist, whether a trace is active).
//
// KERNELS (associated functions): the handful of dense operations modules
// need. Like the Backend trait they are stateless entry points; a buffer
// already knows its device, so no runtime handle is threaded through model
// code.
//
// A runtime signals "this platform has no devices" with
// Error::PlatformNotFound. The device adapter relies on that variant to turn
// availability probes into plain booleans.

/// Element-wise binary operations (NumPy broadcasting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Mul,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Mul => "mul",
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Mul => a * b,
        }
    }
}

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Relu => "relu",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
        }
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
        }
    }
}

/// An array-computation runtime that owns devices, buffers and kernels.
pub trait Runtime: fmt::Debug + Send + Sync + 'static {
    /// The runtime's native device handle.
    type Device: NativeDevice;
    /// A buffer resident on one device.
    type Buffer: Clone + fmt::Debug + Send + Sync + 'static;

    //  Services

    /// Platform whose first device is used when nothing else is configured.
    fn default_platform(&self) -> &str;

    /// All devices of `platform`, in index order.
    ///
    /// Returns `Error::PlatformNotFound` when the platform has no devices.
    fn devices(&self, platform: &str) -> Result<Vec<Self::Device>>;

    /// The device `buffer` currently lives on.
    fn buffer_device(&self, buffer: &Self::Buffer) -> Result<Self::Device>;

    /// Copy `buffer` to `device`.
    fn device_put(&self, buffer: &Self::Buffer, device: &Self::Device) -> Result<Self::Buffer>;

    /// Begin capturing a trace whose files are written under `dir`.
    fn start_trace(&self, dir: &Path) -> Result<()>;

    /// Finish the active trace capture and flush it.
    fn stop_trace(&self) -> Result<()>;

    //  Creation

    /// Create a buffer from host data, rounding to `dtype`.
    fn from_f64_slice(
        data: &[f64],
        shape: &Shape,
        dtype: DType,
        device: &Self::Device,
    ) -> Result<Self::Buffer>;

    /// Create a buffer of uniform random values in [0, 1).
    fn rand_uniform(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Buffer>;

    //  Inspection

    fn shape(buffer: &Self::Buffer) -> &Shape;

    fn dtype(buffer: &Self::Buffer) -> DType;

    /// Copy the buffer's contents to the host.
    fn to_f64_vec(buffer: &Self::Buffer) -> Result<Vec<f64>>;

    //  Kernels

    fn binary_op(op: BinaryOp, lhs: &Self::Buffer, rhs: &Self::Buffer) -> Result<Self::Buffer>;

    fn unary_op(op: UnaryOp, input: &Self::Buffer) -> Result<Self::Buffer>;

    /// 2-D matrix product.
    fn matmul(lhs: &Self::Buffer, rhs: &Self::Buffer) -> Result<Self::Buffer>;

    /// 2-D transpose.
    fn transpose(input: &Self::Buffer) -> Result<Self::Buffer>;

    /// `input * mul + add`.
    fn affine(input: &Self::Buffer, mul: f64, add: f64) -> Result<Self::Buffer>;
}
