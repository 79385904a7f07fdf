//! # lattice-core
//!
//! Device handling and the runtime seam for Lattice.
//!
//! This crate provides:
//! - [`Device`] — backend-neutral device identifier (`"cpu"`, `"gpu:0"`)
//! - [`Runtime`] trait — the array runtime Lattice delegates to
//! - [`Array`] — concrete runtime buffer or traced placeholder
//! - [`DeviceAdapter`] — identifier/native translation, placement, probes
//! - [`Profiler`] — scoped trace capture
//! - [`Error`] / [`Result`] — the shared error type

pub mod adapter;
pub mod array;
pub mod config;
pub mod device;
pub mod dtype;
pub mod error;
pub mod profiler;
pub mod runtime;
pub mod shape;

pub use adapter::DeviceAdapter;
pub use array::{Array, TracedArray};
pub use config::{AdapterConfig, DEFAULT_DEVICE_ENV};
pub use device::{Device, DeviceLike, NativeDevice, CPU_PLATFORM};
pub use dtype::DType;
pub use error::{Error, Result};
pub use profiler::{ProfileScope, Profiler, PROFILE_SUBDIR};
pub use runtime::{BinaryOp, Runtime, UnaryOp};
pub use shape::Shape;
