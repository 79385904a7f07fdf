//! # Lattice
//!
//! A device adapter and sequential modules over a pluggable array runtime.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use lattice::prelude::*;
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `lattice-core` | Device, Runtime trait, Array, DeviceAdapter, Profiler, errors |
//! | `lattice-host` | In-process reference runtime with virtual devices and trace capture |
//! | `lattice-nn` | Module trait, VarTree, Sequential, Linear, activations |
//!
//! ## Modules
//!
//! - [`nn`] — modules and variable trees
//! - [`summary`] — per-parameter model summary with device placement

/// Re-export core types.
pub use lattice_core::{
    adapter::{GPU_PLATFORM, TPU_PLATFORM},
    bail, AdapterConfig, Array, BinaryOp, DType, Device, DeviceAdapter, DeviceLike, Error,
    NativeDevice, ProfileScope, Profiler, Result, Runtime, Shape, TracedArray, UnaryOp,
    CPU_PLATFORM, DEFAULT_DEVICE_ENV, PROFILE_SUBDIR,
};

/// Re-export the host runtime.
pub use lattice_host::{
    trace::TRACE_FILE_NAME, HostBuffer, HostDevice, HostRuntime, HostRuntimeBuilder,
};

/// Re-export modules.
pub mod nn {
    pub use lattice_nn::*;
}

/// Model summary — parameter shapes, dtypes and devices.
pub mod summary;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{Linear, Module, ReLU, Sequential, Sigmoid, Tanh, VarTree};
    pub use crate::summary::ModelSummary;
    pub use crate::{
        AdapterConfig, Array, DType, Device, DeviceAdapter, HostDevice, HostRuntime, Profiler,
        Runtime, Shape,
    };
}
