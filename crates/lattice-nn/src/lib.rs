//! # lattice-nn
//!
//! Modules, variable trees and the Sequential container for Lattice.
//!
//! 1. **Module trait** — `forward(x, v)` with the variables passed explicitly
//! 2. **VarTree** — nested `/`-addressable variables owned by a module
//! 3. **Sequential** — children chained in order, variables under `submodules/v<i>`
//! 4. **Linear** — fully connected: `y = x @ w^T + b`
//! 5. **Activations** — ReLU, Tanh, Sigmoid as parameterless modules
//!
//! Modules are generic over `Runtime`, so the same network definition runs
//! on any runtime that implements the seam.

pub mod activation;
pub mod init;
pub mod linear;
pub mod module;
pub mod sequential;
pub mod variables;

pub use activation::{ReLU, Sigmoid, Tanh};
pub use linear::Linear;
pub use module::{Module, ModuleBase};
pub use sequential::{Sequential, SequentialBuilder};
pub use variables::{submodule_key, SubmoduleVars, VarTree, Variable, SUBMODULES_KEY};
