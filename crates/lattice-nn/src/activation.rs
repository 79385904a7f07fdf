// Activation modules — Array activations wrapped as parameterless modules
//
// Each owns an empty VarTree, so a Sequential does not need a
// `submodules/v<i>` entry for it.
//
// Example:
//   let model = Sequential::builder()
//       .add(linear1)
//       .add(ReLU::new())
//       .add(linear2)
//       .build()?;

use lattice_core::array::Array;
use lattice_core::device::Device;
use lattice_core::error::Result;
use lattice_core::runtime::Runtime;

use crate::module::{Module, ModuleBase};
use crate::variables::VarTree;

macro_rules! activation {
    ($(#[$doc:meta])* $name:ident, $method:ident) => {
        $(#[$doc])*
        pub struct $name<R: Runtime> {
            base: ModuleBase<R>,
        }

        impl<R: Runtime> $name<R> {
            pub fn new() -> Self {
                $name {
                    base: ModuleBase::empty(None),
                }
            }
        }

        impl<R: Runtime> Default for $name<R> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<R: Runtime> Module<R> for $name<R> {
            fn forward(&self, x: &Array<R>, _v: &VarTree<R>) -> Result<Array<R>> {
                x.$method()
            }
            fn variables(&self) -> &VarTree<R> {
                self.base.variables()
            }
            fn set_variables(&mut self, v: VarTree<R>) {
                self.base.set_variables(v)
            }
            fn device(&self) -> Option<&Device> {
                self.base.device()
            }
        }
    };
}

activation!(
    /// ReLU activation: max(0, x)
    ReLU,
    relu
);

activation!(
    /// Tanh activation
    Tanh,
    tanh
);

activation!(
    /// Sigmoid activation: 1 / (1 + e^(-x))
    Sigmoid,
    sigmoid
);
