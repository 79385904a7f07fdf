// Module trait — The interface every layer and container implements
//
// A module owns a VarTree and an optional device. The computation itself is
// functional: forward(x, v) receives the variables explicitly, so the same
// module can be evaluated with its own tree (`call`) or with any tree of the
// same structure (`call_with`), e.g. one that was loaded or moved elsewhere.
//
// GENERIC OVER RUNTIME:
//
// Modules are generic over R: Runtime, so arrays inside a module are
// whatever buffers R produces (or traced placeholders).
//
// SHARED STATE:
//
// Device and variable storage live in ModuleBase, which every module embeds
// and delegates to. ModuleBase builds the module's default tree when none
// was supplied.

use lattice_core::adapter::DeviceAdapter;
use lattice_core::array::Array;
use lattice_core::device::Device;
use lattice_core::error::Result;
use lattice_core::runtime::Runtime;

use crate::variables::VarTree;

/// The fundamental trait for all layers and containers.
///
/// # Example
/// ```ignore
/// struct Scale<R: Runtime> {
///     base: ModuleBase<R>,
/// }
///
/// impl<R: Runtime> Module<R> for Scale<R> {
///     fn forward(&self, x: &Array<R>, v: &VarTree<R>) -> Result<Array<R>> {
///         x.mul(v.get_array("s").ok_or_else(|| Error::msg("missing 's'"))?)
///     }
///     fn variables(&self) -> &VarTree<R> {
///         self.base.variables()
///     }
///     fn set_variables(&mut self, v: VarTree<R>) {
///         self.base.set_variables(v)
///     }
/// }
/// ```
pub trait Module<R: Runtime> {
    /// Compute the output from `x` using the variables in `v`.
    fn forward(&self, x: &Array<R>, v: &VarTree<R>) -> Result<Array<R>>;

    /// The module's own variables.
    fn variables(&self) -> &VarTree<R>;

    /// Replace the module's own variables.
    fn set_variables(&mut self, v: VarTree<R>);

    /// The device the module was configured for, if any.
    fn device(&self) -> Option<&Device> {
        None
    }

    /// Forward with the module's own variables.
    fn call(&self, x: &Array<R>) -> Result<Array<R>> {
        self.forward(x, self.variables())
    }

    /// Forward with an explicit tree.
    fn call_with(&self, x: &Array<R>, v: &VarTree<R>) -> Result<Array<R>> {
        self.forward(x, v)
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.variables().num_elements()
    }

    /// All parameters keyed by their `/`-separated path.
    fn named_parameters(&self) -> Vec<(String, Array<R>)> {
        self.variables()
            .leaves()
            .into_iter()
            .map(|(path, a)| (path, a.clone()))
            .collect()
    }
}

/// Device and variable storage shared by every module.
pub struct ModuleBase<R: Runtime> {
    device: Option<Device>,
    variables: VarTree<R>,
}

impl<R: Runtime> ModuleBase<R> {
    /// Store `device` and `variables`; when no tree is supplied, `build` is
    /// called with the device to produce the default one.
    pub fn new(
        device: Option<Device>,
        variables: Option<VarTree<R>>,
        build: impl FnOnce(Option<&Device>) -> Result<VarTree<R>>,
    ) -> Result<Self> {
        let variables = match variables {
            Some(v) => v,
            None => build(device.as_ref())?,
        };
        Ok(ModuleBase { device, variables })
    }

    /// A base for modules without variables.
    pub fn empty(device: Option<Device>) -> Self {
        ModuleBase {
            device,
            variables: VarTree::new(),
        }
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn variables(&self) -> &VarTree<R> {
        &self.variables
    }

    pub fn set_variables(&mut self, v: VarTree<R>) {
        self.variables = v;
    }

    /// Move every variable onto the module's device, or the adapter's
    /// default device when the module has none.
    pub fn place(&mut self, adapter: &DeviceAdapter<R>) -> Result<()> {
        let target = self
            .device
            .clone()
            .unwrap_or_else(|| adapter.default_device().clone());
        self.variables = self.variables.to_device(adapter, &target)?;
        Ok(())
    }
}

impl<R: Runtime> Default for ModuleBase<R> {
    fn default() -> Self {
        Self::empty(None)
    }
}

impl<R: Runtime> std::fmt::Debug for ModuleBase<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBase")
            .field("device", &self.device)
            .field("variables", &self.variables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::dtype::DType;
    use lattice_core::error::Error;
    use lattice_host::HostRuntime;
    use std::sync::Arc;

    struct Scale {
        base: ModuleBase<HostRuntime>,
    }

    impl Module<HostRuntime> for Scale {
        fn forward(
            &self,
            x: &Array<HostRuntime>,
            v: &VarTree<HostRuntime>,
        ) -> Result<Array<HostRuntime>> {
            x.mul(v.get_array("s").ok_or_else(|| Error::msg("missing 's'"))?)
        }
        fn variables(&self) -> &VarTree<HostRuntime> {
            self.base.variables()
        }
        fn set_variables(&mut self, v: VarTree<HostRuntime>) {
            self.base.set_variables(v)
        }
    }

    fn scalar(value: f64, adapter: &DeviceAdapter<HostRuntime>) -> Array<HostRuntime> {
        Array::from_f64_slice(&[value], 1, DType::F64, adapter.default_native_device()).unwrap()
    }

    #[test]
    fn test_call_and_call_with() -> Result<()> {
        let adapter = DeviceAdapter::with_defaults(Arc::new(HostRuntime::new()))?;
        let base = ModuleBase::new(None, None, |_| {
            Ok(VarTree::new().with("s", scalar(2.0, &adapter)))
        })?;
        let m = Scale { base };
        let x = scalar(3.0, &adapter);

        assert_eq!(m.call(&x)?.to_f64_vec()?, vec![6.0]);
        let other = VarTree::new().with("s", scalar(10.0, &adapter));
        assert_eq!(m.call_with(&x, &other)?.to_f64_vec()?, vec![30.0]);
        assert_eq!(m.num_parameters(), 1);
        assert_eq!(m.named_parameters()[0].0, "s");
        Ok(())
    }

    #[test]
    fn test_supplied_tree_skips_build() -> Result<()> {
        let base: ModuleBase<HostRuntime> = ModuleBase::new(
            Some(Device::cpu()),
            Some(VarTree::new()),
            |_| Err(Error::msg("should not build")),
        )?;
        assert!(base.variables().is_empty());
        assert_eq!(base.device(), Some(&Device::cpu()));
        Ok(())
    }

    #[test]
    fn test_place_moves_variables() -> Result<()> {
        let rt = Arc::new(HostRuntime::builder().platform("gpu", 2).build());
        let adapter = DeviceAdapter::with_defaults(rt)?;
        let mut base = ModuleBase::new(Some(Device::new("gpu:1")), None, |_| {
            Ok(VarTree::new().with("s", scalar(1.0, &adapter)))
        })?;
        base.place(&adapter)?;
        let s = base.variables().get_array("s").unwrap();
        assert_eq!(adapter.resolve_device(s), Some(Device::new("gpu:1")));
        Ok(())
    }
}
