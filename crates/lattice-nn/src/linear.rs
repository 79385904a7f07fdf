// Linear — Fully-connected (dense) layer
//
//   y = x @ w^T + b
//
// VARIABLES:
//
//   w: [out_features, in_features]
//   b: [1, out_features]            optional, broadcast across the batch
//
// Both are drawn from U(-k, k) with k = sqrt(1/in_features). forward reads
// `w` and `b` from whatever tree it is given, so a Linear inside a
// Sequential runs on the `submodules/v<i>` slice of its parent.

use lattice_core::adapter::DeviceAdapter;
use lattice_core::array::Array;
use lattice_core::bail;
use lattice_core::device::Device;
use lattice_core::dtype::DType;
use lattice_core::error::{Error, Result};
use lattice_core::runtime::Runtime;

use crate::init;
use crate::module::{Module, ModuleBase};
use crate::variables::VarTree;

pub const WEIGHT_KEY: &str = "w";
pub const BIAS_KEY: &str = "b";

/// A fully-connected layer: y = x @ w^T + b.
///
/// # Examples
/// ```ignore
/// let adapter = DeviceAdapter::with_defaults(Arc::new(HostRuntime::new()))?;
/// let linear = Linear::new(&adapter, 784, 128, true, DType::F32, None)?;
/// let y = linear.call(&x)?; // [batch, 128]
/// ```
pub struct Linear<R: Runtime> {
    base: ModuleBase<R>,
    in_features: usize,
    out_features: usize,
}

impl<R: Runtime> Linear<R> {
    /// Create a layer with freshly initialized variables on `device`, or on
    /// the adapter's default device.
    pub fn new(
        adapter: &DeviceAdapter<R>,
        in_features: usize,
        out_features: usize,
        use_bias: bool,
        dtype: DType,
        device: Option<Device>,
    ) -> Result<Self> {
        let base = ModuleBase::new(device, None, |device| {
            let native = match device {
                Some(d) => adapter.to_native(d)?,
                None => adapter.default_native_device().clone(),
            };
            let mut v = VarTree::new().with(
                WEIGHT_KEY,
                init::kaiming_uniform::<R>((out_features, in_features), None, dtype, &native)?,
            );
            if use_bias {
                v.insert(
                    BIAS_KEY,
                    init::kaiming_uniform::<R>((1, out_features), Some(in_features), dtype, &native)?,
                );
            }
            Ok(v)
        })?;
        Ok(Linear {
            base,
            in_features,
            out_features,
        })
    }

    /// Create a layer around an existing tree holding `w` (and optionally `b`).
    pub fn from_variables(variables: VarTree<R>, device: Option<Device>) -> Result<Self> {
        let (out_features, in_features) = match weight(&variables)?.dims() {
            [out, inp] => (*out, *inp),
            dims => bail!("Linear weight must be 2D, got shape {:?}", dims),
        };
        Ok(Linear {
            base: ModuleBase::new(device, Some(variables), |_| Ok(VarTree::new()))?,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight(&self) -> Option<&Array<R>> {
        self.base.variables().get_array(WEIGHT_KEY)
    }

    pub fn bias(&self) -> Option<&Array<R>> {
        self.base.variables().get_array(BIAS_KEY)
    }

    /// Move the variables onto the layer's device.
    pub fn place(&mut self, adapter: &DeviceAdapter<R>) -> Result<()> {
        self.base.place(adapter)
    }
}

fn weight<R: Runtime>(v: &VarTree<R>) -> Result<&Array<R>> {
    v.get_array(WEIGHT_KEY)
        .ok_or_else(|| Error::msg("Linear: variable tree has no 'w'"))
}

impl<R: Runtime> Module<R> for Linear<R> {
    fn forward(&self, x: &Array<R>, v: &VarTree<R>) -> Result<Array<R>> {
        let y = x.matmul(&weight(v)?.t()?)?;
        match v.get_array(BIAS_KEY) {
            Some(b) => y.add(b),
            None => Ok(y),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_host::HostRuntime;
    use std::sync::Arc;

    fn adapter() -> DeviceAdapter<HostRuntime> {
        DeviceAdapter::with_defaults(Arc::new(HostRuntime::new())).unwrap()
    }

    #[test]
    fn test_shapes_and_init_range() -> Result<()> {
        let adapter = adapter();
        let linear = Linear::new(&adapter, 4, 3, true, DType::F64, None)?;
        assert_eq!(linear.weight().unwrap().dims(), &[3, 4]);
        assert_eq!(linear.bias().unwrap().dims(), &[1, 3]);
        assert_eq!(linear.num_parameters(), 12 + 3);

        let k = 0.5;
        for (_, p) in linear.named_parameters() {
            assert!(p.to_f64_vec()?.iter().all(|&v| (-k..=k).contains(&v)));
        }
        Ok(())
    }

    #[test]
    fn test_forward_known_values() -> Result<()> {
        let adapter = adapter();
        let dev = adapter.default_native_device();
        let w = Array::<HostRuntime>::from_f64_slice(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0], (3, 2), DType::F64, dev)?;
        let b = Array::<HostRuntime>::from_f64_slice(&[0.5, -0.5, 0.0], (1, 3), DType::F64, dev)?;
        let linear = Linear::from_variables(VarTree::new().with("w", w).with("b", b), None)?;
        assert_eq!((linear.in_features(), linear.out_features()), (2, 3));

        let x = Array::<HostRuntime>::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], (2, 2), DType::F64, dev)?;
        let y = linear.call(&x)?;
        assert_eq!(y.dims(), &[2, 3]);
        assert_eq!(y.to_f64_vec()?, vec![1.5, 1.5, 3.0, 3.5, 3.5, 7.0]);
        Ok(())
    }

    #[test]
    fn test_without_bias() -> Result<()> {
        let adapter = adapter();
        let linear = Linear::new(&adapter, 2, 2, false, DType::F32, None)?;
        assert!(linear.bias().is_none());
        let x = Array::<HostRuntime>::traced((5, 2), DType::F32);
        assert_eq!(linear.call(&x)?.dims(), &[5, 2]);
        Ok(())
    }

    #[test]
    fn test_missing_weight_is_an_error() {
        let linear = Linear::new(&adapter(), 2, 2, true, DType::F32, None).unwrap();
        let x = Array::<HostRuntime>::traced((1, 2), DType::F32);
        assert!(linear.call_with(&x, &VarTree::new()).is_err());
    }
}
