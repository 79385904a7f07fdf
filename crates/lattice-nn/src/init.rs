// nn::init — Parameter initialization
//
//   uniform(shape, low, high)    U(low, high)
//   kaiming_uniform(shape)       U(-k, k), k = sqrt(1 / fan_in)
//   zeros(shape)                 all zeros
//
// The runtime only provides U(0, 1); other ranges come from an affine
// rescale of that draw.

use lattice_core::array::Array;
use lattice_core::dtype::DType;
use lattice_core::error::Result;
use lattice_core::runtime::Runtime;
use lattice_core::shape::Shape;

/// fan_in of a weight shaped `[out, in, ...]`.
fn fan_in(shape: &Shape) -> usize {
    match shape.dims() {
        [] => 1,
        [n] => *n,
        [_, rest @ ..] => rest.iter().product(),
    }
}

/// U(low, high).
pub fn uniform<R: Runtime>(
    shape: impl Into<Shape>,
    low: f64,
    high: f64,
    dtype: DType,
    device: &R::Device,
) -> Result<Array<R>> {
    Array::<R>::rand(shape, dtype, device)?.affine(high - low, low)
}

/// U(-k, k) with k = sqrt(1 / fan_in); what `Linear` uses for both weight
/// and bias, where the bias takes the weight's fan_in.
pub fn kaiming_uniform<R: Runtime>(
    shape: impl Into<Shape>,
    fan_in_override: Option<usize>,
    dtype: DType,
    device: &R::Device,
) -> Result<Array<R>> {
    let shape = shape.into();
    let fan = fan_in_override.unwrap_or_else(|| fan_in(&shape)).max(1);
    let k = (1.0 / fan as f64).sqrt();
    uniform(shape, -k, k, dtype, device)
}

pub fn zeros<R: Runtime>(
    shape: impl Into<Shape>,
    dtype: DType,
    device: &R::Device,
) -> Result<Array<R>> {
    Array::<R>::zeros(shape, dtype, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_host::HostRuntime;

    #[test]
    fn test_kaiming_bounds() -> Result<()> {
        let dev = HostRuntime::new().devices("cpu")?.remove(0);
        let w = kaiming_uniform::<HostRuntime>((8, 16), None, DType::F64, &dev)?;
        let k = (1.0f64 / 16.0).sqrt();
        assert_eq!(w.dims(), &[8, 16]);
        assert!(w.to_f64_vec()?.iter().all(|&v| (-k..=k).contains(&v)));
        Ok(())
    }

    #[test]
    fn test_uniform_range() -> Result<()> {
        let dev = HostRuntime::new().devices("cpu")?.remove(0);
        let a = uniform::<HostRuntime>(100, 2.0, 3.0, DType::F64, &dev)?;
        assert!(a.to_f64_vec()?.iter().all(|&v| (2.0..=3.0).contains(&v)));
        let z = zeros::<HostRuntime>((2, 2), DType::F32, &dev)?;
        assert_eq!(z.to_f64_vec()?, vec![0.0; 4]);
        Ok(())
    }
}
