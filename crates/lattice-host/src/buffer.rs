// HostBuffer — Host-memory storage and kernels
//
// Data is held as f64 regardless of dtype and rounded to the dtype on every
// write, so an F16 buffer only ever contains values an f16 can represent.
//
// All kernels produce contiguous row-major output. Element-wise kernels
// and matmul rows go parallel with rayon once the output is large enough
// to amortize the fork.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use rayon::prelude::*;

use lattice_core::dtype::DType;
use lattice_core::error::{Error, Result};
use lattice_core::runtime::{BinaryOp, UnaryOp};
use lattice_core::shape::Shape;

use crate::HostDevice;

/// Outputs with at least this many elements are computed in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

/// A buffer of the host runtime.
#[derive(Clone)]
pub struct HostBuffer {
    data: Arc<Vec<f64>>,
    shape: Shape,
    dtype: DType,
    device: HostDevice,
}

impl HostBuffer {
    pub(crate) fn from_f64_slice(
        data: &[f64],
        shape: Shape,
        dtype: DType,
        device: &HostDevice,
    ) -> Result<Self> {
        if data.len() != shape.elem_count() {
            return Err(Error::msg(format!(
                "element count mismatch: shape {} requires {} elements, got {}",
                shape,
                shape.elem_count(),
                data.len()
            )));
        }
        let start = Instant::now();
        let stored = data.iter().map(|&v| dtype.quantize(v)).collect();
        device.record("from_f64_slice", "transfer", start, data.len());
        Ok(Self::new(stored, shape, dtype, device.clone()))
    }

    pub(crate) fn rand_uniform(shape: Shape, dtype: DType, device: &HostDevice) -> Result<Self> {
        let start = Instant::now();
        let mut rng = rand::thread_rng();
        let data = (0..shape.elem_count())
            .map(|_| dtype.quantize(rng.gen::<f64>()))
            .collect();
        device.record("rand_uniform", "kernel", start, shape.elem_count());
        Ok(Self::new(data, shape, dtype, device.clone()))
    }

    fn new(data: Vec<f64>, shape: Shape, dtype: DType, device: HostDevice) -> Self {
        HostBuffer {
            data: Arc::new(data),
            shape,
            dtype,
            device,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> &HostDevice {
        &self.device
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    /// Whether two buffers share the same storage allocation.
    pub fn same_storage(&self, other: &HostBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// A copy of this buffer living on `device`.
    pub(crate) fn copy_to(&self, device: &HostDevice) -> Self {
        Self::new(
            self.data.as_ref().clone(),
            self.shape.clone(),
            self.dtype,
            device.clone(),
        )
    }

    /// A buffer on the same device with new contents.
    fn derive(&self, data: Vec<f64>, shape: Shape, dtype: DType) -> Self {
        let data = if dtype == DType::F64 {
            data
        } else {
            data.into_iter().map(|v| dtype.quantize(v)).collect()
        };
        Self::new(data, shape, dtype, self.device.clone())
    }
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HostBuffer(shape={}, dtype={}, device={})",
            self.shape,
            self.dtype,
            self.device.label()
        )
    }
}

fn map_elements(n: usize, f: impl Fn(usize) -> f64 + Sync + Send) -> Vec<f64> {
    if n >= PARALLEL_THRESHOLD {
        (0..n).into_par_iter().map(f).collect()
    } else {
        (0..n).map(f).collect()
    }
}

/// Offset into a buffer read through `strides` at output position `i`.
fn broadcast_offset(mut i: usize, out_dims: &[usize], strides: &[usize]) -> usize {
    let mut offset = 0;
    for d in (0..out_dims.len()).rev() {
        offset += (i % out_dims[d]) * strides[d];
        i /= out_dims[d];
    }
    offset
}

fn same_device(lhs: &HostBuffer, rhs: &HostBuffer, op: &str) -> Result<()> {
    if lhs.device != rhs.device {
        return Err(Error::msg(format!(
            "{op}: operands live on different devices ({} vs {})",
            lhs.device.label(),
            rhs.device.label()
        )));
    }
    Ok(())
}

pub(crate) fn binary(op: BinaryOp, lhs: &HostBuffer, rhs: &HostBuffer) -> Result<HostBuffer> {
    same_device(lhs, rhs, op.name())?;
    let start = Instant::now();
    let out_shape = Shape::broadcast_shape(&lhs.shape, &rhs.shape)?;
    let (a, b) = (lhs.data(), rhs.data());

    let data = if lhs.shape == rhs.shape {
        map_elements(a.len(), |i| op.apply(a[i], b[i]))
    } else {
        let dims = out_shape.dims();
        let ls = lhs.shape.broadcast_strides(&out_shape);
        let rs = rhs.shape.broadcast_strides(&out_shape);
        map_elements(out_shape.elem_count(), |i| {
            op.apply(
                a[broadcast_offset(i, dims, &ls)],
                b[broadcast_offset(i, dims, &rs)],
            )
        })
    };

    let out = lhs.derive(data, out_shape, lhs.dtype.promote(rhs.dtype));
    lhs.device.record(op.name(), "kernel", start, out.elem_count());
    Ok(out)
}

pub(crate) fn unary(op: UnaryOp, input: &HostBuffer) -> HostBuffer {
    let start = Instant::now();
    let x = input.data();
    let data = map_elements(x.len(), |i| op.apply(x[i]));
    let out = input.derive(data, input.shape.clone(), input.dtype);
    input.device.record(op.name(), "kernel", start, out.elem_count());
    out
}

pub(crate) fn affine(input: &HostBuffer, mul: f64, add: f64) -> HostBuffer {
    let start = Instant::now();
    let x = input.data();
    let data = map_elements(x.len(), |i| x[i] * mul + add);
    let out = input.derive(data, input.shape.clone(), input.dtype);
    input.device.record("affine", "kernel", start, out.elem_count());
    out
}

pub(crate) fn matmul(lhs: &HostBuffer, rhs: &HostBuffer) -> Result<HostBuffer> {
    same_device(lhs, rhs, "matmul")?;
    let start = Instant::now();
    let out_shape = Shape::matmul_shape(&lhs.shape, &rhs.shape)?;
    let (m, k, n) = (lhs.shape.dims()[0], lhs.shape.dims()[1], rhs.shape.dims()[1]);
    let (a, b) = (lhs.data(), rhs.data());

    let mut data = vec![0.0; m * n];
    let fill_row = |(row, out): (usize, &mut [f64])| {
        for p in 0..k {
            let av = a[row * k + p];
            for (col, o) in out.iter_mut().enumerate() {
                *o += av * b[p * n + col];
            }
        }
    };
    if n > 0 {
        if m * n >= PARALLEL_THRESHOLD {
            data.par_chunks_mut(n).enumerate().for_each(fill_row);
        } else {
            data.chunks_mut(n).enumerate().for_each(fill_row);
        }
    }

    let out = lhs.derive(data, out_shape, lhs.dtype.promote(rhs.dtype));
    lhs.device.record("matmul", "kernel", start, out.elem_count());
    Ok(out)
}

pub(crate) fn transpose(input: &HostBuffer) -> Result<HostBuffer> {
    let (m, n) = match input.shape.dims() {
        [m, n] => (*m, *n),
        _ => {
            return Err(Error::msg(format!(
                "transpose expects a rank-2 array, got {}",
                input.shape
            )))
        }
    };
    let start = Instant::now();
    let x = input.data();
    let data = map_elements(m * n, |i| {
        let (row, col) = (i / m, i % m);
        x[col * n + row]
    });
    let out = input.derive(data, Shape::from((n, m)), input.dtype);
    input.device.record("transpose", "kernel", start, out.elem_count());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostRuntime;
    use lattice_core::runtime::Runtime;

    fn cpu() -> HostDevice {
        HostRuntime::new().devices("cpu").unwrap().remove(0)
    }

    fn buf(data: &[f64], shape: impl Into<Shape>, dev: &HostDevice) -> HostBuffer {
        HostBuffer::from_f64_slice(data, shape.into(), DType::F64, dev).unwrap()
    }

    #[test]
    fn test_binary_broadcast() {
        let dev = cpu();
        let a = buf(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), &dev);
        let b = buf(&[10.0, 20.0, 30.0], (1, 3), &dev);
        let c = binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 3]);
        assert_eq!(c.data(), &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_binary_rejects_mixed_devices() {
        let rt = HostRuntime::builder().platform("cpu", 2).build();
        let devs = rt.devices("cpu").unwrap();
        let a = buf(&[1.0], 1, &devs[0]);
        let b = buf(&[1.0], 1, &devs[1]);
        assert!(binary(BinaryOp::Mul, &a, &b).is_err());
    }

    #[test]
    fn test_matmul_and_transpose() {
        let dev = cpu();
        let a = buf(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), &dev);
        let at = transpose(&a).unwrap();
        assert_eq!(at.shape().dims(), &[3, 2]);
        assert_eq!(at.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let c = matmul(&a, &at).unwrap();
        assert_eq!(c.shape().dims(), &[2, 2]);
        assert_eq!(c.data(), &[14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn test_large_kernels_match_serial() {
        let dev = cpu();
        let n = PARALLEL_THRESHOLD + 7;
        let x: Vec<f64> = (0..n).map(|i| i as f64 - 100.0).collect();
        let a = buf(&x, n, &dev);
        let y = unary(UnaryOp::Relu, &a);
        assert!(y.data().iter().zip(&x).all(|(&y, &x)| y == x.max(0.0)));
        let z = affine(&a, 2.0, 1.0);
        assert_eq!(z.data()[n - 1], x[n - 1] * 2.0 + 1.0);
    }

    #[test]
    fn test_half_storage_is_rounded() {
        let dev = cpu();
        let a = HostBuffer::from_f64_slice(&[1.0 / 3.0], Shape::from(1), DType::F16, &dev).unwrap();
        assert_eq!(a.data()[0], DType::F16.quantize(1.0 / 3.0));
        let b = affine(&a, 1.0, 1.0 / 3.0);
        assert_eq!(b.data()[0], DType::F16.quantize(a.data()[0] + 1.0 / 3.0));
    }
}
