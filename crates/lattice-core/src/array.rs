use std::fmt;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{BinaryOp, Runtime, UnaryOp};
use crate::shape::Shape;

// Array — A value that is either concrete or traced
//
// Concrete arrays wrap a runtime buffer that lives on some device. Traced
// arrays are placeholders produced while tracing a computation: they carry a
// shape and a dtype but no data and no device.
//
// Operations accept both. When any operand is traced the result is traced
// and only its shape is computed, so a model can be run symbolically to check
// shapes without touching the runtime. Reading data out of a traced array is
// an error.
//
// Cloning is cheap: runtime buffers are reference-counted handles.

/// Shape and dtype of a traced placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedArray {
    pub shape: Shape,
    pub dtype: DType,
}

/// A tensor-like value on runtime `R`.
pub enum Array<R: Runtime> {
    Concrete(R::Buffer),
    Traced(TracedArray),
}

impl<R: Runtime> Clone for Array<R> {
    fn clone(&self) -> Self {
        match self {
            Array::Concrete(b) => Array::Concrete(b.clone()),
            Array::Traced(t) => Array::Traced(t.clone()),
        }
    }
}

impl<R: Runtime> fmt::Debug for Array<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Array::Concrete(b) => write!(f, "Array({:?})", b),
            Array::Traced(t) => write!(f, "Array(traced, shape={}, dtype={})", t.shape, t.dtype),
        }
    }
}

impl<R: Runtime> From<TracedArray> for Array<R> {
    fn from(t: TracedArray) -> Self {
        Array::Traced(t)
    }
}

impl<R: Runtime> Array<R> {
    //  Creation

    /// Create a concrete array from host data.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &R::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::msg(format!(
                "element count mismatch: shape {} requires {} elements, got {}",
                shape,
                shape.elem_count(),
                data.len()
            )));
        }
        Ok(Array::Concrete(R::from_f64_slice(data, &shape, dtype, device)?))
    }

    /// Uniform random values in [0, 1).
    pub fn rand(shape: impl Into<Shape>, dtype: DType, device: &R::Device) -> Result<Self> {
        Ok(Array::Concrete(R::rand_uniform(&shape.into(), dtype, device)?))
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &R::Device) -> Result<Self> {
        let shape = shape.into();
        let data = vec![0.0; shape.elem_count()];
        Ok(Array::Concrete(R::from_f64_slice(&data, &shape, dtype, device)?))
    }

    /// A shape-only placeholder.
    pub fn traced(shape: impl Into<Shape>, dtype: DType) -> Self {
        Array::Traced(TracedArray {
            shape: shape.into(),
            dtype,
        })
    }

    //  Accessors

    pub fn shape(&self) -> &Shape {
        match self {
            Array::Concrete(b) => R::shape(b),
            Array::Traced(t) => &t.shape,
        }
    }

    pub fn dims(&self) -> &[usize] {
        self.shape().dims()
    }

    pub fn dtype(&self) -> DType {
        match self {
            Array::Concrete(b) => R::dtype(b),
            Array::Traced(t) => t.dtype,
        }
    }

    pub fn elem_count(&self) -> usize {
        self.shape().elem_count()
    }

    pub fn is_traced(&self) -> bool {
        matches!(self, Array::Traced(_))
    }

    /// The runtime buffer, or `None` for a traced placeholder.
    pub fn buffer(&self) -> Option<&R::Buffer> {
        match self {
            Array::Concrete(b) => Some(b),
            Array::Traced(_) => None,
        }
    }

    /// Copy the contents to the host.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        match self {
            Array::Concrete(b) => R::to_f64_vec(b),
            Array::Traced(t) => Err(Error::TracedValue {
                op: "to_f64_vec",
                shape: t.shape.clone(),
            }),
        }
    }

    //  Operations

    fn binary(&self, op: BinaryOp, rhs: &Self) -> Result<Self> {
        match (self, rhs) {
            (Array::Concrete(a), Array::Concrete(b)) => Ok(Array::Concrete(R::binary_op(op, a, b)?)),
            _ => Ok(Array::traced(
                Shape::broadcast_shape(self.shape(), rhs.shape())?,
                self.dtype().promote(rhs.dtype()),
            )),
        }
    }

    fn unary(&self, op: UnaryOp) -> Result<Self> {
        match self {
            Array::Concrete(b) => Ok(Array::Concrete(R::unary_op(op, b)?)),
            Array::Traced(_) => Ok(self.clone()),
        }
    }

    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn relu(&self) -> Result<Self> {
        self.unary(UnaryOp::Relu)
    }

    pub fn sigmoid(&self) -> Result<Self> {
        self.unary(UnaryOp::Sigmoid)
    }

    pub fn tanh(&self) -> Result<Self> {
        self.unary(UnaryOp::Tanh)
    }

    /// `self * mul + add`.
    pub fn affine(&self, mul: f64, add: f64) -> Result<Self> {
        match self {
            Array::Concrete(b) => Ok(Array::Concrete(R::affine(b, mul, add)?)),
            Array::Traced(_) => Ok(self.clone()),
        }
    }

    /// 2-D matrix product.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        match (self, rhs) {
            (Array::Concrete(a), Array::Concrete(b)) => Ok(Array::Concrete(R::matmul(a, b)?)),
            _ => Ok(Array::traced(
                Shape::matmul_shape(self.shape(), rhs.shape())?,
                self.dtype().promote(rhs.dtype()),
            )),
        }
    }

    /// 2-D transpose.
    pub fn t(&self) -> Result<Self> {
        match self {
            Array::Concrete(b) => Ok(Array::Concrete(R::transpose(b)?)),
            Array::Traced(t) => match t.shape.dims() {
                [m, n] => Ok(Array::traced((*n, *m), t.dtype)),
                _ => Err(Error::msg(format!(
                    "transpose expects a rank-2 array, got {}",
                    t.shape
                ))),
            },
        }
    }
}
