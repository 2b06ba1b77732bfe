use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::error::SsmError;
use crate::shape::Shape;
use crate::Result;

/// A dense, row-major f32 tensor.
///
/// Storage is reference-counted so clones and reshapes share data.
#[derive(Clone)]
pub struct Tensor {
    data: Arc<Vec<f32>>,
    shape: Shape,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Build a tensor from owned data, checking the element count.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let s = Shape::new(shape);
        if s.numel() != data.len() {
            return Err(SsmError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Self {
            data: Arc::new(data),
            shape: s,
        })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        Self {
            data: Arc::new(vec![0.0; s.numel()]),
            shape: s,
        }
    }

    /// Standard normal samples (Box-Muller) drawn from `rng`.
    pub fn randn<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let s = Shape::new(shape);
        let data: Vec<f32> = (0..s.numel())
            .map(|_| {
                let u1: f32 = rng.gen_range(1e-7f32..1.0f32);
                let u2: f32 = rng.gen_range(0.0f32..std::f32::consts::TAU);
                (-2.0f32 * u1.ln()).sqrt() * u2.cos()
            })
            .collect();
        Self {
            data: Arc::new(data),
            shape: s,
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.as_ref().clone()
    }

    /// Require this tensor to be rank `ndim`, returning its dims.
    pub fn expect_rank(&self, ndim: usize) -> Result<&[usize]> {
        if self.ndim() != ndim {
            return Err(SsmError::ShapeMismatch {
                expected: vec![0; ndim],
                got: self.dims().to_vec(),
            });
        }
        Ok(self.dims())
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    // =========================================================================
    // Shape operations (share storage)
    // =========================================================================

    pub fn reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let resolved = self
            .shape
            .resolve_reshape(new_shape)
            .ok_or_else(|| SsmError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.to_vec(),
            })?;
        Ok(Tensor {
            data: Arc::clone(&self.data),
            shape: resolved,
        })
    }

    pub fn unsqueeze(&self, axis: usize) -> Result<Tensor> {
        let shape = self.shape.unsqueeze(axis).ok_or(SsmError::InvalidAxis {
            axis,
            ndim: self.ndim(),
        })?;
        Ok(Tensor {
            data: Arc::clone(&self.data),
            shape,
        })
    }

    /// Mean over `axis`, removing it from the shape.
    pub fn mean_axis(&self, axis: usize) -> Result<Tensor> {
        let dims = self.dims();
        if axis >= dims.len() {
            return Err(SsmError::InvalidAxis {
                axis,
                ndim: dims.len(),
            });
        }
        let outer: usize = dims[..axis].iter().product();
        let len = dims[axis];
        let inner: usize = dims[axis + 1..].iter().product();
        let mut out = vec![0.0f32; outer * inner];
        if len > 0 {
            for o in 0..outer {
                for k in 0..len {
                    let src = (o * len + k) * inner;
                    for i in 0..inner {
                        out[o * inner + i] += self.data[src + i];
                    }
                }
            }
            let scale = 1.0 / len as f32;
            out.iter_mut().for_each(|v| *v *= scale);
        }
        let mut new_dims = dims.to_vec();
        new_dims.remove(axis);
        Tensor::from_vec(out, &new_dims)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={})", self.shape)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.as_slice();
        if data.len() <= 20 {
            write!(f, "tensor({:?}, shape={})", data, self.shape)
        } else {
            write!(
                f,
                "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                data[0],
                data[1],
                data[data.len() - 1],
                self.shape
            )
        }
    }
}
