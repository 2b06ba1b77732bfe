use smallvec::SmallVec;
use std::fmt;

/// Tensor shape with stack-allocated storage for up to four dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Resolve a reshape target that may contain a single `-1` wildcard.
    ///
    /// Returns `None` when the target has more than one wildcard, a
    /// negative extent other than `-1`, or a different element count.
    pub fn resolve_reshape(&self, target: &[isize]) -> Option<Shape> {
        let numel = self.numel();
        let wildcards = target.iter().filter(|&&d| d == -1).count();
        if wildcards > 1 || target.iter().any(|&d| d < -1) {
            return None;
        }

        let fixed = target
            .iter()
            .filter(|&&d| d >= 0)
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))?;
        let inferred = match wildcards {
            0 => 0,
            _ if fixed == 0 || numel % fixed != 0 => return None,
            _ => numel / fixed,
        };

        let dims: SmallVec<[usize; 4]> = target
            .iter()
            .map(|&d| usize::try_from(d).unwrap_or(inferred))
            .collect();
        let resolved = Shape { dims };
        (resolved.numel() == numel).then_some(resolved)
    }

    /// Shape with a new axis of size one inserted at `axis`.
    pub fn unsqueeze(&self, axis: usize) -> Option<Shape> {
        if axis > self.ndim() {
            return None;
        }
        let mut dims = self.dims.clone();
        dims.insert(axis, 1);
        Some(Shape { dims })
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
