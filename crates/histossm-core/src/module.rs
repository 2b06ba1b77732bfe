use crate::{Result, Tensor};

/// Base trait for every layer in the crate family.
///
/// Layers are immutable during `forward`; any per-call state (such as the
/// scan hidden state) lives on the stack of that call.
pub trait Module: Send + Sync {
    /// Forward pass.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Named parameter buffers, in a stable order.
    fn named_parameters(&self) -> Vec<(String, &[f32])>;

    /// Total number of scalar parameters.
    fn param_count(&self) -> usize {
        self.named_parameters().iter().map(|(_, p)| p.len()).sum()
    }
}
