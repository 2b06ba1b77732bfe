//! Causal depthwise 1D convolution.
//!
//! Equivalent to a grouped `Conv1d(groups = channels, padding = kernel - 1)`
//! whose output is trimmed back to the input length: the output at position
//! t only depends on inputs at positions <= t.
//!
//! Weights use the cross-correlation layout `(channels, kernel)`, so
//! `weight[kernel - 1]` multiplies the current timestep and `weight[0]` the
//! oldest one in the window.

use crate::activations::silu;

/// Causal depthwise Conv1d forward pass.
///
/// # Arguments
/// - `x`: input, shape (batch, channels, seq_len)
/// - `weight`: depthwise kernel, shape (channels, kernel_size)
/// - `bias`: optional bias, shape (channels,)
/// - `activation`: if true, applies SiLU after the convolution
///
/// # Returns
/// Output of shape (batch, channels, seq_len)
#[allow(clippy::too_many_arguments)]
pub fn causal_conv1d_fn(
    x: &[f32],
    batch: usize,
    channels: usize,
    seq_len: usize,
    weight: &[f32],
    kernel_size: usize,
    bias: Option<&[f32]>,
    activation: bool,
) -> Vec<f32> {
    let mut output = vec![0.0f32; batch * channels * seq_len];
    let pad = kernel_size.saturating_sub(1);

    for b in 0..batch {
        for ch in 0..channels {
            let row = &x[(b * channels + ch) * seq_len..(b * channels + ch + 1) * seq_len];
            let w = &weight[ch * kernel_size..(ch + 1) * kernel_size];
            let out_row = &mut output[(b * channels + ch) * seq_len..(b * channels + ch + 1) * seq_len];

            // Only the first seq_len positions of the padded convolution are
            // produced; the trailing kernel_size - 1 are never materialised.
            for (t, out) in out_row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, &wk) in w.iter().enumerate() {
                    // Position in the left-padded input; below `pad` is zero.
                    let padded = t + k;
                    if padded >= pad {
                        acc += row[padded - pad] * wk;
                    }
                }
                if let Some(bias_data) = bias {
                    acc += bias_data[ch];
                }
                *out = if activation { silu(acc) } else { acc };
            }
        }
    }

    output
}
