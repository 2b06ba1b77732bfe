//! SafeTensors weight loading and export for Mamba blocks.
//!
//! Parameter names follow the PyTorch module layout (`in_proj.weight`,
//! `conv1d.weight`, `A_log`, `D`, ...), optionally under a prefix such as
//! `mamba` for the hybrid classifier.

use std::path::Path;

use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use thiserror::Error;

use histossm_core::{Module, SsmError};

use crate::config::MambaConfig;
use crate::mamba::Mamba;

/// Error type for weight and config loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SafeTensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Shape mismatch for {key}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Unsupported dtype {dtype:?} for {key}")]
    UnsupportedDtype { key: String, dtype: Dtype },

    #[error(transparent)]
    Layer(#[from] SsmError),
}

fn full_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Convert a SafeTensors tensor view to Vec<f32>.
fn tensor_to_f32(key: &str, view: &TensorView<'_>) -> Result<Vec<f32>, LoadError> {
    let data = view.data();
    let values = match view.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F16 => data
            .chunks_exact(2)
            .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        Dtype::BF16 => data
            .chunks_exact(2)
            .map(|b| half::bf16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        dtype => {
            return Err(LoadError::UnsupportedDtype {
                key: key.to_string(),
                dtype,
            })
        }
    };
    Ok(values)
}

/// Fetch a tensor and check its shape. Any of `shapes` is accepted.
fn get_checked(
    tensors: &SafeTensors<'_>,
    key: &str,
    shapes: &[&[usize]],
) -> Result<Option<Vec<f32>>, LoadError> {
    let view = match tensors.tensor(key) {
        Ok(view) => view,
        Err(_) => return Ok(None),
    };
    if !shapes.iter().any(|s| *s == view.shape()) {
        return Err(LoadError::ShapeMismatch {
            key: key.to_string(),
            expected: shapes[0].to_vec(),
            got: view.shape().to_vec(),
        });
    }
    tensor_to_f32(key, &view).map(Some)
}

fn get_required(
    tensors: &SafeTensors<'_>,
    key: &str,
    shapes: &[&[usize]],
) -> Result<Vec<f32>, LoadError> {
    get_checked(tensors, key, shapes)?.ok_or_else(|| LoadError::MissingKey(key.to_string()))
}

/// Load weights into an existing Mamba block.
///
/// Weights are required; biases are optional and a missing bias removes
/// the corresponding bias from the block. The step-size bias is required.
pub fn load_mamba_weights(m: &mut Mamba, tensors: &SafeTensors<'_>, prefix: &str) -> Result<(), LoadError> {
    let d = m.d_model();
    let di = m.d_inner;
    let n = m.d_state();
    let k = m.config.d_conv;
    let r = m.config.dt_rank;
    let key = |name: &str| full_key(prefix, name);

    // Every tensor is read and checked before the block is touched, so a
    // failed load leaves `m` unchanged.
    let in_proj_weight = get_required(tensors, &key("in_proj.weight"), &[&[2 * di, d]])?;
    let in_proj_bias = get_checked(tensors, &key("in_proj.bias"), &[&[2 * di]])?;

    // PyTorch stores the depthwise kernel as (d_inner, 1, kernel).
    let conv1d_weight = get_required(tensors, &key("conv1d.weight"), &[&[di, 1, k], &[di, k]])?;
    let conv1d_bias = get_checked(tensors, &key("conv1d.bias"), &[&[di]])?;

    let x_proj_weight = get_required(tensors, &key("x_proj.weight"), &[&[r + 2 * n, di]])?;
    let dt_proj_weight = get_required(tensors, &key("dt_proj.weight"), &[&[di, r]])?;
    let dt_proj_bias = get_required(tensors, &key("dt_proj.bias"), &[&[di]])?;

    let a_log = get_required(tensors, &key("A_log"), &[&[di, n]])?;
    let d_skip = get_required(tensors, &key("D"), &[&[di]])?;

    let out_proj_weight = get_required(tensors, &key("out_proj.weight"), &[&[d, di]])?;
    let out_proj_bias = get_checked(tensors, &key("out_proj.bias"), &[&[d]])?;

    m.in_proj.weight = in_proj_weight;
    m.in_proj.bias = in_proj_bias;
    m.conv1d_weight = conv1d_weight;
    m.conv1d_bias = conv1d_bias;
    m.x_proj.weight = x_proj_weight;
    m.dt_proj.weight = dt_proj_weight;
    m.dt_proj.bias = Some(dt_proj_bias);
    m.a_log = a_log;
    m.d_skip = d_skip;
    m.out_proj.weight = out_proj_weight;
    m.out_proj.bias = out_proj_bias;

    tracing::debug!(prefix, d_model = d, d_inner = di, "loaded mamba weights");
    Ok(())
}

/// Build a Mamba block from `config` and load its weights from a
/// `.safetensors` file.
pub fn load_mamba_from_file(path: &Path, config: MambaConfig, prefix: &str) -> Result<Mamba, LoadError> {
    let data = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&data)?;
    let mut m = Mamba::new(config)?;
    load_mamba_weights(&mut m, &tensors, prefix)?;
    Ok(m)
}

/// Serialise a block's parameters (F32, PyTorch shapes) to SafeTensors bytes.
pub fn export_mamba_weights(m: &Mamba, prefix: &str) -> Result<Vec<u8>, LoadError> {
    let d = m.d_model();
    let di = m.d_inner;
    let n = m.d_state();
    let k = m.config.d_conv;
    let r = m.config.dt_rank;

    let shaped: Vec<(String, Vec<usize>, Vec<u8>)> = m
        .named_parameters()
        .into_iter()
        .map(|(name, data)| {
            let shape = match name.as_str() {
                "in_proj.weight" => vec![2 * di, d],
                "in_proj.bias" => vec![2 * di],
                "conv1d.weight" => vec![di, 1, k],
                "x_proj.weight" => vec![r + 2 * n, di],
                "dt_proj.weight" => vec![di, r],
                "A_log" => vec![di, n],
                "out_proj.weight" => vec![d, di],
                _ => vec![data.len()],
            };
            let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            (full_key(prefix, &name), shape, bytes)
        })
        .collect();

    let views = shaped
        .iter()
        .map(|(name, shape, bytes)| Ok((name.as_str(), TensorView::new(Dtype::F32, shape.clone(), bytes)?)))
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(safetensors::serialize(views.iter().map(|(name, view)| (*name, view)), &None)?)
}
