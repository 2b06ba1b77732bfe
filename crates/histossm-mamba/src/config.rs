//! Layer and model configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use histossm_core::{Result, SsmError};

use crate::loader::LoadError;

/// How the step-size projection weight is initialised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DtInit {
    /// Uniform in [-s, s] with s = dt_rank^-0.5 * dt_scale.
    #[default]
    Random,
    /// Every entry equal to s.
    Constant,
}

/// Configuration of a single selective scan (Mamba) layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MambaConfig {
    /// Feature width of the input and output sequences.
    pub d_model: usize,
    /// Per-channel latent width.
    #[serde(default = "default_d_state")]
    pub d_state: usize,
    /// Depthwise causal convolution width.
    #[serde(default = "default_d_conv")]
    pub d_conv: usize,
    /// Inner width multiplier: d_inner = round(expand * d_model).
    #[serde(default = "default_expand")]
    pub expand: f32,
    /// Rank of the low-rank step-size projection.
    #[serde(default = "default_dt_rank")]
    pub dt_rank: usize,
    #[serde(default = "default_dt_min")]
    pub dt_min: f32,
    #[serde(default = "default_dt_max")]
    pub dt_max: f32,
    #[serde(default)]
    pub dt_init: DtInit,
    #[serde(default = "default_dt_scale")]
    pub dt_scale: f32,
    /// Lower clamp on the sampled initial step size.
    #[serde(default = "default_dt_init_floor")]
    pub dt_init_floor: f32,
    /// Bias on the depthwise convolution.
    #[serde(default = "default_conv_bias")]
    pub conv_bias: bool,
    /// Bias on the input and output projections.
    #[serde(default)]
    pub bias: bool,
    /// Add the step-size bias a second time before softplus.
    ///
    /// On by default to reproduce the reference experiment's numbers.
    #[serde(default = "default_duplicate_dt_bias")]
    pub duplicate_dt_bias: bool,
}

fn default_d_state() -> usize { 16 }
fn default_d_conv() -> usize { 4 }
fn default_expand() -> f32 { 2.0 }
fn default_dt_rank() -> usize { 16 }
fn default_dt_min() -> f32 { 0.001 }
fn default_dt_max() -> f32 { 0.1 }
fn default_dt_scale() -> f32 { 1.0 }
fn default_dt_init_floor() -> f32 { 1e-4 }
fn default_conv_bias() -> bool { true }
fn default_duplicate_dt_bias() -> bool { true }

impl MambaConfig {
    /// Default configuration for the given model width.
    pub fn new(d_model: usize) -> Self {
        Self {
            d_model,
            d_state: default_d_state(),
            d_conv: default_d_conv(),
            expand: default_expand(),
            dt_rank: default_dt_rank(),
            dt_min: default_dt_min(),
            dt_max: default_dt_max(),
            dt_init: DtInit::default(),
            dt_scale: default_dt_scale(),
            dt_init_floor: default_dt_init_floor(),
            conv_bias: default_conv_bias(),
            bias: false,
            duplicate_dt_bias: default_duplicate_dt_bias(),
        }
    }

    /// A tiny config for unit tests.
    pub fn tiny() -> Self {
        Self {
            d_state: 4,
            dt_rank: 4,
            ..Self::new(8)
        }
    }

    /// Inner channel width, `round(expand * d_model)`.
    pub fn d_inner(&self) -> usize {
        let v = (self.expand as f64 * self.d_model as f64).round();
        if v.is_finite() && v > 0.0 { v as usize } else { 0 }
    }

    /// Width of the low-rank projection output: dt_rank + 2 * d_state.
    pub fn x_proj_dim(&self) -> usize {
        self.dt_rank + 2 * self.d_state
    }

    /// Check every construction-time constraint and return `d_inner`.
    pub fn validate(&self) -> Result<usize> {
        if self.d_model == 0 {
            return Err(SsmError::config("d_model must be positive"));
        }
        if self.d_state == 0 {
            return Err(SsmError::config("d_state must be positive"));
        }
        if self.d_conv == 0 {
            return Err(SsmError::config("d_conv must be positive"));
        }
        if self.dt_rank == 0 {
            return Err(SsmError::config("dt_rank must be positive"));
        }
        if !(self.expand.is_finite() && self.expand > 0.0) {
            return Err(SsmError::config(format!(
                "expand must be a positive finite number, got {}",
                self.expand
            )));
        }
        let d_inner = self.d_inner();
        if d_inner == 0 {
            return Err(SsmError::config(format!(
                "expand ({}) * d_model ({}) does not yield a positive inner dimension",
                self.expand, self.d_model
            )));
        }
        if !(self.dt_min > 0.0 && self.dt_max >= self.dt_min) {
            return Err(SsmError::config(format!(
                "dt range must satisfy 0 < dt_min <= dt_max, got [{}, {}]",
                self.dt_min, self.dt_max
            )));
        }
        if !(self.dt_init_floor > 0.0) {
            return Err(SsmError::config("dt_init_floor must be positive"));
        }
        Ok(d_inner)
    }
}

/// Configuration of the hybrid backbone + Mamba classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Mamba layer over the pooled backbone feature; `d_model` is the
    /// backbone feature width.
    pub mamba: MambaConfig,
    #[serde(default = "default_head_hidden")]
    pub head_hidden: usize,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    /// Dropout probability in the head (identity at inference).
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_norm_eps")]
    pub norm_eps: f32,
}

fn default_head_hidden() -> usize { 256 }
fn default_num_classes() -> usize { 2 }
fn default_dropout() -> f32 { 0.1 }
fn default_norm_eps() -> f32 { 1e-5 }

impl HybridConfig {
    /// ResNet-18 features (512) through a narrow Mamba into a 2-way head.
    pub fn mhist() -> Self {
        Self {
            mamba: MambaConfig {
                d_state: 8,
                d_conv: 4,
                expand: 1.0,
                dt_rank: 8,
                ..MambaConfig::new(512)
            },
            head_hidden: default_head_hidden(),
            num_classes: default_num_classes(),
            dropout: default_dropout(),
            norm_eps: default_norm_eps(),
        }
    }

    /// Backbone feature width consumed by the model.
    pub fn feature_dim(&self) -> usize {
        self.mamba.d_model
    }

    pub fn validate(&self) -> Result<()> {
        self.mamba.validate()?;
        if self.head_hidden == 0 || self.num_classes == 0 {
            return Err(SsmError::config("head_hidden and num_classes must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(SsmError::config(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Load a `MambaConfig` from a JSON file.
pub fn load_config(path: &Path) -> std::result::Result<MambaConfig, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let config: MambaConfig =
        serde_json::from_str(&text).map_err(|e| LoadError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
