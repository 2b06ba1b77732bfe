//! # histossm-mamba
//!
//! Selective state-space ("Mamba") layer and the histopathology classifier
//! heads built on it.
//!
//! The layer projects a (batch, seq_len, d_model) sequence into an inner
//! channel space, runs a causal depthwise convolution, derives a per-step
//! discretisation Δ and input/output gates B, C from the signal itself, and
//! folds a linear state-space recurrence over time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use histossm_core::{Module, Tensor};
//! use histossm_mamba::{Mamba, MambaConfig};
//! use rand::SeedableRng;
//!
//! let config = MambaConfig { d_state: 4, dt_rank: 4, ..MambaConfig::new(8) };
//! let block = Mamba::new(config).unwrap();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let input = Tensor::randn(&[2, 5, 8], &mut rng);
//! let output = block.forward(&input).unwrap();
//! assert_eq!(output.dims(), &[2, 5, 8]);
//! ```

pub mod activations;
pub mod causal_conv1d;
pub mod classifier;
pub mod config;
pub mod layers;
pub mod loader;
pub mod mamba;
pub mod selective_scan;

pub use causal_conv1d::causal_conv1d_fn;
pub use classifier::{
    BaselineModel, ClassifierHead, FeatureExtractor, HybridModel, MhistClass, PooledFeatures, Prediction,
};
pub use config::{load_config, DtInit, HybridConfig, MambaConfig};
pub use layers::{LayerNorm, Linear};
pub use loader::{export_mamba_weights, load_mamba_from_file, load_mamba_weights, LoadError};
pub use mamba::{Mamba, SelectiveParams};
pub use selective_scan::{selective_scan, selective_scan_step, ScanInputs, ScanState, SelectiveScanOutput, StepInputs};
