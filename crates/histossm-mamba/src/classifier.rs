//! Image classifiers built around an injected feature extractor.
//!
//! The convolutional backbone (and its pretrained weights) lives outside
//! this crate and is supplied through [`FeatureExtractor`]. Two heads sit on
//! top of the pooled backbone feature:
//!
//! - [`BaselineModel`]: feature → [`ClassifierHead`]
//! - [`HybridModel`]: feature → LayerNorm → length-1 sequence → [`Mamba`] →
//!   mean over time → [`ClassifierHead`]

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use histossm_core::{Module, Result, SsmError, Tensor};

use crate::activations::gelu;
use crate::config::HybridConfig;
use crate::layers::{LayerNorm, Linear};
use crate::mamba::Mamba;

/// Produces one pooled feature vector per image.
pub trait FeatureExtractor: Send + Sync {
    /// Width of each feature vector.
    fn feature_dim(&self) -> usize;

    /// Map a batch of images (leading batch axis) to (batch, feature_dim).
    fn extract(&self, images: &Tensor) -> Result<Tensor>;
}

/// Pass-through extractor for features computed elsewhere.
///
/// Accepts (batch, dim) tensors, or (batch, dim, 1, 1) as produced by a
/// global-average-pooled backbone.
#[derive(Clone, Copy, Debug)]
pub struct PooledFeatures {
    pub dim: usize,
}

impl FeatureExtractor for PooledFeatures {
    fn feature_dim(&self) -> usize {
        self.dim
    }

    fn extract(&self, images: &Tensor) -> Result<Tensor> {
        let dims = images.dims();
        let batch = dims.first().copied().unwrap_or(0);
        let trailing: usize = dims.iter().skip(1).product();
        if dims.len() < 2 || dims[1] != self.dim || trailing != self.dim {
            return Err(SsmError::ShapeMismatch {
                expected: vec![batch, self.dim],
                got: dims.to_vec(),
            });
        }
        images.reshape(&[batch as isize, self.dim as isize])
    }
}

/// Classification label of the MHIST polyp dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MhistClass {
    /// Sessile serrated adenoma.
    #[serde(rename = "SSA")]
    Ssa,
    /// Hyperplastic polyp.
    #[serde(rename = "HP")]
    Hp,
}

impl MhistClass {
    pub const ALL: [MhistClass; 2] = [MhistClass::Ssa, MhistClass::Hp];

    pub fn index(self) -> usize {
        match self {
            MhistClass::Ssa => 0,
            MhistClass::Hp => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            MhistClass::Ssa => "SSA",
            MhistClass::Hp => "HP",
        }
    }
}

impl fmt::Display for MhistClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MhistClass {
    type Err = SsmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "SSA" => Ok(MhistClass::Ssa),
            "HP" => Ok(MhistClass::Hp),
            other => Err(SsmError::config(format!("unknown MHIST label {other:?}"))),
        }
    }
}

/// Arg-max prediction for one image.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub logits: Vec<f32>,
}

impl Prediction {
    fn from_logits(logits: &[f32]) -> Self {
        // First maximum wins on ties.
        let class_index = logits
            .iter()
            .enumerate()
            .fold(0, |best, (i, &v)| if v > logits[best] { i } else { best });
        Self {
            class_index,
            logits: logits.to_vec(),
        }
    }

    /// MHIST label, when the head has two outputs.
    pub fn label(&self) -> Option<MhistClass> {
        if self.logits.len() == MhistClass::ALL.len() {
            MhistClass::from_index(self.class_index)
        } else {
            None
        }
    }
}

/// Linear → LayerNorm → GELU → Dropout → Linear.
#[derive(Clone, Debug)]
pub struct ClassifierHead {
    pub fc1: Linear,
    pub norm: LayerNorm,
    pub fc2: Linear,
    /// Dropout probability; inference-only layers treat it as identity.
    pub dropout: f32,
}

impl ClassifierHead {
    pub fn new<R: Rng + ?Sized>(in_dim: usize, config: &HybridConfig, rng: &mut R) -> Self {
        Self {
            fc1: Linear::new(in_dim, config.head_hidden, true, rng),
            norm: LayerNorm::new(config.head_hidden, config.norm_eps),
            fc2: Linear::new(config.head_hidden, config.num_classes, true, rng),
            dropout: config.dropout,
        }
    }

    /// (rows, in_dim) -> (rows, num_classes)
    pub fn forward_rows(&self, x: &[f32], rows: usize) -> Vec<f32> {
        let hidden = self.fc1.forward(x, rows);
        let mut hidden = self.norm.forward(&hidden, rows);
        hidden.iter_mut().for_each(|v| *v = gelu(*v));
        self.fc2.forward(&hidden, rows)
    }

    pub fn num_classes(&self) -> usize {
        self.fc2.out_dim
    }
}

impl Module for ClassifierHead {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let dims = input.expect_rank(2)?;
        if dims[1] != self.fc1.in_dim {
            return Err(SsmError::ShapeMismatch {
                expected: vec![dims[0], self.fc1.in_dim],
                got: dims.to_vec(),
            });
        }
        let rows = dims[0];
        Tensor::from_vec(self.forward_rows(input.as_slice(), rows), &[rows, self.num_classes()])
    }

    fn named_parameters(&self) -> Vec<(String, &[f32])> {
        let mut params: Vec<(String, &[f32])> = vec![("fc1.weight".into(), self.fc1.weight.as_slice())];
        if let Some(b) = &self.fc1.bias {
            params.push(("fc1.bias".into(), b.as_slice()));
        }
        params.push(("norm.weight".into(), self.norm.weight.as_slice()));
        params.push(("norm.bias".into(), self.norm.bias.as_slice()));
        params.push(("fc2.weight".into(), self.fc2.weight.as_slice()));
        if let Some(b) = &self.fc2.bias {
            params.push(("fc2.bias".into(), b.as_slice()));
        }
        params
    }
}

fn check_backbone<E: FeatureExtractor>(backbone: &E, config: &HybridConfig) -> Result<()> {
    if backbone.feature_dim() != config.feature_dim() {
        return Err(SsmError::config(format!(
            "backbone produces {}-wide features, model expects {}",
            backbone.feature_dim(),
            config.feature_dim()
        )));
    }
    Ok(())
}

fn predictions(logits: &Tensor) -> Vec<Prediction> {
    let classes = logits.dims().last().copied().unwrap_or(0).max(1);
    logits.as_slice().chunks(classes).map(Prediction::from_logits).collect()
}

/// Backbone feature straight into the classifier head.
pub struct BaselineModel<E> {
    pub backbone: E,
    pub head: ClassifierHead,
}

impl<E: FeatureExtractor> BaselineModel<E> {
    pub fn new(config: &HybridConfig, backbone: E) -> Result<Self> {
        Self::with_rng(config, backbone, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(config: &HybridConfig, backbone: E, rng: &mut R) -> Result<Self> {
        config.validate()?;
        check_backbone(&backbone, config)?;
        let head = ClassifierHead::new(config.feature_dim(), config, rng);
        Ok(Self { backbone, head })
    }

    pub fn predict(&self, images: &Tensor) -> Result<Vec<Prediction>> {
        Ok(predictions(&self.forward(images)?))
    }
}

impl<E: FeatureExtractor> Module for BaselineModel<E> {
    fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let features = self.backbone.extract(images)?;
        self.head.forward(&features)
    }

    fn named_parameters(&self) -> Vec<(String, &[f32])> {
        prefixed("head", self.head.named_parameters())
    }
}

/// Backbone feature refined by a selective scan layer before the head.
pub struct HybridModel<E> {
    pub config: HybridConfig,
    pub backbone: E,
    pub norm: LayerNorm,
    pub mamba: Mamba,
    pub head: ClassifierHead,
}

impl<E: FeatureExtractor> HybridModel<E> {
    pub fn new(config: HybridConfig, backbone: E) -> Result<Self> {
        Self::with_rng(config, backbone, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(config: HybridConfig, backbone: E, rng: &mut R) -> Result<Self> {
        config.validate()?;
        check_backbone(&backbone, &config)?;
        let d = config.feature_dim();
        let norm = LayerNorm::new(d, config.norm_eps);
        let mamba = Mamba::with_rng(config.mamba.clone(), rng)?;
        let head = ClassifierHead::new(d, &config, rng);
        tracing::debug!(
            feature_dim = d,
            num_classes = config.num_classes,
            "initialised hybrid classifier"
        );
        Ok(Self { config, backbone, norm, mamba, head })
    }

    /// Classify pooled backbone features of shape (batch, feature_dim).
    pub fn forward_features(&self, features: &Tensor) -> Result<Tensor> {
        let dims = features.expect_rank(2)?;
        let (batch, d) = (dims[0], dims[1]);
        if d != self.config.feature_dim() {
            return Err(SsmError::ShapeMismatch {
                expected: vec![batch, self.config.feature_dim()],
                got: dims.to_vec(),
            });
        }
        let normed = Tensor::from_vec(self.norm.forward(features.as_slice(), batch), &[batch, d])?;
        let seq = normed.unsqueeze(1)?;
        let scanned = self.mamba.forward(&seq)?;
        let pooled = scanned.mean_axis(1)?;
        self.head.forward(&pooled)
    }

    pub fn predict(&self, images: &Tensor) -> Result<Vec<Prediction>> {
        Ok(predictions(&self.forward(images)?))
    }
}

impl<E: FeatureExtractor> Module for HybridModel<E> {
    fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let features = self.backbone.extract(images)?;
        self.forward_features(&features)
    }

    fn named_parameters(&self) -> Vec<(String, &[f32])> {
        let mut params: Vec<(String, &[f32])> = vec![
            ("norm.weight".into(), self.norm.weight.as_slice()),
            ("norm.bias".into(), self.norm.bias.as_slice()),
        ];
        params.extend(prefixed("mamba", self.mamba.named_parameters()));
        params.extend(prefixed("head", self.head.named_parameters()));
        params
    }
}

fn prefixed<'a>(prefix: &str, params: Vec<(String, &'a [f32])>) -> Vec<(String, &'a [f32])> {
    params
        .into_iter()
        .map(|(name, p)| (format!("{prefix}.{name}"), p))
        .collect()
}
