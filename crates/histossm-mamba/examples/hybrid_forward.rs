//! Run pooled backbone features through the hybrid classifier.
//!
//! ```text
//! RUST_LOG=histossm_mamba=debug cargo run -p histossm-mamba --example hybrid_forward
//! ```

use histossm_core::Tensor;
use histossm_mamba::{HybridConfig, HybridModel, PooledFeatures};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HybridConfig::mhist();
    let mut rng = StdRng::seed_from_u64(0);
    let backbone = PooledFeatures { dim: config.feature_dim() };
    let model = HybridModel::with_rng(config.clone(), backbone, &mut rng)?;

    // Stand-in for ResNet-18 global-average-pooled features.
    let features = Tensor::randn(&[4, config.feature_dim(), 1, 1], &mut rng);
    for (i, pred) in model.predict(&features)?.iter().enumerate() {
        let label = pred.label().map(|l| l.to_string()).unwrap_or_default();
        tracing::info!(image = i, class = pred.class_index, %label, logits = ?pred.logits, "prediction");
    }
    Ok(())
}
