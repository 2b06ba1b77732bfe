//! Dense layer primitives operating on flat row-major f32 slices.

use rand::Rng;

/// Linear projection: y = x @ W^T + b.
#[derive(Clone, Debug)]
pub struct Linear {
    /// Weight, shape (out_dim, in_dim).
    pub weight: Vec<f32>,
    /// Optional bias, shape (out_dim,).
    pub bias: Option<Vec<f32>>,
    pub in_dim: usize,
    pub out_dim: usize,
}

impl Linear {
    /// PyTorch default initialisation: weight and bias uniform in
    /// [-1/sqrt(in_dim), 1/sqrt(in_dim)].
    pub fn new<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, bias: bool, rng: &mut R) -> Self {
        let bound = 1.0 / (in_dim as f32).sqrt();
        let weight = (0..out_dim * in_dim)
            .map(|_| rng.gen_range(-bound..=bound))
            .collect();
        let bias = bias.then(|| (0..out_dim).map(|_| rng.gen_range(-bound..=bound)).collect());
        Self { weight, bias, in_dim, out_dim }
    }

    /// Forward: (n, in_dim) -> (n, out_dim)
    pub fn forward(&self, x: &[f32], n: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; n * self.out_dim];
        for i in 0..n {
            let row = &x[i * self.in_dim..(i + 1) * self.in_dim];
            for o in 0..self.out_dim {
                let w = &self.weight[o * self.in_dim..(o + 1) * self.in_dim];
                let mut acc = self.bias.as_ref().map_or(0.0, |b| b[o]);
                for (xv, wv) in row.iter().zip(w) {
                    acc += xv * wv;
                }
                out[i * self.out_dim + o] = acc;
            }
        }
        out
    }

    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.as_ref().map_or(0, Vec::len)
    }
}

/// LayerNorm over the last dimension.
#[derive(Clone, Debug)]
pub struct LayerNorm {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub d: usize,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(d: usize, eps: f32) -> Self {
        Self {
            weight: vec![1.0f32; d],
            bias: vec![0.0f32; d],
            d,
            eps,
        }
    }

    /// Normalize input of shape (n_rows, d).
    pub fn forward(&self, x: &[f32], n_rows: usize) -> Vec<f32> {
        let d = self.d;
        let mut out = vec![0.0f32; n_rows * d];
        for row in 0..n_rows {
            let start = row * d;
            let slice = &x[start..start + d];
            let mean: f32 = slice.iter().sum::<f32>() / d as f32;
            let var: f32 = slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / d as f32;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            for j in 0..d {
                out[start + j] = (slice[j] - mean) * inv_std * self.weight[j] + self.bias[j];
            }
        }
        out
    }
}
