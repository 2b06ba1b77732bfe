//! Mamba block — the selective state-space layer.
//!
//! Architecture: in_proj → split(x, z) → causal_conv1d → SiLU → x_proj →
//! split(dt, B, C) → dt_proj → softplus → selective_scan(x, Δ, A, B, C, D, z)
//! → out_proj

use rand::Rng;

use histossm_core::{Module, Result, SsmError, Tensor};

use crate::activations::{inverse_softplus, softplus};
use crate::causal_conv1d::causal_conv1d_fn;
use crate::config::{DtInit, MambaConfig};
use crate::layers::Linear;
use crate::selective_scan::{selective_scan, ScanInputs};

/// Selective state-space block.
#[derive(Clone, Debug)]
pub struct Mamba {
    pub config: MambaConfig,
    pub d_inner: usize,

    /// in_proj: (2 * d_inner, d_model); rows [0, d_inner) feed x, the rest z.
    pub in_proj: Linear,

    /// conv1d weight: (d_inner, d_conv), depthwise.
    pub conv1d_weight: Vec<f32>,
    /// conv1d bias: (d_inner,)
    pub conv1d_bias: Option<Vec<f32>>,

    /// x_proj: (dt_rank + 2 * d_state, d_inner), no bias.
    pub x_proj: Linear,

    /// dt_proj: (d_inner, dt_rank) with bias (d_inner,).
    pub dt_proj: Linear,

    /// A_log: (d_inner, d_state); A = -exp(A_log).
    pub a_log: Vec<f32>,

    /// D "skip" parameter: (d_inner,)
    pub d_skip: Vec<f32>,

    /// out_proj: (d_model, d_inner)
    pub out_proj: Linear,
}

/// Input-dependent quantities derived from one input sequence.
#[derive(Clone, Debug)]
pub struct SelectiveParams {
    /// Convolved, SiLU-activated signal: (batch, d_inner, seq_len).
    pub x: Vec<f32>,
    /// Gate branch: (batch, d_inner, seq_len).
    pub z: Vec<f32>,
    /// Step size after softplus: (batch, d_inner, seq_len).
    pub delta: Vec<f32>,
    /// Input gate: (batch, seq_len, d_state).
    pub b: Vec<f32>,
    /// Output gate: (batch, seq_len, d_state).
    pub c: Vec<f32>,
}

impl Mamba {
    /// Create a block with parameters drawn from the thread-local RNG.
    pub fn new(config: MambaConfig) -> Result<Self> {
        Self::with_rng(config, &mut rand::thread_rng())
    }

    /// Create a block with parameters drawn from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(config: MambaConfig, rng: &mut R) -> Result<Self> {
        let d_inner = config.validate()?;
        let d_model = config.d_model;
        let d_state = config.d_state;
        let d_conv = config.d_conv;
        let dt_rank = config.dt_rank;

        let in_proj = Linear::new(d_model, 2 * d_inner, config.bias, rng);

        // Depthwise conv: fan_in = kernel width.
        let conv_bound = 1.0 / (d_conv as f32).sqrt();
        let conv1d_weight = (0..d_inner * d_conv)
            .map(|_| rng.gen_range(-conv_bound..=conv_bound))
            .collect();
        let conv1d_bias = config
            .conv_bias
            .then(|| (0..d_inner).map(|_| rng.gen_range(-conv_bound..=conv_bound)).collect());

        let x_proj = Linear::new(d_inner, config.x_proj_dim(), false, rng);

        let mut dt_proj = Linear::new(dt_rank, d_inner, true, rng);
        let dt_init_std = (dt_rank as f32).powf(-0.5) * config.dt_scale;
        match config.dt_init {
            DtInit::Random => dt_proj
                .weight
                .iter_mut()
                .for_each(|w| *w = rng.gen_range(-dt_init_std..=dt_init_std)),
            DtInit::Constant => dt_proj.weight.iter_mut().for_each(|w| *w = dt_init_std),
        }

        // softplus(bias) reproduces a log-uniform sample in [dt_min, dt_max].
        let (log_min, log_max) = (config.dt_min.ln(), config.dt_max.ln());
        let dt_bias = (0..d_inner)
            .map(|_| {
                let dt = (rng.gen::<f32>() * (log_max - log_min) + log_min)
                    .exp()
                    .max(config.dt_init_floor);
                inverse_softplus(dt)
            })
            .collect();
        dt_proj.bias = Some(dt_bias);

        // S4D-real initialisation: every row is log([1, 2, ..., d_state]).
        let a_log = (0..d_inner)
            .flat_map(|_| (1..=d_state).map(|n| (n as f32).ln()))
            .collect();

        let d_skip = vec![1.0f32; d_inner];

        let out_proj = Linear::new(d_inner, d_model, config.bias, rng);

        tracing::debug!(
            d_model,
            d_inner,
            d_state,
            d_conv,
            dt_rank,
            dt_init = ?config.dt_init,
            "initialised mamba block"
        );

        Ok(Self {
            config,
            d_inner,
            in_proj,
            conv1d_weight,
            conv1d_bias,
            x_proj,
            dt_proj,
            a_log,
            d_skip,
            out_proj,
        })
    }

    pub fn d_model(&self) -> usize {
        self.config.d_model
    }

    pub fn d_state(&self) -> usize {
        self.config.d_state
    }

    /// A = -exp(A_log), shape (d_inner, d_state).
    pub fn a_matrix(&self) -> Vec<f32> {
        self.a_log.iter().map(|&v| -v.exp()).collect()
    }

    fn check_input(&self, input: &[f32], batch: usize, seq_len: usize) -> Result<()> {
        if seq_len == 0 {
            return Err(SsmError::EmptySequence);
        }
        let expected = batch * seq_len * self.d_model();
        if input.len() != expected {
            return Err(SsmError::ShapeMismatch {
                expected: vec![batch, seq_len, self.d_model()],
                got: vec![input.len()],
            });
        }
        Ok(())
    }

    /// Compute the signal, gate, Δ, B and C for an input of shape
    /// (batch, seq_len, d_model).
    pub fn selective_params(&self, input: &[f32], batch: usize, seq_len: usize) -> Result<SelectiveParams> {
        self.check_input(input, batch, seq_len)?;
        let di = self.d_inner;
        let d_state = self.d_state();
        let dt_rank = self.config.dt_rank;
        let rows = batch * seq_len;

        // 1) in_proj: (B*L, d_model) -> (B*L, 2*d_inner), then split and
        //    rearrange x, z to (B, d_inner, L)
        let xz = self.in_proj.forward(input, rows);
        let mut x_bdl = vec![0.0f32; batch * di * seq_len];
        let mut z = vec![0.0f32; batch * di * seq_len];
        for b in 0..batch {
            for l in 0..seq_len {
                let src = (b * seq_len + l) * 2 * di;
                for i in 0..di {
                    x_bdl[(b * di + i) * seq_len + l] = xz[src + i];
                    z[(b * di + i) * seq_len + l] = xz[src + di + i];
                }
            }
        }

        // 2) Causal conv1d, trimmed to seq_len, with SiLU
        let x = causal_conv1d_fn(
            &x_bdl,
            batch,
            di,
            seq_len,
            &self.conv1d_weight,
            self.config.d_conv,
            self.conv1d_bias.as_deref(),
            true,
        );

        // 3) x_proj over (B*L, d_inner) -> (B*L, dt_rank + 2*d_state)
        let mut x_bld = vec![0.0f32; rows * di];
        for b in 0..batch {
            for i in 0..di {
                for l in 0..seq_len {
                    x_bld[(b * seq_len + l) * di + i] = x[(b * di + i) * seq_len + l];
                }
            }
        }
        let x_dbl = self.x_proj.forward(&x_bld, rows);
        let proj_dim = self.config.x_proj_dim();

        // 4) Split [dt_raw | B | C]
        let mut dt_raw = vec![0.0f32; rows * dt_rank];
        let mut b_bln = vec![0.0f32; rows * d_state];
        let mut c_bln = vec![0.0f32; rows * d_state];
        for r in 0..rows {
            let src = &x_dbl[r * proj_dim..(r + 1) * proj_dim];
            dt_raw[r * dt_rank..(r + 1) * dt_rank].copy_from_slice(&src[..dt_rank]);
            b_bln[r * d_state..(r + 1) * d_state].copy_from_slice(&src[dt_rank..dt_rank + d_state]);
            c_bln[r * d_state..(r + 1) * d_state].copy_from_slice(&src[dt_rank + d_state..]);
        }

        // 5) Δ = softplus(dt_proj(dt_raw) [+ bias]), rearranged to (B, d_inner, L).
        //    dt_proj already adds its bias once.
        let dt_full = self.dt_proj.forward(&dt_raw, rows);
        let extra_bias = self
            .dt_proj
            .bias
            .as_deref()
            .filter(|_| self.config.duplicate_dt_bias);
        let mut delta = vec![0.0f32; batch * di * seq_len];
        for b in 0..batch {
            for l in 0..seq_len {
                let src = (b * seq_len + l) * di;
                for i in 0..di {
                    let mut v = dt_full[src + i];
                    if let Some(bias) = extra_bias {
                        v += bias[i];
                    }
                    // softplus underflows to 0 for very negative v; keep Δ > 0.
                    // At the floor exp(Δ·A) rounds to exactly 1.0 in f32.
                    delta[(b * di + i) * seq_len + l] = softplus(v).max(f32::MIN_POSITIVE);
                }
            }
        }

        Ok(SelectiveParams { x, z, delta, b: b_bln, c: c_bln })
    }

    /// Forward pass over a flat (batch, seq_len, d_model) buffer.
    ///
    /// Returns a buffer of the same shape.
    pub fn forward_seq(&self, input: &[f32], batch: usize, seq_len: usize) -> Result<Vec<f32>> {
        tracing::trace!(batch, seq_len, d_inner = self.d_inner, "mamba forward");
        let di = self.d_inner;
        let params = self.selective_params(input, batch, seq_len)?;
        let a = self.a_matrix();

        let scan = selective_scan(&ScanInputs {
            batch,
            dim: di,
            seq_len,
            d_state: self.d_state(),
            u: &params.x,
            delta: &params.delta,
            a: &a,
            b: &params.b,
            c: &params.c,
            d: Some(&self.d_skip),
            z: Some(&params.z),
        })?;

        // (B, d_inner, L) -> (B, L, d_inner) -> out_proj
        let mut y_bld = vec![0.0f32; batch * seq_len * di];
        for b in 0..batch {
            for i in 0..di {
                for l in 0..seq_len {
                    y_bld[(b * seq_len + l) * di + i] = scan.output[(b * di + i) * seq_len + l];
                }
            }
        }
        Ok(self.out_proj.forward(&y_bld, batch * seq_len))
    }
}

impl Module for Mamba {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let dims = input.expect_rank(3)?;
        let (batch, seq_len, d) = (dims[0], dims[1], dims[2]);
        if d != self.d_model() {
            return Err(SsmError::ShapeMismatch {
                expected: vec![batch, seq_len, self.d_model()],
                got: dims.to_vec(),
            });
        }
        let output = self.forward_seq(input.as_slice(), batch, seq_len)?;
        Tensor::from_vec(output, &[batch, seq_len, self.d_model()])
    }

    fn named_parameters(&self) -> Vec<(String, &[f32])> {
        let mut params: Vec<(String, &[f32])> = vec![("in_proj.weight".into(), self.in_proj.weight.as_slice())];
        if let Some(b) = &self.in_proj.bias {
            params.push(("in_proj.bias".into(), b.as_slice()));
        }
        params.push(("conv1d.weight".into(), self.conv1d_weight.as_slice()));
        if let Some(b) = &self.conv1d_bias {
            params.push(("conv1d.bias".into(), b.as_slice()));
        }
        params.push(("x_proj.weight".into(), self.x_proj.weight.as_slice()));
        params.push(("dt_proj.weight".into(), self.dt_proj.weight.as_slice()));
        if let Some(b) = &self.dt_proj.bias {
            params.push(("dt_proj.bias".into(), b.as_slice()));
        }
        params.push(("A_log".into(), self.a_log.as_slice()));
        params.push(("D".into(), self.d_skip.as_slice()));
        params.push(("out_proj.weight".into(), self.out_proj.weight.as_slice()));
        if let Some(b) = &self.out_proj.bias {
            params.push(("out_proj.bias".into(), b.as_slice()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::silu;
    use crate::selective_scan::SelectiveScanOutput;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded(config: MambaConfig, seed: u64) -> Mamba {
        Mamba::with_rng(config, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn scenario_config() -> MambaConfig {
        MambaConfig {
            d_state: 4,
            d_conv: 4,
            expand: 2.0,
            dt_rank: 4,
            ..MambaConfig::new(8)
        }
    }

    #[test]
    fn test_mamba_creation() {
        let m = seeded(MambaConfig::new(64), 0);
        assert_eq!(m.d_inner, 128);
        assert_eq!(m.in_proj.weight.len(), 2 * 128 * 64);
        assert!(m.in_proj.bias.is_none());
        assert_eq!(m.conv1d_weight.len(), 128 * 4);
        assert!(m.conv1d_bias.is_some());
        assert_eq!(m.x_proj.out_dim, 16 + 2 * 16);
        assert_eq!(m.dt_proj.weight.len(), 128 * 16);
        assert_eq!(m.a_log.len(), 128 * 16);
        assert!(m.d_skip.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_a_log_rows_are_log_arange() {
        let m = seeded(scenario_config(), 1);
        for row in m.a_log.chunks(m.d_state()) {
            for (n, &v) in row.iter().enumerate() {
                assert!((v - ((n + 1) as f32).ln()).abs() < 1e-7);
            }
        }
        let a = m.a_matrix();
        assert!(a.iter().all(|&v| v < 0.0));
        assert_eq!(&a[..4], &[-1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_dt_bias_inverts_to_sampled_range() {
        let cfg = scenario_config();
        let m = seeded(cfg.clone(), 2);
        for &bias in m.dt_proj.bias.as_ref().unwrap() {
            let dt = softplus(bias);
            assert!(dt >= cfg.dt_init_floor * 0.999);
            assert!(dt >= cfg.dt_min * 0.999 && dt <= cfg.dt_max * 1.001, "dt={dt}");
        }
    }

    #[test]
    fn test_dt_proj_weight_init_modes() {
        let cfg = MambaConfig { dt_scale: 2.0, ..scenario_config() };
        let s = (cfg.dt_rank as f32).powf(-0.5) * 2.0;
        let random = seeded(cfg.clone(), 3);
        assert!(random.dt_proj.weight.iter().all(|w| w.abs() <= s));
        let constant = seeded(MambaConfig { dt_init: DtInit::Constant, ..cfg }, 3);
        assert!(constant.dt_proj.weight.iter().all(|&w| w == s));
    }

    #[test]
    fn test_scenario_shape_and_finite() {
        let m = seeded(scenario_config(), 42);
        let input = Tensor::randn(&[2, 5, 8], &mut StdRng::seed_from_u64(7));
        let output = m.forward(&input).unwrap();
        assert_eq!(output.dims(), &[2, 5, 8]);
        assert!(output.all_finite());
    }

    #[test]
    fn test_output_shape_matches_input_across_configs() {
        let configs = [
            MambaConfig::tiny(),
            MambaConfig { expand: 1.0, d_conv: 1, ..MambaConfig::tiny() },
            MambaConfig { expand: 1.5, d_conv: 3, bias: true, ..MambaConfig::new(6) },
            MambaConfig { conv_bias: false, d_state: 2, dt_rank: 1, ..MambaConfig::new(3) },
        ];
        for (i, cfg) in configs.into_iter().enumerate() {
            let d = cfg.d_model;
            let m = seeded(cfg, i as u64);
            for &(batch, seq_len) in &[(1, 1), (3, 2), (2, 9)] {
                let input = Tensor::randn(&[batch, seq_len, d], &mut StdRng::seed_from_u64(11));
                let out = m.forward(&input).unwrap();
                assert_eq!(out.dims(), &[batch, seq_len, d]);
            }
        }
    }

    #[test]
    fn test_delta_strictly_positive() {
        let m = seeded(scenario_config(), 5);
        let input = Tensor::randn(&[2, 5, 8], &mut StdRng::seed_from_u64(9)).to_vec();
        let scaled: Vec<f32> = input.iter().map(|v| v * 50.0).collect();
        for inp in [&input, &scaled] {
            let p = m.selective_params(inp, 2, 5).unwrap();
            assert!(p.delta.iter().all(|&d| d > 0.0 && d.is_finite()));
        }
    }

    #[test]
    fn test_decay_factor_in_unit_interval() {
        let m = seeded(scenario_config(), 5);
        let input = Tensor::randn(&[2, 5, 8], &mut StdRng::seed_from_u64(9)).to_vec();
        let p = m.selective_params(&input, 2, 5).unwrap();
        let a = m.a_matrix();
        let (di, n_state) = (m.d_inner, m.d_state());
        for (idx, &dt) in p.delta.iter().enumerate() {
            let i = (idx / 5) % di;
            for n in 0..n_state {
                // Same f32 expression the scan step uses.
                let decay = (dt * a[i * n_state + n]).exp();
                assert!(decay > 0.0 && decay < 1.0, "dt={dt} decay={decay}");
            }
        }
    }

    #[test]
    fn test_decay_at_delta_floor_rounds_to_one() {
        let decay = (f32::MIN_POSITIVE * -16.0f32).exp();
        assert_eq!(decay, 1.0);
    }

    #[test]
    fn test_causality_bit_identical_prefix() {
        let m = seeded(scenario_config(), 6);
        let (batch, seq_len, d) = (2, 5, 8);
        let input = Tensor::randn(&[batch, seq_len, d], &mut StdRng::seed_from_u64(3)).to_vec();
        let base = m.forward_seq(&input, batch, seq_len).unwrap();

        for t in 0..seq_len - 1 {
            let mut perturbed = input.clone();
            for b in 0..batch {
                for l in t + 1..seq_len {
                    for k in 0..d {
                        perturbed[(b * seq_len + l) * d + k] += 3.0 + k as f32;
                    }
                }
            }
            let out = m.forward_seq(&perturbed, batch, seq_len).unwrap();
            for b in 0..batch {
                for l in 0..=t {
                    let row = (b * seq_len + l) * d;
                    assert_eq!(&out[row..row + d], &base[row..row + d], "t={t} b={b} l={l}");
                }
            }
        }
    }

    #[test]
    fn test_deterministic_forward() {
        let m = seeded(scenario_config(), 8);
        let input = Tensor::randn(&[2, 5, 8], &mut StdRng::seed_from_u64(1));
        let a = m.forward(&input).unwrap();
        let b = m.forward(&input).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_zero_input_gives_zero_output_without_linear_bias() {
        // Zero input → z = 0 → silu(z) = 0, and the state stays zero.
        let m = seeded(scenario_config(), 10);
        let out = m.forward_seq(&vec![0.0; 2 * 5 * 8], 2, 5).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    /// Zero input through the block's own projections, conv and scan.
    fn scan_zero_input(
        m: &Mamba,
        batch: usize,
        seq_len: usize,
        gated: bool,
    ) -> (SelectiveParams, SelectiveScanOutput) {
        let zeros = vec![0.0f32; batch * seq_len * m.d_model()];
        let p = m.selective_params(&zeros, batch, seq_len).unwrap();
        let a = m.a_matrix();
        let scan = selective_scan(&ScanInputs {
            batch,
            dim: m.d_inner,
            seq_len,
            d_state: m.d_state(),
            u: &p.x,
            delta: &p.delta,
            a: &a,
            b: &p.b,
            c: &p.c,
            d: Some(&m.d_skip),
            z: gated.then_some(p.z.as_slice()),
        })
        .unwrap();
        (p, scan)
    }

    #[test]
    fn test_zero_input_without_biases_keeps_state_zero() {
        let m = seeded(MambaConfig { conv_bias: false, bias: false, ..scenario_config() }, 10);
        let (p, scan) = scan_zero_input(&m, 2, 4, true);
        assert!(p.x.iter().all(|&x| x == 0.0));
        assert!(p.b.iter().chain(&p.c).all(|&v| v == 0.0));
        assert!(scan.last_state.hidden.iter().all(|&h| h == 0.0));
        assert!(scan.output.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_zero_input_with_conv_bias_is_silenced_by_gate() {
        let m = seeded(scenario_config(), 10);
        let (p, ungated) = scan_zero_input(&m, 2, 4, false);
        // The conv bias drives the signal, so the state fills up.
        assert!(p.x.iter().any(|&x| x != 0.0));
        assert!(ungated.last_state.hidden.iter().any(|&h| h != 0.0));
        assert!(ungated.output.iter().any(|&y| y != 0.0));

        // z = 0 without a linear bias, and silu(0) = 0 zeroes the output.
        assert!(p.z.iter().all(|&z| z == 0.0));
        let (_, gated) = scan_zero_input(&m, 2, 4, true);
        assert_eq!(gated.last_state, ungated.last_state);
        assert!(gated.output.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn test_zero_input_with_linear_bias() {
        let m = seeded(MambaConfig { bias: true, ..scenario_config() }, 11);
        let (batch, seq_len) = (2, 4);
        let (p, scan) = scan_zero_input(&m, batch, seq_len, true);

        // The gate branch is exactly the in_proj bias for z.
        let z_bias = &m.in_proj.bias.as_ref().unwrap()[m.d_inner..];
        for (idx, &z) in p.z.iter().enumerate() {
            assert_eq!(z, z_bias[(idx / seq_len) % m.d_inner]);
        }
        assert!(scan.last_state.hidden.iter().any(|&h| h != 0.0));

        let out = m.forward_seq(&vec![0.0; batch * seq_len * 8], batch, seq_len).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        // Every batch element sees the same all-zero sequence.
        let (first, second) = out.split_at(seq_len * 8);
        assert_eq!(first, second);
        // Not just the output bias: the gated scan contributes.
        let out_bias = m.out_proj.bias.as_ref().unwrap();
        assert!(first.chunks(8).any(|row| row != out_bias.as_slice()));
    }

    #[test]
    fn test_single_timestep_matches_closed_form() {
        let cfg = MambaConfig { bias: true, ..scenario_config() };
        let m = seeded(cfg, 13);
        let input = Tensor::randn(&[1, 1, 8], &mut StdRng::seed_from_u64(21)).to_vec();
        let got = m.forward_seq(&input, 1, 1).unwrap();

        let di = m.d_inner;
        let k = m.config.d_conv;
        let n_state = m.d_state();
        let rank = m.config.dt_rank;

        let xz = m.in_proj.forward(&input, 1);
        let mut y = vec![0.0f32; di];
        // x_proj needs the full convolved vector first.
        let xc: Vec<f32> = (0..di)
            .map(|i| {
                let pre = xz[i] * m.conv1d_weight[i * k + k - 1] + m.conv1d_bias.as_ref().unwrap()[i];
                silu(pre)
            })
            .collect();
        let x_dbl = m.x_proj.forward(&xc, 1);
        let bvec = &x_dbl[rank..rank + n_state];
        let cvec = &x_dbl[rank + n_state..];
        // From a zero state the decay term vanishes: h = x * B.
        for i in 0..di {
            let h_dot_c: f32 = (0..n_state).map(|n| xc[i] * bvec[n] * cvec[n]).sum();
            y[i] = (h_dot_c + m.d_skip[i] * xc[i]) * silu(xz[di + i]);
        }
        let expected = m.out_proj.forward(&y, 1);

        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).abs() < 1e-5, "got={g} expected={e}");
        }
    }

    #[test]
    fn test_duplicate_dt_bias_switch() {
        let cfg = scenario_config();
        let twice = seeded(cfg.clone(), 14);
        let mut once = twice.clone();
        once.config.duplicate_dt_bias = false;
        let input = Tensor::randn(&[1, 3, 8], &mut StdRng::seed_from_u64(4)).to_vec();

        let p2 = twice.selective_params(&input, 1, 3).unwrap();
        let p1 = once.selective_params(&input, 1, 3).unwrap();
        let bias = twice.dt_proj.bias.as_ref().unwrap();
        // dt_proj bias is negative at init, so the doubled bias shrinks Δ.
        assert!(bias.iter().all(|&b| b < 0.0));
        for (d2, d1) in p2.delta.iter().zip(&p1.delta) {
            assert!(*d2 > 0.0 && d2 < d1);
        }
    }

    #[test]
    fn test_forward_rejects_bad_inputs() {
        let m = seeded(scenario_config(), 15);
        let wrong_width = Tensor::zeros(&[2, 5, 7]);
        assert!(matches!(m.forward(&wrong_width), Err(SsmError::ShapeMismatch { .. })));
        let rank2 = Tensor::zeros(&[5, 8]);
        assert!(m.forward(&rank2).is_err());
        let empty = Tensor::zeros(&[2, 0, 8]);
        assert!(matches!(m.forward(&empty), Err(SsmError::EmptySequence)));
        assert!(m.forward_seq(&[0.0; 10], 2, 5).is_err());
    }

    #[test]
    fn test_construction_rejects_zero_inner_dim() {
        let cfg = MambaConfig { expand: 0.05, ..scenario_config() };
        assert!(matches!(Mamba::new(cfg), Err(SsmError::InvalidConfig(_))));
    }

    #[test]
    fn test_named_parameters_and_count() {
        let m = seeded(scenario_config(), 16);
        let names: Vec<String> = m.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["in_proj.weight", "conv1d.weight", "conv1d.bias", "x_proj.weight", "dt_proj.weight", "dt_proj.bias", "A_log", "D", "out_proj.weight"]
        );
        let di = 16;
        let expected = 2 * di * 8 + di * 4 + di + 12 * di + di * 4 + di + di * 4 + di + 8 * di;
        assert_eq!(m.param_count(), expected);
    }
}
