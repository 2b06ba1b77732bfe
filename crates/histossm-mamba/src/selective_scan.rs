//! Selective scan: the input-dependent linear state-space recurrence.
//!
//! For every timestep t, independently per batch element and channel:
//!
//! ```text
//! h_t = exp(delta_t * A) * h_{t-1} + u_t * B_t
//! y_t = <h_t, C_t> + D * u_t
//! ```
//!
//! followed by an optional `y * silu(z)` gate over the whole sequence.
//! The recurrence is expressed as a fold of [`selective_scan_step`] over
//! time so the state is owned by exactly one step at a time.
//!
//! All tensors are flat f32 slices with explicit shape indexing.

use histossm_core::{Result, SsmError};

use crate::activations::silu;

/// Hidden state of the scan, shape (batch, dim, d_state).
#[derive(Clone, Debug, PartialEq)]
pub struct ScanState {
    pub hidden: Vec<f32>,
    pub batch: usize,
    pub dim: usize,
    pub d_state: usize,
}

impl ScanState {
    pub fn zeros(batch: usize, dim: usize, d_state: usize) -> Self {
        Self {
            hidden: vec![0.0; batch * dim * d_state],
            batch,
            dim,
            d_state,
        }
    }
}

/// Inputs of a single timestep.
#[derive(Clone, Copy, Debug)]
pub struct StepInputs<'a> {
    /// Signal, shape (batch, dim).
    pub u: &'a [f32],
    /// Step size (already positive), shape (batch, dim).
    pub delta: &'a [f32],
    /// Input gate, shape (batch, d_state).
    pub b: &'a [f32],
    /// Output gate, shape (batch, d_state).
    pub c: &'a [f32],
}

/// Full-sequence inputs of the scan.
#[derive(Clone, Copy, Debug)]
pub struct ScanInputs<'a> {
    pub batch: usize,
    pub dim: usize,
    pub seq_len: usize,
    pub d_state: usize,
    /// Signal, shape (batch, dim, seq_len).
    pub u: &'a [f32],
    /// Step size after softplus, shape (batch, dim, seq_len).
    pub delta: &'a [f32],
    /// State matrix, negative, shape (dim, d_state).
    pub a: &'a [f32],
    /// Input gate, shape (batch, seq_len, d_state).
    pub b: &'a [f32],
    /// Output gate, shape (batch, seq_len, d_state).
    pub c: &'a [f32],
    /// Skip parameter, shape (dim,).
    pub d: Option<&'a [f32]>,
    /// Gate branch, shape (batch, dim, seq_len).
    pub z: Option<&'a [f32]>,
}

impl ScanInputs<'_> {
    fn validate(&self) -> Result<()> {
        let bdl = self.batch * self.dim * self.seq_len;
        let bln = self.batch * self.seq_len * self.d_state;
        check_len("u", self.u, &[self.batch, self.dim, self.seq_len], bdl)?;
        check_len("delta", self.delta, &[self.batch, self.dim, self.seq_len], bdl)?;
        check_len("a", self.a, &[self.dim, self.d_state], self.dim * self.d_state)?;
        check_len("b", self.b, &[self.batch, self.seq_len, self.d_state], bln)?;
        check_len("c", self.c, &[self.batch, self.seq_len, self.d_state], bln)?;
        if let Some(d) = self.d {
            check_len("d", d, &[self.dim], self.dim)?;
        }
        if let Some(z) = self.z {
            check_len("z", z, &[self.batch, self.dim, self.seq_len], bdl)?;
        }
        Ok(())
    }
}

fn check_len(name: &str, data: &[f32], shape: &[usize], expected: usize) -> Result<()> {
    if data.len() != expected {
        tracing::debug!(tensor = name, expected, got = data.len(), "selective scan shape mismatch");
        return Err(SsmError::ShapeMismatch {
            expected: shape.to_vec(),
            got: vec![data.len()],
        });
    }
    Ok(())
}

/// Result of a selective scan.
#[derive(Clone, Debug)]
pub struct SelectiveScanOutput {
    /// Output, shape (batch, dim, seq_len).
    pub output: Vec<f32>,
    /// Hidden state after the final timestep.
    pub last_state: ScanState,
}

/// One step of the recurrence: `(state, inputs_t) -> (new_state, y_t)`.
///
/// `y_t` has shape (batch, dim) and excludes the z gate.
pub fn selective_scan_step(
    mut state: ScanState,
    a: &[f32],
    d: Option<&[f32]>,
    step: StepInputs<'_>,
) -> (ScanState, Vec<f32>) {
    let (batch, dim, d_state) = (state.batch, state.dim, state.d_state);
    let mut y = vec![0.0f32; batch * dim];

    for b_idx in 0..batch {
        let b_row = &step.b[b_idx * d_state..(b_idx + 1) * d_state];
        let c_row = &step.c[b_idx * d_state..(b_idx + 1) * d_state];
        for d_idx in 0..dim {
            let bd = b_idx * dim + d_idx;
            let dt = step.delta[bd];
            let u = step.u[bd];
            let a_row = &a[d_idx * d_state..(d_idx + 1) * d_state];
            let h = &mut state.hidden[bd * d_state..(bd + 1) * d_state];

            let mut acc = 0.0f32;
            for n in 0..d_state {
                h[n] *= (dt * a_row[n]).exp();
                h[n] += u * b_row[n];
                acc += h[n] * c_row[n];
            }
            if let Some(d_skip) = d {
                acc += d_skip[d_idx] * u;
            }
            y[bd] = acc;
        }
    }

    (state, y)
}

/// Run the scan over a whole sequence from a zero hidden state.
pub fn selective_scan(inputs: &ScanInputs<'_>) -> Result<SelectiveScanOutput> {
    inputs.validate()?;
    let ScanInputs { batch, dim, seq_len, d_state, .. } = *inputs;

    let mut output = vec![0.0f32; batch * dim * seq_len];
    let mut u_t = vec![0.0f32; batch * dim];
    let mut dt_t = vec![0.0f32; batch * dim];
    let mut b_t = vec![0.0f32; batch * d_state];
    let mut c_t = vec![0.0f32; batch * d_state];

    let last_state = (0..seq_len).fold(ScanState::zeros(batch, dim, d_state), |state, t| {
        for bd in 0..batch * dim {
            u_t[bd] = inputs.u[bd * seq_len + t];
            dt_t[bd] = inputs.delta[bd * seq_len + t];
        }
        for b_idx in 0..batch {
            let src = (b_idx * seq_len + t) * d_state;
            b_t[b_idx * d_state..(b_idx + 1) * d_state].copy_from_slice(&inputs.b[src..src + d_state]);
            c_t[b_idx * d_state..(b_idx + 1) * d_state].copy_from_slice(&inputs.c[src..src + d_state]);
        }

        let step = StepInputs { u: &u_t, delta: &dt_t, b: &b_t, c: &c_t };
        let (state, y_t) = selective_scan_step(state, inputs.a, inputs.d, step);
        for (bd, &y) in y_t.iter().enumerate() {
            output[bd * seq_len + t] = y;
        }
        state
    });

    if let Some(z) = inputs.z {
        for (y, &g) in output.iter_mut().zip(z) {
            *y *= silu(g);
        }
    }

    Ok(SelectiveScanOutput { output, last_state })
}
